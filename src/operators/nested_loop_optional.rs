//! Symmetric hash-partitioned Nested-Loop Optional: the join operator
//! implementing SPARQL `OPTIONAL` against a remote source, contacting it
//! only on a partition miss and caching what it learns.

use std::collections::{HashSet, VecDeque};

use crate::storage::{partition_key, ArrivalClock, PartitionedTable, Record};
use crate::streams::{bounded, Mapping, StreamItem, TupleReceiver, TupleSender};

use super::{instance_values, RemoteSource};

/// `NestedLoopOptional` pins its state to one instance: the two
/// partitioned tables and the arrival clock are private to this operator
/// and never shared across instances.
pub struct NestedLoopOptional {
    join_vars: Vec<String>,
    partition_count: usize,
    /// Capacity of the scratch stream used to receive a remote source's
    /// output during one probe call.
    remote_stream_capacity: usize,
    clock: ArrivalClock,
}

impl NestedLoopOptional {
    /// `join_vars` is fixed at construction as the (sorted, for
    /// determinism) intersection of `vars_left` and `vars_right`.
    pub fn new(
        vars_left: &HashSet<String>,
        vars_right: &HashSet<String>,
        partition_count: usize,
        remote_stream_capacity: usize,
    ) -> Self {
        let mut join_vars: Vec<String> = vars_left.intersection(vars_right).cloned().collect();
        join_vars.sort();
        NestedLoopOptional {
            join_vars,
            partition_count,
            remote_stream_capacity,
            clock: ArrivalClock::new(),
        }
    }

    pub fn join_vars(&self) -> &[String] {
        &self.join_vars
    }

    /// Drain `q_left` fully, probe each left tuple against `right`
    /// (contacting it only on a partition miss), then drain the result
    /// buffer to `out` and emit `Eof`.
    pub fn execute(&self, q_left: &TupleReceiver, right: &dyn RemoteSource, out: &TupleSender) {
        let mut l_table = PartitionedTable::new(self.partition_count);
        let mut r_table = PartitionedTable::new(self.partition_count);
        let mut result_buf: Vec<Mapping> = Vec::new();

        // The sentinel itself is never appended to this buffer — `drain`
        // already stops at it.
        let mut pending: VecDeque<Mapping> = q_left.drain().into();

        while let Some(t) = pending.pop_front() {
            self.insert_and_probe(t, &mut l_table, &mut r_table, right, &mut result_buf);
        }

        for tuple in result_buf {
            if out.put_tuple(tuple).is_err() {
                return;
            }
        }
        let _ = out.put_eof();
    }

    fn insert_and_probe(
        &self,
        t: Mapping,
        l_table: &mut PartitionedTable,
        r_table: &mut PartitionedTable,
        right: &dyn RemoteSource,
        result_buf: &mut Vec<Mapping>,
    ) {
        let key = partition_key(&t, &self.join_vars);
        let i = l_table.index_for(&key);
        let rec = Record::new(t, self.clock.next());
        l_table.insert(i, rec.clone());
        self.probe(&rec, i, r_table, right, result_buf);
    }

    fn probe(
        &self,
        rec: &Record,
        i: usize,
        r_table: &mut PartitionedTable,
        right: &dyn RemoteSource,
        result_buf: &mut Vec<Mapping>,
    ) {
        let partition_was_empty = r_table.partition(i).is_empty();
        let mut any_join = false;

        for r in r_table.partition(i) {
            if rec.is_duplicated(r) {
                break;
            }
            let matches = self
                .join_vars
                .iter()
                .all(|v| rec.tuple.get(v) == r.tuple.get(v));
            if matches {
                any_join = true;
                // Right side wins on overlap for a pure local match.
                let mut combined = rec.tuple.clone();
                combined.extend(r.tuple.clone());
                result_buf.push(combined);
            }
        }

        if !(partition_was_empty || !any_join) {
            return;
        }

        let instances = instance_values(&rec.tuple, &self.join_vars);
        let (tx, rx) = bounded(self.remote_stream_capacity);
        right.execute(&self.join_vars, &instances, &tx);
        drop(tx);

        match rx.get() {
            StreamItem::Eof => {
                let empty_tuple: Mapping = right
                    .atts()
                    .iter()
                    .map(|a| (a.clone(), String::new()))
                    .collect();
                // The cached record also carries this probe's join-var
                // bindings, not just the empty atts — otherwise a later
                // left tuple hashing to the same partition could never
                // match it on `join_vars` and would re-contact the
                // remote source on every miss instead of hitting cache.
                let mut cached = empty_tuple.clone();
                for v in &self.join_vars {
                    if let Some(val) = rec.tuple.get(v) {
                        cached.insert(v.clone(), val.clone());
                    }
                }
                r_table.insert(i, Record::new(cached, self.clock.next()));
                let mut combined = rec.tuple.clone();
                combined.extend(empty_tuple);
                result_buf.push(combined);
            }
            StreamItem::Tuple(first) => {
                self.absorb_remote_tuple(first, rec, i, r_table, result_buf);
                loop {
                    match rx.get() {
                        StreamItem::Tuple(t) => self.absorb_remote_tuple(t, rec, i, r_table, result_buf),
                        StreamItem::Eof => break,
                    }
                }
            }
        }
    }

    /// A remote tuple joins the probing left record: cache it back into
    /// `R` (so a later left tuple hitting this partition sees it without
    /// another remote call) and emit the combined tuple. Left's bindings
    /// overwrite the remote tuple's on overlap — the opposite direction
    /// from the local-match branch, because here the remote tuple is
    /// only known to satisfy the join on `join_vars`; `rec.tuple` is the
    /// side that carries the rest of the pattern's bindings.
    fn absorb_remote_tuple(
        &self,
        r_tuple: Mapping,
        rec: &Record,
        i: usize,
        r_table: &mut PartitionedTable,
        result_buf: &mut Vec<Mapping>,
    ) {
        let mut cached = r_tuple.clone();
        for v in &self.join_vars {
            if let Some(val) = rec.tuple.get(v) {
                cached.insert(v.clone(), val.clone());
            }
        }
        r_table.insert(i, Record::new(cached, self.clock.next()));

        // r_tuple ⊎ rec.tuple: rec.tuple (left) overwrites on overlap —
        // the opposite direction from the local-match branch above.
        let mut combined = r_tuple;
        combined.extend(rec.tuple.clone());
        result_buf.push(combined);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn vars(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// A fake remote source that always answers with a fixed, preloaded
    /// table of tuples matching on the join key, or nothing.
    struct FakeSource {
        atts: Vec<String>,
        answers: Vec<Mapping>,
    }

    impl RemoteSource for FakeSource {
        fn atts(&self) -> &[String] {
            &self.atts
        }

        fn execute(&self, vars: &[String], instance_values: &[String], out: &TupleSender) {
            for candidate in &self.answers {
                let matches = vars
                    .iter()
                    .zip(instance_values.iter())
                    .all(|(v, expected)| candidate.get(v).map(|s| s.as_str()) == Some(expected.as_str()));
                if matches {
                    out.put_tuple(candidate.clone()).unwrap();
                }
            }
            out.put_eof().unwrap();
        }
    }

    #[test]
    fn optional_empty_padding_caches_across_left_tuples() {
        let left_vars = vars(&["x"]);
        let right_vars = vars(&["x", "z"]);
        let op = NestedLoopOptional::new(&left_vars, &right_vars, 4, 16);

        let source = FakeSource {
            atts: vec!["z".to_string()],
            answers: vec![],
        };

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);

        in_tx.put_tuple(mapping(&[("x", "k")])).unwrap();
        in_tx.put_tuple(mapping(&[("x", "k")])).unwrap();
        in_tx.put_eof().unwrap();

        op.execute(&in_rx, &source, &out_tx);

        let results = out_rx.drain();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.get("x"), Some(&"k".to_string()));
            assert_eq!(r.get("z"), Some(&"".to_string()));
        }
    }

    #[test]
    fn every_left_tuple_produces_at_least_one_output() {
        let left_vars = vars(&["x"]);
        let right_vars = vars(&["x"]);
        let op = NestedLoopOptional::new(&left_vars, &right_vars, 4, 16);
        let source = FakeSource {
            atts: vec!["y".to_string()],
            answers: vec![mapping(&[("x", "a"), ("y", "1")])],
        };

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);
        in_tx.put_tuple(mapping(&[("x", "a")])).unwrap();
        in_tx.put_tuple(mapping(&[("x", "b")])).unwrap();
        in_tx.put_tuple(mapping(&[("x", "c")])).unwrap();
        in_tx.put_eof().unwrap();

        op.execute(&in_rx, &source, &out_tx);
        let results = out_rx.drain();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn second_left_tuple_with_same_join_key_does_not_recontact_remote() {
        use std::cell::Cell;

        struct CountingSource {
            atts: Vec<String>,
            calls: Cell<usize>,
        }
        impl RemoteSource for CountingSource {
            fn atts(&self) -> &[String] {
                &self.atts
            }
            fn execute(&self, _vars: &[String], _instance_values: &[String], out: &TupleSender) {
                self.calls.set(self.calls.get() + 1);
                out.put_tuple(mapping(&[("x", "a"), ("y", "1")])).unwrap();
                out.put_eof().unwrap();
            }
        }

        let left_vars = vars(&["x"]);
        let right_vars = vars(&["x"]);
        let op = NestedLoopOptional::new(&left_vars, &right_vars, 4, 16);
        let source = CountingSource {
            atts: vec!["y".to_string()],
            calls: Cell::new(0),
        };

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);
        in_tx.put_tuple(mapping(&[("x", "a")])).unwrap();
        in_tx.put_tuple(mapping(&[("x", "a")])).unwrap();
        in_tx.put_eof().unwrap();

        op.execute(&in_rx, &source, &out_tx);
        let _ = out_rx.drain();
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn no_duplicate_join_output_for_matching_pair() {
        // Two left tuples sharing a join key, and the remote answer for
        // the first caches into R; the second left tuple must hit the
        // cache exactly once, not duplicate it via a stale partition
        // re-scan.
        let left_vars = vars(&["x"]);
        let right_vars = vars(&["x"]);
        let op = NestedLoopOptional::new(&left_vars, &right_vars, 1, 16);
        let source = FakeSource {
            atts: vec!["y".to_string()],
            answers: vec![mapping(&[("x", "a"), ("y", "1")])],
        };

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);
        in_tx.put_tuple(mapping(&[("x", "a")])).unwrap();
        in_tx.put_tuple(mapping(&[("x", "a")])).unwrap();
        in_tx.put_eof().unwrap();

        op.execute(&in_rx, &source, &out_tx);
        let results = out_rx.drain();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert_eq!(r.get("y"), Some(&"1".to_string()));
        }
    }

    #[test]
    fn asymmetric_merge_direction_matches_each_branch() {
        // Local-match branch: right overwrites left on overlap.
        let left_vars = vars(&["x"]);
        let right_vars = vars(&["x"]);
        let op = NestedLoopOptional::new(&left_vars, &right_vars, 1, 16);
        let source = FakeSource {
            atts: vec!["x".to_string(), "shared".to_string()],
            answers: vec![mapping(&[("x", "a"), ("shared", "from-right")])],
        };

        let (in_tx, in_rx) = bounded(8);
        let (out_tx, out_rx) = bounded(8);
        // First left tuple triggers the remote-contact (join) branch.
        in_tx
            .put_tuple(mapping(&[("x", "a"), ("shared", "from-left")]))
            .unwrap();
        // Second left tuple with the same key hits the now-cached R
        // record via the local-match branch.
        in_tx
            .put_tuple(mapping(&[("x", "a"), ("shared", "from-left")]))
            .unwrap();
        in_tx.put_eof().unwrap();

        op.execute(&in_rx, &source, &out_tx);
        let results = out_rx.drain();
        assert_eq!(results.len(), 2);

        // Join branch (first tuple): r_tuple ⊎ rec.tuple, rec.tuple wins.
        assert_eq!(results[0].get("shared"), Some(&"from-left".to_string()));
        // Local-match branch (second tuple): rec.tuple ⊎ r.tuple, r.tuple wins.
        assert_eq!(results[1].get("shared"), Some(&"from-right".to_string()));
    }
}
