//! Lazy projection/limit operator.

use crate::streams::{Mapping, StreamItem, TupleReceiver, TupleSender};
use crate::terms::Argument;

/// Projects onto a fixed list of variables and optionally stops after
/// `limit` tuples.
#[derive(Debug, Clone)]
pub struct Project {
    vars: Vec<Argument>,
    limit: i64,
}

impl Project {
    /// `limit < 0` means unbounded.
    pub fn new(vars: Vec<Argument>, limit: i64) -> Self {
        Project { vars, limit }
    }

    pub fn execute(&self, input: &TupleReceiver, output: &TupleSender) {
        if self.vars.is_empty() {
            loop {
                match input.get() {
                    StreamItem::Tuple(tuple) => {
                        if output.put_tuple(tuple).is_err() {
                            return;
                        }
                    }
                    StreamItem::Eof => {
                        let _ = output.put_eof();
                        return;
                    }
                }
            }
        }

        let mut emitted: i64 = 0;
        loop {
            if self.limit >= 0 && emitted >= self.limit {
                let _ = output.put_eof();
                return;
            }
            match input.get() {
                StreamItem::Tuple(tuple) => {
                    let projected = self.project_one(&tuple);
                    if output.put_tuple(projected).is_err() {
                        return;
                    }
                    emitted += 1;
                }
                StreamItem::Eof => {
                    let _ = output.put_eof();
                    return;
                }
            }
        }
    }

    fn project_one(&self, tuple: &Mapping) -> Mapping {
        self.vars
            .iter()
            .map(|arg| {
                let key = arg.var_name().to_string();
                let value = tuple.get(&key).cloned().unwrap_or_default();
                (key, value)
            })
            .collect()
    }
}
