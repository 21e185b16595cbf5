//! Streaming physical operators.

pub mod nested_loop_optional;
pub mod project;

use crate::streams::{Mapping, TupleSender};

/// A remote-endpoint client. Represented as a trait so tests can supply
/// an in-memory fake without standing up a network client.
///
/// `execute` blocks until it has enqueued every matching tuple plus the
/// stream's `Eof` sentinel onto `out`.
pub trait RemoteSource {
    /// Every variable this source can bind — used by the OPTIONAL-empty
    /// branch to build a synthetic all-empty tuple on a total miss.
    fn atts(&self) -> &[String];

    fn execute(&self, vars: &[String], instance_values: &[String], out: &TupleSender);
}

/// Build the instance-values list `execute` expects: `tuple[v]` for each
/// `v` in `vars`, in order, defaulting to the empty string for an
/// unbound variable.
pub fn instance_values(tuple: &Mapping, vars: &[String]) -> Vec<String> {
    vars.iter()
        .map(|v| tuple.get(v).cloned().unwrap_or_default())
        .collect()
}
