//! Bounded tuple streams.
//!
//! A stream is a `crossbeam_channel::bounded` channel of [`StreamItem`],
//! which folds the end-of-stream sentinel into the payload enum rather
//! than treating channel closure as the termination signal. A consumer
//! calling [`TupleReceiver::recv`] never needs to distinguish "the
//! channel hung up" from "the producer sent `Eof`" — there is exactly
//! one way a well-behaved producer ends a stream, and it is a value, not
//! an error.

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};

/// A tuple: variable name (sigil already stripped) to lexical value.
pub type Mapping = HashMap<String, String>;

/// One item flowing through a tuple stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamItem {
    Tuple(Mapping),
    Eof,
}

impl StreamItem {
    pub fn is_eof(&self) -> bool {
        matches!(self, StreamItem::Eof)
    }

    pub fn into_tuple(self) -> Option<Mapping> {
        match self {
            StreamItem::Tuple(m) => Some(m),
            StreamItem::Eof => None,
        }
    }
}

/// The producing half of a tuple stream.
#[derive(Debug, Clone)]
pub struct TupleSender(Sender<StreamItem>);

impl TupleSender {
    /// Blocks until there is room in the channel.
    pub fn put(&self, item: StreamItem) -> Result<(), StreamClosed> {
        self.0.send(item).map_err(|_| StreamClosed)
    }

    pub fn put_tuple(&self, mapping: Mapping) -> Result<(), StreamClosed> {
        self.put(StreamItem::Tuple(mapping))
    }

    pub fn put_eof(&self) -> Result<(), StreamClosed> {
        self.put(StreamItem::Eof)
    }
}

/// The consuming half of a tuple stream.
#[derive(Debug, Clone)]
pub struct TupleReceiver(Receiver<StreamItem>);

impl TupleReceiver {
    /// Blocks until a tuple or `Eof` arrives.
    pub fn get(&self) -> StreamItem {
        self.0.recv().unwrap_or(StreamItem::Eof)
    }

    /// Drain every tuple up to and including `Eof`, returning the tuples
    /// seen (the sentinel itself is not appended to the result).
    pub fn drain(&self) -> Vec<Mapping> {
        let mut out = Vec::new();
        loop {
            match self.get() {
                StreamItem::Tuple(m) => out.push(m),
                StreamItem::Eof => break,
            }
        }
        out
    }
}

/// Consumer gone: the channel's receiving half was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl std::fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream consumer gone")
    }
}

impl std::error::Error for StreamClosed {}

/// Create a bounded tuple stream with room for `capacity` in-flight
/// items (not counting the terminal `Eof`).
pub fn bounded(capacity: usize) -> (TupleSender, TupleReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (TupleSender(tx), TupleReceiver(rx))
}
