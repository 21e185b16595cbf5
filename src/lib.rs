//! # fedquery-core
//!
//! The algebraic query model and streaming physical operators for
//! federated SPARQL evaluation.
//!
//! This crate is the execution core of a federated SPARQL query engine:
//! it owns (a) a language-neutral representation of SPARQL 1.1 algebra —
//! triple patterns, join/union blocks, optionals, filters, `SERVICE`
//! subqueries, and projections, each with the static analyses the rest
//! of the stack needs (variable/constant extraction, selectivity
//! statistics, a total order used to shape join plans) — and (b) the
//! pipelined physical operators that evaluate that algebra against
//! remote endpoints, most importantly a symmetric hash-partitioned
//! Nested-Loop Optional.
//!
//! ## Module map
//!
//! ```text
//! terms      -- Argument (SPARQL term) and Expression (filter tree)
//! algebra    -- Triple, JoinBlock, UnionBlock, Optional, Service, Query
//! streams    -- bounded tuple streams with an in-band EOF sentinel
//! storage    -- PartitionedTable / Record, the join operator's state
//! operators  -- Project and NestedLoopOptional, the physical operators
//! rml        -- RML term-map -> relational predicate translator
//! config     -- hierarchical configuration (figment) and logging setup
//! error      -- FedQueryError, the crate-wide error type
//! ```
//!
//! ## What this crate does not do
//!
//! Parsing SPARQL/RML source text into the algebra types here, planning
//! (choosing an operator tree and join order), and talking to actual
//! remote endpoints over HTTP are all out of scope — this crate models
//! the algebra and executes a plan it is handed, nothing upstream or
//! downstream of that. See [`operators::RemoteSource`] for the seam an
//! embedding engine plugs a real endpoint client into.

pub mod algebra;
pub mod config;
pub mod error;
pub mod operators;
pub mod rml;
pub mod storage;
pub mod streams;
pub mod terms;

pub use config::Config;
pub use error::{FedQueryError, Result};
