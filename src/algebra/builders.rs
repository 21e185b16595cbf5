//! Fluent builders for the algebra tree, in the same
//! `XBuilder::new().method().build()` style used elsewhere in this crate
//! for config and record construction.

use super::{BodyNode, Filter, JoinBlock, Query, QueryType, Service, Triple, UnionBlock};
use crate::terms::Argument;

#[derive(Debug, Default)]
pub struct TripleBuilder {
    subject: Option<Argument>,
    predicate: Option<Argument>,
    object: Option<Argument>,
}

impl TripleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subject(mut self, subject: Argument) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn predicate(mut self, predicate: Argument) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn object(mut self, object: Argument) -> Self {
        self.object = Some(object);
        self
    }

    /// Panics if any of subject/predicate/object was never set — builders
    /// are for constructing well-formed trees in code and tests, not for
    /// parsing untrusted input.
    pub fn build(self) -> Triple {
        Triple::new(
            self.subject.expect("TripleBuilder: subject not set"),
            self.predicate.expect("TripleBuilder: predicate not set"),
            self.object.expect("TripleBuilder: object not set"),
        )
    }
}

#[derive(Debug, Default)]
pub struct ServiceBuilder {
    endpoint: Option<String>,
    triples: Vec<BodyNode>,
    filters: Vec<Filter>,
    rdfmts: Vec<String>,
    limit: i64,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        ServiceBuilder {
            endpoint: None,
            triples: Vec::new(),
            filters: Vec::new(),
            rdfmts: Vec::new(),
            limit: -1,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn triple(mut self, triple: Triple) -> Self {
        self.triples.push(BodyNode::Triple(triple));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn rdfmt(mut self, rdfmt: impl Into<String>) -> Self {
        self.rdfmts.push(rdfmt.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn build(self) -> Service {
        let mut service = Service::new(
            self.endpoint.expect("ServiceBuilder: endpoint not set"),
            self.triples,
        );
        service.filters = self.filters;
        service.rdfmts = self.rdfmts;
        service.limit = self.limit;
        service
    }
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    args: Vec<Argument>,
    children: Vec<BodyNode>,
    distinct: bool,
    limit: i64,
    offset: i64,
    query_type: Option<QueryType>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder {
            args: Vec::new(),
            children: Vec::new(),
            distinct: false,
            limit: -1,
            offset: 0,
            query_type: None,
        }
    }

    pub fn select(mut self) -> Self {
        self.query_type = Some(QueryType::Select);
        self
    }

    pub fn construct(mut self) -> Self {
        self.query_type = Some(QueryType::Construct);
        self
    }

    pub fn ask(mut self) -> Self {
        self.query_type = Some(QueryType::Ask);
        self
    }

    pub fn project(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    pub fn child(mut self, node: BodyNode) -> Self {
        self.children.push(node);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(self) -> Query {
        let query_type = self.query_type.unwrap_or(QueryType::Select);
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(self.children)));
        let mut query = Query::new(self.args, body, query_type);
        query.distinct = self.distinct;
        query.offset = self.offset;
        if query_type != QueryType::Ask {
            query.limit = self.limit;
        }
        query
    }
}
