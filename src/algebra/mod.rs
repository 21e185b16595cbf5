//! The SPARQL algebra AST: `Triple`, `Filter`, `JoinBlock`, `UnionBlock`,
//! `Optional`, `Service` and `Query`.
//!
//! Every node type supports the same uniform surface (variable/constant
//! extraction, selectivity statistics, instantiation, filter propagation,
//! and a total order used for join-order shaping). Rather than a trait
//! object hierarchy, composite bodies are represented as a tagged
//! [`BodyNode`] enum dispatched by `match`, keeping traversal logic
//! exhaustive-checked by the compiler against a fixed, closed set of
//! node kinds.
//!
//! Every `instantiate`/`instantiate_filter` call here returns a fresh
//! tree; nothing in this module mutates a node in place, including
//! `Query`, `Service`, and `JoinBlock`.

pub mod builders;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::terms::{get_uri, Argument, Expression};

/// A filter wraps a single boolean-valued [`Expression`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub expr: Expression,
}

impl Filter {
    pub fn new(expr: Expression) -> Self {
        Filter { expr }
    }

    pub fn get_vars(&self) -> Vec<String> {
        self.expr.get_vars()
    }

    pub fn get_consts(&self) -> Vec<String> {
        self.expr.get_consts()
    }

    pub fn places(&self) -> usize {
        self.expr.places()
    }

    pub fn constant_number(&self) -> usize {
        self.expr.constant_number()
    }

    /// Computed from the wrapped expression's real `constant_number/places`
    /// ratio, consistent with every other node type's contract that
    /// `constant_percentage ∈ [0,1]` equals `constant_number/places`
    /// whenever `places>0`.
    pub fn constant_percentage(&self) -> f64 {
        self.expr.constant_percentage()
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Filter {
        Filter {
            expr: self.expr.instantiate(bindings),
        }
    }
}

/// A SPARQL triple pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Argument,
    pub predicate: Argument,
    pub object: Argument,
    /// True when `predicate`'s expanded IRI is listed as "general" by the
    /// caller (see [`set_general`]).
    pub is_general: bool,
}

impl Triple {
    pub fn new(subject: Argument, predicate: Argument, object: Argument) -> Self {
        Triple {
            subject,
            predicate,
            object,
            is_general: false,
        }
    }

    pub fn const_subjects(&self) -> usize {
        usize::from(self.subject.constant)
    }

    pub fn const_predicates(&self) -> usize {
        usize::from(self.predicate.constant)
    }

    pub fn const_objects(&self) -> usize {
        usize::from(self.object.constant)
    }

    pub fn places(&self) -> usize {
        3
    }

    pub fn constant_number(&self) -> usize {
        self.const_subjects() + self.const_predicates() + self.const_objects()
    }

    pub fn constant_percentage(&self) -> f64 {
        self.constant_number() as f64 / self.places() as f64
    }

    pub fn get_vars(&self) -> Vec<String> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter(|a| !a.constant)
            .map(|a| a.name.clone())
            .collect()
    }

    pub fn get_consts(&self) -> Vec<String> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter(|a| a.constant)
            .map(Argument::lexical_form)
            .collect()
    }

    pub fn get_pred_vars(&self) -> Vec<String> {
        if self.predicate.constant {
            Vec::new()
        } else {
            vec![self.predicate.name.clone()]
        }
    }

    pub fn all_triples_general(&self) -> bool {
        self.is_general
    }

    /// True iff this triple has ≥2 non-constant positions, or a
    /// non-constant predicate.
    pub fn is_low_selectivity(&self) -> bool {
        let non_const = 3 - self.constant_number();
        non_const >= 2 || !self.predicate.constant
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Triple {
        Triple {
            subject: self.subject.instantiate(bindings),
            predicate: self.predicate.instantiate(bindings),
            object: self.object.instantiate(bindings),
            is_general: self.is_general,
        }
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> Triple {
        let is_general = self.predicate.constant
            && general.contains(&get_uri(&self.predicate.name, prefixes));
        Triple {
            is_general,
            ..self.clone()
        }
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        format!(
            "{} {} {} .",
            display_term(&self.subject, prefixes),
            display_term(&self.predicate, prefixes),
            display_term(&self.object, prefixes),
        )
    }
}

fn display_term(arg: &Argument, prefixes: &HashMap<String, String>) -> String {
    if arg.constant {
        let mut uri = get_uri(&arg.name, prefixes);
        if let Some(datatype) = &arg.datatype {
            uri.push_str("^^");
            uri.push_str(datatype);
        }
        if let Some(lang) = &arg.lang {
            uri.push('@');
            uri.push_str(lang);
        }
        uri
    } else {
        arg.name.clone()
    }
}

/// Total order on two triples: constant subject first, then constant
/// predicate/object, then by overall constant percentage. Used to drive
/// join-order heuristics (§4.2).
pub fn triple_order(a: &Triple, b: &Triple) -> Ordering {
    a.const_subjects()
        .cmp(&b.const_subjects())
        .reverse()
        .then_with(|| a.const_predicates().cmp(&b.const_predicates()).reverse())
        .then_with(|| a.const_objects().cmp(&b.const_objects()).reverse())
        .then_with(|| {
            a.constant_percentage()
                .partial_cmp(&b.constant_percentage())
                .unwrap_or(Ordering::Equal)
                .reverse()
        })
}

/// One element of a join/union body, or a nested control node. A tagged
/// variant dispatched by `match` rather than a trait object, since the set
/// of node kinds is fixed and closed — exhaustiveness checking catches a
/// missed case at compile time instead of at traversal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyNode {
    Triple(Triple),
    Service(Box<Service>),
    Join(JoinBlock),
    Union(UnionBlock),
    Optional(Box<Optional>),
}

impl BodyNode {
    pub fn get_vars(&self) -> Vec<String> {
        match self {
            BodyNode::Triple(t) => t.get_vars(),
            BodyNode::Service(s) => s.get_vars(),
            BodyNode::Join(j) => j.get_vars(),
            BodyNode::Union(u) => u.get_vars(),
            BodyNode::Optional(o) => o.get_vars(),
        }
    }

    pub fn get_consts(&self) -> Vec<String> {
        match self {
            BodyNode::Triple(t) => t.get_consts(),
            BodyNode::Service(s) => s.get_consts(),
            BodyNode::Join(j) => j.get_consts(),
            BodyNode::Union(u) => u.get_consts(),
            BodyNode::Optional(o) => o.get_consts(),
        }
    }

    pub fn get_pred_vars(&self) -> Vec<String> {
        match self {
            BodyNode::Triple(t) => t.get_pred_vars(),
            BodyNode::Service(s) => s.get_pred_vars(),
            BodyNode::Join(j) => j.get_pred_vars(),
            BodyNode::Union(u) => u.get_pred_vars(),
            BodyNode::Optional(o) => o.get_pred_vars(),
        }
    }

    pub fn places(&self) -> usize {
        match self {
            BodyNode::Triple(t) => t.places(),
            BodyNode::Service(s) => s.places(),
            BodyNode::Join(j) => j.places(),
            BodyNode::Union(u) => u.places(),
            BodyNode::Optional(o) => o.places(),
        }
    }

    pub fn constant_number(&self) -> usize {
        match self {
            BodyNode::Triple(t) => t.constant_number(),
            BodyNode::Service(s) => s.constant_number(),
            BodyNode::Join(j) => j.constant_number(),
            BodyNode::Union(u) => u.constant_number(),
            BodyNode::Optional(o) => o.constant_number(),
        }
    }

    pub fn constant_percentage(&self) -> f64 {
        let places = self.places();
        if places == 0 {
            0.0
        } else {
            self.constant_number() as f64 / places as f64
        }
    }

    pub fn const_subjects(&self) -> usize {
        match self {
            BodyNode::Triple(t) => t.const_subjects(),
            BodyNode::Service(s) => s.const_subjects(),
            BodyNode::Join(j) => j.const_subjects(),
            BodyNode::Union(u) => u.const_subjects(),
            BodyNode::Optional(o) => o.const_subjects(),
        }
    }

    pub fn const_predicates(&self) -> usize {
        match self {
            BodyNode::Triple(t) => t.const_predicates(),
            BodyNode::Service(s) => s.const_predicates(),
            BodyNode::Join(j) => j.const_predicates(),
            BodyNode::Union(u) => u.const_predicates(),
            BodyNode::Optional(o) => o.const_predicates(),
        }
    }

    pub fn const_objects(&self) -> usize {
        match self {
            BodyNode::Triple(t) => t.const_objects(),
            BodyNode::Service(s) => s.const_objects(),
            BodyNode::Join(j) => j.const_objects(),
            BodyNode::Union(u) => u.const_objects(),
            BodyNode::Optional(o) => o.const_objects(),
        }
    }

    pub fn all_triples_general(&self) -> bool {
        match self {
            BodyNode::Triple(t) => t.all_triples_general(),
            BodyNode::Service(s) => s.all_triples_general(),
            BodyNode::Join(j) => j.all_triples_general(),
            BodyNode::Union(u) => u.all_triples_general(),
            BodyNode::Optional(o) => o.all_triples_general(),
        }
    }

    pub fn all_triples_low_selectivity(&self) -> bool {
        match self {
            BodyNode::Triple(t) => t.is_low_selectivity(),
            BodyNode::Service(s) => s.all_triples_low_selectivity(),
            BodyNode::Join(j) => j.all_triples_low_selectivity(),
            BodyNode::Union(u) => u.all_triples_low_selectivity(),
            BodyNode::Optional(o) => o.all_triples_low_selectivity(),
        }
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> BodyNode {
        match self {
            BodyNode::Triple(t) => BodyNode::Triple(t.instantiate(bindings)),
            BodyNode::Service(s) => BodyNode::Service(Box::new(s.instantiate(bindings))),
            BodyNode::Join(j) => BodyNode::Join(j.instantiate(bindings)),
            BodyNode::Union(u) => BodyNode::Union(u.instantiate(bindings)),
            BodyNode::Optional(o) => BodyNode::Optional(Box::new(o.instantiate(bindings))),
        }
    }

    pub fn instantiate_filter(
        &self,
        bindings: &HashMap<String, String>,
        filter_str: &str,
    ) -> BodyNode {
        match self {
            BodyNode::Triple(t) => BodyNode::Triple(t.instantiate(bindings)),
            BodyNode::Service(s) => {
                BodyNode::Service(Box::new(s.instantiate_filter(bindings, filter_str)))
            }
            BodyNode::Join(j) => BodyNode::Join(j.instantiate_filter(bindings, filter_str)),
            BodyNode::Union(u) => BodyNode::Union(u.instantiate_filter(bindings, filter_str)),
            BodyNode::Optional(o) => {
                BodyNode::Optional(Box::new(o.instantiate_filter(bindings, filter_str)))
            }
        }
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> BodyNode {
        match self {
            BodyNode::Triple(t) => BodyNode::Triple(t.set_general(prefixes, general)),
            BodyNode::Service(s) => BodyNode::Service(Box::new(s.set_general(prefixes, general))),
            BodyNode::Join(j) => BodyNode::Join(j.set_general(prefixes, general)),
            BodyNode::Union(u) => BodyNode::Union(u.set_general(prefixes, general)),
            BodyNode::Optional(o) => BodyNode::Optional(Box::new(o.set_general(prefixes, general))),
        }
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        match self {
            BodyNode::Triple(t) => t.show(prefixes),
            BodyNode::Service(s) => s.show(prefixes),
            BodyNode::Join(j) => j.show(prefixes),
            BodyNode::Union(u) => u.show(prefixes),
            BodyNode::Optional(o) => o.show(prefixes),
        }
    }
}

/// Shared aggregation logic for `JoinBlock`/`UnionBlock`, which are
/// structurally identical (a child list plus a filter list) and differ
/// only in how they serialize (`.`-conjunction vs `UNION`-disjunction)
/// and what they mean algebraically.
fn aggregate_vars(children: &[BodyNode]) -> Vec<String> {
    children.iter().flat_map(BodyNode::get_vars).collect()
}

fn aggregate_consts(children: &[BodyNode]) -> Vec<String> {
    children.iter().flat_map(BodyNode::get_consts).collect()
}

fn aggregate_pred_vars(children: &[BodyNode]) -> Vec<String> {
    children.iter().flat_map(BodyNode::get_pred_vars).collect()
}

fn aggregate_places(children: &[BodyNode]) -> usize {
    children.iter().map(BodyNode::places).sum()
}

fn aggregate_constant_number(children: &[BodyNode]) -> usize {
    children.iter().map(BodyNode::constant_number).sum()
}

fn aggregate_all_general(children: &[BodyNode]) -> bool {
    children.iter().all(BodyNode::all_triples_general)
}

fn aggregate_low_selectivity(children: &[BodyNode]) -> bool {
    children.iter().all(BodyNode::all_triples_low_selectivity)
}

/// A conjunction (basic graph pattern `.`-joined block) of children plus
/// any filters attached at this level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinBlock {
    pub children: Vec<BodyNode>,
    pub filters: Vec<Filter>,
}

impl JoinBlock {
    pub fn new(children: Vec<BodyNode>) -> Self {
        JoinBlock {
            children,
            filters: Vec::new(),
        }
    }

    pub fn include_filter(&self, filter: Filter) -> JoinBlock {
        let mut filters = self.filters.clone();
        filters.push(filter);
        JoinBlock {
            children: self.children.clone(),
            filters,
        }
    }

    pub fn get_vars(&self) -> Vec<String> {
        let mut vars = aggregate_vars(&self.children);
        vars.extend(self.filters.iter().flat_map(Filter::get_vars));
        vars
    }

    pub fn get_consts(&self) -> Vec<String> {
        aggregate_consts(&self.children)
    }

    pub fn get_pred_vars(&self) -> Vec<String> {
        aggregate_pred_vars(&self.children)
    }

    pub fn places(&self) -> usize {
        aggregate_places(&self.children)
    }

    pub fn constant_number(&self) -> usize {
        aggregate_constant_number(&self.children)
    }

    pub fn constant_percentage(&self) -> f64 {
        let places = self.places();
        if places == 0 {
            0.0
        } else {
            self.constant_number() as f64 / places as f64
        }
    }

    pub fn const_subjects(&self) -> usize {
        self.children.iter().map(BodyNode::const_subjects).sum()
    }

    pub fn const_predicates(&self) -> usize {
        self.children.iter().map(BodyNode::const_predicates).sum()
    }

    pub fn const_objects(&self) -> usize {
        self.children.iter().map(BodyNode::const_objects).sum()
    }

    pub fn all_triples_general(&self) -> bool {
        aggregate_all_general(&self.children)
    }

    pub fn all_triples_low_selectivity(&self) -> bool {
        aggregate_low_selectivity(&self.children)
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> JoinBlock {
        JoinBlock {
            children: self.children.iter().map(|c| c.instantiate(bindings)).collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
        }
    }

    pub fn instantiate_filter(
        &self,
        bindings: &HashMap<String, String>,
        filter_str: &str,
    ) -> JoinBlock {
        JoinBlock {
            children: self
                .children
                .iter()
                .map(|c| c.instantiate_filter(bindings, filter_str))
                .collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
        }
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> JoinBlock {
        JoinBlock {
            children: self
                .children
                .iter()
                .map(|c| c.set_general(prefixes, general))
                .collect(),
            filters: self.filters.clone(),
        }
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.show(prefixes)).collect();
        let mut body = nest(parts, ".");
        for f in &self.filters {
            body.push_str(&format!(" FILTER({}) ", show_expr(&f.expr, prefixes)));
        }
        body
    }
}

/// A disjunction (`UNION`-joined block). Structurally identical to
/// [`JoinBlock`]; kept as a distinct type because it means something
/// different algebraically and serializes with `UNION` rather than `.`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionBlock {
    pub children: Vec<BodyNode>,
    pub filters: Vec<Filter>,
}

impl UnionBlock {
    pub fn new(children: Vec<BodyNode>) -> Self {
        UnionBlock {
            children,
            filters: Vec::new(),
        }
    }

    pub fn single(child: BodyNode) -> Self {
        UnionBlock::new(vec![child])
    }

    pub fn include_filter(&self, filter: Filter) -> UnionBlock {
        let mut filters = self.filters.clone();
        filters.push(filter);
        UnionBlock {
            children: self.children.clone(),
            filters,
        }
    }

    pub fn get_vars(&self) -> Vec<String> {
        let mut vars = aggregate_vars(&self.children);
        vars.extend(self.filters.iter().flat_map(Filter::get_vars));
        vars
    }

    pub fn get_consts(&self) -> Vec<String> {
        aggregate_consts(&self.children)
    }

    pub fn get_pred_vars(&self) -> Vec<String> {
        aggregate_pred_vars(&self.children)
    }

    pub fn places(&self) -> usize {
        aggregate_places(&self.children)
    }

    pub fn constant_number(&self) -> usize {
        aggregate_constant_number(&self.children)
    }

    pub fn constant_percentage(&self) -> f64 {
        let places = self.places();
        if places == 0 {
            0.0
        } else {
            self.constant_number() as f64 / places as f64
        }
    }

    pub fn const_subjects(&self) -> usize {
        self.children.iter().map(BodyNode::const_subjects).sum()
    }

    pub fn const_predicates(&self) -> usize {
        self.children.iter().map(BodyNode::const_predicates).sum()
    }

    pub fn const_objects(&self) -> usize {
        self.children.iter().map(BodyNode::const_objects).sum()
    }

    pub fn all_triples_general(&self) -> bool {
        aggregate_all_general(&self.children)
    }

    pub fn all_triples_low_selectivity(&self) -> bool {
        aggregate_low_selectivity(&self.children)
    }

    /// Every occurrence (with duplicates) of a variable across this
    /// block's children. Used by `Query::join_vars` to find variables
    /// bound in ≥2 positions.
    pub fn all_var_occurrences(&self) -> Vec<String> {
        self.get_vars()
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> UnionBlock {
        UnionBlock {
            children: self.children.iter().map(|c| c.instantiate(bindings)).collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
        }
    }

    pub fn instantiate_filter(
        &self,
        bindings: &HashMap<String, String>,
        filter_str: &str,
    ) -> UnionBlock {
        UnionBlock {
            children: self
                .children
                .iter()
                .map(|c| c.instantiate_filter(bindings, filter_str))
                .collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
        }
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> UnionBlock {
        UnionBlock {
            children: self
                .children
                .iter()
                .map(|c| c.set_general(prefixes, general))
                .collect(),
            filters: self.filters.clone(),
        }
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        let parts: Vec<String> = self.children.iter().map(|c| c.show(prefixes)).collect();
        let mut body = nest(parts, "UNION");
        for f in &self.filters {
            body.push_str(&format!(" FILTER({}) ", show_expr(&f.expr, prefixes)));
        }
        body
    }
}

/// SPARQL `OPTIONAL { ... }`. Wraps a single body, typically a
/// [`UnionBlock`]; left tuples are preserved even without a right match
/// (enforced by the `NestedLoopOptional` operator, not by this node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optional {
    pub bgg: Box<BodyNode>,
}

impl Optional {
    pub fn new(bgg: BodyNode) -> Self {
        Optional { bgg: Box::new(bgg) }
    }

    pub fn get_vars(&self) -> Vec<String> {
        self.bgg.get_vars()
    }
    pub fn get_consts(&self) -> Vec<String> {
        self.bgg.get_consts()
    }
    pub fn get_pred_vars(&self) -> Vec<String> {
        self.bgg.get_pred_vars()
    }
    pub fn places(&self) -> usize {
        self.bgg.places()
    }
    pub fn constant_number(&self) -> usize {
        self.bgg.constant_number()
    }
    pub fn const_subjects(&self) -> usize {
        self.bgg.const_subjects()
    }
    pub fn const_predicates(&self) -> usize {
        self.bgg.const_predicates()
    }
    pub fn const_objects(&self) -> usize {
        self.bgg.const_objects()
    }
    pub fn all_triples_general(&self) -> bool {
        self.bgg.all_triples_general()
    }
    pub fn all_triples_low_selectivity(&self) -> bool {
        self.bgg.all_triples_low_selectivity()
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Optional {
        Optional::new(self.bgg.instantiate(bindings))
    }

    pub fn instantiate_filter(&self, bindings: &HashMap<String, String>, filter_str: &str) -> Optional {
        Optional::new(self.bgg.instantiate_filter(bindings, filter_str))
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> Optional {
        Optional::new(self.bgg.set_general(prefixes, general))
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        format!("OPTIONAL {{ {} }}", self.bgg.show(prefixes))
    }
}

/// A remote subquery targeting one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub endpoint: String,
    pub triples: Vec<BodyNode>,
    pub filters: Vec<Filter>,
    pub rdfmts: Vec<String>,
    pub stars: HashMap<String, Vec<BodyNode>>,
    pub star_filters: HashMap<String, Vec<Filter>>,
    pub limit: i64,
    pub filter_nested: Vec<String>,
    pub translated_query: Option<String>,
}

impl Service {
    pub fn new(endpoint: impl Into<String>, triples: Vec<BodyNode>) -> Self {
        Service {
            endpoint: endpoint.into(),
            triples,
            filters: Vec::new(),
            rdfmts: Vec::new(),
            stars: HashMap::new(),
            star_filters: HashMap::new(),
            limit: -1,
            filter_nested: Vec::new(),
            translated_query: None,
        }
    }

    pub fn get_vars(&self) -> Vec<String> {
        let mut vars = aggregate_vars(&self.triples);
        vars.extend(self.filters.iter().flat_map(Filter::get_vars));
        vars
    }

    pub fn get_consts(&self) -> Vec<String> {
        aggregate_consts(&self.triples)
    }

    pub fn get_pred_vars(&self) -> Vec<String> {
        aggregate_pred_vars(&self.triples)
    }

    pub fn places(&self) -> usize {
        aggregate_places(&self.triples)
    }

    pub fn constant_number(&self) -> usize {
        aggregate_constant_number(&self.triples)
    }

    pub fn constant_percentage(&self) -> f64 {
        let places = self.places();
        if places == 0 {
            0.0
        } else {
            self.constant_number() as f64 / places as f64
        }
    }

    pub fn const_subjects(&self) -> usize {
        self.triples.iter().map(BodyNode::const_subjects).sum()
    }

    pub fn const_predicates(&self) -> usize {
        self.triples.iter().map(BodyNode::const_predicates).sum()
    }

    pub fn const_objects(&self) -> usize {
        self.triples.iter().map(BodyNode::const_objects).sum()
    }

    pub fn all_triples_general(&self) -> bool {
        aggregate_all_general(&self.triples)
    }

    /// Unlike every other node type, a `Service` is also considered
    /// low-selectivity whenever it carries its own filters, regardless of
    /// its triples' shape.
    pub fn all_triples_low_selectivity(&self) -> bool {
        aggregate_low_selectivity(&self.triples) || !self.filters.is_empty()
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Service {
        Service {
            endpoint: self.endpoint.clone(),
            triples: self.triples.iter().map(|t| t.instantiate(bindings)).collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
            rdfmts: self.rdfmts.clone(),
            stars: self.stars.clone(),
            star_filters: self.star_filters.clone(),
            limit: self.limit,
            filter_nested: self.filter_nested.clone(),
            translated_query: self.translated_query.clone(),
        }
    }

    pub fn instantiate_filter(&self, bindings: &HashMap<String, String>, filter_str: &str) -> Service {
        let mut filter_nested = self.filter_nested.clone();
        filter_nested.push(filter_str.to_string());
        Service {
            endpoint: self.endpoint.clone(),
            triples: self
                .triples
                .iter()
                .map(|t| t.instantiate_filter(bindings, filter_str))
                .collect(),
            filters: self.filters.iter().map(|f| f.instantiate(bindings)).collect(),
            rdfmts: self.rdfmts.clone(),
            stars: self.stars.clone(),
            star_filters: self.star_filters.clone(),
            limit: self.limit,
            filter_nested,
            translated_query: self.translated_query.clone(),
        }
    }

    pub fn set_general(&self, prefixes: &HashMap<String, String>, general: &HashSet<String>) -> Service {
        Service {
            triples: self
                .triples
                .iter()
                .map(|t| t.set_general(prefixes, general))
                .collect(),
            ..self.clone()
        }
    }

    pub fn show(&self, prefixes: &HashMap<String, String>) -> String {
        let parts: Vec<String> = self.triples.iter().map(|t| t.show(prefixes)).collect();
        let mut body = format!("SERVICE <{}> {{ {} ", self.endpoint, nest(parts, "."));
        for f in &self.filters {
            body.push_str(&format!("FILTER({}) ", show_expr(&f.expr, prefixes)));
        }
        for nested in &self.filter_nested {
            body.push_str(&format!("FILTER({nested}) "));
        }
        body.push('}');
        body
    }
}

/// Total order on two `Service` nodes per §4.2: more constants in S+P
/// wins, then S, then O+P, then O, then a tie-break cascade on raw
/// subject/predicate/object constant counts, finally on overall constant
/// percentage (ties broken by raw constant number).
pub fn service_order(a: &Service, b: &Service) -> Ordering {
    let sp_a = a.const_subjects() + a.const_predicates();
    let sp_b = b.const_subjects() + b.const_predicates();
    if sp_a != sp_b {
        return sp_a.cmp(&sp_b).reverse();
    }

    if a.const_subjects() != b.const_subjects() {
        return a.const_subjects().cmp(&b.const_subjects()).reverse();
    }

    let op_a = a.const_objects() + a.const_predicates();
    let op_b = b.const_objects() + b.const_predicates();
    if op_a != op_b {
        return op_a.cmp(&op_b).reverse();
    }

    if a.const_objects() != b.const_objects() {
        return a.const_objects().cmp(&b.const_objects()).reverse();
    }

    if a.const_predicates() != b.const_predicates() {
        return a.const_predicates().cmp(&b.const_predicates()).reverse();
    }

    match a
        .constant_percentage()
        .partial_cmp(&b.constant_percentage())
        .unwrap_or(Ordering::Equal)
    {
        Ordering::Equal => a.constant_number().cmp(&b.constant_number()).reverse(),
        other => other.reverse(),
    }
}

/// `SELECT` / `CONSTRUCT` / `ASK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryType {
    Select = 0,
    Construct = 1,
    Ask = 2,
}

/// A full query: prefixes, projection, body, and modifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub prefs: Vec<(String, String)>,
    pub args: Vec<Argument>,
    pub body: UnionBlock,
    pub distinct: bool,
    pub order_by: Vec<Argument>,
    pub limit: i64,
    pub offset: i64,
    pub query_type: QueryType,
    pub filter_nested: Vec<String>,
}

impl Query {
    pub fn new(args: Vec<Argument>, body: UnionBlock, query_type: QueryType) -> Self {
        // ASK forces limit=1 regardless of what was requested.
        let limit = if query_type == QueryType::Ask { 1 } else { -1 };
        Query {
            prefs: Vec::new(),
            args,
            body,
            distinct: false,
            order_by: Vec::new(),
            limit,
            offset: 0,
            query_type,
            filter_nested: Vec::new(),
        }
    }

    /// Variables occurring in at least two positions across the body
    /// (with duplicates counted), i.e. the variables a physical join
    /// would actually need to match on.
    pub fn join_vars(&self) -> HashSet<String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for v in self.body.all_var_occurrences() {
            *counts.entry(v).or_insert(0) += 1;
        }
        counts.into_iter().filter(|(_, n)| *n >= 2).map(|(v, _)| v).collect()
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Query {
        Query {
            prefs: self.prefs.clone(),
            args: self.args.iter().map(|a| a.instantiate(bindings)).collect(),
            body: self.body.instantiate(bindings),
            distinct: self.distinct,
            order_by: self.order_by.iter().map(|a| a.instantiate(bindings)).collect(),
            limit: self.limit,
            offset: self.offset,
            query_type: self.query_type,
            filter_nested: self.filter_nested.clone(),
        }
    }

    pub fn instantiate_filter(&self, bindings: &HashMap<String, String>, filter_str: &str) -> Query {
        let mut filter_nested = self.filter_nested.clone();
        filter_nested.push(filter_str.to_string());
        Query {
            prefs: self.prefs.clone(),
            args: self.args.iter().map(|a| a.instantiate(bindings)).collect(),
            body: self.body.instantiate_filter(bindings, filter_str),
            distinct: self.distinct,
            order_by: self.order_by.iter().map(|a| a.instantiate(bindings)).collect(),
            limit: self.limit,
            offset: self.offset,
            query_type: self.query_type,
            filter_nested,
        }
    }

    fn prefix_map(&self) -> HashMap<String, String> {
        self.prefs.iter().cloned().collect()
    }

    /// Serialize back to SPARQL 1.1 text. The only canonical wire form
    /// this crate emits.
    pub fn show(&self) -> String {
        let prefixes = self.prefix_map();
        let mut out = String::new();
        for (name, uri) in &self.prefs {
            out.push_str(&format!("PREFIX {name}: {uri}\n"));
        }

        match self.query_type {
            QueryType::Select => {
                out.push_str("SELECT ");
                if self.distinct {
                    out.push_str("DISTINCT ");
                }
                if self.args.is_empty() {
                    out.push('*');
                } else {
                    let projected: Vec<String> = self.args.iter().map(|a| a.name.clone()).collect();
                    out.push_str(&projected.join(" "));
                }
                out.push_str(" WHERE { ");
                out.push_str(&self.body.show(&prefixes));
                for nested in &self.filter_nested {
                    out.push_str(&format!(" FILTER({nested})"));
                }
                out.push_str(" }");
            }
            QueryType::Construct => {
                out.push_str("CONSTRUCT { ");
                let projected: Vec<String> = self.args.iter().map(|a| a.name.clone()).collect();
                out.push_str(&projected.join(" "));
                out.push_str(" } WHERE { ");
                out.push_str(&self.body.show(&prefixes));
                for nested in &self.filter_nested {
                    out.push_str(&format!(" FILTER({nested})"));
                }
                out.push_str(" }");
            }
            QueryType::Ask => {
                out.push_str("ASK WHERE { ");
                out.push_str(&self.body.show(&prefixes));
                for nested in &self.filter_nested {
                    out.push_str(&format!(" FILTER({nested})"));
                }
                out.push_str(" }");
            }
        }

        if self.limit >= 0 {
            out.push_str(&format!(" LIMIT {}", self.limit));
        }
        if self.offset > 0 {
            out.push_str(&format!(" OFFSET {}", self.offset));
        }

        out
    }
}

/// Repeatedly fold a list of already-serialized fragments pairwise
/// (popping the last two and grouping them with `joiner`) until one
/// fragment remains, yielding a right-leaning tree of explicit `{ ... }`
/// groups.
pub fn nest(mut items: Vec<String>, joiner: &str) -> String {
    if items.is_empty() {
        return String::new();
    }
    while items.len() > 1 {
        let b = items.pop().expect("len > 1");
        let a = items.pop().expect("len > 1");
        items.push(format!("{{ {a} }} {joiner} {{ {b} }}"));
    }
    items.pop().expect("non-empty")
}

fn show_expr(expr: &Expression, prefixes: &HashMap<String, String>) -> String {
    let left = show_expr_child(&expr.left, prefixes);
    match &expr.right {
        None => format!("{}({})", expr.op, left),
        Some(right) => {
            let right_str = show_expr_child(right, prefixes);
            if expr.is_binary_functor() {
                if let Some(flags) = &expr.regex_flags {
                    format!("{}({}, {}, \"{}\")", expr.op, left, right_str, flags)
                } else {
                    format!("{}({}, {})", expr.op, left, right_str)
                }
            } else {
                format!("({left} {} {right_str})", expr.op)
            }
        }
    }
}

fn show_expr_child(child: &crate::terms::ExprChild, prefixes: &HashMap<String, String>) -> String {
    match child {
        crate::terms::ExprChild::Arg(a) => display_term(a, prefixes),
        crate::terms::ExprChild::Expr(e) => show_expr(e, prefixes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terms::ExprChild;

    fn triple(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(
            if s.starts_with('?') { Argument::variable(s) } else { Argument::constant(s) },
            if p.starts_with('?') { Argument::variable(p) } else { Argument::constant(p) },
            if o.starts_with('?') { Argument::variable(o) } else { Argument::constant(o) },
        )
    }

    #[test]
    fn triple_constant_percentage() {
        let t = triple("<http://ex/a>", "<http://ex/p>", "?o");
        assert_eq!(t.places(), 3);
        assert_eq!(t.constant_number(), 2);
        assert!((t.constant_percentage() - (2.0 / 3.0)).abs() < 1e-9);
    }

    proptest::proptest! {
        #[test]
        fn triple_constant_percentage_always_in_unit_range(
            s_const in proptest::bool::ANY,
            p_const in proptest::bool::ANY,
            o_const in proptest::bool::ANY,
        ) {
            let pick = |is_const: bool, const_name: &str, var_name: &str| {
                if is_const { Argument::constant(const_name) } else { Argument::variable(var_name) }
            };
            let t = Triple::new(
                pick(s_const, "<http://ex/s>", "?s"),
                pick(p_const, "<http://ex/p>", "?p"),
                pick(o_const, "<http://ex/o>", "?o"),
            );
            let pct = t.constant_percentage();
            prop_assert!((0.0..=1.0).contains(&pct));
            let expected = [s_const, p_const, o_const].iter().filter(|b| **b).count();
            prop_assert_eq!(t.constant_number(), expected);
        }
    }

    #[test]
    fn show_preserves_datatype_and_lang_suffix() {
        let typed = Argument::constant("\"42\"").with_datatype("<http://www.w3.org/2001/XMLSchema#integer>");
        let tagged = Argument::constant("\"hello\"").with_lang("en");
        let t = Triple::new(Argument::variable("?s"), Argument::variable("?p"), typed);
        let text = t.show(&HashMap::new());
        assert!(text.contains("\"42\"^^<http://www.w3.org/2001/XMLSchema#integer>"));

        let t2 = Triple::new(Argument::variable("?s"), Argument::variable("?p"), tagged);
        let text2 = t2.show(&HashMap::new());
        assert!(text2.contains("\"hello\"@en"));
    }

    #[test]
    fn triple_order_prefers_constant_subject() {
        let a = triple("<http://ex/a>", "?p", "?o");
        let b = triple("?s", "?p", "?o");
        assert_eq!(triple_order(&a, &b), Ordering::Less);
    }

    #[test]
    fn instantiate_then_show_has_no_leftover_variable() {
        let t = triple("?city", "<http://ex/in>", "?country");
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![BodyNode::Triple(t)])));
        let query = Query::new(vec![Argument::variable("?city")], body, QueryType::Select);

        let mut bindings = HashMap::new();
        bindings.insert("city".to_string(), "<http://ex/Addis>".to_string());

        let instantiated = query.instantiate(&bindings);
        let text = instantiated.show();
        assert!(!text.contains("?city"));
        assert!(text.contains("<http://ex/Addis>"));
    }

    #[test]
    fn instantiate_is_idempotent() {
        let t = triple("?x", "<http://ex/p>", "?y");
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![BodyNode::Triple(t)])));
        let query = Query::new(vec![Argument::variable("?x")], body, QueryType::Select);

        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), "<http://ex/1>".to_string());

        let once = query.instantiate(&bindings);
        let twice = once.instantiate(&bindings);
        assert_eq!(once, twice);
    }

    #[test]
    fn ask_query_forces_limit_one() {
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![])));
        let query = Query::new(vec![], body, QueryType::Ask);
        assert_eq!(query.limit, 1);
    }

    #[test]
    fn show_serializes_nested_filters_pushed_by_instantiate_filter() {
        let t = triple("?city", "<http://ex/in>", "?country");
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![BodyNode::Triple(t)])));
        let query = Query::new(vec![Argument::variable("?city")], body, QueryType::Select);

        let instantiated = query.instantiate_filter(&HashMap::new(), "?population > 1000");
        let text = instantiated.show();
        assert!(text.contains("FILTER(?population > 1000)"));
    }

    #[test]
    fn join_vars_requires_two_or_more_occurrences() {
        let t1 = triple("?x", "<http://ex/p>", "?y");
        let t2 = triple("?y", "<http://ex/q>", "?z");
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![
            BodyNode::Triple(t1),
            BodyNode::Triple(t2),
        ])));
        let query = Query::new(vec![], body, QueryType::Select);
        let joins = query.join_vars();
        assert!(joins.contains("?y"));
        assert!(!joins.contains("?x"));
        assert!(!joins.contains("?z"));
    }

    #[test]
    fn service_all_triples_low_selectivity_forced_by_own_filters() {
        let t = triple("<http://ex/a>", "<http://ex/p>", "<http://ex/b>");
        let mut service = Service::new("http://endpoint", vec![BodyNode::Triple(t)]);
        assert!(!service.all_triples_low_selectivity());
        service.filters.push(Filter::new(Expression::unary(
            "BOUND",
            ExprChild::Arg(Argument::variable("?x")),
        )));
        assert!(service.all_triples_low_selectivity());
    }

    #[test]
    fn service_order_example_from_scenario_four() {
        let mut s1 = Service::new("http://e1", vec![]);
        s1.triples.push(BodyNode::Triple(triple(
            "<http://ex/a>",
            "<http://ex/p>",
            "?o",
        )));
        let mut s2 = Service::new("http://e2", vec![]);
        s2.triples.push(BodyNode::Triple(triple("?s", "?p", "<http://ex/b>")));
        s2.triples.push(BodyNode::Triple(triple(
            "?s2",
            "<http://ex/q>",
            "<http://ex/c>",
        )));

        // s1: const_subjects=1, const_predicates=1, const_objects=0
        // s2: const_subjects=0, const_predicates=1, const_objects=2
        assert_eq!(s1.const_subjects(), 1);
        assert_eq!(s1.const_predicates(), 1);
        assert_eq!(s1.const_objects(), 0);
        assert_eq!(s2.const_subjects(), 0);

        let order = service_order(&s1, &s2);
        assert_ne!(order, Ordering::Less);
    }

    #[test]
    fn service_order_is_consistent_under_negation() {
        let a = {
            let mut s = Service::new("a", vec![]);
            s.triples.push(BodyNode::Triple(triple("<http://ex/a>", "?p", "?o")));
            s
        };
        let b = {
            let mut s = Service::new("b", vec![]);
            s.triples.push(BodyNode::Triple(triple("?s", "?p", "<http://ex/o>")));
            s
        };
        let ab = service_order(&a, &b);
        let ba = service_order(&b, &a);
        match ab {
            Ordering::Less => assert_eq!(ba, Ordering::Greater),
            Ordering::Greater => assert_eq!(ba, Ordering::Less),
            Ordering::Equal => assert_eq!(ba, Ordering::Equal),
        }
    }

    #[test]
    fn nest_folds_pairwise_to_single_fragment() {
        let parts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = nest(parts, "UNION");
        assert!(result.contains("UNION"));
        assert!(result.contains('a'));
        assert!(result.contains('b'));
        assert!(result.contains('c'));
    }

    #[test]
    fn query_round_trips_through_json() {
        let t = triple("?s", "<http://ex/p>", "<http://ex/o>");
        let body = UnionBlock::single(BodyNode::Join(JoinBlock::new(vec![BodyNode::Triple(t)])));
        let query = Query::new(vec![Argument::variable("?s")], body, QueryType::Select);

        let json = serde_json::to_string(&query).expect("serialize");
        let restored: Query = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(query, restored);
    }

    #[test]
    fn filter_constant_percentage_matches_wrapped_expression() {
        let expr = Expression::binary(
            "=",
            ExprChild::Arg(Argument::variable("?x")),
            ExprChild::Arg(Argument::constant("<http://ex/1>")),
        );
        let filter = Filter::new(expr.clone());
        assert_eq!(filter.constant_percentage(), expr.constant_percentage());
    }
}
