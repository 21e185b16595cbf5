//! Term atoms and filter expressions.
//!
//! `Argument` is the leaf of the algebra tree (a SPARQL variable or a bound
//! constant). `Expression` is the recursive filter-expression tree built out
//! of `Argument`s and other `Expression`s, with operators drawn from three
//! disjoint sets: unary functors, binary functors, and infix operators.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A SPARQL term: either a variable (`?x` / `$x`) or a bound constant
/// (an IRI `<...>`, a literal `"..."`, a blank node `_:...`, or a bare
/// symbol).
///
/// Equality and hashing are defined over `(name, constant)` only — two
/// arguments naming the same slot are "the same" regardless of how that
/// slot happens to be annotated with a datatype/lang/desc hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    pub constant: bool,
    pub datatype: Option<String>,
    pub lang: Option<String>,
    /// Set when this argument was named in an `ORDER BY ... DESC` clause.
    pub desc: bool,
    /// True when a constant argument denotes a URI rather than a literal.
    pub is_uri: bool,
    /// Free-form type hint carried alongside the argument (e.g. "var",
    /// "uri", "literal") for callers that want a cheap tag without
    /// re-deriving it from `constant`/`is_uri`.
    pub dtype: Option<String>,
}

impl Argument {
    pub fn variable(name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(
            name.starts_with('?') || name.starts_with('$'),
            "variable argument name must start with ? or $"
        );
        Argument {
            name,
            constant: false,
            datatype: None,
            lang: None,
            desc: false,
            is_uri: false,
            dtype: None,
        }
    }

    pub fn constant(name: impl Into<String>) -> Self {
        Argument {
            name: name.into(),
            constant: true,
            datatype: None,
            lang: None,
            desc: false,
            is_uri: false,
            dtype: None,
        }
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.datatype = Some(datatype.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_desc(mut self, desc: bool) -> Self {
        self.desc = desc;
        self
    }

    pub fn with_is_uri(mut self, is_uri: bool) -> Self {
        self.is_uri = is_uri;
        self
    }

    /// Variable name with its leading sigil (`?`/`$`) stripped. Panics
    /// in debug builds if called on a constant; callers should check
    /// `constant` first.
    pub fn var_name(&self) -> &str {
        debug_assert!(!self.constant, "var_name() called on a constant argument");
        self.name.trim_start_matches(['?', '$'])
    }

    /// Lexical form including datatype/lang suffix, as produced by
    /// `get_consts()`.
    pub fn lexical_form(&self) -> String {
        let mut s = self.name.clone();
        if let Some(dt) = &self.datatype {
            s.push_str("^^");
            s.push_str(dt);
        }
        if let Some(lang) = &self.lang {
            s.push('@');
            s.push_str(lang);
        }
        s
    }

    /// Replace this argument with its bound value if `bindings` contains
    /// a key matching its stripped variable name; otherwise clone it
    /// unchanged. Constants are always returned unchanged.
    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Argument {
        if self.constant {
            return self.clone();
        }
        match bindings.get(self.var_name()) {
            Some(value) => Argument::constant(value.clone()),
            None => self.clone(),
        }
    }
}

impl PartialEq for Argument {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.constant == other.constant
    }
}
impl Eq for Argument {}

impl std::hash::Hash for Argument {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.constant.hash(state);
    }
}

/// Unary functors: prefix/postfix operators taking a single operand.
pub static UNARY_FUNCTORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "!", "BOUND", "ISIRI", "ISURI", "ISBLANK", "ISLITERAL", "STR", "UCASE", "LANG", "DATATYPE",
        "xsd:integer", "xsd:decimal", "xsd:double", "xsd:float", "xsd:string", "xsd:boolean",
        "xsd:dateTime", "xsd:date", "xsd:time",
        "<http://www.w3.org/2001/XMLSchema#integer>",
        "<http://www.w3.org/2001/XMLSchema#decimal>",
        "<http://www.w3.org/2001/XMLSchema#double>",
        "<http://www.w3.org/2001/XMLSchema#float>",
        "<http://www.w3.org/2001/XMLSchema#string>",
        "<http://www.w3.org/2001/XMLSchema#boolean>",
        "<http://www.w3.org/2001/XMLSchema#dateTime>",
        "<http://www.w3.org/2001/XMLSchema#date>",
        "<http://www.w3.org/2001/XMLSchema#time>",
    ]
    .into_iter()
    .collect()
});

/// Binary functors: named two-argument functions (as opposed to infix
/// operators).
pub static BINARY_FUNCTORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "REGEX", "regex", "sameTerm", "langMatches", "CONTAINS", "contains", "Contains",
    ]
    .into_iter()
    .collect()
});

/// Infix operators.
pub static INFIX_OPERATORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "=", "!=", "<", ">", "<=", ">=", "&&", "||", "+", "-", "*", "/",
    ]
    .into_iter()
    .collect()
});

/// One child slot of an [`Expression`]: either a leaf term or a nested
/// subexpression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprChild {
    Arg(Argument),
    Expr(Box<Expression>),
}

impl ExprChild {
    fn get_vars(&self, out: &mut Vec<String>) {
        match self {
            ExprChild::Arg(a) if !a.constant => out.push(a.name.clone()),
            ExprChild::Arg(_) => {}
            ExprChild::Expr(e) => e.get_vars_into(out),
        }
    }

    fn get_consts(&self, out: &mut Vec<String>) {
        match self {
            ExprChild::Arg(a) if a.constant => out.push(a.lexical_form()),
            ExprChild::Arg(_) => {}
            ExprChild::Expr(e) => e.get_consts_into(out),
        }
    }

    fn places(&self) -> usize {
        match self {
            ExprChild::Arg(_) => 1,
            ExprChild::Expr(e) => e.places(),
        }
    }

    fn constant_number(&self) -> usize {
        match self {
            ExprChild::Arg(a) => usize::from(a.constant),
            ExprChild::Expr(e) => e.constant_number(),
        }
    }

    fn instantiate(&self, bindings: &HashMap<String, String>) -> ExprChild {
        match self {
            ExprChild::Arg(a) => ExprChild::Arg(a.instantiate(bindings)),
            ExprChild::Expr(e) => ExprChild::Expr(Box::new(e.instantiate(bindings))),
        }
    }
}

/// A filter-expression tree: `(op, left, right?)`.
///
/// `op` is one of [`UNARY_FUNCTORS`] (right is `None`), [`BINARY_FUNCTORS`]
/// or [`INFIX_OPERATORS`] (right is `Some`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub op: String,
    pub left: ExprChild,
    pub right: Option<ExprChild>,
    /// Regex flags (e.g. `"i"`), populated only when `op` is `REGEX`/`regex`
    /// and the pattern carried a flags suffix.
    pub regex_flags: Option<String>,
}

impl Expression {
    pub fn unary(op: impl Into<String>, operand: ExprChild) -> Self {
        Expression {
            op: op.into(),
            left: operand,
            right: None,
            regex_flags: None,
        }
    }

    pub fn binary(op: impl Into<String>, left: ExprChild, right: ExprChild) -> Self {
        Expression {
            op: op.into(),
            left,
            right: Some(right),
            regex_flags: None,
        }
    }

    /// Construct a `REGEX(subject, pattern)` expression, optionally with
    /// flags (the `i` / `s` / `m` suffix SPARQL allows as a third argument).
    pub fn regex(subject: ExprChild, pattern: Argument, flags: Option<String>) -> Self {
        Expression {
            op: "REGEX".to_string(),
            left: subject,
            right: Some(ExprChild::Arg(pattern)),
            regex_flags: flags,
        }
    }

    pub fn is_unary(&self) -> bool {
        UNARY_FUNCTORS.contains(self.op.as_str())
    }

    pub fn is_binary_functor(&self) -> bool {
        BINARY_FUNCTORS.contains(self.op.as_str())
    }

    pub fn get_vars(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.get_vars_into(&mut out);
        out
    }

    fn get_vars_into(&self, out: &mut Vec<String>) {
        self.left.get_vars(out);
        if let Some(right) = &self.right {
            right.get_vars(out);
        }
    }

    pub fn get_consts(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.get_consts_into(&mut out);
        out
    }

    fn get_consts_into(&self, out: &mut Vec<String>) {
        self.left.get_consts(out);
        if let Some(right) = &self.right {
            right.get_consts(out);
        }
    }

    pub fn places(&self) -> usize {
        self.left.places() + self.right.as_ref().map_or(0, ExprChild::places)
    }

    pub fn constant_number(&self) -> usize {
        self.left.constant_number() + self.right.as_ref().map_or(0, ExprChild::constant_number)
    }

    pub fn constant_percentage(&self) -> f64 {
        let places = self.places();
        if places == 0 {
            0.0
        } else {
            self.constant_number() as f64 / places as f64
        }
    }

    pub fn instantiate(&self, bindings: &HashMap<String, String>) -> Expression {
        Expression {
            op: self.op.clone(),
            left: self.left.instantiate(bindings),
            right: self.right.as_ref().map(|r| r.instantiate(bindings)),
            regex_flags: self.regex_flags.clone(),
        }
    }
}

/// Prefixes implicitly available on every query in addition to whatever
/// the parser collected.
pub fn default_prefixes() -> HashMap<String, String> {
    [
        ("rdfs", "<http://www.w3.org/2000/01/rdf-schema#"),
        ("owl", "<http://www.w3.org/2002/07/owl#"),
        (
            "rdf",
            "<http://www.w3.org/1999/02/22-rdf-syntax-ns#",
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Expand a `prefix:suffix` argument's lexical form to a full `<...>` IRI
/// using `prefixes`, always augmented with `rdfs`/`owl`/`rdf`.
///
/// Literals (containing `"` or `'`) and already-bracketed IRIs are
/// returned unchanged. If the argument carries a datatype and/or lang
/// tag, those are appended instead of being part of the URI expansion.
pub fn get_uri(arg: &str, prefixes: &HashMap<String, String>) -> String {
    let mut full_prefixes = default_prefixes();
    full_prefixes.extend(prefixes.clone());

    if arg.contains('"') || arg.contains('\'') {
        return arg.to_string();
    }
    if arg.starts_with('<') {
        return arg.to_string();
    }

    let colon_pos = match arg.find(':') {
        Some(pos) => pos,
        None => return arg.to_string(),
    };
    // Only treat this as prefix:suffix if the colon precedes any `<`.
    if let Some(lt_pos) = arg.find('<') {
        if lt_pos < colon_pos {
            return arg.to_string();
        }
    }

    let prefix = &arg[..colon_pos];
    let suffix = &arg[colon_pos + 1..];

    match full_prefixes.get(prefix) {
        Some(base) => {
            let trimmed = base.trim_end_matches('>');
            format!("{trimmed}{suffix}>")
        }
        None => arg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argument_equality_ignores_datatype() {
        let a = Argument::constant("\"42\"").with_datatype("xsd:integer");
        let b = Argument::constant("\"42\"");
        assert_eq!(a, b);
    }

    #[test]
    fn argument_lexical_form_appends_datatype_and_lang() {
        let a = Argument::constant("\"hello\"")
            .with_datatype("xsd:string")
            .with_lang("en");
        assert_eq!(a.lexical_form(), "\"hello\"^^xsd:string@en");
    }

    #[test]
    fn instantiate_replaces_matching_variable() {
        let arg = Argument::variable("?x");
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), "<http://ex/1>".to_string());
        let result = arg.instantiate(&bindings);
        assert!(result.constant);
        assert_eq!(result.name, "<http://ex/1>");
    }

    #[test]
    fn instantiate_leaves_unbound_variable_unchanged() {
        let arg = Argument::variable("?y");
        let bindings = HashMap::new();
        let result = arg.instantiate(&bindings);
        assert_eq!(result, arg);
        assert!(!result.constant);
    }

    #[test]
    fn expression_constant_percentage_is_zero_with_no_places() {
        // Places is never actually zero for a well-formed Expression (every
        // leaf is an Argument), but the formula itself must not panic and
        // divides defensively.
        let expr = Expression::unary("BOUND", ExprChild::Arg(Argument::variable("?x")));
        assert!(expr.constant_percentage() >= 0.0);
    }

    #[test]
    fn expression_constant_percentage_matches_ratio() {
        let expr = Expression::binary(
            "=",
            ExprChild::Arg(Argument::variable("?x")),
            ExprChild::Arg(Argument::constant("<http://ex/1>")),
        );
        assert_eq!(expr.places(), 2);
        assert_eq!(expr.constant_number(), 1);
        assert!((expr.constant_percentage() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn get_uri_expands_known_prefix() {
        let mut prefixes = HashMap::new();
        prefixes.insert("ex".to_string(), "<http://example.org/".to_string());
        assert_eq!(get_uri("ex:City", &prefixes), "<http://example.org/City>");
    }

    #[test]
    fn get_uri_always_has_rdf_rdfs_owl() {
        let prefixes = HashMap::new();
        assert_eq!(
            get_uri("rdf:type", &prefixes),
            "<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>"
        );
    }

    #[test]
    fn get_uri_passes_through_literals_and_bracketed_iris() {
        let prefixes = HashMap::new();
        assert_eq!(get_uri("\"a literal\"", &prefixes), "\"a literal\"");
        assert_eq!(get_uri("<http://ex/1>", &prefixes), "<http://ex/1>");
    }

    #[test]
    fn get_uri_unknown_prefix_passes_through() {
        let prefixes = HashMap::new();
        assert_eq!(get_uri("foo:bar", &prefixes), "foo:bar");
    }
}
