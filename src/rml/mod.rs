//! RML term-map → relational predicate translator.
//!
//! Translates an RML (RDF Mapping Language) term map plus a bound SPARQL
//! [`Argument`] into the SQL fragments a relational source needs: a term
//! expression, a filter condition, and (for variable arguments) a
//! projection. Exercises the same AST abstractions as the rest of this
//! crate, which is why it lives here rather than in a separate crate.

use crate::error::{FedQueryError, Result};
use crate::terms::Argument;

/// How an RML term map derives its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripleMapType {
    Constant,
    Reference,
    Template,
}

/// The kind of RDF term an RML term map produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermType {
    Iri,
    Literal,
    BNode,
}

/// An RML term map: `rr:constant`, `rr:column`/`rr:reference`, or
/// `rr:template`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermMap {
    pub value: String,
    pub resource_type: TripleMapType,
    pub term_type: TermType,
}

impl TermMap {
    pub fn new(value: impl Into<String>, resource_type: TripleMapType, term_type: TermType) -> Self {
        TermMap {
            value: value.into(),
            resource_type,
            term_type,
        }
    }

    /// Split a template string like `http://ex.org/City/{name}-{suffix}`
    /// into `(prefix, column)` pairs, plus a trailing single-element
    /// segment for any constant tail with no column.
    pub fn split_template(&self) -> Vec<Vec<String>> {
        let mut result = Vec::new();
        let mut rest = self.value.as_str();
        loop {
            match rest.find('{') {
                Some(start) => {
                    let prefix = &rest[..start];
                    let after = &rest[start + 1..];
                    match after.find('}') {
                        Some(end) => {
                            result.push(vec![prefix.to_string(), after[..end].to_string()]);
                            rest = &after[end + 1..];
                        }
                        None => {
                            // Unterminated placeholder: treat the remainder as a
                            // literal constant tail rather than panicking.
                            result.push(vec![rest.to_string()]);
                            break;
                        }
                    }
                }
                None => {
                    if !rest.is_empty() {
                        result.push(vec![rest.to_string()]);
                    }
                    break;
                }
            }
        }
        result
    }

    /// Column names referenced by this term map (template placeholders,
    /// or the single reference column).
    pub fn columns(&self) -> Vec<String> {
        match self.resource_type {
            TripleMapType::Template => self
                .split_template()
                .into_iter()
                .filter(|seg| seg.len() > 1)
                .map(|seg| seg[1].clone())
                .collect(),
            TripleMapType::Reference => vec![self.value.clone()],
            TripleMapType::Constant => Vec::new(),
        }
    }
}

/// A SQL-ish term expression: either a bare column reference or a
/// function call over columns (e.g. `CONCAT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlExpr {
    Column(String),
    Function { name: String, args: Vec<String> },
}

impl SqlExpr {
    pub fn to_sql(&self) -> String {
        match self {
            SqlExpr::Column(c) => c.clone(),
            SqlExpr::Function { name, args } => format!("{name}({})", args.join(", ")),
        }
    }
}

/// The `type`/`value` pair RML calls the "SPARQL result template" — how
/// to tag the value this term map produces when no binding is projected
/// (i.e. the argument side was a constant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultTemplate {
    pub term_type: String,
    pub value: String,
}

/// The output of translating one term map against one SPARQL argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub term: Option<SqlExpr>,
    pub projection: Option<String>,
    pub filter: Option<String>,
    pub result_template: ResultTemplate,
}

fn get_expr(segments: &[Vec<String>]) -> Vec<String> {
    let mut out = Vec::new();
    for seg in segments {
        match seg.len() {
            1 => out.push(format!("'{}'", seg[0])),
            _ => {
                if !seg[0].is_empty() {
                    out.push(format!("'{}'", seg[0]));
                }
                out.push(format!("`{}`", seg[1]));
            }
        }
    }
    out
}

fn get_sql_term(term_map: &TermMap) -> Result<(Option<SqlExpr>, ResultTemplate)> {
    match term_map.resource_type {
        TripleMapType::Template => {
            if term_map.value.is_empty() {
                return Err(FedQueryError::TermMapTranslation {
                    detail: "empty template".to_string(),
                });
            }
            let mut segments = term_map.split_template();
            let mut term_type = "uri".to_string();
            if let Some(first) = segments.first_mut() {
                if term_map.term_type == TermType::BNode {
                    if let Some(constant) = first.first_mut() {
                        *constant = format!("_:{constant}");
                    }
                    term_type = "bnode".to_string();
                }
            }
            let expr = get_expr(&segments);
            let term = if expr.len() > 1 {
                Some(SqlExpr::Function {
                    name: "CONCAT".to_string(),
                    args: expr,
                })
            } else if let Some(only) = expr.first() {
                Some(SqlExpr::Column(only.clone()))
            } else {
                None
            };
            Ok((
                term,
                ResultTemplate {
                    term_type,
                    value: String::new(),
                },
            ))
        }
        TripleMapType::Reference => match term_map.term_type {
            TermType::BNode => {
                let expr = get_expr(&[vec!["_:".to_string(), term_map.value.clone()]]);
                let term = if expr.len() > 1 {
                    Some(SqlExpr::Function {
                        name: "CONCAT".to_string(),
                        args: expr,
                    })
                } else {
                    Some(SqlExpr::Column(expr[0].clone()))
                };
                Ok((
                    term,
                    ResultTemplate {
                        term_type: "bnode".to_string(),
                        value: String::new(),
                    },
                ))
            }
            TermType::Iri => Ok((
                Some(SqlExpr::Column(term_map.value.clone())),
                ResultTemplate {
                    term_type: "uri".to_string(),
                    value: String::new(),
                },
            )),
            TermType::Literal => Ok((
                Some(SqlExpr::Column(term_map.value.clone())),
                ResultTemplate {
                    term_type: "literal".to_string(),
                    value: String::new(),
                },
            )),
        },
        TripleMapType::Constant => {
            let term_type = match term_map.term_type {
                TermType::BNode => "bnode",
                TermType::Literal => "literal",
                TermType::Iri => "uri",
            };
            Ok((
                None,
                ResultTemplate {
                    term_type: term_type.to_string(),
                    value: term_map.value.clone(),
                },
            ))
        }
    }
}

/// Strip a literal/IRI's delimiters (`"`, `'`, `<`, `>`) for content
/// comparison, without re-quoting.
fn strip_delimiters(value: &str) -> &str {
    value.trim_matches(|c| c == '"' || c == '\'' || c == '<' || c == '>')
}

fn quote_rdf_value(term_map: &TermMap, rdf_term_name: &str) -> String {
    if term_map.term_type == TermType::BNode {
        return rdf_term_name.to_string();
    }
    if rdf_term_name.starts_with(['"', '<', '\'']) {
        format!("'{}'", strip_delimiters(rdf_term_name))
    } else {
        format!("'{rdf_term_name}'")
    }
}

fn filter_condition(
    term_map: &TermMap,
    term: &Option<SqlExpr>,
    result_template: &ResultTemplate,
    rdf_term: &Argument,
    comparison_op: &str,
) -> Option<String> {
    let rdf_value = quote_rdf_value(term_map, &rdf_term.name);

    match term {
        Some(t) => Some(format!("{} {comparison_op} {rdf_value}", t.to_sql())),
        None => {
            // CONSTANT term map vs. a constant argument: both sides are
            // known at translation time, so short-circuit instead of
            // emitting a condition that compares equal literal content
            // across mismatched quoting.
            if comparison_op == "=" {
                if strip_delimiters(&result_template.value) == strip_delimiters(&rdf_term.name) {
                    None
                } else {
                    Some("FALSE".to_string())
                }
            } else {
                Some(format!("'{}' {comparison_op} {rdf_value}", result_template.value))
            }
        }
    }
}

/// Translate `term_map` against `rdf_term` (default comparison `=`).
pub fn translate(term_map: &TermMap, rdf_term: &Argument, comparison_op: &str) -> Result<Translation> {
    let (term, result_template) = get_sql_term(term_map)?;

    if rdf_term.constant {
        let filter = filter_condition(term_map, &term, &result_template, rdf_term, comparison_op);
        Ok(Translation {
            term,
            projection: None,
            filter,
            result_template: ResultTemplate {
                term_type: result_template.term_type,
                value: String::new(),
            },
        })
    } else {
        let projection = term
            .as_ref()
            .map(|t| format!("{} AS {}", t.to_sql(), rdf_term.var_name()));
        let filter = if term_map.columns().is_empty() {
            None
        } else {
            Some(
                term_map
                    .columns()
                    .iter()
                    .map(|c| format!("`{c}` IS NOT NULL"))
                    .collect::<Vec<_>>()
                    .join(" AND "),
            )
        };
        Ok(Translation {
            term,
            projection,
            filter,
            result_template,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_with_single_column_is_a_bare_column() {
        let tm = TermMap::new("{name}", TripleMapType::Template, TermType::Iri);
        let var = Argument::variable("?nvar");
        let t = translate(&tm, &var, "=").unwrap();
        assert_eq!(t.term, Some(SqlExpr::Column("`name`".to_string())));
        assert_eq!(t.projection, Some("`name` AS nvar".to_string()));
        assert!(t.filter.unwrap().contains("IS NOT NULL"));
    }

    #[test]
    fn template_with_prefix_and_column_produces_concat_term() {
        let tm = TermMap::new("http://hello.us/City/{name}", TripleMapType::Template, TermType::Iri);
        let var = Argument::variable("?nvar");
        let t = translate(&tm, &var, "=").unwrap();
        assert!(matches!(t.term, Some(SqlExpr::Function { .. })));
    }

    #[test]
    fn template_with_prefix_and_column_uses_concat() {
        let tm = TermMap::new("http://hello.us/City/{name}", TripleMapType::Template, TermType::Iri);
        let segments = tm.split_template();
        assert_eq!(
            segments,
            vec![vec!["http://hello.us/City/".to_string(), "name".to_string()]]
        );
        let expr = get_expr(&segments);
        assert_eq!(expr, vec!["'http://hello.us/City/'".to_string(), "`name`".to_string()]);
    }

    #[test]
    fn bnode_template_prepends_underscore_colon() {
        let tm = TermMap::new("http://hello.us/City/{name}", TripleMapType::Template, TermType::BNode);
        let var = Argument::variable("?nvar");
        let t = translate(&tm, &var, "=").unwrap();
        assert_eq!(t.result_template.term_type, "bnode");
        match t.term {
            Some(SqlExpr::Function { args, .. }) => {
                assert!(args[0].contains("_:"));
            }
            other => panic!("expected CONCAT function, got {other:?}"),
        }
    }

    #[test]
    fn reference_bnode_wraps_with_concat() {
        let tm = TermMap::new("id", TripleMapType::Reference, TermType::BNode);
        let var = Argument::variable("?x");
        let t = translate(&tm, &var, "=").unwrap();
        assert_eq!(t.result_template.term_type, "bnode");
        assert!(matches!(t.term, Some(SqlExpr::Function { .. })));
    }

    #[test]
    fn constant_vs_matching_constant_short_circuits_to_no_filter() {
        let tm = TermMap::new("Addis Ababa", TripleMapType::Constant, TermType::Literal);
        let constant = Argument::constant("\"Addis Ababa\"");
        let t = translate(&tm, &constant, "=").unwrap();
        assert_eq!(t.filter, None);
    }

    #[test]
    fn constant_vs_mismatched_constant_short_circuits_to_false() {
        let tm = TermMap::new("Addis Ababa", TripleMapType::Constant, TermType::Literal);
        let constant = Argument::constant("\"Nairobi\"");
        let t = translate(&tm, &constant, "=").unwrap();
        assert_eq!(t.filter, Some("FALSE".to_string()));
    }

    #[test]
    fn empty_template_is_a_translation_error() {
        let tm = TermMap::new("", TripleMapType::Template, TermType::Iri);
        let var = Argument::variable("?x");
        let result = translate(&tm, &var, "=");
        assert!(result.is_err());
    }

    #[test]
    fn constant_term_map_against_variable_projects_nothing() {
        let tm = TermMap::new("Addis Ababa", TripleMapType::Constant, TermType::Literal);
        let var = Argument::variable("?city");
        let t = translate(&tm, &var, "=").unwrap();
        assert_eq!(t.projection, None);
        assert_eq!(t.filter, None);
        assert_eq!(t.result_template.value, "Addis Ababa");
    }
}
