use serde_json::Value;

use crate::model::Aggregator;

#[derive(Debug, Clone)]
pub enum SparqlTerm {
    Var(String),
    Iri(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
pub struct TriplePattern {
    pub subject: SparqlTerm,
    pub predicate: SparqlTerm,
    pub object: SparqlTerm,
}

pub fn triple(subject: SparqlTerm, predicate: SparqlTerm, object: SparqlTerm) -> TriplePattern {
    TriplePattern {
        subject,
        predicate,
        object,
    }
}

pub fn var(name: impl Into<String>) -> SparqlTerm {
    SparqlTerm::Var(name.into())
}

pub fn iri(value: impl Into<String>) -> SparqlTerm {
    SparqlTerm::Iri(value.into())
}

#[derive(Debug, Clone)]
pub enum SparqlExpr {
    Var(String),
    Iri(String),
    Literal(Value),
    BinaryOp {
        op: SparqlBinaryOperator,
        left: Box<SparqlExpr>,
        right: Box<SparqlExpr>,
    },
    Function {
        name: String,
        args: Vec<SparqlExpr>,
    },
    Aggregate {
        agg: Aggregator,
        distinct: bool,
        expr: Box<SparqlExpr>,
    },
}

#[derive(Debug, Clone, Copy)]
pub enum SparqlBinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: SparqlExpr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValuesClause {
    pub variable: String,
    pub terms: Vec<SparqlTerm>,
}

#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub select: Vec<SelectItem>,
    pub patterns: Vec<TriplePattern>,
    pub optionals: Vec<Vec<TriplePattern>>,
    pub values: Option<ValuesClause>,
    pub filters: Vec<SparqlExpr>,
    pub group_by: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: Option<u64>,
}

pub struct SparqlRenderer;

impl SparqlRenderer {
    pub fn render_select(&self, query: &SelectQuery) -> String {
        let select_items: Vec<String> = query
            .select
            .iter()
            .map(|item| match &item.alias {
                Some(alias) => format!("({} AS ?{alias})", self.render_expr(&item.expr)),
                None => self.render_expr(&item.expr),
            })
            .collect();

        let mut text = format!(
            "SELECT {}{} WHERE {{\n",
            if query.distinct { "DISTINCT " } else { "" },
            select_items.join(" ")
        );

        for pattern in &query.patterns {
            text.push_str(&format!("{} .\n", self.render_pattern(pattern)));
        }

        for optional in &query.optionals {
            let inner: Vec<String> = optional
                .iter()
                .map(|p| format!("{} .", self.render_pattern(p)))
                .collect();
            text.push_str(&format!("OPTIONAL {{ {} }}\n", inner.join(" ")));
        }

        if let Some(values) = &query.values {
            let terms: Vec<String> = values.terms.iter().map(|t| self.render_term(t)).collect();
            text.push_str(&format!(
                "VALUES ?{} {{ {} }}\n",
                values.variable,
                terms.join(" ")
            ));
        }

        for filter in &query.filters {
            text.push_str(&format!("FILTER ({})\n", self.render_expr(filter)));
        }

        text.push('}');

        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|g| format!("?{g}")).collect();
            text.push_str(&format!("\nGROUP BY {}", groups.join(" ")));
        }

        if !query.order_by.is_empty() {
            let orders: Vec<String> = query.order_by.iter().map(|o| format!("?{o}")).collect();
            text.push_str(&format!("\nORDER BY {}", orders.join(" ")));
        }

        if let Some(limit) = query.limit {
            text.push_str(&format!("\nLIMIT {limit}"));
        }

        text
    }

    fn render_pattern(&self, pattern: &TriplePattern) -> String {
        format!(
            "{} {} {}",
            self.render_term(&pattern.subject),
            self.render_term(&pattern.predicate),
            self.render_term(&pattern.object)
        )
    }

    fn render_term(&self, term: &SparqlTerm) -> String {
        match term {
            SparqlTerm::Var(name) => format!("?{name}"),
            SparqlTerm::Iri(value) => format!("<{value}>"),
            SparqlTerm::Literal(value) => self.render_literal(value),
        }
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "UNDEF".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            other => format!(
                "\"{}\"",
                other.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            ),
        }
    }

    fn render_expr(&self, expr: &SparqlExpr) -> String {
        match expr {
            SparqlExpr::Var(name) => format!("?{name}"),
            SparqlExpr::Iri(value) => format!("<{value}>"),
            SparqlExpr::Literal(value) => self.render_literal(value),
            SparqlExpr::BinaryOp { op, left, right } => {
                let op_sparql = match op {
                    SparqlBinaryOperator::Add => "+",
                    SparqlBinaryOperator::Subtract => "-",
                    SparqlBinaryOperator::Multiply => "*",
                    SparqlBinaryOperator::Divide => "/",
                    SparqlBinaryOperator::And => "&&",
                    SparqlBinaryOperator::Or => "||",
                    SparqlBinaryOperator::Eq => "=",
                    SparqlBinaryOperator::Neq => "!=",
                    SparqlBinaryOperator::Gt => ">",
                    SparqlBinaryOperator::Gte => ">=",
                    SparqlBinaryOperator::Lt => "<",
                    SparqlBinaryOperator::Lte => "<=",
                };
                format!(
                    "({} {} {})",
                    self.render_expr(left),
                    op_sparql,
                    self.render_expr(right)
                )
            }
            SparqlExpr::Function { name, args } => {
                let rendered: Vec<String> = args.iter().map(|a| self.render_expr(a)).collect();
                format!("{name}({})", rendered.join(", "))
            }
            SparqlExpr::Aggregate {
                agg,
                distinct,
                expr,
            } => {
                let inner = format!(
                    "{}{}",
                    if *distinct { "DISTINCT " } else { "" },
                    self.render_expr(expr)
                );
                match agg {
                    Aggregator::Sum => format!("SUM({inner})"),
                    Aggregator::Avg => format!("AVG({inner})"),
                    Aggregator::Min => format!("MIN({inner})"),
                    Aggregator::Max => format!("MAX({inner})"),
                    Aggregator::Count => format!("COUNT({inner})"),
                    // Calculated measures never aggregate; their arithmetic
                    // expression is built directly by the fact generator.
                    Aggregator::Calculated => inner,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_aggregate_group_and_filter() {
        let mut query = SelectQuery {
            select: vec![
                SelectItem {
                    expr: SparqlExpr::Var("year".to_string()),
                    alias: None,
                },
                SelectItem {
                    expr: SparqlExpr::Aggregate {
                        agg: Aggregator::Sum,
                        distinct: false,
                        expr: Box::new(SparqlExpr::Var("m0".to_string())),
                    },
                    alias: Some("a0".to_string()),
                },
            ],
            ..Default::default()
        };
        query.patterns.push(triple(
            var("obs"),
            iri("http://purl.org/linked-data/cube#dataSet"),
            iri("http://example.org/ds"),
        ));
        query.filters.push(SparqlExpr::BinaryOp {
            op: SparqlBinaryOperator::Gte,
            left: Box::new(SparqlExpr::Var("year".to_string())),
            right: Box::new(SparqlExpr::Literal(serde_json::json!(2))),
        });
        query.group_by.push("year".to_string());
        query.order_by.push("year".to_string());

        let text = SparqlRenderer.render_select(&query);
        assert!(text.contains("SELECT ?year (SUM(?m0) AS ?a0) WHERE {"));
        assert!(text.contains("?obs <http://purl.org/linked-data/cube#dataSet> <http://example.org/ds> ."));
        assert!(text.contains("FILTER ((?year >= 2))"));
        assert!(text.contains("GROUP BY ?year"));
        assert!(text.contains("ORDER BY ?year"));
    }

    #[test]
    fn renders_values_and_optional() {
        let mut query = SelectQuery {
            distinct: true,
            select: vec![SelectItem {
                expr: SparqlExpr::Var("c".to_string()),
                alias: None,
            }],
            ..Default::default()
        };
        query.patterns.push(triple(
            var("c"),
            iri("http://www.w3.org/2004/02/skos/core#inScheme"),
            iri("http://example.org/scheme"),
        ));
        query.optionals.push(vec![triple(
            var("c"),
            iri("http://www.w3.org/2000/01/rdf-schema#label"),
            var("label"),
        )]);
        query.values = Some(ValuesClause {
            variable: "c".to_string(),
            terms: vec![iri("http://example.org/a"), iri("http://example.org/b")],
        });

        let text = SparqlRenderer.render_select(&query);
        assert!(text.starts_with("SELECT DISTINCT ?c WHERE {"));
        assert!(text.contains("OPTIONAL { ?c <http://www.w3.org/2000/01/rdf-schema#label> ?label . }"));
        assert!(text.contains("VALUES ?c { <http://example.org/a> <http://example.org/b> }"));
    }
}
