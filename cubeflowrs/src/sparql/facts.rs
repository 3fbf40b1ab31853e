//! Fact retrieval: one SPARQL query per logical query.
//!
//! The SELECT carries one variable per grouped level and one aggregate per
//! measure; the WHERE binds each observation to the cube's dataset and to
//! each grouped dimension, walking `leaf_distance` narrowing hops from the
//! raw dimension value up to the grouped level. GROUP BY and ORDER BY
//! cover exactly the grouped level variables in query order.

use std::collections::{BTreeSet, HashMap, HashSet};

use oxrdf::Term;

use crate::error::{CubeflowError, Result};
use crate::model::{Aggregator, ArithOp, Measure, Member};
use crate::plan::{LogicalQuery, SelectionPredicate};
use crate::transport::SparqlRow;
use crate::uri;
use crate::vocab;

use super::ast::{iri, triple, var, SelectItem, SelectQuery, SparqlBinaryOperator, SparqlExpr, SparqlRenderer};
use super::QueryGenerator;

impl QueryGenerator {
    /// Render the fact query for a logical query.
    pub fn fact_query(&self, logical: &LogicalQuery) -> Result<String> {
        let mut query = SelectQuery::default();
        query.patterns.push(triple(
            var("obs"),
            iri(vocab::qb::DATA_SET),
            iri(logical.cube.dataset_iri.clone()),
        ));

        // Grouped levels, in query order.
        let mut grouped_dimensions: HashSet<String> = HashSet::new();
        for (i, level) in logical.groupby.iter().enumerate() {
            let dim_iri = self
                .codec()
                .decode(uri::strip_brackets(&level.dimension_unique_name));
            grouped_dimensions.insert(level.dimension_unique_name.clone());

            let raw = format!("d{i}_0");
            query
                .patterns
                .push(triple(var("obs"), iri(dim_iri), var(raw.clone())));
            let mut bound = raw;
            for hop in 1..=level.leaf_distance {
                let parent = format!("d{i}_{hop}");
                query.patterns.push(triple(
                    var(parent.clone()),
                    iri(vocab::skos::NARROWER),
                    var(bound.clone()),
                ));
                bound = parent;
            }
            query.select.push(SelectItem {
                expr: SparqlExpr::Var(bound.clone()),
                alias: None,
            });
            query.group_by.push(bound.clone());
            query.order_by.push(bound);
        }

        // Measures: default to the cube's first measure when none given.
        let measures = self.effective_measures(logical)?;
        let mut measure_vars: HashMap<String, String> = HashMap::new();
        for (j, measure) in measures.iter().enumerate() {
            let expr = self.measure_select_expr(measure, &mut measure_vars, &mut query)?;
            query.select.push(SelectItem {
                expr,
                alias: Some(format!("a{j}")),
            });
        }

        // Selection predicates; a dimension already bound by the grouping
        // is never filtered a second time.
        for (k, predicate) in logical.predicates.iter().enumerate() {
            if grouped_dimensions.contains(&predicate.hierarchy.dimension_unique_name) {
                continue;
            }
            if predicate.members.is_empty() {
                continue;
            }
            let sel = format!("s{k}");
            if let Some(filter) = self.selection_filter(&sel, predicate)? {
                let dim_iri = self
                    .codec()
                    .decode(uri::strip_brackets(&predicate.hierarchy.dimension_unique_name));
                query
                    .patterns
                    .push(triple(var("obs"), iri(dim_iri), var(sel.clone())));
                query.filters.push(filter);
            }
        }

        Ok(SparqlRenderer.render_select(&query))
    }

    /// Execute the fact query. The first row is the variable-name header;
    /// data rows carry the grouped level values then the per-measure
    /// aggregates, in declared order.
    pub fn fact_rows(&self, logical: &LogicalQuery) -> Result<Vec<SparqlRow>> {
        let text = self.fact_query(logical)?;
        self.run(&text)
    }

    pub(crate) fn effective_measures(&self, logical: &LogicalQuery) -> Result<Vec<Measure>> {
        let mut measures = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for measure in &logical.measures {
            if seen.insert(measure.unique_name().to_string()) {
                measures.push(measure.clone());
            }
        }
        if measures.is_empty() {
            let first = logical.cube.first_measure()?.ok_or_else(|| {
                CubeflowError::Metadata(format!(
                    "cube {} has no measures",
                    logical.cube.unique_name
                ))
            })?;
            measures.push(first);
        }
        Ok(measures)
    }

    /// One aggregate expression per measure. Calculated measures emit an
    /// aggregate-free arithmetic expression over the two per-observation
    /// operand variables instead.
    fn measure_select_expr(
        &self,
        measure: &Measure,
        measure_vars: &mut HashMap<String, String>,
        query: &mut SelectQuery,
    ) -> Result<SparqlExpr> {
        if measure.aggregator == Aggregator::Calculated {
            let formula = measure.formula.as_ref().ok_or_else(|| {
                CubeflowError::Metadata(format!(
                    "calculated measure {} has no formula",
                    measure.unique_name()
                ))
            })?;
            let left = self.bind_measure_var(&formula.left, measure_vars, query)?;
            let right = self.bind_measure_var(&formula.right, measure_vars, query)?;
            let op = match formula.op {
                ArithOp::Add => SparqlBinaryOperator::Add,
                ArithOp::Subtract => SparqlBinaryOperator::Subtract,
                ArithOp::Multiply => SparqlBinaryOperator::Multiply,
                ArithOp::Divide => SparqlBinaryOperator::Divide,
            };
            return Ok(SparqlExpr::BinaryOp {
                op,
                left: Box::new(SparqlExpr::Var(left)),
                right: Box::new(SparqlExpr::Var(right)),
            });
        }
        let bound = self.bind_measure_var(measure, measure_vars, query)?;
        Ok(SparqlExpr::Aggregate {
            agg: measure.aggregator,
            distinct: false,
            expr: Box::new(SparqlExpr::Var(bound)),
        })
    }

    /// Bind `?obs <measureProperty> ?mN` once per distinct measure.
    fn bind_measure_var(
        &self,
        measure: &Measure,
        measure_vars: &mut HashMap<String, String>,
        query: &mut SelectQuery,
    ) -> Result<String> {
        let key = measure.member.key()?;
        if let Some(existing) = measure_vars.get(&key) {
            return Ok(existing.clone());
        }
        let name = format!("m{}", measure_vars.len());
        query
            .patterns
            .push(triple(var("obs"), iri(key.clone()), var(name.clone())));
        measure_vars.insert(key, name.clone());
        Ok(name)
    }

    /// Compile one hierarchy's member selection. Integer-coded candidate
    /// sets compact to a range filter; the full range compiles to no
    /// filter at all; everything else becomes an equality disjunction.
    fn selection_filter(
        &self,
        variable: &str,
        predicate: &SelectionPredicate,
    ) -> Result<Option<SparqlExpr>> {
        if let Some(candidates) = integer_names(&predicate.members) {
            if let Some(range) = self.level_integer_range(predicate)? {
                if candidates == range {
                    return Ok(None);
                }
                if let (Some(&low), Some(&high)) = (candidates.first(), candidates.last()) {
                    let contiguous = candidates.len() as i64 == high - low + 1;
                    if contiguous && candidates.is_subset(&range) {
                        return Ok(Some(SparqlExpr::BinaryOp {
                            op: SparqlBinaryOperator::And,
                            left: Box::new(SparqlExpr::BinaryOp {
                                op: SparqlBinaryOperator::Gte,
                                left: Box::new(SparqlExpr::Var(variable.to_string())),
                                right: Box::new(SparqlExpr::Literal(serde_json::json!(low))),
                            }),
                            right: Box::new(SparqlExpr::BinaryOp {
                                op: SparqlBinaryOperator::Lte,
                                left: Box::new(SparqlExpr::Var(variable.to_string())),
                                right: Box::new(SparqlExpr::Literal(serde_json::json!(high))),
                            }),
                        }));
                    }
                }
            }
        }

        let mut disjunction: Option<SparqlExpr> = None;
        for member in &predicate.members {
            let right = match member.term.as_ref() {
                Some(Term::NamedNode(n)) => SparqlExpr::Iri(n.as_str().to_string()),
                Some(Term::Literal(l)) => {
                    SparqlExpr::Literal(serde_json::Value::String(l.value().to_string()))
                }
                Some(Term::BlankNode(b)) => {
                    SparqlExpr::Literal(serde_json::Value::String(b.as_str().to_string()))
                }
                None => {
                    return Err(CubeflowError::Query(format!(
                        "member {} cannot appear in a selection",
                        member.unique_name
                    )))
                }
            };
            let eq = SparqlExpr::BinaryOp {
                op: SparqlBinaryOperator::Eq,
                left: Box::new(SparqlExpr::Var(variable.to_string())),
                right: Box::new(right),
            };
            disjunction = Some(match disjunction {
                Some(acc) => SparqlExpr::BinaryOp {
                    op: SparqlBinaryOperator::Or,
                    left: Box::new(acc),
                    right: Box::new(eq),
                },
                None => eq,
            });
        }
        Ok(disjunction)
    }

    /// The full integer value range of the candidates' level, when every
    /// one of its members is integer-coded.
    fn level_integer_range(
        &self,
        predicate: &SelectionPredicate,
    ) -> Result<Option<BTreeSet<i64>>> {
        let Some(level_name) = predicate
            .members
            .first()
            .map(|m| m.level_unique_name.clone())
        else {
            return Ok(None);
        };
        let level = match predicate.hierarchy.level_by_unique_name(&level_name) {
            Ok(level) => level,
            Err(_) => return Ok(None),
        };
        let members = level.members()?;
        let mut range = BTreeSet::new();
        for member in members.iter() {
            match parse_integer_name(member.unique_name()) {
                Some(value) => {
                    range.insert(value);
                }
                None => return Ok(None),
            }
        }
        Ok(Some(range))
    }
}

fn parse_integer_name(unique_name: &str) -> Option<i64> {
    uri::unescape(uri::last_segment(unique_name)).parse().ok()
}

fn integer_names(members: &[Member]) -> Option<BTreeSet<i64>> {
    let mut out = BTreeSet::new();
    for member in members {
        out.insert(parse_integer_name(&member.unique_name)?);
    }
    Some(out)
}
