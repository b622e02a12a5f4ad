//! Utility expression calculator
//!
//! A utility specification is a list of rows. Each row holds an expression
//! and one coefficient per alternative; the utility of alternative `k` is the
//! sum of `coefficient[k] * value` over every row that applies. Rows without
//! coefficients are assignments (`name = ...`) that feed later rows.

use super::expression::{Expression, NoTrace, TraceSink};
use crate::error::{EvalError, UecError, UecResult};
use crate::types::UtilitySpec;
use crate::variables::{EvalContext, VariableResolver, VariableTable};
use tracing::{debug, error};

/// Contexts that can be re-targeted at one alternative.
pub trait AlternativeContext {
    /// Copy of this context with the 1-based `alternative` selected.
    fn for_alternative(&self, alternative: usize) -> Self;
}

impl<O> AlternativeContext for EvalContext<'_, O> {
    fn for_alternative(&self, alternative: usize) -> Self {
        EvalContext {
            alternative,
            ..*self
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    filter: Option<Expression>,
    expression: Expression,
    coefficients: Vec<f64>,
}

/// A compiled utility specification.
#[derive(Debug, Clone)]
pub struct Uec {
    name: String,
    alternatives: Vec<String>,
    rows: Vec<Row>,
}

impl Uec {
    /// Compile every row, failing on the first row that does not compile.
    pub fn compile<R>(spec: &UtilitySpec, resolver: &mut R) -> UecResult<Self>
    where
        R: VariableResolver + ?Sized,
    {
        if spec.alternatives.is_empty() {
            return Err(UecError::Validation(format!(
                "Utility '{}' has no alternatives",
                spec.name
            )));
        }

        let mut rows = Vec::with_capacity(spec.rows.len());
        for (i, row) in spec.rows.iter().enumerate() {
            let number = i + 1;

            let filter = match row.filter.as_deref().map(str::trim) {
                Some(text) if !text.is_empty() => {
                    let filter = Expression::compile(text, resolver)
                        .map_err(|e| UecError::syntax(text, e))?;
                    if filter.target().is_some() {
                        return Err(UecError::Validation(format!(
                            "Utility '{}' row {}: a filter cannot assign",
                            spec.name, number
                        )));
                    }
                    Some(filter)
                }
                _ => None,
            };

            let expression = Expression::compile(row.expression.as_str(), resolver)
                .map_err(|e| UecError::syntax(&row.expression, e))?;

            if row.coefficients.is_empty() && expression.target().is_none() {
                return Err(UecError::Validation(format!(
                    "Utility '{}' row {} neither assigns nor has coefficients",
                    spec.name, number
                )));
            }
            if !row.coefficients.is_empty() && row.coefficients.len() != spec.alternatives.len() {
                return Err(UecError::Validation(format!(
                    "Utility '{}' row {} has {} coefficients, expected {}",
                    spec.name,
                    number,
                    row.coefficients.len(),
                    spec.alternatives.len()
                )));
            }

            rows.push(Row {
                filter,
                expression,
                coefficients: row.coefficients.clone(),
            });
        }

        debug!(
            utility = %spec.name,
            rows = rows.len(),
            alternatives = spec.alternatives.len(),
            "compiled utility"
        );

        Ok(Self {
            name: spec.name.clone(),
            alternatives: spec.alternatives.clone(),
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Expression> + '_ {
        self.rows
            .iter()
            .flat_map(|row| row.filter.iter().chain(std::iter::once(&row.expression)))
    }

    /// Utility of every alternative.
    pub fn solve<C, T>(&self, table: &mut T, ctx: &C) -> UecResult<Vec<f64>>
    where
        C: AlternativeContext,
        T: VariableTable<C> + ?Sized,
    {
        let mut utilities = vec![0.0; self.alternatives.len()];
        self.solve_into(table, ctx, &mut utilities)?;
        Ok(utilities)
    }

    /// Utility of every alternative, written to `out`.
    pub fn solve_into<C, T>(&self, table: &mut T, ctx: &C, out: &mut [f64]) -> UecResult<()>
    where
        C: AlternativeContext,
        T: VariableTable<C> + ?Sized,
    {
        self.solve_traced(table, ctx, out, &mut NoTrace)
    }

    pub fn solve_traced<C, T, S>(
        &self,
        table: &mut T,
        ctx: &C,
        out: &mut [f64],
        sink: &mut S,
    ) -> UecResult<()>
    where
        C: AlternativeContext,
        T: VariableTable<C> + ?Sized,
        S: TraceSink + ?Sized,
    {
        if out.len() != self.alternatives.len() {
            return Err(UecError::Validation(format!(
                "Utility '{}' has {} alternatives, output holds {}",
                self.name,
                self.alternatives.len(),
                out.len()
            )));
        }
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = self.utility(table, &ctx.for_alternative(k + 1), k, sink)?;
        }
        Ok(())
    }

    /// Utility of one 1-based alternative, reporting every step to `sink`.
    pub fn trace<C, T, S>(
        &self,
        table: &mut T,
        ctx: &C,
        alternative: usize,
        sink: &mut S,
    ) -> UecResult<f64>
    where
        C: AlternativeContext,
        T: VariableTable<C> + ?Sized,
        S: TraceSink + ?Sized,
    {
        if alternative == 0 || alternative > self.alternatives.len() {
            return Err(UecError::Validation(format!(
                "Utility '{}' has no alternative {}",
                self.name, alternative
            )));
        }
        self.utility(
            table,
            &ctx.for_alternative(alternative),
            alternative - 1,
            sink,
        )
    }

    /// `k` is the 0-based alternative; `ctx` already selects it.
    fn utility<C, T, S>(&self, table: &mut T, ctx: &C, k: usize, sink: &mut S) -> UecResult<f64>
    where
        T: VariableTable<C> + ?Sized,
        S: TraceSink + ?Sized,
    {
        let mut utility = 0.0;
        for (r, row) in self.rows.iter().enumerate() {
            if let Some(filter) = &row.filter {
                let pass = filter
                    .value_traced(&*table, ctx, sink)
                    .map_err(|e| self.abort(k, r, filter, e))?;
                if !(pass > 0.0) {
                    continue;
                }
            }

            let coefficient = row.coefficients.get(k).copied();
            if row.expression.target().is_none() && coefficient == Some(0.0) {
                continue;
            }

            let value = row
                .expression
                .solve_traced(table, ctx, sink)
                .map_err(|e| self.abort(k, r, &row.expression, e))?;
            if let Some(c) = coefficient {
                utility += c * value;
            }
        }
        Ok(utility)
    }

    fn abort(&self, k: usize, r: usize, expression: &Expression, source: EvalError) -> UecError {
        let alternative = self.alternatives.get(k).cloned().unwrap_or_default();
        error!(
            utility = %self.name,
            alternative = %alternative,
            row = r + 1,
            expression = %expression.text(),
            error = %source,
            "utility evaluation aborted"
        );
        UecError::Solve {
            utility: self.name.clone(),
            alternative,
            row: r + 1,
            expression: expression.text().to_string(),
            source,
        }
    }
}
