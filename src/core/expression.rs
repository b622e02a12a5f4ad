//! Compiled expressions
//!
//! An [`Expression`] is parsed once against a [`VariableResolver`] and then
//! evaluated any number of times against a [`VariableTable`] and a
//! caller-owned context. Compiled expressions hold no evaluation state and can
//! be shared between threads.
//!
//! ```
//! use uec_expr::core::expression::Expression;
//! use uec_expr::variables::ScalarTable;
//!
//! let mut table = ScalarTable::new();
//! table.set("ivt", 12.0);
//!
//! let expr = Expression::compile("time = ivt * 1.5 + 2", &mut table)?;
//! assert_eq!(expr.solve(&mut table, &())?, 20.0);
//! assert_eq!(table.get("time"), Some(20.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod compiler;
pub mod evaluator;
pub mod instruction;
pub mod tokenizer;
pub mod trace;

pub use evaluator::AUX_STACK_CAPACITY;
pub use instruction::{Arity, Instruction, Opcode, Program};
pub use trace::{LogTrace, NoTrace, TextTrace, TraceSink, TraceStep};

use crate::error::{EvalError, SyntaxError};
use crate::variables::{VariableResolver, VariableTable};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
enum State {
    Pending,
    Compiled(Program),
    Failed(SyntaxError),
}

/// A formula in one of three states: pending, compiled or failed.
///
/// A failed expression stays failed; evaluating it reports
/// [`EvalError::NotCompiled`].
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    text: String,
    state: State,
    target: Option<usize>,
}

impl Expression {
    /// An uncompiled expression. Call [`parse`](Self::parse) before solving.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            state: State::Pending,
            target: None,
        }
    }

    /// Create and compile in one step.
    pub fn compile<R>(text: impl Into<String>, resolver: &mut R) -> Result<Self, SyntaxError>
    where
        R: VariableResolver + ?Sized,
    {
        let mut expression = Self::new(text);
        expression.parse(resolver)?;
        Ok(expression)
    }

    /// Compile against `resolver`. Names are resolved only on the first call;
    /// later calls report the outcome of that first attempt.
    pub fn parse<R>(&mut self, resolver: &mut R) -> Result<(), SyntaxError>
    where
        R: VariableResolver + ?Sized,
    {
        match &self.state {
            State::Compiled(_) => return Ok(()),
            State::Failed(err) => return Err(err.clone()),
            State::Pending => {}
        }

        match compiler::compile(&self.text, resolver) {
            Ok(compiled) => {
                debug!(
                    expression = %self.text,
                    instructions = compiled.program.len(),
                    assigns = compiled.target.is_some(),
                    "compiled expression"
                );
                self.target = compiled.target;
                self.state = State::Compiled(compiled.program);
                Ok(())
            }
            Err(err) => {
                debug!(expression = %self.text, error = %err, "expression failed to compile");
                self.state = State::Failed(err.clone());
                Err(err)
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Table index the result is written to, for `name = ...` expressions.
    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.state, State::Compiled(_))
    }

    pub fn error(&self) -> Option<&SyntaxError> {
        match &self.state {
            State::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn program(&self) -> Option<&Program> {
        match &self.state {
            State::Compiled(program) => Some(program),
            _ => None,
        }
    }

    fn compiled(&self) -> Result<&Program, EvalError> {
        self.program().ok_or_else(|| EvalError::NotCompiled {
            text: self.text.clone(),
        })
    }

    /// Evaluate without writing back to an assignment target.
    pub fn value<C, T>(&self, table: &T, ctx: &C) -> Result<f64, EvalError>
    where
        C: ?Sized,
        T: VariableTable<C> + ?Sized,
    {
        self.value_traced(table, ctx, &mut NoTrace)
    }

    pub fn value_traced<C, T, S>(&self, table: &T, ctx: &C, sink: &mut S) -> Result<f64, EvalError>
    where
        C: ?Sized,
        T: VariableTable<C> + ?Sized,
        S: TraceSink + ?Sized,
    {
        evaluator::evaluate(self.compiled()?, table, ctx, sink)
    }

    /// Evaluate and, for an assignment, write the result to its target.
    pub fn solve<C, T>(&self, table: &mut T, ctx: &C) -> Result<f64, EvalError>
    where
        C: ?Sized,
        T: VariableTable<C> + ?Sized,
    {
        self.solve_traced(table, ctx, &mut NoTrace)
    }

    pub fn solve_traced<C, T, S>(
        &self,
        table: &mut T,
        ctx: &C,
        sink: &mut S,
    ) -> Result<f64, EvalError>
    where
        C: ?Sized,
        T: VariableTable<C> + ?Sized,
        S: TraceSink + ?Sized,
    {
        let value = self.value_traced(&*table, ctx, sink)?;
        if let Some(target) = self.target {
            table.write(target, value, ctx)?;
        }
        Ok(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Compile `text` against `resolver`.
pub fn compile<R>(text: &str, resolver: &mut R) -> Result<Expression, SyntaxError>
where
    R: VariableResolver + ?Sized,
{
    Expression::compile(text, resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::ScalarTable;
    use std::cell::Cell;

    /// Hands out a fresh index per lookup and counts them.
    #[derive(Default)]
    struct CountingResolver {
        lookups: Cell<usize>,
    }

    impl VariableResolver for CountingResolver {
        fn resolve_read_index(&mut self, _name: &str) -> Option<usize> {
            let n = self.lookups.get();
            self.lookups.set(n + 1);
            Some(n)
        }

        fn resolve_assign_index(&mut self, _name: &str) -> Option<usize> {
            None
        }
    }

    #[test]
    fn test_each_occurrence_resolves_separately() {
        let mut resolver = CountingResolver::default();
        let expr = compile("x+x", &mut resolver).unwrap();
        assert_eq!(resolver.lookups.get(), 2);
        assert_eq!(
            expr.program().unwrap().instructions(),
            &[
                Instruction::Var(0),
                Instruction::Var(1),
                Instruction::Op(Opcode::Add)
            ]
        );
    }

    #[test]
    fn test_parse_runs_once() {
        let mut resolver = CountingResolver::default();
        let mut expr = Expression::new("a*b");
        expr.parse(&mut resolver).unwrap();
        expr.parse(&mut resolver).unwrap();
        assert_eq!(resolver.lookups.get(), 2);
    }

    #[test]
    fn test_assignment_writes_target() {
        let mut table = ScalarTable::new();
        let expr = compile("x=1+2", &mut table).unwrap();
        assert!(expr.target().is_some());
        assert_eq!(table.get("x"), Some(0.0));
        assert_eq!(expr.solve(&mut table, &()).unwrap(), 3.0);
        assert_eq!(table.get("x"), Some(3.0));
    }

    #[test]
    fn test_value_does_not_write() {
        let mut table = ScalarTable::new();
        let expr = compile("y = 4", &mut table).unwrap();
        assert_eq!(expr.value(&table, &()).unwrap(), 4.0);
        assert_eq!(table.get("y"), Some(0.0));
    }

    #[test]
    fn test_failed_expression_stays_disabled() {
        let mut table = ScalarTable::new();
        let mut expr = Expression::new("(1+2");
        let err = expr.parse(&mut table).unwrap_err();
        assert!(matches!(err, SyntaxError::UnbalancedParentheses { .. }));
        assert_eq!(expr.error(), Some(&err));
        assert_eq!(expr.parse(&mut table), Err(err));
        assert_eq!(
            expr.solve(&mut table, &()),
            Err(EvalError::NotCompiled {
                text: "(1+2".to_string()
            })
        );
    }

    #[test]
    fn test_pending_expression_is_not_compiled() {
        let expr = Expression::new("1");
        assert!(!expr.is_compiled());
        assert!(matches!(
            expr.value(&ScalarTable::new(), &()),
            Err(EvalError::NotCompiled { .. })
        ));
    }

    #[test]
    fn test_compiled_expression_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Expression>();

        let mut table = ScalarTable::new();
        table.set("base", 1.0);
        let expr = compile("base + put(2) * get(1)", &mut table).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        assert_eq!(expr.value(&table, &()).unwrap(), 5.0);
                    }
                });
            }
        });
    }
}
