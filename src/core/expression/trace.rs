//! Evaluation trace sinks

use super::instruction::Instruction;
use std::fmt;

/// One reduction performed by the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct TraceStep<'a> {
    pub index: usize,
    pub instruction: Instruction,
    /// Rendered instruction: a variable name, literal or operator symbol.
    pub label: &'a str,
    pub operands: &'a [f64],
    pub result: f64,
}

impl fmt::Display for TraceStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>3}] ", self.index)?;
        match self.instruction {
            Instruction::Literal(_) => write!(f, "{} = {}", self.label, self.result),
            Instruction::Var(_) | Instruction::ArrayVar(_) => {
                write!(f, "{} -> {}", self.label, self.result)
            }
            Instruction::Op(op) if op.is_function() => {
                write!(f, "{}(", self.label)?;
                for (i, v) in self.operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ") = {}", self.result)
            }
            Instruction::Op(_) => match self.operands {
                [a, b] => write!(f, "{a} {} {b} = {}", self.label, self.result),
                _ => write!(f, "{} {:?} = {}", self.label, self.operands, self.result),
            },
        }
    }
}

/// Receives every step of a traced evaluation.
pub trait TraceSink {
    fn record(&mut self, step: &TraceStep<'_>);

    /// Whether steps should be built at all.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl TraceSink for NoTrace {
    #[inline]
    fn record(&mut self, _step: &TraceStep<'_>) {}

    #[inline]
    fn enabled(&self) -> bool {
        false
    }
}

/// Collects formatted steps in evaluation order.
#[derive(Debug, Clone, Default)]
pub struct TextTrace {
    lines: Vec<String>,
}

impl TextTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl TraceSink for TextTrace {
    fn record(&mut self, step: &TraceStep<'_>) {
        self.lines.push(step.to_string());
    }
}

impl fmt::Display for TextTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Forwards steps to `tracing` at TRACE level.
#[derive(Debug, Clone, Default)]
pub struct LogTrace {
    expression: String,
}

impl LogTrace {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

impl TraceSink for LogTrace {
    fn record(&mut self, step: &TraceStep<'_>) {
        tracing::trace!(expression = %self.expression, "{step}");
    }

    fn enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::TRACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::expression::instruction::Opcode;

    #[test]
    fn test_step_formats() {
        let var = TraceStep {
            index: 0,
            instruction: Instruction::Var(3),
            label: "ivt",
            operands: &[],
            result: 12.5,
        };
        assert_eq!(var.to_string(), "[  0] ivt -> 12.5");

        let add = TraceStep {
            index: 2,
            instruction: Instruction::Op(Opcode::Add),
            label: "+",
            operands: &[1.0, 2.0],
            result: 3.0,
        };
        assert_eq!(add.to_string(), "[  2] 1 + 2 = 3");

        let call = TraceStep {
            index: 4,
            instruction: Instruction::Op(Opcode::Max),
            label: "max",
            operands: &[1.0, 5.0],
            result: 5.0,
        };
        assert_eq!(call.to_string(), "[  4] max(1, 5) = 5");
    }

    #[test]
    fn test_text_trace_collects_in_order() {
        let mut sink = TextTrace::new();
        for i in 0..3 {
            sink.record(&TraceStep {
                index: i,
                instruction: Instruction::Literal(i as f64),
                label: "x",
                operands: &[],
                result: i as f64,
            });
        }
        assert_eq!(sink.lines().len(), 3);
        assert!(sink.lines()[2].starts_with("[  2]"));
        sink.clear();
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_no_trace_is_disabled() {
        assert!(!NoTrace.enabled());
        assert!(TextTrace::new().enabled());
    }
}
