//! Stack-machine evaluator
//!
//! Reduction starts at the last instruction and recurses into operands, using
//! the start index each slot recorded at compile time to find where one
//! operand ends and the next begins. Operands are always evaluated left to
//! right, so `put` calls run in reading order.
//!
//! Nothing here allocates unless the trace sink asks for rendered labels.

use super::instruction::{Instruction, Opcode, Program};
use super::trace::{TraceSink, TraceStep};
use crate::error::EvalError;
use crate::variables::VariableTable;

/// Slots available to `put` within one evaluation.
pub const AUX_STACK_CAPACITY: usize = 32;

/// Values stored by `put` and read back by `get`.
struct AuxStack {
    values: [f64; AUX_STACK_CAPACITY],
    len: usize,
}

impl AuxStack {
    fn new() -> Self {
        Self {
            values: [0.0; AUX_STACK_CAPACITY],
            len: 0,
        }
    }

    fn put(&mut self, value: f64) -> Result<f64, EvalError> {
        if self.len == AUX_STACK_CAPACITY {
            return Err(EvalError::AuxStackOverflow {
                capacity: AUX_STACK_CAPACITY,
            });
        }
        self.values[self.len] = value;
        self.len += 1;
        Ok(value)
    }

    /// 1-based read; the value stays on the stack.
    fn get(&self, position: f64) -> Result<f64, EvalError> {
        let slot = position.trunc();
        if !(slot >= 1.0 && slot <= self.len as f64) {
            return Err(EvalError::AuxStackUnderflow {
                position,
                depth: self.len,
            });
        }
        Ok(self.values[slot as usize - 1])
    }
}

/// Evaluate `program` against `table` in context `ctx`.
pub(crate) fn evaluate<C, T, S>(
    program: &Program,
    table: &T,
    ctx: &C,
    sink: &mut S,
) -> Result<f64, EvalError>
where
    C: ?Sized,
    T: VariableTable<C> + ?Sized,
    S: TraceSink + ?Sized,
{
    let Some(last) = program.len().checked_sub(1) else {
        return Err(EvalError::InvalidInstruction {
            index: 0,
            detail: "empty instruction stream",
        });
    };

    let mut machine = Machine {
        program,
        table,
        ctx,
        aux: AuxStack::new(),
        sink,
    };
    machine.reduce(last)
}

struct Machine<'a, C: ?Sized, T: ?Sized, S: ?Sized> {
    program: &'a Program,
    table: &'a T,
    ctx: &'a C,
    aux: AuxStack,
    sink: &'a mut S,
}

impl<C, T, S> Machine<'_, C, T, S>
where
    C: ?Sized,
    T: VariableTable<C> + ?Sized,
    S: TraceSink + ?Sized,
{
    fn reduce(&mut self, index: usize) -> Result<f64, EvalError> {
        let instruction = self
            .program
            .get(index)
            .ok_or(EvalError::InvalidInstruction {
                index,
                detail: "index past the end of the program",
            })?;

        match instruction {
            Instruction::Literal(value) => {
                self.record(index, instruction, &[], value);
                Ok(value)
            }
            Instruction::Var(slot) => {
                let value = self.table.read(slot, self.ctx)?;
                self.record(index, instruction, &[], value);
                Ok(value)
            }
            Instruction::ArrayVar(_) => Err(EvalError::InvalidInstruction {
                index,
                detail: "matrix slot outside array()",
            }),
            Instruction::Op(op) => self.apply(index, op),
        }
    }

    /// Last-instruction index of each operand of the operator at `index`.
    fn operand_ends(&self, index: usize, count: usize) -> Result<[usize; 3], EvalError> {
        let mut ends = [0usize; 3];
        let mut cursor = index;
        for k in (0..count).rev() {
            let Some(end) = cursor.checked_sub(1) else {
                return Err(EvalError::InvalidInstruction {
                    index,
                    detail: "operator is missing an operand",
                });
            };
            let start = self.program.start_of(end);
            if start > end {
                return Err(EvalError::InvalidInstruction {
                    index: end,
                    detail: "sub-expression starts after it ends",
                });
            }
            ends[k] = end;
            cursor = start;
        }
        if cursor != self.program.start_of(index) {
            return Err(EvalError::InvalidInstruction {
                index,
                detail: "operand boundaries do not match the recorded start",
            });
        }
        Ok(ends)
    }

    fn apply(&mut self, index: usize, op: Opcode) -> Result<f64, EvalError> {
        let count = op.arity().operands();
        let ends = self.operand_ends(index, count)?;

        if op == Opcode::Array {
            let Some(Instruction::ArrayVar(slot)) = self.program.get(ends[0]) else {
                return Err(EvalError::InvalidInstruction {
                    index,
                    detail: "array() without a matrix slot",
                });
            };
            let subscript = self.reduce(ends[1])?;
            let value = self.table.read_indexed(slot, subscript, self.ctx)?;
            self.record(index, Instruction::Op(op), &[subscript], value);
            return Ok(value);
        }

        let mut args = [0.0f64; 3];
        for k in 0..count {
            args[k] = self.reduce(ends[k])?;
        }
        let [a, b, c] = args;

        let value = match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => a / b,
            Opcode::Mod => a.trunc() % b.trunc(),
            Opcode::Pow => a.powf(b),
            Opcode::Eq => truth(a == b),
            Opcode::Ne => truth(a != b),
            Opcode::Lt => truth(a < b),
            Opcode::Le => truth(a <= b),
            Opcode::Gt => truth(a > b),
            Opcode::Ge => truth(a >= b),
            Opcode::Max => a.max(b),
            Opcode::Min => a.min(b),
            Opcode::Ln => a.ln(),
            Opcode::Exp => a.exp(),
            Opcode::Abs => a.abs(),
            Opcode::Sign => sign(a),
            Opcode::Int => a.floor(),
            Opcode::Sqrt => a.sqrt(),
            Opcode::Put => self.aux.put(a)?,
            Opcode::Get => self.aux.get(a)?,
            Opcode::If => {
                if a > 0.0 {
                    b
                } else {
                    c
                }
            }
            Opcode::Array => {
                return Err(EvalError::InvalidInstruction {
                    index,
                    detail: "array() reached the arithmetic path",
                })
            }
        };

        self.record(index, Instruction::Op(op), &args[..count], value);
        Ok(value)
    }

    fn record(&mut self, index: usize, instruction: Instruction, operands: &[f64], result: f64) {
        if !self.sink.enabled() {
            return;
        }
        let label = self.program.render(index);
        self.sink.record(&TraceStep {
            index,
            instruction,
            label: &label,
            operands,
            result,
        });
    }
}

fn truth(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        // 0 stays 0, NaN stays NaN
        x * 0.0
    }
}
