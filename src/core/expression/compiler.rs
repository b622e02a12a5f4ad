//! Expression compiler
//!
//! Turns tokens into a flat post-order [`Program`] with a precedence-climbing
//! pass over an explicit marker stack. There is no AST: operators are emitted
//! as soon as a lower-or-equal precedence operator, a `,` or a `)` forces
//! them off the stack.
//!
//! Alongside the marker stack the compiler simulates the evaluation stack
//! (`operands`, holding the start index of each pending sub-expression). That
//! gives operand checks at compile time and lets every slot record where its
//! sub-expression begins.

use super::instruction::{Instruction, Opcode, Program};
use super::tokenizer::{self, Delimiter, Lexeme, Token};
use crate::error::SyntaxError;
use crate::variables::VariableResolver;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Marker {
    /// `(`, remembering how many operands were pending when it opened.
    Open { depth: usize },
    Comma,
    Operator(Opcode),
    Function { op: Opcode, position: usize },
}

/// Result of compiling one expression text.
#[derive(Debug, Clone)]
pub(crate) struct Compiled {
    pub program: Program,
    pub target: Option<usize>,
}

/// Compile `text`, resolving names through `resolver`.
///
/// An assignment `target = rhs` compiles only `rhs`; the target is resolved
/// once, after the right-hand side compiled cleanly.
pub(crate) fn compile<R>(text: &str, resolver: &mut R) -> Result<Compiled, SyntaxError>
where
    R: VariableResolver + ?Sized,
{
    let (target, rhs) = match split_assignment(text) {
        Some((name, offset)) => (Some(name), &text[offset..]),
        None => (None, text),
    };

    if rhs.trim().is_empty() {
        return Err(SyntaxError::EmptyExpression);
    }

    let rewritten = tokenizer::rewrite_subscripts(rhs)?;
    tokenizer::check_balance(&rewritten)?;
    let lexemes = tokenizer::Tokenizer::new(&rewritten).tokenize()?;

    let program = Compiler::new(resolver).run(&lexemes)?;

    let target = match target {
        Some(name) => {
            validate_target(name)?;
            let index = resolver.resolve_assign_index(name).ok_or_else(|| {
                SyntaxError::AssignmentTargetUnresolvable {
                    name: name.to_string(),
                }
            })?;
            Some(index)
        }
        None => None,
    };

    Ok(Compiled { program, target })
}

/// Find a bare `=` (not part of `==`, `!=`, `<=`, `>=`).
/// Returns the trimmed target text and the byte offset of the right-hand side.
fn split_assignment(text: &str) -> Option<(&str, usize)> {
    let bytes = text.as_bytes();
    let relational = |c: Option<&u8>| matches!(c, Some(b'=' | b'!' | b'<' | b'>'));

    (0..bytes.len())
        .find(|&i| {
            bytes[i] == b'='
                && !relational(i.checked_sub(1).and_then(|p| bytes.get(p)))
                && !relational(bytes.get(i + 1))
        })
        .map(|i| (text[..i].trim(), i + 1))
}

fn validate_target(name: &str) -> Result<(), SyntaxError> {
    let valid_start = name
        .bytes()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == b'$' || c == b'@');
    if !valid_start || name.bytes().any(tokenizer::is_delimiter) || name.contains(&['[', ']'][..]) {
        return Err(SyntaxError::malformed(
            format!("'{name}' is not a valid assignment target"),
            0,
        ));
    }
    if Opcode::function(name).is_some() {
        return Err(SyntaxError::AssignmentTargetUnresolvable {
            name: name.to_string(),
        });
    }
    Ok(())
}

struct Compiler<'r, R: ?Sized> {
    resolver: &'r mut R,
    markers: Vec<Marker>,
    program: Program,
    operands: Vec<usize>,
}

impl<'r, R> Compiler<'r, R>
where
    R: VariableResolver + ?Sized,
{
    fn new(resolver: &'r mut R) -> Self {
        Self {
            resolver,
            markers: Vec::new(),
            program: Program::default(),
            operands: Vec::new(),
        }
    }

    fn run(mut self, lexemes: &[Lexeme]) -> Result<Program, SyntaxError> {
        let mut end_position = 0;

        for (i, lexeme) in lexemes.iter().enumerate() {
            let position = lexeme.position;
            match &lexeme.token {
                Token::Number(value) => self.push_operand(Instruction::Literal(*value), None),
                Token::Variable(name) => {
                    let next = lexemes.get(i + 1).map(|l| &l.token);
                    let previous = i.checked_sub(1).map(|p| &lexemes[p].token);
                    self.variable(name, position, previous, next)?;
                }
                Token::Delimiter(delimiter) => self.delimiter(*delimiter, position)?,
                Token::End => {
                    end_position = position;
                    break;
                }
            }
        }

        self.finish(end_position)
    }

    fn variable(
        &mut self,
        name: &str,
        position: usize,
        previous: Option<&Token>,
        next: Option<&Token>,
    ) -> Result<(), SyntaxError> {
        if let Some(op) = Opcode::function(name) {
            if next != Some(&Token::Delimiter(Delimiter::OpenParen)) {
                return Err(SyntaxError::malformed(
                    format!("function '{name}' must be followed by '('"),
                    position,
                ));
            }
            self.markers.push(Marker::Function { op, position });
            return Ok(());
        }
        if next == Some(&Token::Delimiter(Delimiter::OpenParen)) {
            return Err(SyntaxError::UnknownFunction {
                name: name.to_string(),
            });
        }

        let array_base = previous == Some(&Token::Delimiter(Delimiter::OpenParen))
            && matches!(
                self.markers.iter().rev().nth(1),
                Some(Marker::Function {
                    op: Opcode::Array,
                    ..
                })
            );

        let resolved = if array_base {
            self.resolver.resolve_array_index(name)
        } else {
            self.resolver.resolve_read_index(name)
        };
        let index = resolved.ok_or_else(|| SyntaxError::UnknownVariable {
            name: name.to_string(),
            position,
        })?;

        let instruction = if array_base {
            Instruction::ArrayVar(index)
        } else {
            Instruction::Var(index)
        };
        self.push_operand(instruction, Some(name.to_string()));
        Ok(())
    }

    fn delimiter(&mut self, delimiter: Delimiter, position: usize) -> Result<(), SyntaxError> {
        let op = match delimiter {
            Delimiter::OpenParen => {
                self.markers.push(Marker::Open {
                    depth: self.operands.len(),
                });
                return Ok(());
            }
            Delimiter::Comma => {
                self.drain_operators(position)?;
                if !matches!(
                    self.markers.last(),
                    Some(Marker::Open { .. } | Marker::Comma)
                ) {
                    return Err(SyntaxError::malformed("unexpected ','", position));
                }
                self.markers.push(Marker::Comma);
                return Ok(());
            }
            Delimiter::CloseParen => return self.close_group(position),
            Delimiter::Assign => {
                return Err(SyntaxError::malformed("unexpected '='", position));
            }
            Delimiter::Bang => {
                return Err(SyntaxError::malformed("'!' must be followed by '='", position));
            }
            Delimiter::Plus => Opcode::Add,
            Delimiter::Minus => Opcode::Sub,
            Delimiter::Star => Opcode::Mul,
            Delimiter::Slash => Opcode::Div,
            Delimiter::Percent => Opcode::Mod,
            Delimiter::Caret => Opcode::Pow,
            Delimiter::Equal => Opcode::Eq,
            Delimiter::NotEqual => Opcode::Ne,
            Delimiter::Less => Opcode::Lt,
            Delimiter::LessEqual => Opcode::Le,
            Delimiter::Greater => Opcode::Gt,
            Delimiter::GreaterEqual => Opcode::Ge,
        };
        self.push_operator(op, position)
    }

    /// Reduce while the stacked operator binds at least as tightly, then push.
    /// Equal precedence therefore associates left to right.
    fn push_operator(&mut self, op: Opcode, position: usize) -> Result<(), SyntaxError> {
        while let Some(Marker::Operator(top)) = self.markers.last().copied() {
            if top.precedence() < op.precedence() {
                break;
            }
            self.markers.pop();
            self.emit(top, position)?;
        }
        self.markers.push(Marker::Operator(op));
        Ok(())
    }

    /// Pop and emit operators down to the nearest `(` or `,`.
    fn drain_operators(&mut self, position: usize) -> Result<(), SyntaxError> {
        while let Some(Marker::Operator(op)) = self.markers.last().copied() {
            self.markers.pop();
            self.emit(op, position)?;
        }
        Ok(())
    }

    fn close_group(&mut self, position: usize) -> Result<(), SyntaxError> {
        self.drain_operators(position)?;

        let mut commas = 0;
        while self.markers.last() == Some(&Marker::Comma) {
            self.markers.pop();
            commas += 1;
        }

        let depth = match self.markers.pop() {
            Some(Marker::Open { depth }) => depth,
            _ => return Err(SyntaxError::UnbalancedParentheses { position }),
        };
        let produced = self.operands.len().saturating_sub(depth);

        if let Some(Marker::Function { op, position: at }) = self.markers.last().copied() {
            self.markers.pop();
            let expected = op.arity().operands();
            if produced != expected || commas + 1 != expected {
                return Err(SyntaxError::malformed(
                    format!(
                        "{}() takes {} argument{}",
                        op.symbol(),
                        expected,
                        if expected == 1 { "" } else { "s" }
                    ),
                    at,
                ));
            }
            return self.emit(op, position);
        }

        match (commas, produced) {
            (0, 1) => Ok(()),
            (0, 0) => Err(SyntaxError::malformed("empty parentheses", position)),
            (0, _) => Err(SyntaxError::malformed("missing operator", position)),
            _ => Err(SyntaxError::malformed("unexpected ','", position)),
        }
    }

    fn push_operand(&mut self, instruction: Instruction, name: Option<String>) {
        let start = self.program.len();
        let index = self.program.push(instruction, start, name);
        self.operands.push(index);
    }

    /// Append `op`, consuming its operands from the simulated stack.
    fn emit(&mut self, op: Opcode, position: usize) -> Result<(), SyntaxError> {
        let needed = op.arity().operands();
        if self.operands.len() < needed {
            return Err(SyntaxError::malformed(
                format!("operator '{}' is missing an operand", op.symbol()),
                position,
            ));
        }
        let base = self.operands.len() - needed;
        let first = self.operands[base];

        if op == Opcode::Array {
            let subscript = self.operands[base + 1];
            let is_slot = subscript == first + 1
                && matches!(self.program.get(first), Some(Instruction::ArrayVar(_)));
            if !is_slot {
                return Err(SyntaxError::malformed(
                    "array() needs a matrix name as its first argument",
                    position,
                ));
            }
        } else if (base..self.operands.len()).any(|k| self.is_bare_array_slot(k)) {
            return Err(SyntaxError::malformed(
                "a subscripted matrix must be read through array()",
                position,
            ));
        }

        self.operands.truncate(base);
        self.program.push(Instruction::Op(op), first, None);
        self.operands.push(first);
        Ok(())
    }

    /// Pending operands tile the program in order, so operand `k` ends where
    /// operand `k + 1` starts.
    fn is_bare_array_slot(&self, k: usize) -> bool {
        let start = self.operands[k];
        let end = self
            .operands
            .get(k + 1)
            .map_or(self.program.len(), |&next| next)
            - 1;
        start == end && matches!(self.program.get(start), Some(Instruction::ArrayVar(_)))
    }

    fn finish(mut self, position: usize) -> Result<Program, SyntaxError> {
        while let Some(marker) = self.markers.pop() {
            match marker {
                Marker::Operator(op) => self.emit(op, position)?,
                Marker::Open { .. } => return Err(SyntaxError::UnbalancedParentheses { position }),
                Marker::Comma => return Err(SyntaxError::malformed("unexpected ','", position)),
                Marker::Function { op, position } => {
                    return Err(SyntaxError::malformed(
                        format!("function '{}' has no argument list", op.symbol()),
                        position,
                    ))
                }
            }
        }

        match self.operands.len() {
            0 => Err(SyntaxError::EmptyExpression),
            1 => Ok(self.program),
            _ => Err(SyntaxError::malformed("missing operator", position)),
        }
    }
}
