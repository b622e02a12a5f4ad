//! Instruction set for compiled expressions
//!
//! A compiled expression is a flat stream of [`Instruction`]s in post-order.
//! Each slot also records where its sub-expression starts, so the evaluator
//! can find operand boundaries while walking the stream from the end.

use serde::Serialize;
use std::fmt;

/// Built-in operators and functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Max,
    Min,
    Ln,
    Exp,
    Abs,
    Sign,
    Int,
    Sqrt,
    Put,
    Get,
    If,
    Array,
}

/// Operand shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
    Ternary,
    /// `array(matrix, subscript)`: a matrix slot read through a subscript.
    Lookup,
}

impl Arity {
    pub fn operands(self) -> usize {
        match self {
            Arity::Unary => 1,
            Arity::Binary | Arity::Lookup => 2,
            Arity::Ternary => 3,
        }
    }
}

/// Reserved function names. Matched case-insensitively.
const FUNCTIONS: &[(&str, Opcode)] = &[
    ("ln", Opcode::Ln),
    ("exp", Opcode::Exp),
    ("abs", Opcode::Abs),
    ("sign", Opcode::Sign),
    ("int", Opcode::Int),
    ("max", Opcode::Max),
    ("min", Opcode::Min),
    ("if", Opcode::If),
    ("put", Opcode::Put),
    ("get", Opcode::Get),
    ("sqrt", Opcode::Sqrt),
    ("array", Opcode::Array),
];

impl Opcode {
    pub fn arity(self) -> Arity {
        match self {
            Opcode::Ln
            | Opcode::Exp
            | Opcode::Abs
            | Opcode::Sign
            | Opcode::Int
            | Opcode::Sqrt
            | Opcode::Put
            | Opcode::Get => Arity::Unary,
            Opcode::If => Arity::Ternary,
            Opcode::Array => Arity::Lookup,
            _ => Arity::Binary,
        }
    }

    /// Binding strength of infix operators; `None` for functions.
    pub fn precedence(self) -> Option<u8> {
        match self {
            Opcode::Eq | Opcode::Ne => Some(1),
            Opcode::Lt | Opcode::Gt | Opcode::Le | Opcode::Ge => Some(2),
            Opcode::Add | Opcode::Sub => Some(3),
            Opcode::Mul | Opcode::Div | Opcode::Mod => Some(4),
            Opcode::Pow => Some(5),
            _ => None,
        }
    }

    /// Look up a reserved function name.
    pub fn function(name: &str) -> Option<Opcode> {
        FUNCTIONS
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, op)| *op)
    }

    pub fn is_function(self) -> bool {
        self.precedence().is_none()
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Opcode::Add => "+",
            Opcode::Sub => "-",
            Opcode::Mul => "*",
            Opcode::Div => "/",
            Opcode::Mod => "%",
            Opcode::Pow => "^",
            Opcode::Eq => "==",
            Opcode::Ne => "!=",
            Opcode::Lt => "<",
            Opcode::Le => "<=",
            Opcode::Gt => ">",
            Opcode::Ge => ">=",
            Opcode::Max => "max",
            Opcode::Min => "min",
            Opcode::Ln => "ln",
            Opcode::Exp => "exp",
            Opcode::Abs => "abs",
            Opcode::Sign => "sign",
            Opcode::Int => "int",
            Opcode::Sqrt => "sqrt",
            Opcode::Put => "put",
            Opcode::Get => "get",
            Opcode::If => "if",
            Opcode::Array => "array",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One slot of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Instruction {
    Literal(f64),
    /// Variable read through the table at evaluation time.
    Var(usize),
    /// Matrix slot consumed by the following `array` lookup; never read alone.
    ArrayVar(usize),
    Op(Opcode),
}

/// Compiled instruction stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    code: Vec<Instruction>,
    starts: Vec<usize>,
    names: Vec<Option<String>>,
}

impl Program {
    pub(crate) fn push(&mut self, instruction: Instruction, start: usize, name: Option<String>) -> usize {
        self.code.push(instruction);
        self.starts.push(start);
        self.names.push(name);
        self.code.len() - 1
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn get(&self, index: usize) -> Option<Instruction> {
        self.code.get(index).copied()
    }

    /// Index of the first instruction of the sub-expression ending at `index`.
    pub fn start_of(&self, index: usize) -> usize {
        self.starts.get(index).copied().unwrap_or(0)
    }

    /// Source name of the variable at `index`, if that slot is a variable.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).and_then(|n| n.as_deref())
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Human-readable form of one slot.
    pub fn render(&self, index: usize) -> String {
        match (self.get(index), self.name_of(index)) {
            (Some(Instruction::Literal(v)), _) => format!("{v}"),
            (Some(Instruction::Var(_) | Instruction::ArrayVar(_)), Some(name)) => name.to_string(),
            (Some(Instruction::Var(i) | Instruction::ArrayVar(i)), None) => format!("#{i}"),
            (Some(Instruction::Op(op)), _) => op.symbol().to_string(),
            (None, _) => "?".to_string(),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.code.iter().enumerate() {
            let kind = match instruction {
                Instruction::Literal(_) => "literal",
                Instruction::Var(_) => "var",
                Instruction::ArrayVar(_) => "matrix",
                Instruction::Op(op) if op.is_function() => "call",
                Instruction::Op(_) => "op",
            };
            writeln!(
                f,
                "{:>4}  {:<8}{:<16}(from {})",
                i,
                kind,
                self.render(i),
                self.starts[i]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_lookup_is_case_insensitive() {
        assert_eq!(Opcode::function("SQRT"), Some(Opcode::Sqrt));
        assert_eq!(Opcode::function("If"), Some(Opcode::If));
        assert_eq!(Opcode::function("Array"), Some(Opcode::Array));
        assert_eq!(Opcode::function("sum"), None);
    }

    #[test]
    fn test_arity_table() {
        assert_eq!(Opcode::Ln.arity(), Arity::Unary);
        assert_eq!(Opcode::Get.arity(), Arity::Unary);
        assert_eq!(Opcode::Max.arity(), Arity::Binary);
        assert_eq!(Opcode::Pow.arity(), Arity::Binary);
        assert_eq!(Opcode::If.arity(), Arity::Ternary);
        assert_eq!(Opcode::Array.arity(), Arity::Lookup);
        assert_eq!(Arity::Lookup.operands(), 2);
    }

    #[test]
    fn test_precedence_bands() {
        assert_eq!(Opcode::Eq.precedence(), Opcode::Ne.precedence());
        assert!(Opcode::Ne.precedence() < Opcode::Le.precedence());
        assert!(Opcode::Ge.precedence() < Opcode::Sub.precedence());
        assert!(Opcode::Add.precedence() < Opcode::Mod.precedence());
        assert!(Opcode::Div.precedence() < Opcode::Pow.precedence());
        assert_eq!(Opcode::Min.precedence(), None);
    }

    #[test]
    fn test_program_listing() {
        let mut program = Program::default();
        program.push(Instruction::Literal(2.0), 0, None);
        program.push(Instruction::Var(0), 1, Some("ivt".to_string()));
        program.push(Instruction::Op(Opcode::Mul), 0, None);

        assert_eq!(program.render(1), "ivt");
        assert_eq!(program.start_of(2), 0);
        let listing = program.to_string();
        assert!(listing.contains("literal"));
        assert!(listing.contains("ivt"));
        assert!(listing.contains('*'));
    }
}
