use thiserror::Error;

pub type UecResult<T> = Result<T, UecError>;

/// Compile-time failure of a single expression.
///
/// Once an [`Expression`](crate::core::Expression) fails to compile it stays
/// disabled; every later solve reports [`EvalError::NotCompiled`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntaxError {
    #[error("Syntax error: No Expression Present")]
    EmptyExpression,

    #[error("Syntax error: Unbalanced Parenthesis at position {position}")]
    UnbalancedParentheses { position: usize },

    #[error("Syntax error: unknown variable '{name}' at position {position}")]
    UnknownVariable { name: String, position: usize },

    /// A call to a name that is not a built-in function.
    #[error("Syntax error: unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("Syntax error: cannot assign to '{name}'")]
    AssignmentTargetUnresolvable { name: String },

    #[error("Syntax error at position {position}: {message}")]
    Malformed { message: String, position: usize },
}

impl SyntaxError {
    pub(crate) fn malformed(message: impl Into<String>, position: usize) -> Self {
        SyntaxError::Malformed {
            message: message.into(),
            position,
        }
    }
}

/// Run-time failure while evaluating a compiled expression.
///
/// NaN and infinities are ordinary results, never errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Expression '{text}' is not compiled")]
    NotCompiled { text: String },

    #[error("Invalid instruction at index {index}: {detail}")]
    InvalidInstruction { index: usize, detail: &'static str },

    #[error("get({position}) reads past the {depth} value(s) stored by put")]
    AuxStackUnderflow { position: f64, depth: usize },

    #[error("put overflows the value stack (capacity {capacity})")]
    AuxStackOverflow { capacity: usize },

    #[error("Subscript {subscript} out of range for '{variable}'")]
    SubscriptOutOfRange { variable: String, subscript: f64 },

    #[error("Variable index {index} is not bound in this table")]
    UnboundVariable { index: usize },

    #[error("Variable '{variable}' cannot be subscripted")]
    NotSubscriptable { variable: String },

    #[error("'{variable}': {detail}")]
    CellOutOfRange { variable: String, detail: String },

    #[error("'{variable}' needs {what} in the evaluation context")]
    MissingContext {
        variable: String,
        what: &'static str,
    },

    #[error("Variable '{variable}' is read-only")]
    ReadOnly { variable: String },
}

#[derive(Error, Debug)]
pub enum UecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{source} in '{expression}'")]
    Syntax {
        expression: String,
        #[source]
        source: SyntaxError,
    },

    #[error("Evaluation error in '{expression}': {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("{utility}: alternative '{alternative}', row {row} ('{expression}'): {source}")]
    Solve {
        utility: String,
        alternative: String,
        row: usize,
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl UecError {
    pub fn syntax(expression: impl Into<String>, source: SyntaxError) -> Self {
        UecError::Syntax {
            expression: expression.into(),
            source,
        }
    }

    pub fn eval(expression: impl Into<String>, source: EvalError) -> Self {
        UecError::Eval {
            expression: expression.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_keep_legacy_wording() {
        assert!(SyntaxError::EmptyExpression
            .to_string()
            .contains("No Expression Present"));
        assert!(SyntaxError::UnbalancedParentheses { position: 3 }
            .to_string()
            .contains("Unbalanced Parenthesis"));
        assert!(SyntaxError::malformed("dangling operator", 2)
            .to_string()
            .starts_with("Syntax error"));
    }

    #[test]
    fn test_subscript_error_names_variable() {
        let err = EvalError::SubscriptOutOfRange {
            variable: "ivt".to_string(),
            subscript: 7.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("ivt"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_solve_error_carries_context() {
        let err = UecError::Solve {
            utility: "mode_choice".to_string(),
            alternative: "transit".to_string(),
            row: 4,
            expression: "get(3)".to_string(),
            source: EvalError::AuxStackUnderflow {
                position: 3.0,
                depth: 0,
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("transit"));
        assert!(msg.contains("get(3)"));
        assert!(msg.contains("row 4"));
    }
}
