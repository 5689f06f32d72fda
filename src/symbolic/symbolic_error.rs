use thiserror::Error;

/// Errors raised while compiling or calling symbolic functions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SymbolicError {
    #[error("function '{function}': output depends on '{variable}', which is not an input")]
    FreeVariable { function: String, variable: String },
    #[error("function '{function}': input '{input}' contains a non-symbolic entry '{entry}'")]
    NotASymbol {
        function: String,
        input: String,
        entry: String,
    },
    #[error("function '{function}': symbol '{variable}' is declared twice among the inputs")]
    DuplicateSymbol { function: String, variable: String },
    #[error("function '{function}': argument '{argument}' has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        function: String,
        argument: String,
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("function '{function}': expected {expected} arguments, got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("function '{function}': no {kind} named '{name}'")]
    UnknownName {
        function: String,
        kind: &'static str,
        name: String,
    },
    #[error("parse error: {0}")]
    Parse(String),
}
