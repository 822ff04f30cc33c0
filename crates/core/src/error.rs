use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LmmError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Shape mismatch: expected {expected:?}, got {got:?} in {context}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
        context: String,
    },

    #[error("Invalid sparsity pattern: {0}")]
    InvalidSparsityPattern(String),

    #[error("Parameter vector has length {got}, expected {expected}")]
    ParameterLength { expected: usize, got: usize },

    #[error("Level reference {value} at observation {index} is outside 1..={nlevels}")]
    InvalidLevelRef {
        index: usize,
        value: usize,
        nlevels: usize,
    },

    #[error("Square-root weight {value} at observation {index} must be finite and non-negative")]
    InvalidWeight { index: usize, value: f64 },

    #[error("Invalid variance parameter: {0}")]
    InvalidParameter(String),

    #[error("Model specification error: {0}")]
    ModelSpec(String),
}

pub type Result<T> = std::result::Result<T, LmmError>;

impl LmmError {
    pub(crate) fn dim(expected: usize, got: usize, context: impl Into<String>) -> Self {
        LmmError::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }

    pub(crate) fn shape(
        expected: (usize, usize),
        got: (usize, usize),
        context: impl Into<String>,
    ) -> Self {
        LmmError::ShapeMismatch {
            expected,
            got,
            context: context.into(),
        }
    }
}
