use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        actual: String,
    },

    #[error("invalid layer geometry: {0}")]
    InvalidGeometry(String),

    #[error("{0} backward called without a matching forward")]
    BackwardWithoutForward(&'static str),

    #[error("label {label} out of range for {classes} classes")]
    InvalidLabel { label: usize, classes: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("parameter archive is missing key '{0}'")]
    MissingKey(String),

    #[error("invalid parameter archive: {0}")]
    InvalidArchive(String),

    #[error("invalid training config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn shape_mismatch<E, A>(context: &'static str, expected: E, actual: A) -> Self
    where
        E: ToString,
        A: ToString,
    {
        Error::ShapeMismatch {
            context,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
