use thiserror::Error;

pub type Result<T> = std::result::Result<T, ParseError>;

/// Failures raised while turning an uploaded file into a `StudentTable`.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("missing required column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("row {row}: column '{column}' has non-numeric value '{value}'")]
    MalformedValue {
        column: &'static str,
        row: usize,
        value: String,
    },

    #[error("could not read uploaded file: {reason}")]
    Unreadable { reason: String },
}

impl ParseError {
    pub fn unreadable(reason: impl Into<String>) -> Self {
        ParseError::Unreadable {
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::unreadable(err.to_string())
    }
}

impl From<zip::result::ZipError> for ParseError {
    fn from(err: zip::result::ZipError) -> Self {
        ParseError::unreadable(err.to_string())
    }
}

impl From<quick_xml::de::DeError> for ParseError {
    fn from(err: quick_xml::de::DeError) -> Self {
        ParseError::unreadable(err.to_string())
    }
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::unreadable(err.to_string())
    }
}

/// Invalid environment configuration detected at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} must be a valid {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}
