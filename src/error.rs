//! Error type shared by every Struct and by the primitive codec.

use crate::size::Size;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("Configuration: {0}")]
    Configuration(String),
    #[error("Missing field: {field} not in {available:?}")]
    MissingField { field: String, available: Vec<String> },
    #[error("Insufficient data for serialization: source exhausted after {consumed} elements")]
    InsufficientData { consumed: usize },
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Overrun: budget of {budget} exceeded (reached {reached}, {unconsumed} elements unconsumed)")]
    Overrun {
        budget: Size,
        reached: Size,
        unconsumed: usize,
    },
    #[error("Unknown discriminant: {discriminant} not in {available:?}")]
    UnknownDiscriminant {
        discriminant: String,
        available: Vec<String>,
    },
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: &'static str, found: String },
    #[error("Value out of range: {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: String, bits: usize },
    #[error("Out of bounds: need bits {start}..{end}, buffer has {available}")]
    OutOfBounds {
        start: usize,
        end: usize,
        available: usize,
    },
    #[error("Misaligned: byte span at bit offset {bit_offset}")]
    Misaligned { bit_offset: usize },
    #[error("Invalid UTF-8 text: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),
    #[error("Hook: {0}")]
    Hook(String),
    #[error("field {field}: {source}")]
    InField {
        field: String,
        #[source]
        source: Box<TranscodeError>,
    },
}

impl TranscodeError {
    /// Wraps `self` with the name of the field it occurred in.
    pub fn in_field(self, field: &str) -> Self {
        TranscodeError::InField {
            field: field.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all field wrappers removed.
    pub fn root(&self) -> &TranscodeError {
        let mut current = self;
        while let TranscodeError::InField { source, .. } = current {
            current = source;
        }
        current
    }

    /// Dotted path of the named fields the error passed through, outermost first.
    pub fn path(&self) -> String {
        let mut parts = Vec::new();
        let mut current = self;
        while let TranscodeError::InField { field, source } = current {
            parts.push(field.as_str());
            current = source;
        }
        parts.join(".")
    }
}
