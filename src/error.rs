//! Error types for the deck compiler.
//!
//! This module provides a unified error type [`DeckError`] that covers
//! every fatal condition that can occur while reading a deck, generating
//! unit cells, and building the RUC hierarchy.
//!
//! Physical and numeric problems (volume fractions above an architecture's
//! packing limit, near-singular orientation vectors, frames that are not
//! orthogonal) are never errors. They are reported as
//! [`Diagnostic`](crate::model::Diagnostic) values and `tracing` warnings.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`DeckError`].
pub type Result<T> = std::result::Result<T, DeckError>;

/// Position of a record inside a keyword block.
///
/// `None` means the keyword's header line; `Some(i)` is the zero-based
/// sub-record (material, loading leg, RUC block, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record(pub Option<usize>);

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(i) => write!(f, " (record {})", i + 1),
            None => Ok(()),
        }
    }
}

/// Unified error type for all deck operations.
#[derive(Error, Debug)]
pub enum DeckError {
    // ============ Deck Reading Errors ============
    /// A parameter line failed type inference or a required field is absent
    #[error("Malformed input in {keyword}{record}: {message}")]
    MalformedInput {
        keyword: String,
        record: Record,
        message: String,
    },

    /// A keyword the compiled model cannot do without is missing
    #[error("Deck has no {keyword} keyword")]
    MissingKeyword { keyword: &'static str },

    /// Braced parameter with neither a default nor an override
    #[error("Parameter '{name}' has no default value and no override")]
    ParameterUndefined { name: String },

    /// Braced expression that could not be evaluated
    #[error("Cannot evaluate parameter expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },

    /// Orientation override file could not be understood
    #[error("Orientation override file, line {line}: {message}")]
    BadOverride { line: usize, message: String },

    // ============ Unit Cell Errors ============
    /// Architecture id not in the built-in catalog for this method
    #[error("Unknown architecture ARCHID={archid} for {method}")]
    UnknownArchitecture { archid: i64, method: String },

    /// Micromechanics method code that is not supported
    #[error("Micromechanics method MOD={code} is not supported{record}")]
    UnsupportedMethod { code: i64, record: Record },

    // ============ Hierarchy Errors ============
    /// Negative material id with no matching RUC definition
    #[error("Material {msm} referenced by RUC {parent} has no RUC definition")]
    UnresolvedReference { msm: i64, parent: i64 },

    /// A RUC contains itself through a chain of references
    #[error("RUC {msm} references itself through {path:?}")]
    CycleDetected { msm: i64, path: Vec<i64> },

    // ============ I/O Errors ============
    /// Error reading a deck or override file
    #[error("Failed to read '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing a deck or override file
    #[error("Failed to write '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error encoding a compiled deck as JSON
    #[error("Failed to encode output: {0}")]
    EncodeError(#[from] serde_json::Error),

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl DeckError {
    /// Create a malformed input error for a keyword header line
    pub fn malformed(keyword: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            keyword: keyword.into(),
            record: Record(None),
            message: message.into(),
        }
    }

    /// Create a malformed input error for a numbered sub-record
    pub fn malformed_record(
        keyword: impl Into<String>,
        record: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedInput {
            keyword: keyword.into(),
            record: Record(Some(record)),
            message: message.into(),
        }
    }

    /// Create an unknown architecture error
    pub fn unknown_architecture(archid: i64, method: impl Into<String>) -> Self {
        Self::UnknownArchitecture {
            archid,
            method: method.into(),
        }
    }

    /// Create an override file error
    pub fn bad_override(line: usize, message: impl Into<String>) -> Self {
        Self::BadOverride {
            line,
            message: message.into(),
        }
    }

    /// Create an unsupported method error with no record position yet
    pub fn unsupported_method(code: i64) -> Self {
        Self::UnsupportedMethod {
            code,
            record: Record(None),
        }
    }

    /// Attach keyword/record context to an error raised below the reader level.
    ///
    /// `MalformedInput` takes both, `UnsupportedMethod` takes the record;
    /// other variants pass through.
    pub fn in_context(self, keyword: &str, record: Option<usize>) -> Self {
        match self {
            Self::MalformedInput { message, .. } => Self::MalformedInput {
                keyword: keyword.to_string(),
                record: Record(record),
                message,
            },
            Self::UnsupportedMethod { code, .. } => Self::UnsupportedMethod {
                code,
                record: Record(record),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display_includes_record() {
        let err = DeckError::malformed_record("*MECH", 1, "missing MODE");
        assert_eq!(
            err.to_string(),
            "Malformed input in *MECH (record 2): missing MODE"
        );
        let err = DeckError::malformed("*SOLVER", "bad line");
        assert_eq!(err.to_string(), "Malformed input in *SOLVER: bad line");
    }

    #[test]
    fn test_in_context_relabels_located_variants() {
        let err = DeckError::malformed("line", "oops").in_context("*PDFA", Some(0));
        assert!(matches!(
            err,
            DeckError::MalformedInput { ref keyword, record: Record(Some(0)), .. } if keyword == "*PDFA"
        ));

        let err = DeckError::UnresolvedReference { msm: -20, parent: 0 }.in_context("*RUC", Some(1));
        assert!(matches!(err, DeckError::UnresolvedReference { msm: -20, parent: 0 }));

        let err = DeckError::unsupported_method(302).in_context("*RUC", Some(1));
        assert!(matches!(err, DeckError::UnsupportedMethod { code: 302, record: Record(Some(1)) }));
        assert_eq!(err.to_string(), "Micromechanics method MOD=302 is not supported (record 2)");
    }
}
