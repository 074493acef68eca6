//! Error types for the preprocessing core.
//!
//! A single `thiserror` enum covers every stage. Stages decide per variant
//! whether a failure aborts the paragraph (`is_fatal`) or is recorded as a
//! warning on the passage output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error for all preprocessing operations.
#[derive(Debug, Error)]
pub enum PreprocessError {
    // --- Structural errors ---
    /// Aligned annotation sequences disagree in length or surface text.
    #[error("structural mismatch in {context}: expected {expected}, found {found}")]
    StructuralMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// A structural edit left the tree in an unexpected state.
    #[error("consistency violation after {stage}: {detail}")]
    ConsistencyViolation { stage: String, detail: String },

    // --- Recoverable findings ---
    #[error("span not found: {phrase:?}")]
    SpanNotFound { phrase: String },

    #[error("malformed date {literal:?}: {reason}")]
    MalformedDate { literal: String, reason: String },

    // --- Collaborators ---
    #[error("annotator failed: {0}")]
    Annotator(String),

    // --- Configuration ---
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    // --- Serialization ---
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Serializable discriminant of [`PreprocessError`], used in ledgers and
/// passage warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    StructuralMismatch,
    ConsistencyViolation,
    SpanNotFound,
    MalformedDate,
    Annotator,
    Pattern,
    Config,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::StructuralMismatch => "structural_mismatch",
            ErrorKind::ConsistencyViolation => "consistency_violation",
            ErrorKind::SpanNotFound => "span_not_found",
            ErrorKind::MalformedDate => "malformed_date",
            ErrorKind::Annotator => "annotator",
            ErrorKind::Pattern => "pattern",
            ErrorKind::Config => "config",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl PreprocessError {
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::StructuralMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn consistency(stage: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ConsistencyViolation {
            stage: stage.into(),
            detail: detail.into(),
        }
    }

    pub fn span_not_found(phrase: impl Into<String>) -> Self {
        Self::SpanNotFound {
            phrase: phrase.into(),
        }
    }

    pub fn malformed_date(literal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDate {
            literal: literal.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StructuralMismatch { .. } => ErrorKind::StructuralMismatch,
            Self::ConsistencyViolation { .. } => ErrorKind::ConsistencyViolation,
            Self::SpanNotFound { .. } => ErrorKind::SpanNotFound,
            Self::MalformedDate { .. } => ErrorKind::MalformedDate,
            Self::Annotator(_) => ErrorKind::Annotator,
            Self::Pattern(_) => ErrorKind::Pattern,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Fatal errors abort the current paragraph; the rest become warnings.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::SpanNotFound { .. } | Self::MalformedDate { .. }
        )
    }
}

/// Non-fatal finding recorded on a passage instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl StageWarning {
    pub fn from_error(stage: impl Into<String>, error: &PreprocessError) -> Self {
        Self {
            stage: stage.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
