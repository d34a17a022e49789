// 🚨 Pipeline Errors
// Schema-level failures that stop a dashboard section from being built.
// Row-level problems are NOT errors: see `normalizer::DroppedRow`.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors signalled by the normalizer and the series helpers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A structurally required column is absent from every record.
    #[error("missing column '{column}': {hint}")]
    MissingColumn { column: String, hint: String },

    /// A series name that is not one of Open/High/Low/Close.
    #[error("unknown price column '{0}' (expected one of Open, High, Low, Close)")]
    UnknownColumn(String),

    /// A date range preset that is not 1m/6m/ytd/1y/all.
    #[error("invalid range '{0}' (expected one of 1m, 6m, ytd, 1y, all)")]
    InvalidRange(String),
}

impl PipelineError {
    pub fn missing_column(column: &str, hint: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            column: column.to_string(),
            hint: hint.into(),
        }
    }

    /// Name of the missing column, if this is a `MissingColumn` failure
    pub fn missing(&self) -> Option<&str> {
        match self {
            PipelineError::MissingColumn { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// Serialized as its message, for JSON output
impl Serialize for PipelineError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_message_names_column_and_hint() {
        let err = PipelineError::missing_column("Date", "expected DD/MM/YYYY HH:MM:SS");
        let msg = err.to_string();
        assert!(msg.contains("'Date'"));
        assert!(msg.contains("DD/MM/YYYY HH:MM:SS"));
        assert_eq!(err.missing(), Some("Date"));
    }

    #[test]
    fn test_other_variants_are_not_missing() {
        assert_eq!(PipelineError::UnknownColumn("Volume".into()).missing(), None);
        assert_eq!(PipelineError::InvalidRange("2w".into()).missing(), None);
    }
}
