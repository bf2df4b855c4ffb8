//! Error types for the import pipeline

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

/// Which end of an edge could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Destination,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Source => f.write_str("source"),
            Endpoint::Destination => f.write_str("destination"),
        }
    }
}

/// Edge endpoint that never appeared in the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub edge_label: String,
    pub endpoint: Endpoint,
    pub node_label: String,
    pub natural_key: String,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[:{}] {} ({}:{})",
            self.edge_label, self.endpoint, self.node_label, self.natural_key
        )
    }
}

fn summarize(refs: &[DanglingReference]) -> String {
    const SHOWN: usize = 5;
    let mut out = refs
        .iter()
        .take(SHOWN)
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if refs.len() > SHOWN {
        out.push_str(&format!(", ... and {} more", refs.len() - SHOWN));
    }
    out
}

#[derive(Error, Debug)]
pub enum ImportError {
    // === configuration ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown property type '{type_name}' for {label}.{column}")]
    UnknownPropertyType {
        label: String,
        column: String,
        type_name: String,
    },

    #[error("Malformed filter '{filter}' on label {label}")]
    MalformedFilter { label: String, filter: String },

    #[error("Unknown column '{column}' referenced by label {label}")]
    UnknownColumn { label: String, column: String },

    #[error("Unknown converter '{converter}' for {label}.{column}")]
    UnknownConverter {
        label: String,
        column: String,
        converter: String,
    },

    #[error("Label {0} redeclared with a different property list")]
    LabelConflict(String),

    #[error("No mapping registered for label {0}")]
    UnknownLabel(String),

    // === data ===
    #[error("Line {line}: row has no field {index} ('{column}') required by {label}")]
    MissingField {
        line: u64,
        label: String,
        column: String,
        index: usize,
    },

    #[error("Line {line}: cannot convert '{value}' to {expected} for {label}.{column}")]
    Conversion {
        line: u64,
        label: String,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("Line {line}: empty natural key for {label}")]
    EmptyNaturalKey { line: u64, label: String },

    // === identity cache ===
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No node id cached for {label}:{key}")]
    NotFound { label: String, key: String },

    #[error("{} unresolved edge reference(s): {}", .0.len(), summarize(.0))]
    UnresolvedReferences(Vec<DanglingReference>),

    // === transport ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Store rejected batch: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // === run control ===
    #[error("Import cancelled")]
    Cancelled,

    #[error("Pipeline stage failed: {0}")]
    Pipeline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ImportError::InvalidConfig(_)
                | ImportError::UnknownPropertyType { .. }
                | ImportError::MalformedFilter { .. }
                | ImportError::UnknownColumn { .. }
                | ImportError::UnknownConverter { .. }
                | ImportError::LabelConflict(_)
                | ImportError::UnknownLabel(_)
        )
    }

    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            ImportError::MissingField { .. }
                | ImportError::Conversion { .. }
                | ImportError::EmptyNaturalKey { .. }
        )
    }

    /// Soft errors mean "not yet": the caller retries later.
    pub fn is_soft(&self) -> bool {
        matches!(self, ImportError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dangling(key: &str) -> DanglingReference {
        DanglingReference {
            edge_label: "KNOWS".into(),
            endpoint: Endpoint::Destination,
            node_label: "Person".into(),
            natural_key: key.into(),
        }
    }

    #[test]
    fn test_unresolved_message_names_label_and_key() {
        let err = ImportError::UnresolvedReferences(vec![dangling("n2")]);
        let msg = err.to_string();
        assert!(msg.starts_with("1 unresolved"));
        assert!(msg.contains("[:KNOWS] destination (Person:n2)"));
    }

    #[test]
    fn test_unresolved_message_is_truncated() {
        let refs = (0..8).map(|i| dangling(&i.to_string())).collect();
        let msg = ImportError::UnresolvedReferences(refs).to_string();
        assert!(msg.contains("and 3 more"));
    }

    #[test]
    fn test_classification() {
        assert!(ImportError::NotFound { label: "A".into(), key: "1".into() }.is_soft());
        assert!(ImportError::LabelConflict("A".into()).is_config_error());
        assert!(ImportError::EmptyNaturalKey { line: 1, label: "A".into() }.is_data_error());
        assert!(!ImportError::Cancelled.is_soft());
    }
}
