//! Error types for pipeline operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConformaError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool '{tool}' unavailable: {detail}")]
    ToolUnavailable { tool: String, detail: String },

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Deadline exceeded: {subject} ran past {limit_ms}ms")]
    Timeout { subject: String, limit_ms: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, ConformaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConformaError::ToolUnavailable {
            tool: "opa".to_string(),
            detail: "no such file".to_string(),
        };
        assert_eq!(err.to_string(), "Tool 'opa' unavailable: no such file");

        let err = ConformaError::Timeout {
            subject: "tfsec".to_string(),
            limit_ms: 5000,
        };
        assert!(err.to_string().contains("5000ms"));

        let err = ConformaError::PolicyViolation("encryption disabled".to_string());
        assert!(err.to_string().contains("encryption disabled"));

        let err = ConformaError::Configuration("no stages".to_string());
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
