//! Host-side error type

use thiserror::Error;

/// Failures originating in the host layer: the backing store, record
/// marshaling, or the single-event rule. Contracts surface these verbatim
/// as internal errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("state store failure: {message}")]
    Store { message: String },

    #[error("failed to marshal record at {key}: {message}")]
    Marshal { key: String, message: String },

    #[error("failed to unmarshal record at {key}: {message}")]
    Unmarshal { key: String, message: String },

    #[error("event already set for this transaction: {existing} then {rejected}")]
    EventAlreadySet { existing: String, rejected: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = LedgerError::Unmarshal {
            key: "SEC1".to_string(),
            message: "missing field".to_string(),
        };
        assert!(err.to_string().contains("SEC1"));

        let err = LedgerError::EventAlreadySet {
            existing: "OrderCreated".to_string(),
            rejected: "OrderCanceled".to_string(),
        };
        assert!(err.to_string().contains("OrderCreated"));
        assert!(err.to_string().contains("OrderCanceled"));
    }
}
