//! Error taxonomy for a single deployment attempt.

use thiserror::Error;

/// Terminal failure of one deployment attempt.
///
/// None of these are retried internally. They are surfaced to the caller as-is
/// and translated to an exit status by the binary.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Malformed or missing static configuration. Raised before any network interaction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Empty or unusable secret or endpoint for the selected network.
    #[error("credential error: {0}")]
    Credential(String),

    /// Source or compiler-version resolution failure.
    #[error("compilation error: {0}")]
    Compilation(String),

    /// Transport or RPC failure while talking to the node.
    #[error("network error: {0}")]
    Network(String),

    /// The creation transaction was mined but failed on-chain.
    #[error("transaction reverted: {reason}")]
    TransactionReverted {
        /// Transaction hash of the reverted creation.
        tx_hash: String,
        /// Revert detail reported by the node, if any.
        reason: String,
    },
}

impl DeployError {
    /// Stable name of the failure kind, used in status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Credential(_) => "CredentialError",
            Self::Compilation(_) => "CompilationError",
            Self::Network(_) => "NetworkError",
            Self::TransactionReverted { .. } => "TransactionRevertedError",
        }
    }

    pub(crate) fn network(err: anyhow::Error) -> Self {
        // `{:#}` keeps the whole context chain on one line.
        Self::Network(format!("{:#}", err))
    }

    pub(crate) fn compilation(err: anyhow::Error) -> Self {
        Self::Compilation(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(DeployError::Configuration("x".into()).kind(), "ConfigurationError");
        assert_eq!(DeployError::Credential("x".into()).kind(), "CredentialError");
        assert_eq!(DeployError::Compilation("x".into()).kind(), "CompilationError");
        assert_eq!(DeployError::Network("x".into()).kind(), "NetworkError");
        let reverted = DeployError::TransactionReverted {
            tx_hash: "0xabc".into(),
            reason: "out of gas".into(),
        };
        assert_eq!(reverted.kind(), "TransactionRevertedError");
        assert_eq!(reverted.to_string(), "transaction reverted: out of gas");
    }

    #[test]
    fn test_anyhow_context_is_preserved() {
        let err = anyhow::anyhow!("connection refused").context("Failed to send eth_chainId request");
        let mapped = DeployError::network(err);
        assert_eq!(
            mapped.to_string(),
            "network error: Failed to send eth_chainId request: connection refused"
        );
    }
}
