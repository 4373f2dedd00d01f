//! Error types and retry classification for the arbitration core.
//!
//! This module provides:
//! - [`ArbiterError`]: The main error enum for all arbitration and cache operations
//! - [`RetryClass`]: Classification for determining fallback behavior
//! - [`ProviderFailure`]: A single (provider, error) attempt recorded during plan execution

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// One failed attempt during execution of a plan.
///
/// Collected in plan order and carried by
/// [`ArbiterError::AllProvidersFailed`] for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Identifier of the provider that failed.
    pub provider: String,
    /// Rendered error message for the failure.
    pub error: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.error)
    }
}

/// Errors that can occur during arbitration and cache operations.
///
/// Each variant is classified into a [`RetryClass`] via the
/// [`retry_class`](Self::retry_class) method, which determines how the
/// engine handles the error during plan execution.
#[derive(Error, Debug)]
pub enum ArbiterError {
    /// No registered provider supports the requested asset, or all
    /// supporting providers are marked down. Surfaced to the caller
    /// immediately, no fallback is attempted.
    #[error("No provider available for {symbol}")]
    NoProviderAvailable {
        /// Symbol of the asset that had no eligible providers
        symbol: String,
    },

    /// A single provider exceeded its per-call timeout.
    /// The engine proceeds to the next plan entry.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// A provider returned an error or malformed response.
    /// The engine proceeds to the next plan entry.
    #[error("Provider error: {provider} - {message}")]
    Provider {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The provider does not serve the requested asset or data type.
    /// Another provider in the plan may still succeed; no penalty recorded.
    #[error("Unsupported request for provider {provider}")]
    Unsupported {
        /// The provider that rejected the request
        provider: String,
    },

    /// Every entry in the execution plan failed. Carries the ordered list
    /// of per-provider failures for diagnostics.
    #[error("All {} providers failed", .attempts.len())]
    AllProvidersFailed {
        /// Per-provider failures, in plan order
        attempts: Vec<ProviderFailure>,
    },

    /// A cache tier operation failed. Never surfaced from `resolve`:
    /// read failures degrade to misses and write failures to no-ops.
    #[error("Cache tier error: {message}")]
    Cache {
        /// Description of the tier failure
        message: String,
    },

    /// Configuration failed validation. Raised at construction time only,
    /// never during request handling.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the validation failure
        message: String,
    },
}

impl ArbiterError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: terminal, stop processing this request
    /// - [`RetryClass::FailoverWithPenalty`]: record a reliability failure, try next plan entry
    /// - [`RetryClass::NextProvider`]: try next plan entry, no penalty
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::Provider { .. } => RetryClass::FailoverWithPenalty,

            Self::Unsupported { .. } => RetryClass::NextProvider,

            Self::NoProviderAvailable { .. }
            | Self::AllProvidersFailed { .. }
            | Self::Cache { .. }
            | Self::InvalidConfig { .. } => RetryClass::Never,
        }
    }

    /// Shorthand for a cache tier error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration validation error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
