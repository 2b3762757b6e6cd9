// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Locanda agent runtime.

use thiserror::Error;

/// The primary error type used across the runtime crates.
#[derive(Debug, Error)]
pub enum LocandaError {
    /// Configuration errors (missing required keys, invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query, decode).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messaging platform errors (poll failure, send failure).
    #[error("messenger error: {message}")]
    Messenger {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Model provider errors (API failure, decode failure, exhausted retries).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Tool execution errors. Converted to `ToolResult { is_error: true }`
    /// at the registry boundary; the model never observes this variant.
    #[error("{0}")]
    Tool(String),

    /// An invite token that is unknown, already redeemed, or expired.
    #[error("invite invalid or expired")]
    InviteInvalid,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LocandaError {
    /// Wraps a storage-layer error.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Builds a messenger error from a bare message.
    pub fn messenger(message: impl Into<String>) -> Self {
        Self::Messenger {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a provider error from a bare message.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }
}
