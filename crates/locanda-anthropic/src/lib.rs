// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API adapter.
//!
//! Translates the provider-neutral message IR to and from the Messages API
//! wire format and retries transient failures with exponential backoff and
//! jitter, honoring server-provided `Retry-After` hints.

mod client;
mod retry;
mod types;

pub use client::AnthropicClient;
pub use retry::RetryConfig;
