// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock adapters for fast, CI-runnable agent tests without external
//! services.

mod mock_messenger;
mod mock_provider;

pub use mock_messenger::MockMessenger;
pub use mock_provider::MockProvider;
