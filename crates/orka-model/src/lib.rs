// SPDX-License-Identifier: Apache-2.0
pub mod catalog;
pub mod retry;
pub mod sanitize;
mod mock;
mod provider;
mod types;

pub use mock::{MockProvider, ScriptedMockProvider};
pub use provider::{ModelProvider, ResponseStream};
pub use types::*;
