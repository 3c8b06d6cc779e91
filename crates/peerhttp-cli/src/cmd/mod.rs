//! Command implementations. Each command builds its own Tokio runtime.

pub mod node;
pub mod request;

use anyhow::Context;

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")
}
