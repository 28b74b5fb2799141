use async_trait::async_trait;

use crate::context::ActionContext;
use crate::error::Result;

/// What a finished action reports back: a one-line summary plus optional
/// detail lines for the deployment log.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub message: String,
    pub details: Vec<String>,
}

impl Outcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }
}

/// A single idempotent unit of provisioning work.
///
/// Inputs are captured when the action is planned, so a deployment edit
/// after planning never changes what runs. `run` must tolerate re-invocation
/// after a partial failure: create-if-absent, never create-unconditionally.
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable machine name, used in execution records.
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the polling client.
    fn description(&self) -> &'static str;

    async fn run(&self, ctx: &ActionContext) -> Result<Outcome>;
}
