//! Action doubles and canned provider sets for exercising the runner
//! without real infrastructure. Exported so downstream crates can use them
//! in their own tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use capstan_providers::{
    MockCloudClient, MockConsoleClient, MockSshClient, MockVirtClient, ProviderError,
};

use crate::action::{Action, Outcome};
use crate::context::{ActionContext, ProviderSet};
use crate::error::{ActionError, Result};

/// Typed handles onto one set of mock adapters, so tests can keep asserting
/// on them after handing the erased set to the code under test.
#[derive(Clone)]
pub struct MockProviders {
    pub cloud: Arc<MockCloudClient>,
    pub virt: Arc<MockVirtClient>,
    pub ssh: Arc<MockSshClient>,
    pub console: Arc<MockConsoleClient>,
}

impl Default for MockProviders {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProviders {
    pub fn new() -> Self {
        Self {
            cloud: Arc::new(MockCloudClient::new()),
            virt: Arc::new(MockVirtClient::new()),
            ssh: Arc::new(MockSshClient::new()),
            console: Arc::new(MockConsoleClient::new()),
        }
    }

    pub fn with_cloud(mut self, cloud: MockCloudClient) -> Self {
        self.cloud = Arc::new(cloud);
        self
    }

    pub fn with_virt(mut self, virt: MockVirtClient) -> Self {
        self.virt = Arc::new(virt);
        self
    }

    pub fn with_ssh(mut self, ssh: MockSshClient) -> Self {
        self.ssh = Arc::new(ssh);
        self
    }

    pub fn with_console(mut self, console: MockConsoleClient) -> Self {
        self.console = Arc::new(console);
        self
    }

    pub fn as_set(&self) -> ProviderSet {
        ProviderSet::new(
            self.cloud.clone(),
            self.virt.clone(),
            self.ssh.clone(),
            self.console.clone(),
        )
    }
}

/// Default mock adapters plus the handles to inspect them.
pub fn mock_providers() -> (ProviderSet, MockProviders) {
    let handles = MockProviders::new();
    (handles.as_set(), handles)
}

/// Succeeds immediately.
#[derive(Debug)]
pub struct NoopAction {
    name: &'static str,
}

impl NoopAction {
    pub fn new() -> Self {
        Self::named("noop")
    }

    pub fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for NoopAction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Action for NoopAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Do nothing"
    }

    async fn run(&self, _ctx: &ActionContext) -> Result<Outcome> {
        Ok(Outcome::new("nothing to do"))
    }
}

/// Always fails, either permanently or transiently.
#[derive(Debug)]
pub struct FailingAction {
    message: String,
    transient: bool,
}

impl FailingAction {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

#[async_trait]
impl Action for FailingAction {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn description(&self) -> &'static str {
        "Always fail"
    }

    async fn run(&self, _ctx: &ActionContext) -> Result<Outcome> {
        if self.transient {
            Err(ActionError::Provider(ProviderError::Unavailable(
                self.message.clone(),
            )))
        } else {
            Err(ActionError::ExecutionFailed(self.message.clone()))
        }
    }
}

/// Fails transiently a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyAction {
    failures_before_success: u32,
    calls: AtomicU32,
}

impl FlakyAction {
    pub fn new(failures_before_success: u32) -> Self {
        Self {
            failures_before_success,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for FlakyAction {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn description(&self) -> &'static str {
        "Fail a few times, then succeed"
    }

    async fn run(&self, _ctx: &ActionContext) -> Result<Outcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            Err(ActionError::Provider(ProviderError::Connection(format!(
                "flaky failure {}",
                call + 1
            ))))
        } else {
            Ok(Outcome::new("recovered"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_action_recovers() {
        let (providers, _) = mock_providers();
        let ctx = ActionContext::new(providers);
        let action = FlakyAction::new(2);

        assert!(action.run(&ctx).await.unwrap_err().is_transient());
        assert!(action.run(&ctx).await.unwrap_err().is_transient());
        assert!(action.run(&ctx).await.is_ok());
        assert_eq!(action.calls(), 3);
    }

    #[tokio::test]
    async fn test_failing_action_modes() {
        let (providers, _) = mock_providers();
        let ctx = ActionContext::new(providers);

        let permanent = FailingAction::new("boom");
        assert!(!permanent.run(&ctx).await.unwrap_err().is_transient());

        let transient = FailingAction::transient("flap");
        assert!(transient.run(&ctx).await.unwrap_err().is_transient());
    }
}
