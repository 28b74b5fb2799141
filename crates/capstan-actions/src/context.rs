//! Everything an action is handed at run time: the provider adapters and a
//! progress reporter. Both arrive as trait objects so tests can substitute
//! mocks wholesale.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use capstan_providers::{CloudClient, ConsoleClient, SshClient, VirtClient};

/// The four adapters an action may reach for. Cheap to clone.
#[derive(Clone)]
pub struct ProviderSet {
    pub cloud: Arc<dyn CloudClient>,
    pub virt: Arc<dyn VirtClient>,
    pub ssh: Arc<dyn SshClient>,
    pub console: Arc<dyn ConsoleClient>,
}

impl ProviderSet {
    pub fn new(
        cloud: Arc<dyn CloudClient>,
        virt: Arc<dyn VirtClient>,
        ssh: Arc<dyn SshClient>,
        console: Arc<dyn ConsoleClient>,
    ) -> Self {
        Self {
            cloud,
            virt,
            ssh,
            console,
        }
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}

/// Receives fine-grained progress lines while an action runs. The runner
/// bridges these onto its event channel; the default discards them.
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, message: &str);
}

#[derive(Debug, Default)]
pub struct NoopReporter;

#[async_trait]
impl ProgressReporter for NoopReporter {
    async fn report(&self, _message: &str) {}
}

/// Collects progress lines for assertions.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    messages: Mutex<Vec<String>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ProgressReporter for CollectingReporter {
    async fn report(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}

#[derive(Clone)]
pub struct ActionContext {
    pub providers: ProviderSet,
    reporter: Arc<dyn ProgressReporter>,
}

impl ActionContext {
    pub fn new(providers: ProviderSet) -> Self {
        Self {
            providers,
            reporter: Arc::new(NoopReporter),
        }
    }

    pub fn with_reporter(providers: ProviderSet, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            providers,
            reporter,
        }
    }

    pub async fn progress(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!("{}", message);
        self.reporter.report(message).await;
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("providers", &self.providers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_providers;

    #[tokio::test]
    async fn test_progress_reaches_reporter() {
        let (providers, _handles) = mock_providers();
        let reporter = Arc::new(CollectingReporter::new());
        let ctx = ActionContext::with_reporter(providers, reporter.clone());

        ctx.progress("step one").await;
        ctx.progress("step two").await;

        assert_eq!(reporter.messages(), vec!["step one", "step two"]);
    }
}
