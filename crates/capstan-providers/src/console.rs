//! Management console adapter.
//!
//! Registers a cloud provider with a CloudForms appliance by replaying the
//! browser flow: authenticate into the dashboard, pull the CSRF token off
//! the provider form, then submit it. The appliance has no API for this on
//! the versions the installer targets, so the form route is the only one.

use async_trait::async_trait;
use regex::Regex;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProviderError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection details for one appliance console.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleCredentials {
    /// e.g. `https://192.0.2.30`.
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl ConsoleCredentials {
    pub fn admin(address: &str, password: impl Into<String>) -> Self {
        Self {
            base_url: format!("https://{}", address),
            username: "admin".to_string(),
            password: password.into(),
        }
    }
}

/// The provider form as the console expects it.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudProviderForm {
    pub name: String,
    /// Console type discriminator, e.g. `openstack`.
    pub provider_type: String,
    pub hostname: String,
    pub ip_address: String,
    pub api_port: String,
    pub zone: String,
    pub userid: String,
    pub password: String,
}

/// Trait for console operations.
#[async_trait]
pub trait ConsoleClient: Send + Sync {
    async fn add_cloud_provider(
        &self,
        creds: &ConsoleCredentials,
        form: &CloudProviderForm,
    ) -> Result<()>;
}

/// Appliance certificates are self-signed, so verification is off and the
/// client keeps the session cookie between steps.
pub struct HttpConsoleClient {
    http: reqwest::Client,
}

impl HttpConsoleClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| ProviderError::Connection(format!("failed to build http client: {}", e)))?;
        Ok(Self { http })
    }

    async fn authenticate(&self, creds: &ConsoleCredentials) -> Result<()> {
        let url = format!("{}/dashboard/authenticate?button=login", creds.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("user_name", creds.username.as_str()),
                ("user_password", creds.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("POST {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("POST {}", url)));
        }
        Ok(())
    }

    async fn fetch_csrf_token(&self, creds: &ConsoleCredentials) -> Result<String> {
        let url = format!("{}/ems_cloud/new", creds.base_url);
        // The console rejects this page with 403 unless the request looks
        // like in-console navigation, hence the Referer.
        let response = self
            .http
            .get(&url)
            .header("Referer", format!("{}/ems_cloud/", creds.base_url))
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("GET {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("GET {}", url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::UnexpectedResponse(format!("GET {}: {}", url, e)))?;

        extract_csrf_token(&body).ok_or_else(|| {
            ProviderError::UnexpectedResponse("no csrf token on provider form page".to_string())
        })
    }
}

#[async_trait]
impl ConsoleClient for HttpConsoleClient {
    async fn add_cloud_provider(
        &self,
        creds: &ConsoleCredentials,
        form: &CloudProviderForm,
    ) -> Result<()> {
        self.authenticate(creds).await?;
        let csrf_token = self.fetch_csrf_token(creds).await?;

        tracing::debug!(provider = %form.name, console = %creds.base_url, "submitting provider form");

        let url = format!("{}/ems_cloud/create/new?button=add", creds.base_url);
        let response = self
            .http
            .post(&url)
            .header("Referer", format!("{}/ems_cloud/", creds.base_url))
            .header("X-CSRF-Token", csrf_token)
            .form(&[
                ("name", form.name.as_str()),
                ("server_emstype", form.provider_type.as_str()),
                ("hostname", form.hostname.as_str()),
                ("ipaddress", form.ip_address.as_str()),
                ("port", form.api_port.as_str()),
                ("server_zone", form.zone.as_str()),
                ("default_userid", form.userid.as_str()),
                ("default_password", form.password.as_str()),
                ("default_verify", form.password.as_str()),
                ("amqp_userid", ""),
                ("amqp_password", ""),
                ("metrics_verify", ""),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, format!("POST {}", url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, format!("POST {}", url)));
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpConsoleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConsoleClient").finish_non_exhaustive()
    }
}

/// The token sits in a meta tag; attribute order varies between console
/// releases.
fn extract_csrf_token(body: &str) -> Option<String> {
    let name_first = Regex::new(r#"<meta\s+name="csrf-token"\s+content="([^"]+)""#).unwrap();
    let content_first = Regex::new(r#"<meta\s+content="([^"]+)"\s+name="csrf-token""#).unwrap();

    name_first
        .captures(body)
        .or_else(|| content_first.captures(body))
        .map(|caps| caps[1].to_string())
}

/// Records submitted providers for tests.
#[derive(Debug, Default)]
pub struct MockConsoleClient {
    providers: Mutex<Vec<CloudProviderForm>>,
    fail_with: Mutex<Option<ProviderError>>,
}

impl MockConsoleClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(error: ProviderError) -> Self {
        Self {
            providers: Mutex::new(Vec::new()),
            fail_with: Mutex::new(Some(error)),
        }
    }

    pub fn providers(&self) -> Vec<CloudProviderForm> {
        self.providers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ConsoleClient for MockConsoleClient {
    async fn add_cloud_provider(
        &self,
        _creds: &ConsoleCredentials,
        form: &CloudProviderForm,
    ) -> Result<()> {
        if let Some(err) = self.fail_with.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            return Err(err);
        }
        self.providers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(form.clone());
        Ok(())
    }
}
