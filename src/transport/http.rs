//! HTTP implementations of the probe and call capabilities.

use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::time::Instant;

use crate::health::probe::{HealthProbe, ProbeReport};
use crate::transport::{CallReport, ServiceCaller};

const PROBE_USER_AGENT: &str = "service-registry-health-check";

/// Probes an instance with `GET <url>`; any 2xx is healthy.
#[derive(Debug, Clone, Default)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HealthProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeReport {
        let started = Instant::now();
        let healthy = match self.client.get(url).header(USER_AGENT, PROBE_USER_AGENT).send().await {
            Ok(response) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(url = %url, status = %response.status(), "Health check failed: non-success status");
                }
                success
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Health check failed: connection error");
                false
            }
        };

        ProbeReport {
            healthy,
            elapsed: started.elapsed(),
        }
    }
}

/// Performs `GET <url>` and returns the body; non-2xx statuses are failures.
#[derive(Debug, Clone, Default)]
pub struct HttpCaller {
    client: Client,
}

impl HttpCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl ServiceCaller for HttpCaller {
    type Response = String;
    type Error = reqwest::Error;

    async fn call(&self, url: &str) -> CallReport<String, reqwest::Error> {
        let started = Instant::now();
        let result = self.fetch(url).await;
        CallReport {
            elapsed: started.elapsed(),
            result,
        }
    }
}
