//! HTTP callback observer
//!
//! Delivers each event as a JSON payload to a configured endpoint. The
//! observer owns a simple retry of its own — fixed delay multiplied per
//! attempt, no retryability predicate — separate from the engine's node
//! retry policy. An HTTP status of 400 or above counts as a failed
//! delivery.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use waverun_core::{ExecutionEvent, Observer, Result, WorkflowError};

/// Webhook delivery settings
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Destination URL
    pub url: String,
    /// HTTP verb; defaults to POST
    pub method: String,
    /// Extra request headers
    pub headers: HashMap<String, String>,
    /// Client-side request timeout
    pub timeout: Duration,
    /// Delivery attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub retry_delay: Duration,
    /// Factor applied to the delay after each attempt
    pub retry_multiplier: f64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
            retry_multiplier: 2.0,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, delay: Duration, multiplier: f64) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = delay;
        self.retry_multiplier = multiplier;
        self
    }
}

/// Observer POSTing events to an HTTP endpoint
pub struct WebhookObserver {
    name: String,
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookObserver {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkflowError::Execution(format!("webhook client: {e}")))?;
        Ok(Self {
            name: "webhook".to_string(),
            config,
            client,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn deliver_once(&self, event: &ExecutionEvent) -> Result<()> {
        let method = reqwest::Method::from_bytes(self.config.method.as_bytes())
            .map_err(|_| {
                WorkflowError::Execution(format!("invalid HTTP method '{}'", self.config.method))
            })?;

        let mut request = self.client.request(method, &self.config.url).json(event);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkflowError::Execution(format!("webhook delivery: {e}")))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(WorkflowError::Execution(format!(
                "webhook endpoint returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Observer for WebhookObserver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_event(&self, event: ExecutionEvent) -> Result<()> {
        let mut delay = self.config.retry_delay;
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts.max(1) {
            match self.deliver_once(&event).await {
                Ok(()) => return Ok(()),
                Err(error) => {
                    tracing::warn!(
                        observer = self.name.as_str(),
                        url = self.config.url.as_str(),
                        attempt,
                        error = %error,
                        "webhook delivery failed"
                    );
                    last_error = Some(error);
                    if attempt < self.config.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay = delay.mul_f64(self.config.retry_multiplier.max(1.0));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            WorkflowError::Execution("webhook delivery failed".to_string())
        }))
    }
}
