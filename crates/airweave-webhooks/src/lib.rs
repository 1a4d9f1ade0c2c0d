//! Outbound webhook delivery.
//!
//! Grounded on the platform observer stack's webhook action: an HTTP POST
//! of the event's wire payload, with one bounded retry on a transient
//! failure before the delivery is logged and dropped. Delivery is
//! best-effort from the event bus's point of view — a failed webhook must
//! never fail the publisher that produced the event.

use std::sync::Arc;
use std::time::Duration;

use airweave_error::CoreError;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Resolves the destination URL for an organization's webhook channel.
/// Administration of this mapping (creating/rotating webhook targets) is
/// out of scope for the core; this trait is the narrow boundary the core
/// calls through.
pub trait WebhookEndpointResolver: Send + Sync {
    /// The configured webhook URL for an organization, if any. `None`
    /// means the organization has not configured outbound webhooks.
    fn endpoint_for(&self, organization_id: Uuid) -> Option<String>;
}

/// Delivers an event's webhook payload to an organization's configured
/// endpoint.
#[async_trait]
pub trait WebhookPublisher: Send + Sync {
    /// Deliver `payload` for `event_type` to the organization's webhook
    /// endpoint. A no-op (returns `Ok`) if no endpoint is configured.
    ///
    /// # Errors
    /// Returns [`CoreError::Upstream`] if the endpoint is configured but
    /// every delivery attempt failed.
    async fn publish(
        &self,
        organization_id: Uuid,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), CoreError>;
}

/// Delivery outcome of a single HTTP attempt, kept for tests and for a
/// caller that wants attempt-level detail beyond pass/fail.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    /// HTTP status code returned by the endpoint.
    pub status_code: u16,
    /// Whether the status code indicated success (2xx).
    pub success: bool,
}

/// A `reqwest`-backed [`WebhookPublisher`] with one bounded retry.
pub struct ReqwestWebhookPublisher {
    client: reqwest::Client,
    resolver: Arc<dyn WebhookEndpointResolver>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl ReqwestWebhookPublisher {
    /// Build a publisher with the default single-retry policy.
    #[must_use]
    pub fn new(resolver: Arc<dyn WebhookEndpointResolver>) -> Self {
        Self {
            client: reqwest::Client::new(),
            resolver,
            max_attempts: 2,
            retry_delay: Duration::from_millis(200),
        }
    }

    async fn deliver_once(&self, url: &str, payload: &Value) -> Result<DeliveryResult, CoreError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| CoreError::Upstream {
                service: "webhook".to_string(),
                message: err.to_string(),
            })?;
        let status_code = response.status().as_u16();
        Ok(DeliveryResult {
            status_code,
            success: response.status().is_success(),
        })
    }
}

#[async_trait]
impl WebhookPublisher for ReqwestWebhookPublisher {
    async fn publish(
        &self,
        organization_id: Uuid,
        event_type: &str,
        payload: &Value,
    ) -> Result<(), CoreError> {
        let Some(url) = self.resolver.endpoint_for(organization_id) else {
            return Ok(());
        };

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.deliver_once(&url, payload).await {
                Ok(result) if result.success => return Ok(()),
                Ok(result) => {
                    tracing::warn!(
                        organization_id = %organization_id,
                        event_type,
                        status = result.status_code,
                        attempt,
                        "webhook delivery returned non-success status"
                    );
                    last_error = Some(CoreError::Upstream {
                        service: "webhook".to_string(),
                        message: format!("endpoint returned status {}", result.status_code),
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        organization_id = %organization_id,
                        event_type,
                        attempt,
                        error = %err,
                        "webhook delivery attempt failed"
                    );
                    last_error = Some(err);
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or(CoreError::Upstream {
            service: "webhook".to_string(),
            message: "delivery failed with no recorded error".to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoEndpoint;
    impl WebhookEndpointResolver for NoEndpoint {
        fn endpoint_for(&self, _organization_id: Uuid) -> Option<String> {
            None
        }
    }

    #[tokio::test]
    async fn publish_is_a_no_op_without_a_configured_endpoint() {
        let publisher = ReqwestWebhookPublisher::new(Arc::new(NoEndpoint));
        let result = publisher
            .publish(Uuid::new_v4(), "entity.batch_processed", &serde_json::json!({}))
            .await;
        assert!(result.is_ok());
    }
}
