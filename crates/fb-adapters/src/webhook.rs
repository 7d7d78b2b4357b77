//! Outbound delivery transports
//!
//! Webhook destinations receive the submission payload as JSON, signed
//! with HMAC-SHA256 when `FORMBRIDGE_WEBHOOK_SECRET` is configured.
//! Callback and queue destinations are handled in-process by
//! [`RoutingDeliveryTransport`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use fb_domain::Destination;
use fb_ports::{DeliveryError, DeliveryPayload, DeliveryTransport, SubmissionCallback};

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_SECRET_ENV: &str = "FORMBRIDGE_WEBHOOK_SECRET";
pub const SIGNATURE_HEADER: &str = "x-formbridge-signature";
pub const SUBMISSION_ID_HEADER: &str = "x-formbridge-submission-id";

/// Delivers to `webhook` destinations over HTTP.
pub struct WebhookDeliveryTransport {
    client: reqwest::Client,
    signing_key: Option<Vec<u8>>,
}

impl WebhookDeliveryTransport {
    pub fn new(signing_key: Option<Vec<u8>>) -> Self {
        if signing_key.is_none() {
            warn!(
                env = WEBHOOK_SECRET_ENV,
                "webhook signing key not configured; outbound deliveries are unsigned"
            );
        }
        Self {
            client: reqwest::Client::new(),
            signing_key,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var(WEBHOOK_SECRET_ENV)
                .ok()
                .map(String::into_bytes),
        )
    }

    fn signature(&self, body: &[u8]) -> Option<String> {
        self.signing_key.as_ref().map(|key| {
            let mut mac =
                HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
            mac.update(body);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        })
    }
}

#[async_trait]
impl DeliveryTransport for WebhookDeliveryTransport {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &DeliveryPayload,
    ) -> Result<(), DeliveryError> {
        let Destination::Webhook { url } = destination else {
            return Err(DeliveryError::Unsupported {
                kind: destination.kind().to_string(),
            });
        };

        let body = serde_json::to_vec(payload).map_err(|e| DeliveryError::Transport {
            message: format!("failed to encode payload: {e}"),
        })?;

        let mut request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header(SUBMISSION_ID_HEADER, payload.submission_id.as_str());

        if let Some(signature) = self.signature(&body) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            debug!(url = %url, submission_id = %payload.submission_id, "webhook delivered");
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                message: format!("destination answered {}", response.status()),
            })
        }
    }
}

/// Collects `queue` deliveries in memory until a consumer drains them.
#[derive(Default)]
pub struct InMemoryQueueSink {
    queues: Mutex<HashMap<String, Vec<DeliveryPayload>>>,
}

impl InMemoryQueueSink {
    pub fn push(&self, queue: &str, payload: DeliveryPayload) {
        self.queues
            .lock()
            .expect("queue sink mutex poisoned")
            .entry(queue.to_string())
            .or_default()
            .push(payload);
    }

    pub fn drain(&self, queue: &str) -> Vec<DeliveryPayload> {
        self.queues
            .lock()
            .expect("queue sink mutex poisoned")
            .get_mut(queue)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

/// Routes deliveries by destination kind: webhooks over HTTP, callbacks
/// to registered in-process handlers, queues into the in-memory sink.
pub struct RoutingDeliveryTransport {
    webhook: WebhookDeliveryTransport,
    callbacks: RwLock<HashMap<String, Arc<dyn SubmissionCallback>>>,
    queues: InMemoryQueueSink,
}

impl RoutingDeliveryTransport {
    pub fn new(webhook: WebhookDeliveryTransport) -> Self {
        Self {
            webhook,
            callbacks: RwLock::new(HashMap::new()),
            queues: InMemoryQueueSink::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(WebhookDeliveryTransport::from_env())
    }

    pub fn register_callback(&self, name: impl Into<String>, handler: Arc<dyn SubmissionCallback>) {
        self.callbacks
            .write()
            .expect("callback registry poisoned")
            .insert(name.into(), handler);
    }

    pub fn queues(&self) -> &InMemoryQueueSink {
        &self.queues
    }
}

#[async_trait]
impl DeliveryTransport for RoutingDeliveryTransport {
    async fn deliver(
        &self,
        destination: &Destination,
        payload: &DeliveryPayload,
    ) -> Result<(), DeliveryError> {
        match destination {
            Destination::Webhook { .. } => self.webhook.deliver(destination, payload).await,
            Destination::Callback { name } => {
                let handler = {
                    self.callbacks
                        .read()
                        .expect("callback registry poisoned")
                        .get(name)
                        .cloned()
                };
                match handler {
                    Some(handler) => handler.handle(payload).await,
                    None => Err(DeliveryError::Unsupported {
                        kind: format!("callback:{name}"),
                    }),
                }
            }
            Destination::Queue { name } => {
                self.queues.push(name, payload.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fb_domain::{FieldMap, SubmissionId};
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> DeliveryPayload {
        let mut fields = FieldMap::new();
        fields.insert("name".to_string(), serde_json::json!("John"));
        DeliveryPayload {
            submission_id: SubmissionId::new(),
            intake_id: "contact_form".to_string(),
            fields,
            submitted_at: Utc::now(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn delivers_signed_payload_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header_exists(SUBMISSION_ID_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WebhookDeliveryTransport::new(Some(b"secret".to_vec()));
        let destination = Destination::Webhook {
            url: format!("{}/hook", server.uri()),
        };

        transport.deliver(&destination, &payload()).await.unwrap();
    }

    #[tokio::test]
    async fn non_2xx_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = WebhookDeliveryTransport::new(None);
        let destination = Destination::Webhook {
            url: format!("{}/hook", server.uri()),
        };

        let err = transport.deliver(&destination, &payload()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Rejected { .. }));
    }

    #[tokio::test]
    async fn signature_is_stable_for_identical_bodies() {
        let transport = WebhookDeliveryTransport::new(Some(b"secret".to_vec()));
        let body = br#"{"hello":"world"}"#;
        assert_eq!(transport.signature(body), transport.signature(body));
        assert!(transport.signature(body).unwrap().starts_with("sha256="));

        let unsigned = WebhookDeliveryTransport::new(None);
        assert!(unsigned.signature(body).is_none());
    }

    #[tokio::test]
    async fn queue_destinations_accumulate_until_drained() {
        let transport = RoutingDeliveryTransport::new(WebhookDeliveryTransport::new(None));
        let destination = Destination::Queue {
            name: "intake".to_string(),
        };

        transport.deliver(&destination, &payload()).await.unwrap();
        transport.deliver(&destination, &payload()).await.unwrap();

        assert_eq!(transport.queues().drain("intake").len(), 2);
        assert!(transport.queues().drain("intake").is_empty());
    }

    #[tokio::test]
    async fn unregistered_callback_is_unsupported() {
        let transport = RoutingDeliveryTransport::new(WebhookDeliveryTransport::new(None));
        let destination = Destination::Callback {
            name: "crm".to_string(),
        };

        let err = transport.deliver(&destination, &payload()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unsupported { .. }));
    }
}
