//! Reviewer notification webhook
//!
//! Optional collaborator: when `FORMBRIDGE_REVIEWER_WEBHOOK_URL` is set,
//! review requests are POSTed there. Its absence never breaks the core
//! operation; the engine logs a warning and continues.

use async_trait::async_trait;
use tracing::{debug, info};

use fb_ports::{NotifyError, ReviewNotice, ReviewerNotifier};

pub const REVIEWER_WEBHOOK_ENV: &str = "FORMBRIDGE_REVIEWER_WEBHOOK_URL";

pub struct WebhookReviewerNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookReviewerNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// None when the environment does not configure a reviewer sink.
    pub fn from_env() -> Option<Self> {
        match std::env::var(REVIEWER_WEBHOOK_ENV) {
            Ok(url) if !url.is_empty() => {
                info!(url = %url, "reviewer notifications enabled");
                Some(Self::new(url))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl ReviewerNotifier for WebhookReviewerNotifier {
    async fn notify(&self, notice: &ReviewNotice) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notice)
            .send()
            .await
            .map_err(|e| NotifyError::Failed {
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            debug!(submission_id = %notice.submission_id, "reviewer notified");
            Ok(())
        } else {
            Err(NotifyError::Failed {
                message: format!("notification sink answered {}", response.status()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fb_domain::SubmissionId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_notice_to_configured_sink() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reviewers"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookReviewerNotifier::new(format!("{}/reviewers", server.uri()));
        notifier
            .notify(&ReviewNotice {
                submission_id: SubmissionId::new(),
                intake_id: "vendor_onboarding".to_string(),
                intake_name: "Vendor onboarding".to_string(),
                gates: vec!["legal".to_string()],
                requested_at: Utc::now(),
            })
            .await
            .unwrap();
    }
}
