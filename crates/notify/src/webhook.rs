//! HTTP webhook delivery for the SMS and push channels.
//!
//! Each delivery is POSTed as JSON to the configured gateway URL. A bearer
//! token is attached when one is configured.

use std::time::Duration;

use crate::traits::{Delivery, DeliveryProvider, NotifyError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub struct WebhookProvider {
    url: String,
    token: Option<String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl WebhookProvider {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Result<Self, NotifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!(
                "webhook URL must be http(s): {url}"
            )));
        }
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { url, token, client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl DeliveryProvider for WebhookProvider {
    async fn deliver(&self, delivery: &Delivery) -> Result<(), NotifyError> {
        let mut request = self.client.post(&self.url).json(delivery);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Rejected(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(
            url = %self.url,
            channel = %delivery.channel,
            status = %status,
            "webhook delivery accepted"
        );
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use herald_core::{Channel, Role};
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        auth: Arc<Mutex<Vec<Option<String>>>>,
    }

    /// Serve a gateway on an ephemeral port answering every POST with `status`.
    async fn gateway(status: StatusCode) -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State(c): State<Captured>,
                          headers: HeaderMap,
                          Json(body): Json<serde_json::Value>| async move {
                        c.bodies.lock().await.push(body);
                        c.auth.lock().await.push(
                            headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string),
                        );
                        (status, "gateway says no")
                    },
                ),
            )
            .with_state(captured.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), captured)
    }

    fn delivery() -> Delivery {
        Delivery {
            channel: Channel::Sms,
            event_type: "credential.revoked".into(),
            actor_role: Role::Issuer,
            recipients: vec!["+15550100".into()],
            subject: None,
            body: "Your credential was revoked.".into(),
            recipient_roles: vec![Role::Learner],
            metadata: None,
        }
    }

    #[test]
    fn rejects_non_http_url() {
        assert!(matches!(
            WebhookProvider::new("ftp://example.com", None),
            Err(NotifyError::Config(_))
        ));
    }

    #[tokio::test]
    async fn posts_delivery_as_json_with_token() {
        let (url, captured) = gateway(StatusCode::OK).await;
        let provider = WebhookProvider::new(url, Some("s3cret".into())).unwrap();

        provider.deliver(&delivery()).await.unwrap();

        let bodies = captured.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["channel"], "sms");
        assert_eq!(bodies[0]["recipients"][0], "+15550100");
        assert!(bodies[0].get("subject").is_none());
        assert_eq!(
            captured.auth.lock().await[0].as_deref(),
            Some("Bearer s3cret")
        );
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let (url, _captured) = gateway(StatusCode::BAD_GATEWAY).await;
        let provider = WebhookProvider::new(url, None).unwrap();

        let err = provider.deliver(&delivery()).await.unwrap_err();
        match err {
            NotifyError::Rejected(msg) => {
                assert!(msg.contains("502"));
                assert!(msg.contains("gateway says no"));
            }
            other => panic!("expected Rejected error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_gateway_is_http_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = WebhookProvider::new(format!("http://{addr}/hook"), None).unwrap();
        assert!(matches!(
            provider.deliver(&delivery()).await,
            Err(NotifyError::Http(_))
        ));
    }
}
