//! HTTP-backed email relay and push gateway adapters.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::channels::{AdminSink, ChannelResult, EmailDigest, EmailSender, PushSender};
use crate::error::ChannelError;
use crate::models::{Admin, AdminSummary, Subscriber};

/// Body markers the push gateway uses for dead device identities.
const INVALID_DEVICE_MARKERS: [&str; 3] = [
    "UNREGISTERED",
    "registration-token-not-registered",
    "invalid-registration-token",
];

/// Outgoing email envelope understood by the relay.
#[derive(Debug, Serialize)]
struct EmailEnvelope<'a, T: Serialize> {
    from: &'a str,
    to: &'a str,
    subject: String,
    kind: &'static str,
    data: &'a T,
}

/// Posts structured email payloads to a relay that renders and sends them.
pub struct HttpEmailSender {
    client: Client,
    endpoint: String,
    from: String,
    api_key: Option<String>,
}

impl HttpEmailSender {
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        from: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
            api_key,
        }
    }

    async fn post<T: Serialize + Sync>(&self, envelope: &EmailEnvelope<'_, T>) -> ChannelResult {
        let mut request = self.client.post(&self.endpoint).json(envelope);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_batch(
        &self,
        subscriber: &Subscriber,
        to: &str,
        digest: &EmailDigest,
    ) -> ChannelResult {
        log::debug!("Emailing {} changes to subscriber {}", digest.len(), subscriber.id);
        self.post(&EmailEnvelope {
            from: &self.from,
            to,
            subject: digest.subject(),
            kind: "subscriber_batch",
            data: digest,
        })
        .await
    }
}

#[async_trait]
impl AdminSink for HttpEmailSender {
    async fn send_summary(&self, admin: &Admin, to: &str, summary: &AdminSummary) -> ChannelResult {
        log::debug!("Emailing catalog summary to admin {}", admin.id);
        self.post(&EmailEnvelope {
            from: &self.from,
            to,
            subject: format!("Catalog changes: {} events", summary.total()),
            kind: "admin_summary",
            data: summary,
        })
        .await
    }
}

/// Sends count-only pushes through an FCM-style gateway.
pub struct FcmPushSender {
    client: Client,
    endpoint: String,
    server_key: Option<String>,
}

impl FcmPushSender {
    pub fn new(client: Client, endpoint: impl Into<String>, server_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            server_key,
        }
    }
}

/// Map a gateway response to a channel outcome.
pub fn classify_push_response(status: u16, body: &str) -> ChannelResult {
    if (200..300).contains(&status) {
        return Ok(());
    }
    if status == 404
        || status == 410
        || INVALID_DEVICE_MARKERS
            .iter()
            .any(|marker| body.contains(marker))
    {
        return Err(ChannelError::InvalidDevice);
    }
    Err(ChannelError::Rejected {
        status,
        body: body.to_string(),
    })
}

#[async_trait]
impl PushSender for FcmPushSender {
    async fn send_count(&self, subscriber: &Subscriber, device: &str, count: usize) -> ChannelResult {
        let payload = json!({
            "message": {
                "token": device,
                "data": {
                    "kind": "availability_changes",
                    "count": count.to_string(),
                },
            }
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.server_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = if response.status().is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        log::debug!("Push to subscriber {} returned {}", subscriber.id, status);
        classify_push_response(status, &body)
    }
}
