use async_trait::async_trait;
use serde::Serialize;

/// §4.7: the abstract "deliver payload to partner subscription" collaborator
/// consumed by the entry service. `Gone` tells the caller to prune the
/// recipient's subscription fields; other failures are logged and dropped.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscriptionTarget) -> PushOutcome;
}

#[derive(Clone, Debug)]
pub struct PushSubscriptionTarget {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The endpoint permanently rejected the subscription (HTTP 410).
    Gone,
    /// A transient failure; logged by the caller, never surfaced to the API.
    TransientFailure,
}

#[derive(Serialize)]
struct PartnerEntryNotification {
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Production transport: a plain POST of the fixed notification payload to
/// the subscriber's push endpoint.
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(&self, subscription: &PushSubscriptionTarget) -> PushOutcome {
        let body = PartnerEntryNotification {
            kind: "partner-entry",
        };

        let response = self
            .client
            .post(&subscription.endpoint)
            .json(&body)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == reqwest::StatusCode::GONE => PushOutcome::Gone,
            Ok(resp) if resp.status().is_success() => PushOutcome::Delivered,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "push transport returned non-success");
                PushOutcome::TransientFailure
            }
            Err(err) => {
                tracing::warn!(error = %err, "push transport request failed");
                PushOutcome::TransientFailure
            }
        }
    }
}

/// Records every call in order instead of making a network request. Used by
/// integration tests to assert notify fan-out (§8 scenario 5) without a live
/// push endpoint.
pub struct RecordingPushTransport {
    pub calls: std::sync::Mutex<Vec<PushSubscriptionTarget>>,
    pub outcome: PushOutcome,
}

impl RecordingPushTransport {
    pub fn new(outcome: PushOutcome) -> Self {
        Self {
            calls: std::sync::Mutex::new(Vec::new()),
            outcome,
        }
    }
}

#[async_trait]
impl PushTransport for RecordingPushTransport {
    async fn send(&self, subscription: &PushSubscriptionTarget) -> PushOutcome {
        self.calls.lock().unwrap().push(subscription.clone());
        match self.outcome {
            PushOutcome::Delivered => PushOutcome::Delivered,
            PushOutcome::Gone => PushOutcome::Gone,
            PushOutcome::TransientFailure => PushOutcome::TransientFailure,
        }
    }
}
