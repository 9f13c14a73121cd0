//! Single-attempt outbound HTTP dispatch.
//!
//! One POST per trigger, no automatic retry. A failed attempt is terminal;
//! trying again requires a new explicit replay or forward.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::dispatch::DeliveryConfig;
use crate::types::{DeliveryKind, DeliveryStatus};

pub const PRODUCT_USER_AGENT: &str = "WebhookRelay/1.0";
pub const TEST_USER_AGENT: &str = "WebhookRelay/1.0 (Test)";

/// Never forwarded to a new target: the original routing and auth context
/// must not leak.
const EXCLUDED_ORIGINAL_HEADERS: [&str; 3] = ["host", "content-length", "authorization"];

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub target_url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
}

/// Headers for a replay or forward: the fixed tracing set, the product
/// identifier, and every original inbound header under an `x-original-`
/// prefix minus the excluded ones.
pub fn build_headers(
    kind: DeliveryKind,
    event_id: Uuid,
    event_type: &str,
    content_type: Option<&str>,
    source_ip: Option<&str>,
    original_headers: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(
        "content-type".to_string(),
        content_type.unwrap_or("application/json").to_string(),
    );
    headers.insert(marker_header(kind).to_string(), "true".to_string());
    headers.insert("x-original-event-id".to_string(), event_id.to_string());
    headers.insert("x-event-type".to_string(), event_type.to_string());
    headers.insert(
        "x-timestamp".to_string(),
        Utc::now().timestamp().to_string(),
    );
    headers.insert("user-agent".to_string(), PRODUCT_USER_AGENT.to_string());

    if kind == DeliveryKind::Forward {
        headers.insert(
            "x-source-ip".to_string(),
            source_ip.unwrap_or("unknown").to_string(),
        );
    }

    for (name, value) in original_headers {
        let lowered = name.to_ascii_lowercase();
        if EXCLUDED_ORIGINAL_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        headers.insert(format!("x-original-{lowered}"), value.clone());
    }

    headers
}

/// Headers for a test send: a signed synthetic request against the
/// endpoint's own webhook URL.
pub fn build_test_headers(event_type: &str, signature: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert(
        "content-type".to_string(),
        "application/json".to_string(),
    );
    headers.insert("x-signature".to_string(), signature.to_string());
    headers.insert("x-event-type".to_string(), event_type.to_string());
    headers.insert("x-webhook-test".to_string(), "true".to_string());
    headers.insert(
        "x-timestamp".to_string(),
        Utc::now().timestamp().to_string(),
    );
    headers.insert("user-agent".to_string(), TEST_USER_AGENT.to_string());
    headers
}

/// Perform the one outbound call. 2xx-3xx responses are `sent`; anything
/// else, including transport errors and the timeout, is `failed`. The
/// outcome is data, never an error: failure is a valid, auditable result.
pub async fn send(
    client: &reqwest::Client,
    config: &DeliveryConfig,
    outbound: &OutboundRequest,
) -> DeliveryOutcome {
    let mut request = client
        .post(&outbound.target_url)
        .timeout(config.timeout());
    for (name, value) in &outbound.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    match request.body(outbound.body.clone()).send().await {
        Ok(response) => {
            let status_code = i64::from(response.status().as_u16());
            let body = response.text().await.unwrap_or_default();
            let truncated = truncate_chars(&body, config.response_body_limit);

            if status_code < 400 {
                DeliveryOutcome {
                    status: DeliveryStatus::Sent,
                    response_status: Some(status_code),
                    response_body: Some(truncated),
                    error_message: None,
                }
            } else {
                DeliveryOutcome {
                    status: DeliveryStatus::Failed,
                    response_status: Some(status_code),
                    response_body: Some(truncated),
                    error_message: Some(format!(
                        "HTTP {status_code}: {}",
                        truncate_chars(&body, 200)
                    )),
                }
            }
        }
        Err(err) => {
            tracing::warn!(target_url = %outbound.target_url, error = %err, "outbound delivery failed");
            DeliveryOutcome {
                status: DeliveryStatus::Failed,
                response_status: None,
                response_body: None,
                error_message: Some(format!("Request failed: {err}")),
            }
        }
    }
}

fn marker_header(kind: DeliveryKind) -> &'static str {
    match kind {
        DeliveryKind::Test => "x-webhook-test",
        DeliveryKind::Replay => "x-webhook-replay",
        DeliveryKind::Forward => "x-webhook-forward",
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
