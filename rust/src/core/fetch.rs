// Outbound HTTP: organic-attribution retrieval and destination-config
// acquisition. Response validation is split into pure helpers so the
// contract is testable without a server.

use serde_json::Value;
use url::Url;

pub type Metrics = serde_json::Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum FetchFault {
    #[error("cannot assemble attribution request")]
    DestinationAssembly,
    #[error("network transport failure: {0}")]
    Transport(String),
    #[error("unexpected response status {status}")]
    ResponseValidation { status: u16 },
    #[error("malformed response payload")]
    PayloadParsing,
    #[error("cannot encode request body")]
    Serialization,
}

/// Fill `primary` with any keys from `secondary` it does not already have.
/// Existing keys always win.
pub fn merge_metrics(mut primary: Metrics, secondary: &Metrics) -> Metrics {
    for (key, value) in secondary {
        if !primary.contains_key(key) {
            primary.insert(key.clone(), value.clone());
        }
    }
    primary
}

pub async fn fetch_organic_metrics(
    client: &reqwest::Client,
    endpoint: &str,
    program_id: &str,
    auth_key: &str,
    device_id: &str,
) -> Result<Metrics, FetchFault> {
    if program_id.is_empty() || auth_key.is_empty() || device_id.is_empty() {
        return Err(FetchFault::DestinationAssembly);
    }

    let url = format!("{}/{}", endpoint.trim_end_matches('/'), program_id);
    let reply = client
        .get(url)
        .query(&[("devkey", auth_key), ("device_id", device_id)])
        .send()
        .await
        .map_err(|e| FetchFault::Transport(e.to_string()))?;

    let status = reply.status().as_u16();
    let body = reply
        .bytes()
        .await
        .map_err(|e| FetchFault::Transport(e.to_string()))?;
    metrics_from_reply(status, &body)
}

pub async fn fetch_destination_config(
    client: &reqwest::Client,
    endpoint: &str,
    payload: &Value,
) -> Result<String, FetchFault> {
    let body = serde_json::to_vec(payload).map_err(|_| FetchFault::Serialization)?;

    let reply = client
        .post(endpoint)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await
        .map_err(|e| FetchFault::Transport(e.to_string()))?;

    let status = reply.status().as_u16();
    let body = reply
        .bytes()
        .await
        .map_err(|e| FetchFault::Transport(e.to_string()))?;
    destination_from_reply(status, &body)
}

/// Attribution reply contract: HTTP 200 with a JSON object body.
fn metrics_from_reply(status: u16, body: &[u8]) -> Result<Metrics, FetchFault> {
    if status != 200 {
        return Err(FetchFault::ResponseValidation { status });
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(FetchFault::PayloadParsing),
    }
}

/// Config reply contract: HTTP 200 with `{ "ok": true, "url": "<string>" }`
/// where `url` parses as a URL.
fn destination_from_reply(status: u16, body: &[u8]) -> Result<String, FetchFault> {
    if status != 200 {
        return Err(FetchFault::ResponseValidation { status });
    }
    let parsed: Value = serde_json::from_slice(body).map_err(|_| FetchFault::PayloadParsing)?;
    if parsed.get("ok").and_then(Value::as_bool) != Some(true) {
        return Err(FetchFault::PayloadParsing);
    }
    let dest = parsed
        .get("url")
        .and_then(Value::as_str)
        .ok_or(FetchFault::PayloadParsing)?;
    Url::parse(dest).map_err(|_| FetchFault::PayloadParsing)?;
    Ok(dest.to_string())
}
