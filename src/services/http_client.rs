use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{PaymentError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(20)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

/// Appends `segments` to `base`, escaping each one so an id always stays
/// a single path segment.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
    if let Some(bad) = segments.iter().find(|s| s.is_empty() || **s == "." || **s == "..") {
        return Err(PaymentError::InvalidRequest(format!("invalid path segment: {:?}", bad)));
    }

    let mut url = Url::parse(base).map_err(|e| PaymentError::Config(format!("invalid api base {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| PaymentError::Config(format!("api base cannot carry a path: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Decodes a JSON body, turning non-2xx answers into a gateway error that
/// names the failing call.
pub async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    operation: &'static str,
    response: Response,
) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        debug!("{} {} returned HTTP {}: {}", provider, operation, status, body);
        return Err(PaymentError::gateway(
            provider,
            operation,
            format!("HTTP {}: {}", status, extract_error_message(&body)),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        PaymentError::gateway(provider, operation, format!("unreadable response: {}", e))
    })
}

/// Pulls the human readable part out of a gateway error body.
pub fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };

    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/message"),
        value.pointer("/error_description"),
        value.pointer("/error"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());
    message
}
