//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        // Endpoint URLs often embed provider API keys.
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to send {} request", method))?;

    let status = response.status();
    let result: Value = response
        .json()
        .await
        .map_err(reqwest::Error::without_url)
        .with_context(|| format!("Failed to parse {} response (HTTP {})", method, status))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error on {}: {}",
            method,
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Poll `check_fn` until it yields a value.
///
/// Errors from `check_fn` end the wait immediately; there is no deadline, the
/// caller bounds the wait if it needs to.
pub async fn poll_until<T, F, Fut>(
    name: &str,
    interval: Duration,
    check_fn: F,
) -> Result<T, anyhow::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, anyhow::Error>>,
{
    loop {
        if let Some(value) = check_fn().await? {
            return Ok(value);
        }

        tracing::trace!(name, "Not ready yet, polling again...");
        tokio::time::sleep(interval).await;
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u128, anyhow::Error> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("Quantity '{}' is missing the 0x prefix", value))?;
    if digits.is_empty() {
        anyhow::bail!("Empty hex quantity");
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1").unwrap(), 1);
        assert_eq!(parse_quantity("0xc350").unwrap(), 50_000);
        assert!(parse_quantity("c350").is_err());
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[tokio::test]
    async fn test_poll_until_returns_value() {
        let calls = AtomicUsize::new(0);
        let value = poll_until("counter", Duration::from_millis(1), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(if n >= 2 { Some(n) } else { None }) }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_until_stops_on_error() {
        let result = poll_until("failing", Duration::from_millis(1), || async {
            Err::<Option<()>, _>(anyhow::anyhow!("connection refused"))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_json_rpc_call_unreachable() {
        let client = create_client().unwrap();
        // Port 9 (discard) is never an RPC endpoint.
        let result: Result<String, _> =
            json_rpc_call(&client, "http://127.0.0.1:9", "eth_chainId", vec![]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transport_error_omits_endpoint_url() {
        let client = create_client().unwrap();
        let err = json_rpc_call::<String>(
            &client,
            "http://127.0.0.1:9/v2/provider-api-key",
            "eth_chainId",
            vec![],
        )
        .await
        .unwrap_err();

        let message = format!("{:#}", err);
        assert!(message.contains("eth_chainId"));
        assert!(!message.contains("provider-api-key"));
    }
}
