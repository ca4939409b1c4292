//! REST venue client.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET /symbols/{symbol}` returns `SymbolRules`
//! - `POST /orders` takes a `VenueOrder`, returns a `VenueAck`
//! - `DELETE /orders/{client_id}`
//!
//! HTTP status classification:
//!
//! | Status | Error |
//! |--------|-------|
//! | 401, 403 | `Auth` |
//! | 429 | `RateLimited` (honours `Retry-After` seconds) |
//! | 400, 404, 409, 422 | `Rejected` |
//! | 408, 5xx, transport failure | `Network` |
//! | client-side timeout | `Timeout` |

use std::time::Duration;

use ordergate_core::ClientOrderId;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::{ExecutorError, ExecutorResult};
use crate::executor::BoxFuture;
use crate::venue::{SymbolRules, VenueAck, VenueClient, VenueOrder};

/// Header carrying the venue API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 256;

/// `VenueClient` over JSON REST.
pub struct HttpVenueClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpVenueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpVenueClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpVenueClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> ExecutorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutorError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> ExecutorResult<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_ms = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1_000));
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, retry_after_ms, &body);
        debug!(status = status.as_u16(), code = error.code(), "Venue returned error status");
        Err(error)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ExecutorResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ExecutorError::Network(format!("invalid response body: {e}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> ExecutorError {
        if e.is_timeout() {
            ExecutorError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ExecutorError::Network(e.to_string())
        }
    }
}

/// Map a non-success HTTP status to an executor error.
#[must_use]
pub fn classify_status(status: StatusCode, retry_after_ms: Option<u64>, body: &str) -> ExecutorError {
    let mut detail: String = body.chars().take(MAX_ERROR_BODY).collect();
    if detail.is_empty() {
        detail = status.to_string();
    }
    match status.as_u16() {
        401 | 403 => ExecutorError::Auth(detail),
        429 => ExecutorError::RateLimited { retry_after_ms },
        400 | 404 | 409 | 422 => ExecutorError::Rejected(detail),
        408 => ExecutorError::Network(detail),
        s if (500..600).contains(&s) => ExecutorError::Network(detail),
        _ => ExecutorError::Rejected(detail),
    }
}

impl VenueClient for HttpVenueClient {
    fn name(&self) -> &str {
        &self.base_url
    }

    fn symbol_rules<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, ExecutorResult<SymbolRules>> {
        Box::pin(async move {
            trace!(symbol, "Fetching symbol rules");
            self.send_json(self.client.get(self.url(&format!("/symbols/{symbol}"))))
                .await
        })
    }

    fn place_order<'a>(&'a self, order: &'a VenueOrder) -> BoxFuture<'a, ExecutorResult<VenueAck>> {
        Box::pin(async move {
            debug!(
                client_id = %order.client_id,
                symbol = %order.symbol,
                side = %order.side,
                quantity = %order.quantity,
                "Placing venue order"
            );
            self.send_json(self.client.post(self.url("/orders")).json(order))
                .await
        })
    }

    fn cancel_order<'a>(
        &'a self,
        client_id: &'a ClientOrderId,
    ) -> BoxFuture<'a, ExecutorResult<()>> {
        Box::pin(async move {
            self.send(self.client.delete(self.url(&format!("/orders/{client_id}"))))
                .await
                .map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordergate_core::{OrderRequest, OrderSide, OrderStatus, Price, Size};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpVenueClient {
        HttpVenueClient::new(
            server.uri(),
            Some("key-123".to_string()),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    fn venue_order() -> VenueOrder {
        let order = OrderRequest::limit(
            "BTC-USD",
            OrderSide::Buy,
            Size::new(dec!(1)),
            Price::new(dec!(100)),
        );
        VenueOrder::from_request(&order, ClientOrderId::from("og_1"))
    }

    #[test]
    fn test_classify_status() {
        let s = |code| StatusCode::from_u16(code).unwrap();
        assert!(matches!(classify_status(s(401), None, ""), ExecutorError::Auth(_)));
        assert!(matches!(classify_status(s(403), None, ""), ExecutorError::Auth(_)));
        assert_eq!(
            classify_status(s(429), Some(2_000), ""),
            ExecutorError::RateLimited {
                retry_after_ms: Some(2_000)
            }
        );
        assert!(matches!(classify_status(s(422), None, "bad"), ExecutorError::Rejected(_)));
        assert!(matches!(classify_status(s(408), None, ""), ExecutorError::Network(_)));
        assert!(matches!(classify_status(s(503), None, ""), ExecutorError::Network(_)));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let c = HttpVenueClient::new("http://localhost", Some("secret".into()), Duration::from_secs(1))
            .unwrap();
        assert!(!format!("{c:?}").contains("secret"));
    }

    #[tokio::test]
    async fn test_place_order_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header(API_KEY_HEADER, "key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "venue_order_id": "v-1",
                "status": "filled",
                "filled_quantity": "1",
                "avg_price": "100"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client(&server).place_order(&venue_order()).await.unwrap();
        assert_eq!(ack.venue_order_id, "v-1");
        assert_eq!(ack.status, OrderStatus::Filled);
        assert_eq!(ack.avg_price, Some(Price::new(dec!(100))));
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "3"))
            .mount(&server)
            .await;

        let err = client(&server).place_order(&venue_order()).await.unwrap_err();
        assert_eq!(
            err,
            ExecutorError::RateLimited {
                retry_after_ms: Some(3_000)
            }
        );
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/BTC-USD"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let err = client(&server).symbol_rules("BTC-USD").await.unwrap_err();
        assert_eq!(err, ExecutorError::Auth("invalid key".to_string()));
    }

    #[tokio::test]
    async fn test_slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/symbols/BTC-USD"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = client(&server).symbol_rules("BTC-USD").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/orders/og_1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .cancel_order(&ClientOrderId::from("og_1"))
            .await
            .unwrap();
    }
}
