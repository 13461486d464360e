//! Coincheck client tests against a mock HTTP server

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use coincheck_poller::coincheck::auth::signature;
use coincheck_poller::coincheck::{
    ApiError, ClientConfig, CoincheckClient, Credentials, EndpointTable, NewOrder,
};
use coincheck_poller::Side;
use rust_decimal_macros::dec;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-access-key";
const SECRET: &str = "test-secret";

fn client(server: &MockServer) -> CoincheckClient {
    CoincheckClient::with_config(
        server.uri(),
        EndpointTable::coincheck(),
        Credentials::new(KEY, SECRET),
        ClientConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_rate_limit(100),
    )
    .unwrap()
}

/// Counts WARN events
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Outcome classification
// =============================================================================

#[tokio::test]
async fn test_503_is_http_error_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ticker"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&server)
        .await;

    let err = client(&server).ticker("btc_jpy").await.unwrap_err();
    assert_eq!(
        err,
        ApiError::Http {
            status: 503,
            body: "service unavailable".to_string()
        }
    );
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_invalid_json_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ticker"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server)
        .call_public("get_ticker", None, &query(&[("pair", "btc_jpy")]))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ticker"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = CoincheckClient::with_config(
        server.uri(),
        EndpointTable::coincheck(),
        Credentials::new(KEY, SECRET),
        ClientConfig::default().with_timeout(Duration::from_millis(200)),
    )
    .unwrap();

    let err = client.ticker("btc_jpy").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "got {:?}", err);
}

// =============================================================================
// Public calls
// =============================================================================

#[tokio::test]
async fn test_public_trades_sorted_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/trades"))
        .and(query_param("pair", "btc_jpy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": [
                {"id": 2, "amount": "0.1", "rate": "5000100.0", "pair": "btc_jpy",
                 "order_type": "buy", "created_at": "2024-01-01T00:00:02.000Z"},
                {"id": 1, "amount": "0.2", "rate": "5000000.0", "pair": "btc_jpy",
                 "order_type": "sell", "created_at": "2024-01-01T00:00:01.000Z"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let value = client
        .call_public(
            "get_public_trades",
            None,
            &query(&[("pair", "btc_jpy"), ("order", "desc"), ("limit", "2")]),
        )
        .await
        .unwrap();
    assert_eq!(value["data"].as_array().map(Vec::len), Some(2));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("limit=2&order=desc&pair=btc_jpy"));
    assert!(requests[0].headers.get("ACCESS-KEY").is_none());
}

#[tokio::test]
async fn test_typed_public_helpers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ticker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "last": 27390, "bid": 26900, "ask": 27390, "high": 27659, "low": 26400,
            "volume": "50.29627103", "timestamp": 1423377841
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/order_books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "asks": [["27330.0", "2.25"]],
            "bids": [["27240.0", "1.1543"]]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/rate/btc_jpy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"rate": "5000000"})))
        .mount(&server)
        .await;

    let client = client(&server);
    let ticker = client.ticker("btc_jpy").await.unwrap();
    assert_eq!(ticker.last, dec!(27390));

    let book = client.order_books("btc_jpy").await.unwrap();
    assert_eq!(book.asks[0], (dec!(27330.0), dec!(2.25)));

    let rate = client.standard_rate("btc_jpy").await.unwrap();
    assert_eq!(rate["rate"], "5000000");
}

// =============================================================================
// Private calls
// =============================================================================

#[tokio::test]
async fn test_private_call_is_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts/balance"))
        .and(header("ACCESS-KEY", KEY))
        .and(header_exists("ACCESS-NONCE"))
        .and(header_exists("ACCESS-SIGNATURE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true, "jpy": "1000.5", "btc": "0.25"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    let balance = client.balance().await.unwrap();
    assert_eq!(balance.available("jpy"), Some(dec!(1000.5)));
    client.balance().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let mut nonces = Vec::new();
    for request in &requests {
        let nonce = request.headers.get("ACCESS-NONCE").unwrap().to_str().unwrap();
        let sig = request
            .headers
            .get("ACCESS-SIGNATURE")
            .unwrap()
            .to_str()
            .unwrap();
        // the signed URL is the one the client built, without query here
        let signed_url = format!("{}{}", server.uri(), request.url.path());
        assert_eq!(sig, signature(SECRET, nonce, &signed_url));
        nonces.push(nonce.parse::<u64>().unwrap());
    }
    assert!(nonces[1] > nonces[0]);
}

#[tokio::test]
async fn test_cancel_order_uses_delete() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/exchange/orders/12345"))
        .and(header_exists("ACCESS-SIGNATURE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true, "id": 12345
        })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client(&server).cancel_order("12345").await.unwrap();
    assert_eq!(value["id"], 12345);
}

#[tokio::test]
async fn test_new_order_uses_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/exchange/orders"))
        .and(query_param("order_type", "sell"))
        .and(query_param("rate", "5000000"))
        .and(header_exists("ACCESS-NONCE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true, "id": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let order = NewOrder::limit(Side::Sell, "btc_jpy", dec!(5000000), dec!(0.05));
    let value = client(&server).new_order(&order).await.unwrap();
    assert_eq!(value["success"], true);
}

#[tokio::test]
async fn test_client_side_errors_never_hit_the_network() {
    let server = MockServer::start().await;
    let client = client(&server);

    let warnings = WarnCounter::default();
    let _guard = tracing::subscriber::set_default(
        tracing_subscriber::registry().with(warnings.clone()),
    );

    let err = client
        .call_private("get_secret_stash", None, &BTreeMap::new())
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::UnknownRequest("get_secret_stash".into()));

    let err = client
        .call_private("delet_cancel_order", None, &BTreeMap::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::MissingPathParameter("delet_cancel_order".into())
    );

    // a private endpoint is never sent unsigned
    let err = client
        .call_public("get_balance", None, &BTreeMap::new())
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::SigningRequired("get_balance".into()));

    assert!(server.received_requests().await.unwrap().is_empty());
    // one log event per rejected call
    assert_eq!(warnings.0.load(Ordering::SeqCst), 3);
}
