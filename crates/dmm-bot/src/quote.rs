//! Quote HTTP API using axum.
//!
//! - `GET /conversion_rate?from_token=&to_token=&amount=`: pool quote net of fee
//! - `GET /sell_book?symbol=`: resting sell orders, best price first
//! - `GET /metrics`: Prometheus text exposition

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use dmm_core::Amount;
use dmm_settlement::{apply_fee, quote_from_base_capped, quote_to_base, SettlementConfig};
use dmm_sidechain::{BookOrder, PoolSnapshot, SidechainApi, SidechainResult};
use dmm_telemetry::Metrics;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::AppResult;

type Cache<T> = Mutex<HashMap<String, (Instant, T)>>;

/// Shared state for the quote handlers.
pub struct QuoteState<A> {
    sidechain: A,
    settlement: SettlementConfig,
    config: ApiConfig,
    pools: Cache<PoolSnapshot>,
    books: Cache<Vec<BookOrder>>,
}

impl<A: SidechainApi> QuoteState<A> {
    pub fn new(sidechain: A, settlement: SettlementConfig, config: ApiConfig) -> Self {
        Self {
            sidechain,
            settlement,
            config,
            pools: Mutex::new(HashMap::new()),
            books: Mutex::new(HashMap::new()),
        }
    }

    async fn pool(&self, symbol: &str) -> SidechainResult<Option<PoolSnapshot>> {
        let pair = self.settlement.pool_pair(symbol);
        let ttl = Duration::from_millis(self.config.pool_cache_ttl_ms);
        if let Some(pool) = fresh(&self.pools, &pair, ttl) {
            return Ok(Some(pool));
        }

        let pool = self.sidechain.pool(&pair).await?;
        if let Some(pool) = &pool {
            self.pools
                .lock()
                .insert(pair, (Instant::now(), pool.clone()));
        }
        Ok(pool)
    }

    async fn sell_book(&self, symbol: &str) -> SidechainResult<Vec<BookOrder>> {
        let ttl = Duration::from_millis(self.config.sell_book_cache_ttl_ms);
        if let Some(orders) = fresh(&self.books, symbol, ttl) {
            return Ok(orders);
        }

        let orders = self
            .sidechain
            .sell_book(symbol, self.config.sell_book_limit)
            .await?;
        self.books
            .lock()
            .insert(symbol.to_string(), (Instant::now(), orders.clone()));
        Ok(orders)
    }
}

fn fresh<T: Clone>(cache: &Cache<T>, key: &str, ttl: Duration) -> Option<T> {
    cache
        .lock()
        .get(key)
        .filter(|(at, _)| at.elapsed() < ttl)
        .map(|(_, value)| value.clone())
}

#[derive(Debug, Deserialize)]
struct ConversionQuery {
    from_token: Option<String>,
    to_token: Option<String>,
    amount: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConversionRate {
    from_token: String,
    to_token: String,
    amount: String,
    converted: String,
    fee_bps: u32,
}

#[derive(Debug, Deserialize)]
struct SellBookQuery {
    symbol: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Create the axum router.
pub fn create_router<A: SidechainApi + 'static>(state: Arc<QuoteState<A>>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_headers([
        header::ORIGIN,
        HeaderName::from_static("x-requested-with"),
        HeaderName::from_static("x-csrf-token"),
        header::CONTENT_TYPE,
        header::ACCEPT,
    ]);

    Router::new()
        .route("/conversion_rate", get(conversion_rate::<A>))
        .route("/sell_book", get(sell_book::<A>))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("sameorigin"),
        ))
}

async fn conversion_rate<A: SidechainApi + 'static>(
    State(state): State<Arc<QuoteState<A>>>,
    Query(query): Query<ConversionQuery>,
) -> Response {
    let (Some(from), Some(to), Some(raw_amount)) = (query.from_token, query.to_token, query.amount)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Must specify from_token, to_token and amount.",
        );
    };

    let amount = match raw_amount.parse::<Amount>() {
        Ok(amount) if amount.is_positive() => amount,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Must specify a valid amount to convert.",
            )
        }
    };

    let settlement = &state.settlement;
    let (symbol, buying) = if from == settlement.base_currency && settlement.is_supported(&to) {
        (to.as_str(), true)
    } else if to == settlement.base_currency && settlement.is_supported(&from) {
        (from.as_str(), false)
    } else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported conversion {from} -> {to}."),
        );
    };

    let pool = match state.pool(symbol).await {
        Ok(Some(pool)) => pool,
        Ok(None) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("No {symbol} pool available."),
            )
        }
        Err(e) => {
            warn!(symbol, error = %e, "Pool lookup failed");
            return error_response(StatusCode::BAD_GATEWAY, "Pool lookup failed.");
        }
    };

    let conversion = if buying {
        quote_from_base_capped(&pool, amount, settlement.max_pool_share_bps)
    } else {
        quote_to_base(&pool, amount)
    };
    let Some(conversion) = conversion else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("No {symbol} liquidity available."),
        );
    };

    let rate = ConversionRate {
        amount: conversion.consumed.to_wire(),
        converted: apply_fee(conversion.output, settlement.fee_bps).to_wire(),
        fee_bps: settlement.fee_bps,
        from_token: from,
        to_token: to,
    };
    Json(rate).into_response()
}

async fn sell_book<A: SidechainApi + 'static>(
    State(state): State<Arc<QuoteState<A>>>,
    Query(query): Query<SellBookQuery>,
) -> Response {
    let symbol = match query.symbol {
        Some(symbol) if state.settlement.is_supported(&symbol) => symbol,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Must specify a supported symbol.",
            )
        }
    };

    match state.sell_book(&symbol).await {
        Ok(orders) => Json(orders).into_response(),
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "Sell book lookup failed");
            error_response(StatusCode::BAD_GATEWAY, "Sell book lookup failed.")
        }
    }
}

async fn metrics() -> Response {
    match Metrics::render() {
        Ok(text) => text.into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Serve `router` on `addr` until the listener fails.
pub async fn run_server(addr: SocketAddr, router: Router) -> AppResult<()> {
    info!(%addr, "Starting quote API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use dmm_core::{BoxFuture, Price};
    use dmm_sidechain::{SidechainError, SidechainTx};
    use rust_decimal_macros::dec;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MockSidechain {
        pool: Mutex<Option<PoolSnapshot>>,
        fail: Mutex<bool>,
        pool_calls: Mutex<u32>,
        book_calls: Mutex<Vec<(String, u32)>>,
    }

    impl SidechainApi for MockSidechain {
        fn pool<'a>(&'a self, _: &'a str) -> BoxFuture<'a, SidechainResult<Option<PoolSnapshot>>> {
            *self.pool_calls.lock() += 1;
            let result = if *self.fail.lock() {
                Err(SidechainError::Rpc("timeout".into()))
            } else {
                Ok(self.pool.lock().clone())
            };
            Box::pin(async move { result })
        }

        fn sell_book<'a>(
            &'a self,
            symbol: &'a str,
            limit: u32,
        ) -> BoxFuture<'a, SidechainResult<Vec<BookOrder>>> {
            self.book_calls.lock().push((symbol.to_string(), limit));
            let order = BookOrder {
                account: "seller".into(),
                symbol: symbol.to_string(),
                quantity: Amount::new(dec!(1500)),
                price: Price::new(dec!(0.00101)),
            };
            Box::pin(async move { Ok(vec![order]) })
        }

        fn transaction_info<'a>(
            &'a self,
            _: &'a str,
        ) -> BoxFuture<'a, SidechainResult<Option<SidechainTx>>> {
            Box::pin(async { Ok(None) })
        }
    }

    fn setup() -> (Arc<MockSidechain>, Router) {
        let sidechain = Arc::new(MockSidechain::default());
        *sidechain.pool.lock() = Some(PoolSnapshot::new(
            Amount::new(dec!(1000)),
            Amount::new(dec!(10000)),
        ));
        let state = QuoteState::new(
            Arc::clone(&sidechain),
            SettlementConfig::new("dec-mm"),
            ApiConfig::default(),
        );
        (sidechain, create_router(Arc::new(state)))
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_buy_quote_deducts_fee() {
        let (_, router) = setup();

        // 10000 * 10 / 1010 = 99.009, less 0.5% = 98.514
        let (status, body) =
            get_json(&router, "/conversion_rate?from_token=HIVE&to_token=DEC&amount=10").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["amount"], "10.000");
        assert_eq!(body["converted"], "98.514");
        assert_eq!(body["fee_bps"], 50);
    }

    #[tokio::test]
    async fn test_sell_quote_deducts_fee() {
        let (_, router) = setup();

        // 1000 * 100 / 10100 = 9.900, less 0.5% = 9.851
        let (status, body) =
            get_json(&router, "/conversion_rate?from_token=DEC&to_token=HIVE&amount=100").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["converted"], "9.851");
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let (sidechain, router) = setup();

        for uri in [
            "/conversion_rate?from_token=HIVE&to_token=DEC",
            "/conversion_rate?from_token=HIVE&to_token=DEC&amount=abc",
            "/conversion_rate?from_token=HIVE&to_token=DEC&amount=-1",
            "/conversion_rate?from_token=HIVE&to_token=HIVE&amount=1",
            "/conversion_rate?from_token=DEC&to_token=DEC&amount=1",
            "/conversion_rate?from_token=HBD&to_token=DEC&amount=1",
            "/conversion_rate?from_token=HIVE&to_token=SPS&amount=1",
        ] {
            let (status, body) = get_json(&router, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string(), "{uri}");
        }
        assert_eq!(*sidechain.pool_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_missing_pool_and_lookup_failure() {
        let (sidechain, router) = setup();
        *sidechain.pool.lock() = None;

        let (status, _) =
            get_json(&router, "/conversion_rate?from_token=HIVE&to_token=DEC&amount=1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        *sidechain.fail.lock() = true;
        let (status, body) =
            get_json(&router, "/conversion_rate?from_token=HIVE&to_token=DEC&amount=1").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "Pool lookup failed.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_snapshot_cached_for_ttl() {
        let (sidechain, router) = setup();
        let uri = "/conversion_rate?from_token=HIVE&to_token=DEC&amount=1";

        get_json(&router, uri).await;
        get_json(&router, uri).await;
        assert_eq!(*sidechain.pool_calls.lock(), 1);

        tokio::time::advance(Duration::from_millis(10_001)).await;
        get_json(&router, uri).await;
        assert_eq!(*sidechain.pool_calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sell_book_cached() {
        let (sidechain, router) = setup();

        let (status, body) = get_json(&router, "/sell_book?symbol=DEC").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["account"], "seller");
        assert_eq!(body[0]["quantity"], "1500");

        get_json(&router, "/sell_book?symbol=DEC").await;
        assert_eq!(*sidechain.book_calls.lock(), vec![("DEC".to_string(), 200)]);

        tokio::time::advance(Duration::from_secs(61)).await;
        get_json(&router, "/sell_book?symbol=DEC").await;
        assert_eq!(sidechain.book_calls.lock().len(), 2);

        let (status, _) = get_json(&router, "/sell_book?symbol=SPS").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_response_headers() {
        let (_, router) = setup();

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/conversion_rate?from_token=HIVE&to_token=DEC&amount=1")
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::X_FRAME_OPTIONS], "sameorigin");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (_, router) = setup();
        Metrics::settlement("credited");

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("dmm_settlements_total"));
    }
}
