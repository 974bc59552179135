//! Off-chain game ledger balances.

use crate::error::{SettlementError, SettlementResult};
use dmm_core::{Amount, BoxFuture};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for game API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Token inventory the service account holds on the game ledger.
pub trait InventoryApi: Send + Sync {
    /// Balance of `symbol`; zero when the account holds none.
    fn balance<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, SettlementResult<Amount>>;
}

impl<I: InventoryApi + ?Sized> InventoryApi for Arc<I> {
    fn balance<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, SettlementResult<Amount>> {
        (**self).balance(symbol)
    }
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    token: String,
    balance: Value,
}

fn find_balance(entries: &[BalanceEntry], symbol: &str) -> SettlementResult<Amount> {
    let Some(entry) = entries.iter().find(|b| b.token == symbol) else {
        return Ok(Amount::ZERO);
    };

    let text = match &entry.balance {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(SettlementError::Inventory(format!(
                "unexpected {symbol} balance: {other}"
            )))
        }
    };

    text.parse()
        .map_err(|e| SettlementError::Inventory(format!("invalid {symbol} balance {text:?}: {e}")))
}

/// Client for `GET {api_url}/players/balances?username={account}`.
pub struct GameApiClient {
    client: Client,
    api_url: String,
    account: String,
}

impl GameApiClient {
    pub fn new(api_url: impl Into<String>, account: impl Into<String>) -> SettlementResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SettlementError::Inventory(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            account: account.into(),
        })
    }

    async fn fetch_balance(&self, symbol: &str) -> SettlementResult<Amount> {
        let url = format!("{}/players/balances", self.api_url);

        let response = self
            .client
            .get(&url)
            .query(&[("username", self.account.as_str())])
            .send()
            .await
            .map_err(|e| SettlementError::Inventory(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SettlementError::Inventory(format!("HTTP {status}: {body}")));
        }

        let entries: Vec<BalanceEntry> = response
            .json()
            .await
            .map_err(|e| SettlementError::Inventory(format!("Failed to parse response: {e}")))?;

        let balance = find_balance(&entries, symbol)?;
        debug!(symbol, balance = %balance, "Fetched game balance");
        Ok(balance)
    }
}

impl InventoryApi for GameApiClient {
    fn balance<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, SettlementResult<Amount>> {
        Box::pin(self.fetch_balance(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entries(json: &str) -> Vec<BalanceEntry> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_find_balance() {
        let e = entries(
            r#"[{"player":"mm","token":"DEC","balance":12345.678},
                {"player":"mm","token":"SPS","balance":"3.5"}]"#,
        );
        assert_eq!(find_balance(&e, "DEC").unwrap().inner(), dec!(12345.678));
        assert_eq!(find_balance(&e, "SPS").unwrap().inner(), dec!(3.5));
    }

    #[test]
    fn test_missing_token_is_zero() {
        let e = entries(r#"[{"token":"SPS","balance":1}]"#);
        assert_eq!(find_balance(&e, "DEC").unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_null_balance_is_error() {
        let e = entries(r#"[{"token":"DEC","balance":null}]"#);
        assert!(find_balance(&e, "DEC").is_err());
    }
}
