//! Payment interpretation.
//!
//! Rules, applied in order:
//! 1. Only transfers addressed to the service account are considered.
//! 2. A memo starting with `{` is parsed as JSON; anything else is
//!    base64-decoded first, with or without padding.
//! 3. A memo that does not decode is ignored.
//! 4. Only `method == "buy"` for a supported symbol is accepted.
//! 5. The currency is the amount's unit suffix. Only the base currency is
//!    accepted; the pegged-debt currency is always rejected.
//! 6. The recipient is `to`, then `id`, then the sender.
//!
//! A rejected transfer has no side effects.

use crate::config::SettlementConfig;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use dmm_core::{AssetAmount, TransferOp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Standard alphabet, padding optional.
const MEMO_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Fields of a purchase memo. Anything else in the memo is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MemoPayload {
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// Decode a memo into its payload, or `None` if it is not a JSON object.
pub fn decode_memo(memo: &str) -> Option<MemoPayload> {
    let memo = memo.trim();
    let json = if memo.starts_with('{') {
        memo.to_string()
    } else {
        let bytes = MEMO_ENGINE.decode(memo.trim_end_matches('=')).ok()?;
        String::from_utf8(bytes).ok()?
    };

    match serde_json::from_str(&json).ok()? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    }
}

/// Non-empty string form of a memo field; numbers are accepted as ids.
fn field_text(value: &Option<Value>) -> Option<String> {
    match value.as_ref()? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A validated purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseInstruction {
    pub symbol: String,
    pub recipient: String,
    pub payer: String,
    pub payment: AssetAmount,
    /// Raw amount string as transferred, refunded verbatim on a full refund.
    pub raw_amount: String,
}

/// Why a transfer produced no instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum Rejection {
    NotForAccount,
    MalformedMemo,
    UnsupportedMethod(String),
    UnsupportedSymbol(String),
    InvalidAmount(String),
    DebtCurrency(String),
    UnsupportedCurrency(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotForAccount => write!(f, "not addressed to the service account"),
            Rejection::MalformedMemo => write!(f, "memo is not a purchase instruction"),
            Rejection::UnsupportedMethod(m) => write!(f, "unsupported method {m:?}"),
            Rejection::UnsupportedSymbol(s) => write!(f, "unsupported symbol {s:?}"),
            Rejection::InvalidAmount(a) => write!(f, "invalid amount {a:?}"),
            Rejection::DebtCurrency(c) => write!(f, "payments in {c} are not accepted"),
            Rejection::UnsupportedCurrency(c) => write!(f, "unsupported currency {c}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentInterpreter {
    config: SettlementConfig,
}

impl PaymentInterpreter {
    pub fn new(config: SettlementConfig) -> Self {
        Self { config }
    }

    pub fn interpret(&self, transfer: &TransferOp) -> Result<PurchaseInstruction, Rejection> {
        if transfer.to != self.config.account {
            return Err(Rejection::NotForAccount);
        }

        let memo = decode_memo(&transfer.memo).ok_or(Rejection::MalformedMemo)?;

        let method = memo.method.clone().unwrap_or_default();
        if method != "buy" {
            return Err(Rejection::UnsupportedMethod(method));
        }

        let symbol = memo.symbol.clone().unwrap_or_default();
        if !self.config.is_supported(&symbol) {
            return Err(Rejection::UnsupportedSymbol(symbol));
        }

        let payment = AssetAmount::parse(&transfer.amount)
            .map_err(|_| Rejection::InvalidAmount(transfer.amount.clone()))?;
        if payment.is_currency(&self.config.debt_currency) {
            return Err(Rejection::DebtCurrency(payment.symbol));
        }
        if !payment.is_currency(&self.config.base_currency) {
            return Err(Rejection::UnsupportedCurrency(payment.symbol));
        }
        if !payment.amount.is_positive() {
            return Err(Rejection::InvalidAmount(transfer.amount.clone()));
        }

        let recipient = field_text(&memo.to)
            .or_else(|| field_text(&memo.id))
            .unwrap_or_else(|| transfer.from.clone());

        Ok(PurchaseInstruction {
            symbol,
            recipient,
            payer: transfer.from.clone(),
            payment,
            raw_amount: transfer.amount.clone(),
        })
    }
}
