//! Wire types shared by every route: the response envelope and money.

use axum::Json;
use common::{Currency, Money};
use rust_decimal::Decimal;
use serde::Serialize;

/// The `{success, data?, message}` body of every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: message.into(),
        })
    }
}

impl Envelope<()> {
    /// A successful response without data.
    pub fn done(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: message.into(),
        })
    }

    pub fn failure(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            data: None,
            message: message.into(),
        })
    }
}

/// A money amount as clients see it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoneyView {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: Currency,
    pub amount_in_cents: i64,
    /// `1 299,99 EUR`
    pub formatted: String,
}

impl From<Money> for MoneyView {
    fn from(money: Money) -> Self {
        Self {
            amount: money.to_decimal(),
            currency: money.currency(),
            amount_in_cents: money.to_minor_units(),
            formatted: money.to_string(),
        }
    }
}

/// Converts a decimal amount from a request body, rounded to cents.
pub fn money(amount: Decimal, currency: Currency) -> Result<Money, crate::error::ApiError> {
    Ok(Money::from_decimal(amount, currency)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_view_shape() {
        let view = MoneyView::from(Money::from_minor_units(129_999, Currency::EUR));
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["amount"], 1299.99);
        assert_eq!(json["currency"], "EUR");
        assert_eq!(json["amountInCents"], 129_999);
        assert_eq!(json["formatted"], "1 299,99 EUR");
    }

    #[test]
    fn failures_carry_no_data() {
        let Json(body) = Envelope::<()>::failure("Token required");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "message": "Token required"}));
    }
}
