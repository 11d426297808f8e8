//! Payments recorded against invoices.

use chrono::{DateTime, Utc};
use common::{InvoiceId, Money, PaymentId, Version};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    #[default]
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(DomainError::validation(format!(
                "Unknown payment status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    BankTransfer,
    Cash,
    Paypal,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "cash" => Ok(PaymentMethod::Cash),
            "paypal" => Ok(PaymentMethod::Paypal),
            "stripe" => Ok(PaymentMethod::Stripe),
            other => Err(DomainError::validation(format!(
                "Unknown payment method: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentParts {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

/// A payment against an invoice. The amount is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    amount: Money,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: Version,
}

impl Payment {
    pub fn new(parts: PaymentParts) -> Result<Self, DomainError> {
        if !parts.amount.is_positive() {
            return Err(DomainError::validation(
                "Payment amount must be greater than zero",
            ));
        }
        Ok(Self {
            id: parts.id,
            invoice_id: parts.invoice_id,
            amount: parts.amount,
            status: parts.status,
            method: parts.method,
            transaction_id: parts.transaction_id,
            payment_date: parts.payment_date,
            notes: parts.notes,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: parts.version,
        })
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Currency;

    fn parts(minor: i64) -> PaymentParts {
        PaymentParts {
            id: PaymentId::new(),
            invoice_id: InvoiceId::new(),
            amount: Money::from_minor_units(minor, Currency::EUR),
            status: PaymentStatus::default(),
            method: PaymentMethod::CreditCard,
            transaction_id: Some("txn_123".into()),
            payment_date: Utc::now(),
            notes: None,
            created_at: Utc::now(),
            updated_at: None,
            version: Version::first(),
        }
    }

    #[test]
    fn amount_must_be_positive() {
        assert!(Payment::new(parts(0)).is_err());
        assert!(Payment::new(parts(-100)).is_err());
        assert_eq!(Payment::new(parts(100)).unwrap().amount().to_minor_units(), 100);
    }

    #[test]
    fn method_uses_snake_case() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        assert_eq!(
            "credit_card".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::CreditCard
        );
    }

    #[test]
    fn status_defaults_to_completed() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Completed);
        assert!("bounced".parse::<PaymentStatus>().is_err());
    }
}
