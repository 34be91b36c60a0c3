//! Payment record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PaymentStatus;
use crate::error::DomainError;
use crate::order::{CustomerId, Money};

/// Payment identifier. Always the gateway's payment-intent id; never generated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PaymentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// ISO-4217 style currency code, stored lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_lowercase()))
        } else {
            Err(DomainError::InvalidCurrency(code.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Currency::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns true for payment method labels that take a tokenized card.
pub fn is_card_like(method: &str) -> bool {
    matches!(
        method.trim().to_ascii_lowercase().as_str(),
        "card" | "credit_card" | "debit_card"
    )
}

/// Local record of a gateway payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub customer_id: CustomerId,
    /// Minor currency units.
    pub amount: Money,
    pub currency: Currency,
    pub description: String,
    pub payment_method: String,
    pub status: PaymentStatus,
    /// Gateway timestamp of the newest event applied to this payment.
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A freshly created, pending payment.
    pub fn pending(
        id: PaymentId,
        customer_id: CustomerId,
        amount: Money,
        currency: Currency,
        description: impl Into<String>,
        payment_method: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(amount.cents()));
        }
        Ok(Self {
            id,
            customer_id,
            amount,
            currency,
            description: description.into(),
            payment_method: payment_method.into(),
            status: PaymentStatus::Pending,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// True if an event stamped `event_at` predates the newest event already applied.
    pub fn is_older_than_last_event(&self, event_at: Option<DateTime<Utc>>) -> bool {
        matches!((self.last_event_at, event_at), (Some(last), Some(at)) if at < last)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn payment() -> Payment {
        Payment::pending(
            PaymentId::new("pi_1"),
            CustomerId::new(),
            Money::from_cents(4500),
            Currency::parse("USD").unwrap(),
            "Order 42",
            "card",
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_currency_is_normalised() {
        assert_eq!(Currency::parse(" USD ").unwrap().as_str(), "usd");
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("U$D").is_err());
    }

    #[test]
    fn test_currency_deserialization_validates() {
        assert!(serde_json::from_str::<Currency>("\"eur\"").is_ok());
        assert!(serde_json::from_str::<Currency>("\"euro\"").is_err());
    }

    #[test]
    fn test_card_like_labels() {
        assert!(is_card_like("card"));
        assert!(is_card_like("Credit_Card"));
        assert!(!is_card_like("bank_transfer"));
    }

    #[test]
    fn test_pending_payment_requires_positive_amount() {
        let err = Payment::pending(
            PaymentId::new("pi_2"),
            CustomerId::new(),
            Money::zero(),
            Currency::parse("usd").unwrap(),
            "",
            "card",
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, DomainError::InvalidAmount(0));
    }

    #[test]
    fn test_new_payment_is_pending_with_gateway_id() {
        let payment = payment();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.id.as_str(), "pi_1");
        assert!(payment.last_event_at.is_none());
    }

    #[test]
    fn test_event_ordering_guard() {
        let mut payment = payment();
        let now = Utc::now();
        assert!(!payment.is_older_than_last_event(Some(now)));

        payment.last_event_at = Some(now);
        assert!(payment.is_older_than_last_event(Some(now - Duration::seconds(5))));
        assert!(!payment.is_older_than_last_event(Some(now)));
        assert!(!payment.is_older_than_last_event(None));
    }
}
