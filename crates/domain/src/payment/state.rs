//! Payment status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment as reported by the gateway.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Succeeded ──► Refunded
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

/// How a reported status relates to the status already recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    /// The report advances the payment along the graph.
    Apply,
    /// The payment is already in the reported status (replayed delivery).
    AlreadyApplied,
    /// The reported status lies further down the graph than the next step,
    /// e.g. `refunded` while the payment is still `pending`. The intermediate
    /// event has not arrived yet.
    Premature,
    /// The report would move the payment backwards or sideways, e.g. a
    /// `failed` notification arriving after `succeeded`.
    Stale,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 4] = [
        PaymentStatus::Pending,
        PaymentStatus::Succeeded,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
    ];

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Succeeded) | (Pending, Failed) | (Succeeded, Refunded)
        )
    }

    /// Whether `target` is reachable from here in one or more steps.
    pub fn can_reach(&self, target: PaymentStatus) -> bool {
        self.can_transition_to(target)
            || PaymentStatus::ALL
                .into_iter()
                .any(|next| self.can_transition_to(next) && next.can_reach(target))
    }

    /// `target` itself plus every status that can still reach it.
    pub fn leading_to(target: PaymentStatus) -> Vec<PaymentStatus> {
        PaymentStatus::ALL
            .into_iter()
            .filter(|status| *status == target || status.can_reach(target))
            .collect()
    }

    /// Classifies a reported status against this one.
    pub fn assess(&self, reported: PaymentStatus) -> PaymentTransition {
        if *self == reported {
            PaymentTransition::AlreadyApplied
        } else if self.can_transition_to(reported) {
            PaymentTransition::Apply
        } else if self.can_reach(reported) {
            PaymentTransition::Premature
        } else {
            PaymentTransition::Stale
        }
    }

    pub fn transition_to(&self, next: PaymentStatus) -> Result<PaymentStatus, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidPaymentTransition {
                from: *self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Succeeded => "Succeeded",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::UnknownStatus {
                kind: "payment",
                value: s.to_string(),
            })
    }
}
