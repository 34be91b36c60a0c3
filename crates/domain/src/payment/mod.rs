//! Payment records and the payment status state machine.

mod model;
mod state;

pub use model::{Currency, Payment, PaymentId, is_card_like};
pub use state::{PaymentStatus, PaymentTransition};
