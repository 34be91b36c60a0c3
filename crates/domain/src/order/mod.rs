//! Order snapshot, value objects and status state machine.

mod model;
mod state;
mod value_objects;

pub use model::{Order, OrderItem, OrderItemId};
pub use state::OrderStatus;
pub use value_objects::{CustomerId, Money, ProductId, ShippingAddress};
