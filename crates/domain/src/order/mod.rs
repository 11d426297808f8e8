//! Orders, order lines and the order status machine.

mod aggregate;
mod state;

pub use aggregate::{Order, OrderItem, OrderParts};
pub use state::OrderStatus;
