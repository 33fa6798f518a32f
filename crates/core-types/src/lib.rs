//! # Core Types
//!
//! The shared vocabulary of the virtual broker: price observations, order
//! intents and their validated kinds, trades, isolated positions, netted
//! positions and account figures. Every other crate in the workspace builds
//! on these definitions; this crate depends on nothing local.

pub mod account;
pub mod enums;
pub mod error;
pub mod market;
pub mod order;
pub mod trade;

// Re-export the core types to provide a clean public API.
pub use account::{AccountState, BrokerSnapshot};
pub use enums::{CancelReason, CloseReason, Direction, OrderStatus, OrderType, StopType};
pub use error::CoreError;
pub use market::{Bar, Observation, Quote};
pub use order::{
    Exits, Level, Order, OrderId, OrderIntent, OrderKind, OrderOrigin, StopLossSpec, TradeId,
};
pub use trade::{ClosedTrade, IsolatedPosition, LiveStop, Position, Trade};
