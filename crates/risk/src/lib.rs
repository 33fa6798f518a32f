//! # Margin & Risk Engine
//!
//! Stateless calculators the broker consults before and after every fill:
//!
//! - [`MarginEngine`]: margin required by a candidate order, margin available
//!   on an account, and the closeout plan for a margin call.
//! - [`update_drawdown`]: peak/trough/drawdown bookkeeping on every observation.
//! - [`PositionSizer`]: sizing for orders that omit their size, from a risk
//!   percentage and the distance to stop.
//!
//! The engine never owns account state; it reads and updates the plain
//! `AccountState` and `IsolatedPosition` records handed to it.

pub mod drawdown;
pub mod error;
pub mod margin;
pub mod sizing;

pub use drawdown::update_drawdown;
pub use error::RiskError;
pub use margin::MarginEngine;
pub use sizing::{FixedFractionalSizer, PositionSizer, SizingRequest};
