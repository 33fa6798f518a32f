//! # Executor Crate
//!
//! The virtual broker: order book, isolated trades, account ledger and the
//! execution simulator that ties them to incoming price observations.
//!
//! ## Architectural Principles
//!
//! - **State vs. Logic Decoupling:** `BrokerState` holds the books (ledger,
//!   order book, positions); `ExecutionSimulator` holds the rules (pricing,
//!   margin, sizing) and applies each observation to the state.
//! - **Execution Abstraction:** The `Executor` trait prices fills and marks, so
//!   bar-based and quote-based data run through the same matching logic.
//! - **Single Serialization Point:** `VirtualBroker` is the only type that
//!   mutates the books. Shared between bots it lives behind a
//!   `tokio::sync::Mutex` (`SharedBroker`); readers use the `watch` snapshot.
//!
//! ## Public API
//!
//! - `VirtualBroker` / `SharedBroker`: the broker facade.
//! - `Executor`, `SimulatedExecutor`: fill and mark pricing.
//! - `OrderBook`, `PositionManager`, `AccountLedger`: the individual books.
//! - `fifo_reduction`: the policy used by reduce orders.
//! - `ExecutorError`: the error type of this crate.

pub mod broker;
pub mod error;
pub mod exchange;
pub mod ledger;
pub mod order_book;
pub mod positions;
pub mod simulator;

pub use broker::{SharedBroker, VirtualBroker};
pub use error::ExecutorError;
pub use exchange::{Executor, SimulatedExecutor};
pub use ledger::AccountLedger;
pub use order_book::OrderBook;
pub use positions::{fifo_reduction, NewTrade, PositionManager, Reduction};
pub use simulator::{BrokerState, ExecutionSimulator};
