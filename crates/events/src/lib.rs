//! # Broker Events
//!
//! The audit vocabulary of the virtual broker. Order book transitions, fills,
//! closes and bot lifecycle changes are all expressed as [`BrokerEvent`]s so
//! that plotting and reporting collaborators can replay a run without
//! touching ledger state.
//!
//! As a Layer 0 crate, it depends only on `core-types`.

// Declare the modules that make up this crate.
pub mod error;
pub mod messages;

// Re-export the core types to provide a clean public API.
pub use error::EventsError;
pub use messages::{BotLifecycle, BotTransition, BrokerEvent, ForcedClosure, OrderTransition};
