use core_types::{OrderId, TradeId};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Trade not found: {0}")]
    TradeNotFound(TradeId),

    #[error("Invalid quantity for closing trade. Requested: {requested}, Available: {available}")]
    InvalidClosingQuantity { requested: Decimal, available: Decimal },

    #[error("No price observation has been seen for instrument: {0}")]
    NoPriceData(String),

    #[error("Risk engine error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfig(String),
}
