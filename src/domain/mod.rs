//! Core domain types and logic.

pub mod price;
pub mod order;
pub mod tranche;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod allocation;
pub mod trading_model;
pub mod momentum;
pub mod filter;
pub mod stock_picker;
pub mod metrics;
pub mod universe;
pub mod runner;
pub mod config_validation;
pub mod error;
