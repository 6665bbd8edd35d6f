//! Configuration module for famledger
//!
//! This module provides configuration management including:
//! - Data directory resolution
//! - User settings persistence
//! - The currency conversion table

pub mod currency;
pub mod paths;
pub mod settings;

pub use currency::{CurrencyInfo, CurrencyTable};
pub use paths::LedgerPaths;
pub use settings::Settings;
