//! famledger - family and personal expense tracking
//!
//! This library provides the core of the famledger application: shared and
//! personal expenses, recurring expenses that turn into real ones on
//! schedule, and category budgets that follow approved spending.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and the currency table
//! - `error`: Custom error types
//! - `models`: Core data models (users, families, expenses, templates, budgets)
//! - `storage`: JSON file storage layer with versioned updates
//! - `services`: Business logic layer
//! - `notify`: Budget and approval notifications
//! - `audit`: Audit logging system
//! - `cli`, `display`: Command handlers and terminal formatting
//!
//! # Example
//!
//! ```rust,ignore
//! use famledger::config::LedgerPaths;
//! use famledger::notify::LogNotifier;
//! use famledger::services::RecurringService;
//! use famledger::storage::Storage;
//!
//! let storage = Storage::new(LedgerPaths::new()?)?;
//! storage.load_all()?;
//! let outcomes = RecurringService::new(&storage, &LogNotifier).process_due(chrono::Utc::now())?;
//! ```

pub mod audit;
pub mod cli;
pub mod config;
pub mod display;
pub mod error;
pub mod models;
pub mod notify;
pub mod services;
pub mod storage;

pub use error::{LedgerError, LedgerResult};
