// Public API for integration tests and potential library usage

pub mod abuse;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod state;
pub mod store;
pub mod tabulator;
pub mod types;
