//! quantscreen — rule-based stock-selection backtester and rule search.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod cli;
pub mod domain;
pub mod ports;
pub mod adapters;
