// ===============================
// src/lib.rs
// ===============================
pub mod config;
pub mod domain;
pub mod ledger;
pub mod metrics;
pub mod reconcile;
pub mod recorder;
pub mod risk;
pub mod session;
pub mod strategy;
pub mod transport;
