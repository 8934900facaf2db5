//! Contribution settlement engine.
//!
//! Finalizes pooled contributions once their collection window closes:
//! scans for due pools, claims each with a conditional update, splits the
//! total into platform fee and net amount through the shared fee engine,
//! persists a payout, and dispatches the disbursement to the external
//! payment gateway without blocking the batch. Every collected fee lands
//! in an append-only revenue ledger.

pub mod api;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod errors;
pub mod fees;
pub mod gateway;
pub mod models;
pub mod revenue;
pub mod settlement;
