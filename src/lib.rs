//! Weekly activity estimate for Polymarket traders under a daily volume cap.
//!
//! `activity` pulls each trader's recent trades from the Data API, `replay`
//! runs them through the cap simulation, and `report` renders the result.

pub mod activity;
pub mod config;
pub mod replay;
pub mod report;
