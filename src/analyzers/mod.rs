//! Flow aggregation, availability reconstruction and fill-level search.
//!
//! This module turns trip records into hourly flows per station, integrates
//! them into availability trajectories, searches the initial fill level that
//! keeps a station away from both empty and full, and compares simulated
//! availability with the trajectories of held-out data.

pub mod flow;
pub mod optimals;
pub mod search;
pub mod trajectory;
pub mod types;
pub mod utility;
pub mod validate;
