//! Quickplay client - finds a good community server and joins it

pub mod config;
pub mod matchmaking;
pub mod transport;
pub mod util;
