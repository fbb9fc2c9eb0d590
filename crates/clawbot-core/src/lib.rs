//! Clawbot core — conversation types, configuration, session store, and message bus.

pub mod bus;
pub mod config;
pub mod session;
pub mod types;
pub mod utils;
