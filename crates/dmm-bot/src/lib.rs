//! DEC market-maker settlement agent.
//!
//! Main application that orchestrates all components:
//! - Ledger following with failover across nodes
//! - Payment interpretation and settlement (credit or refund)
//! - Sidechain replenishment of sold inventory
//! - Quote API for conversion rates and the sell book

pub mod app;
pub mod config;
pub mod error;
pub mod quote;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
