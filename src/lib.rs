//! Exchange betting engine.
//!
//! The core of a sports betting exchange backend: wager placement with
//! price verification against a live odds feed, worst-case exposure
//! accounting, market settlement by declared winner or score, full
//! settlement reversal, and the profit/loss cascade up the reseller
//! hierarchy.
//!
//! [`ExchangeEngine`] is the single entry point. It is storage- and
//! transport-agnostic: persistence sits behind [`store::LedgerStore`],
//! prices behind [`feed::OddsFeed`] and push updates behind
//! [`notify::NotificationSink`]. [`store::MemoryLedger`] and
//! [`notify::BroadcastSink`] are the in-process implementations used by
//! the test suite and local deployments.
//!
//! ```no_run
//! use std::sync::Arc;
//! use betx_engine::{ExchangeEngine, EngineConfig, MemoryLedger, BroadcastSink};
//! # use betx_engine::feed::OddsFeed;
//! # fn feed() -> Arc<dyn OddsFeed> { unimplemented!() }
//!
//! let config = EngineConfig::default();
//! let store = Arc::new(MemoryLedger::new());
//! let sink = Arc::new(BroadcastSink::from_config(&config));
//! let engine = ExchangeEngine::new(store, feed(), sink, config);
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod models;
pub mod notify;
pub mod services;
pub mod store;

pub use config::EngineConfig;
pub use error::EngineError;
pub use models::{Bet, BetSide, Market, MarketCategory, MarketRunner, Role, SportEvent, User};
pub use notify::{BroadcastSink, EventBetSnapshot, UserSnapshot};
pub use services::exposure::RunnerPl;
pub use services::placement::PlaceBetRequest;
pub use services::ExchangeEngine;
pub use store::{LedgerStore, MemoryLedger};
