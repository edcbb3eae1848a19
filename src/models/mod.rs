//! Domain model: users and the reseller hierarchy, events/markets/runners,
//! and wagers.

pub mod bet;
pub mod market;
pub mod user;

pub use bet::{Bet, BetSide, OrderStatus, ResultStatus};
pub use market::{Market, MarketCategory, MarketRunner, RunnerStatus, SportEvent};
pub use user::{Role, User};
