//! Exposure calculator
//!
//! Pure functions over a user's running wagers in one market. Placement
//! runs them twice (before and after a candidate wager) to derive the
//! incremental exposure delta; settlement and reversal run them once to
//! release or re-reserve the capital a market's wagers consume.
//!
//! All figures are `Decimal`; losses are carried as non-positive numbers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Bet, BetSide, MarketCategory};

/// Fixed payout of a wager: the amount credited on a win and the (non-
/// positive) amount debited on a loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Payout {
    pub win: Decimal,
    pub loss: Decimal,
}

/// Net profit/loss a runner's victory would realize for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerPl {
    pub runner_id: Uuid,
    pub pl: Decimal,
}

/// Per-category payout formula.
///
/// * Match-Odds quotes decimal odds: a back wins `stake * (odds - 1)` and
///   risks the stake; a lay wins the stake and risks `stake * (odds - 1)`.
/// * Bookmaker quotes percentage odds; the effective decimal multiplier is
///   `odds/100 + 1`, then the Match-Odds formula applies.
/// * Fancy quotes a score line whose value doubles as a /100 payout rate.
/// * FancyDirect quotes the rate as a direct multiplier.
pub fn potential_payout(
    category: MarketCategory,
    side: BetSide,
    odds: Decimal,
    stake: Decimal,
) -> Payout {
    let unit = match category {
        MarketCategory::MatchOdds => odds - Decimal::ONE,
        MarketCategory::Bookmaker | MarketCategory::Fancy => odds / Decimal::ONE_HUNDRED,
        MarketCategory::FancyDirect => odds,
    };
    match side {
        BetSide::Back => Payout {
            win: stake * unit,
            loss: -stake,
        },
        BetSide::Lay => Payout {
            win: stake,
            loss: -(stake * unit),
        },
    }
}

/// Per-runner net P/L book for a two-outcome market.
///
/// A back wager realizes its win when its own runner wins and its loss when
/// the other runner wins; a lay wager is the mirror image. Void bets are
/// ignored by the callers (they only pass running/settleable wagers).
pub fn runner_book(bets: &[Bet], runner_ids: &[Uuid]) -> Vec<RunnerPl> {
    let mut book: Vec<RunnerPl> = runner_ids
        .iter()
        .map(|&runner_id| RunnerPl {
            runner_id,
            pl: Decimal::ZERO,
        })
        .collect();

    for bet in bets {
        let (own, other) = match bet.side {
            BetSide::Back => (bet.potential_win, bet.potential_loss),
            BetSide::Lay => (bet.potential_loss, bet.potential_win),
        };
        for entry in book.iter_mut() {
            if entry.runner_id == bet.runner_id {
                entry.pl += own;
            } else {
                entry.pl += other;
            }
        }
    }

    book
}

/// Capital a two-outcome book requires: the worst-case net loss across
/// runners, zero when every runner is net-positive (hedged or better).
pub fn multi_runner_required(book: &[RunnerPl]) -> Decimal {
    let worst = book
        .iter()
        .map(|entry| entry.pl)
        .min()
        .unwrap_or(Decimal::ZERO);
    -worst.min(Decimal::ZERO)
}

/// Capital a single-line (fancy) book requires.
///
/// The two settlement outcomes are "score stays under the line" (backs
/// lose, lays win) and "score reaches the line" (backs win, lays lose);
/// only a net loss on either side consumes exposure.
pub fn line_required(bets: &[Bet]) -> Decimal {
    let mut under = Decimal::ZERO;
    let mut over = Decimal::ZERO;
    for bet in bets {
        match bet.side {
            BetSide::Back => {
                under += bet.potential_loss;
                over += bet.potential_win;
            }
            BetSide::Lay => {
                under += bet.potential_win;
                over += bet.potential_loss;
            }
        }
    }
    let worst = under.min(over);
    -worst.min(Decimal::ZERO)
}

/// Category dispatch for the capital a user's wagers in one market require.
pub fn market_required(
    category: MarketCategory,
    bets: &[Bet],
    runner_ids: &[Uuid],
) -> Decimal {
    if category.is_two_outcome() {
        multi_runner_required(&runner_book(bets, runner_ids))
    } else {
        line_required(bets)
    }
}
