//! Outcome statistics over the ledger.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::Event;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    pub total: usize,
    pub pending: usize,
    pub resolved: usize,
    /// Resolved above entry.
    pub winners: usize,
    /// Resolved below entry.
    pub losers: usize,
    pub target_reached: usize,
    pub stopped_out: usize,
    /// Winners over resolved events, in percent.
    pub win_rate_pct: Option<Decimal>,
    pub mean_return_pct: Option<Decimal>,
}

impl LedgerSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut summary = LedgerSummary::default();
        let mut return_sum = Decimal::ZERO;
        let mut return_count = 0u32;

        for event in events {
            summary.total += 1;
            let Some(price) = event.outcome.price() else {
                summary.pending += 1;
                continue;
            };
            summary.resolved += 1;
            if price > event.entry_price {
                summary.winners += 1;
            } else if price < event.entry_price {
                summary.losers += 1;
            }
            if price >= event.target_price {
                summary.target_reached += 1;
            }
            if price <= event.stop_loss {
                summary.stopped_out += 1;
            }
            if let Some(r) = event.return_pct() {
                return_sum += r;
                return_count += 1;
            }
        }

        if summary.resolved > 0 {
            summary.win_rate_pct = Some(
                (Decimal::from(summary.winners as u64) / Decimal::from(summary.resolved as u64)
                    * Decimal::ONE_HUNDRED)
                    .round_dp(2),
            );
        }
        if return_count > 0 {
            summary.mean_return_pct = Some((return_sum / Decimal::from(return_count)).round_dp(4));
        }
        summary
    }
}
