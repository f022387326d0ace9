//! Breakout alerts.
//!
//! Alerts are best effort: a failed delivery is logged by the caller and
//! never retried, and never affects the recorded event.

pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::IndicatorSnapshot;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Plain-text alert for a freshly recorded breakout.
///
/// The indicator lines come from the timeframe that supplied the breakout
/// price and are left out when no snapshot is available.
pub fn format_alert(symbol: &str, price: f64, snapshot: Option<&IndicatorSnapshot>) -> String {
    let mut text = format!("{symbol} breakout!\nPrice: {price}\nCheck Kraken for details.");
    if let Some(s) = snapshot {
        text.push_str(&format!(
            "\n\nRSI: {:.2}\nMA20: {:.2}, MA50: {:.2}\n% off high: {:.2}%",
            s.rsi,
            s.short_ma,
            s.long_ma,
            s.percent_off_high()
        ));
    }
    text
}
