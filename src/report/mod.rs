//! Console rendering of a replay.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::replay::{ReplayReport, WINDOW_DAYS};

/// Round half away from zero for display (`0.5714` -> `0.6`, `1.425` -> `1.43`).
fn display_round(d: Decimal, dp: u32) -> Decimal {
    d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Render the summary printed at the end of a run.
pub fn render(report: &ReplayReport, participants: usize) -> String {
    let policy = &report.policy;
    let summary = &report.summary;
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!(
        "\nAnalyzing {} trades from last {} days across {} traders...",
        summary.trades_in_window, WINDOW_DAYS, participants
    ));

    lines.push("\n--- SIMULATION SETTINGS ---".to_string());
    lines.push(format!("Wallet:         ${:.2}", display_round(policy.wallet_size, 2)));
    lines.push(format!("Per trade:      ${:.2}", display_round(policy.per_trade, 2)));
    lines.push(format!("Daily cap:      ${:.2}", display_round(policy.max_daily_volume, 2)));
    lines.push(format!("Max position:   ${:.2}", display_round(policy.max_position, 2)));

    lines.push(format!(
        "\n--- ESTIMATED PERFORMANCE (Based on last {} days) ---",
        WINDOW_DAYS
    ));
    lines.push(format!(
        "Avg Bot Trades/Day: {:.1}",
        display_round(summary.avg_trades_per_day, 1)
    ));
    lines.push(format!(
        "Avg Daily Volume: ${:.2}",
        display_round(summary.avg_daily_volume, 2)
    ));
    lines.push(format!(
        "Simulated trades: {} admitted, {} skipped at cap",
        summary.simulated_trades, summary.rejected_trades
    ));

    if !report.buckets.is_empty() {
        lines.push("\n--- DAILY BREAKDOWN ---".to_string());
        for (date, bucket) in &report.buckets {
            let marker = if bucket.volume >= policy.max_daily_volume {
                "  [CAP]"
            } else {
                ""
            };
            lines.push(format!(
                "{}  {:>3} trades  ${:>7.2}{}",
                date.format("%Y-%m-%d"),
                bucket.trades,
                display_round(bucket.volume, 2),
                marker
            ));
        }
    }

    lines.push("\n--- CONSTRAINTS HIT ---".to_string());
    lines.push(format!(
        "Daily Limit (${}) would be hit on {} of {} days.",
        policy.max_daily_volume.normalize(),
        summary.days_at_cap,
        WINDOW_DAYS
    ));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
