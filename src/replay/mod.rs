//! Daily-cap trade replay.
//!
//! Replays a merged trade stream against a fixed per-trade notional and a
//! daily volume ceiling, over the trailing seven days:
//!
//! 1. stable sort by timestamp (ties keep input order)
//! 2. keep trades strictly newer than `now - 7d`
//! 3. admit each trade unless its UTC day has already reached the cap
//! 4. aggregate per-day buckets into week-level averages
//!
//! The cap is checked before the increment is applied, so a day can close
//! up to one `per_trade` above `max_daily_volume`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

use crate::activity::TradeRecord;

/// Length of the analysis window in days. Also the divisor for daily
/// averages, whether or not every day saw trades.
pub const WINDOW_DAYS: i64 = 7;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Simulation constants for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CapPolicy {
    pub wallet_size: Decimal,
    pub per_trade: Decimal,
    pub max_daily_volume: Decimal,
    pub max_position: Decimal,
}

impl Default for CapPolicy {
    fn default() -> Self {
        Self {
            wallet_size: Decimal::from(50),
            per_trade: Decimal::from(2),
            max_daily_volume: Decimal::from(20),
            max_position: Decimal::from(10),
        }
    }
}

/// Admitted volume and trade count for one UTC day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyBucket {
    pub volume: Decimal,
    pub trades: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The day's volume was already at or above the cap.
    DailyCapReached { volume: Decimal },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    Admitted { volume_after: Decimal },
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Outcome of replaying a single trade.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub timestamp: i64,
    pub participant: String,
    pub date: NaiveDate,
    pub admission: Admission,
}

/// Week-level aggregates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekSummary {
    /// Trades inside the recency window, before admission.
    pub trades_in_window: usize,
    pub simulated_trades: u64,
    pub rejected_trades: usize,
    /// Distinct days with an admitted trade, floored at 1.
    pub days_analyzed: usize,
    pub avg_trades_per_day: Decimal,
    pub avg_daily_volume: Decimal,
    pub days_at_cap: usize,
}

#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub policy: CapPolicy,
    pub cutoff: i64,
    pub buckets: BTreeMap<NaiveDate, DailyBucket>,
    pub summary: WeekSummary,
    /// Populated only when the engine was built with the decision log on.
    pub decisions: Vec<Decision>,
}

/// Stable ascending sort by timestamp over borrowed records.
pub fn sort_chronological(trades: &[TradeRecord]) -> Vec<&TradeRecord> {
    let mut ordered: Vec<&TradeRecord> = trades.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);
    ordered
}

/// Lower bound (exclusive) of the recency window.
pub fn window_cutoff(now: DateTime<Utc>) -> i64 {
    now.timestamp() - WINDOW_DAYS * SECS_PER_DAY
}

/// Keep trades strictly newer than `cutoff`. Order is preserved.
pub fn filter_recent<'a>(trades: &[&'a TradeRecord], cutoff: i64) -> Vec<&'a TradeRecord> {
    trades
        .iter()
        .copied()
        .filter(|t| t.timestamp > cutoff)
        .collect()
}

/// UTC calendar day of a unix timestamp.
pub fn date_key(timestamp: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp(timestamp, 0).map(|dt| dt.date_naive())
}

pub struct ReplayEngine {
    policy: CapPolicy,
    record_decisions: bool,
}

impl ReplayEngine {
    pub fn new(policy: CapPolicy) -> Self {
        Self {
            policy,
            record_decisions: false,
        }
    }

    /// Keep every admission decision in the report.
    pub fn with_decision_log(mut self, enabled: bool) -> Self {
        self.record_decisions = enabled;
        self
    }

    /// Check the day's cap and apply the fixed increment if admitted.
    /// A rejected trade never creates its bucket.
    fn admit(&self, buckets: &mut BTreeMap<NaiveDate, DailyBucket>, date: NaiveDate) -> Admission {
        let current = buckets.get(&date).map(|b| b.volume).unwrap_or_default();
        if current >= self.policy.max_daily_volume {
            return Admission::Rejected(RejectReason::DailyCapReached { volume: current });
        }

        let bucket = buckets.entry(date).or_default();
        bucket.volume += self.policy.per_trade;
        bucket.trades += 1;
        Admission::Admitted {
            volume_after: bucket.volume,
        }
    }

    pub fn run(&self, trades: &[TradeRecord], now: DateTime<Utc>) -> ReplayReport {
        let cutoff = window_cutoff(now);
        let ordered = sort_chronological(trades);
        let recent = filter_recent(&ordered, cutoff);

        let mut buckets: BTreeMap<NaiveDate, DailyBucket> = BTreeMap::new();
        let mut decisions = Vec::new();
        let mut simulated_trades: u64 = 0;

        for trade in &recent {
            let Some(date) = date_key(trade.timestamp) else {
                warn!(
                    participant = %trade.participant,
                    timestamp = trade.timestamp,
                    "timestamp has no calendar date, skipping"
                );
                continue;
            };

            let admission = self.admit(&mut buckets, date);

            if admission.is_admitted() {
                simulated_trades += 1;
            }

            trace!(
                participant = %trade.participant,
                timestamp = trade.timestamp,
                %date,
                admission = ?admission,
                "replay decision"
            );

            if self.record_decisions {
                decisions.push(Decision {
                    timestamp: trade.timestamp,
                    participant: trade.participant.clone(),
                    date,
                    admission,
                });
            }
        }

        let summary = self.summarize(&buckets, recent.len(), simulated_trades);

        debug!(
            input = trades.len(),
            in_window = summary.trades_in_window,
            admitted = summary.simulated_trades,
            days = buckets.len(),
            days_at_cap = summary.days_at_cap,
            "replay complete"
        );

        ReplayReport {
            policy: self.policy.clone(),
            cutoff,
            buckets,
            summary,
            decisions,
        }
    }

    fn summarize(
        &self,
        buckets: &BTreeMap<NaiveDate, DailyBucket>,
        trades_in_window: usize,
        simulated_trades: u64,
    ) -> WeekSummary {
        let avg_trades_per_day = Decimal::from(simulated_trades) / Decimal::from(WINDOW_DAYS);
        let days_at_cap = buckets
            .values()
            .filter(|b| b.volume >= self.policy.max_daily_volume)
            .count();

        WeekSummary {
            trades_in_window,
            simulated_trades,
            rejected_trades: trades_in_window.saturating_sub(simulated_trades as usize),
            days_analyzed: buckets.len().max(1),
            avg_trades_per_day,
            avg_daily_volume: avg_trades_per_day * self.policy.per_trade,
            days_at_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    /// `hours_ago` before the fixed test clock.
    fn trade_at(participant: &str, hours_ago: i64) -> TradeRecord {
        TradeRecord::new(participant, now().timestamp() - hours_ago * 3600)
    }

    fn engine() -> ReplayEngine {
        ReplayEngine::new(CapPolicy::default())
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_cap_boundary_eleven_trades() {
        // 11 trades between 00:00 and 00:10 on 2026-03-15
        let midnight = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap().timestamp();
        let trades: Vec<TradeRecord> = (0..11)
            .map(|i| TradeRecord::new("0xa", midnight + i * 60))
            .collect();

        let report = engine().with_decision_log(true).run(&trades, now());

        let bucket = &report.buckets[&day(15)];
        assert_eq!(bucket.volume, Decimal::from(20));
        assert_eq!(bucket.trades, 10);
        assert_eq!(report.summary.simulated_trades, 10);
        assert_eq!(report.summary.rejected_trades, 1);
        assert_eq!(report.summary.days_at_cap, 1);

        assert!(report.decisions[..10].iter().all(|d| d.admission.is_admitted()));
        assert_eq!(
            report.decisions[10].admission,
            Admission::Rejected(RejectReason::DailyCapReached {
                volume: Decimal::from(20)
            })
        );
    }

    #[test]
    fn test_cap_checked_before_increment() {
        // 19 + 2 = 21: the check sees 19 < 20 and admits.
        let policy = CapPolicy {
            per_trade: Decimal::from(2),
            max_daily_volume: Decimal::from(19),
            ..CapPolicy::default()
        };
        let start = now().timestamp() - 3600;
        let trades: Vec<TradeRecord> = (0..12).map(|i| TradeRecord::new("0xa", start + i)).collect();

        let report = ReplayEngine::new(policy).run(&trades, now());
        let bucket = &report.buckets[&day(15)];
        assert_eq!(bucket.trades, 10);
        assert_eq!(bucket.volume, Decimal::from(20));
        assert_eq!(report.summary.days_at_cap, 1);
    }

    #[test]
    fn test_empty_input() {
        let report = engine().run(&[], now());
        assert!(report.buckets.is_empty());
        assert_eq!(report.summary.trades_in_window, 0);
        assert_eq!(report.summary.simulated_trades, 0);
        assert_eq!(report.summary.avg_trades_per_day, Decimal::ZERO);
        assert_eq!(report.summary.avg_daily_volume, Decimal::ZERO);
        assert_eq!(report.summary.days_at_cap, 0);
        assert_eq!(report.summary.days_analyzed, 1);
    }

    #[test]
    fn test_all_trades_outside_window() {
        let trades = vec![trade_at("0xa", 24 * 8), trade_at("0xb", 24 * 30)];
        let report = engine().run(&trades, now());
        assert_eq!(report.summary.trades_in_window, 0);
        assert_eq!(report.summary.simulated_trades, 0);
        assert_eq!(report.summary.days_at_cap, 0);
    }

    #[test]
    fn test_cutoff_is_exclusive() {
        let cutoff = window_cutoff(now());
        let trades = vec![
            TradeRecord::new("0xa", cutoff),
            TradeRecord::new("0xa", cutoff + 1),
        ];
        let ordered = sort_chronological(&trades);
        let recent = filter_recent(&ordered, cutoff);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].timestamp, cutoff + 1);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let trades: Vec<TradeRecord> = [1, 50, 24 * 7 - 1, 24 * 7, 24 * 7 + 1, 400]
            .iter()
            .map(|h| trade_at("0xa", *h))
            .collect();
        let cutoff = window_cutoff(now());
        let ordered = sort_chronological(&trades);

        let once = filter_recent(&ordered, cutoff);
        let twice = filter_recent(&once, cutoff);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let trades = vec![
            TradeRecord::new("0xb", 500),
            TradeRecord::new("0xa", 100),
            TradeRecord::new("0xc", 500),
        ];
        let ordered: Vec<&str> = sort_chronological(&trades)
            .into_iter()
            .map(|t| t.participant.as_str())
            .collect();
        assert_eq!(ordered, vec!["0xa", "0xb", "0xc"]);
    }

    #[test]
    fn test_order_independence() {
        let mut trades = Vec::new();
        for h in 0..40 {
            trades.push(trade_at("0xa", h * 3));
            trades.push(trade_at("0xb", h * 5));
        }
        let baseline = engine().run(&trades, now());

        let mut reversed = trades.clone();
        reversed.reverse();
        let mut rotated = trades.clone();
        rotated.rotate_left(17);
        let mut interleaved: Vec<TradeRecord> = trades.iter().step_by(2).cloned().collect();
        interleaved.extend(trades.iter().skip(1).step_by(2).cloned());

        for permuted in [reversed, rotated, interleaved] {
            let report = engine().run(&permuted, now());
            assert_eq!(report.buckets, baseline.buckets);
            assert_eq!(report.summary, baseline.summary);
        }
    }

    #[test]
    fn test_later_trades_do_not_affect_earlier_admissions() {
        let midnight = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap().timestamp();
        let early: Vec<TradeRecord> = (0..4)
            .map(|i| TradeRecord::new("0xa", midnight + i * 60))
            .collect();

        let base = engine().with_decision_log(true).run(&early, now());

        let mut extended = early.clone();
        extended.extend((0..20).map(|i| TradeRecord::new("0xb", midnight + 3600 + i * 60)));
        let full = engine().with_decision_log(true).run(&extended, now());

        assert_eq!(&full.decisions[..4], &base.decisions[..]);

        // Once the day is capped nothing else gets in.
        let first_reject = full
            .decisions
            .iter()
            .position(|d| !d.admission.is_admitted())
            .unwrap();
        assert!(full.decisions[first_reject..]
            .iter()
            .all(|d| !d.admission.is_admitted()));
        assert_eq!(full.buckets[&day(14)].trades, 10);
    }

    #[test]
    fn test_average_uses_fixed_window() {
        // 3 trades on a single day: 3/7 per day, not 3/1.
        let trades = vec![trade_at("0xa", 1), trade_at("0xa", 2), trade_at("0xa", 3)];
        let report = engine().run(&trades, now());

        assert_eq!(report.summary.days_analyzed, 1);
        assert_eq!(
            report.summary.avg_trades_per_day,
            Decimal::from(3) / Decimal::from(7)
        );
        assert_eq!(
            report.summary.avg_daily_volume,
            Decimal::from(3) / Decimal::from(7) * Decimal::from(2)
        );
    }

    #[test]
    fn test_buckets_split_on_utc_midnight() {
        let midnight = Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap().timestamp();
        let trades = vec![
            TradeRecord::new("0xa", midnight - 1),
            TradeRecord::new("0xa", midnight),
            TradeRecord::new("0xa", midnight + 1),
        ];
        let report = engine().run(&trades, now());

        assert_eq!(report.buckets.len(), 2);
        assert_eq!(report.buckets[&day(13)].trades, 1);
        assert_eq!(report.buckets[&day(14)].trades, 2);
        assert_eq!(report.summary.days_analyzed, 2);
        assert_eq!(report.summary.days_at_cap, 0);
    }

    #[test]
    fn test_decision_log_off_by_default() {
        let trades = vec![trade_at("0xa", 1)];
        let report = engine().run(&trades, now());
        assert!(report.decisions.is_empty());
        assert_eq!(report.summary.simulated_trades, 1);
    }

    #[test]
    fn test_input_not_mutated() {
        let trades = vec![trade_at("0xa", 1), trade_at("0xb", 5), trade_at("0xc", 3)];
        let before = trades.clone();
        engine().run(&trades, now());
        assert_eq!(trades, before);
    }
}
