//! 進捗集計と表示
//!
//! 単位は画像1枚（1ペア = 2単位）。集計はアグリゲータタスクだけが更新する。

use chrono::{DateTime, Local, TimeDelta};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// 1ペアあたりの単位数
pub const UNITS_PER_PAIR: u64 = 2;

#[derive(Debug, Clone)]
pub struct ProcessingStats {
    total_units: u64,
    processed: u64,
    failed: u64,
    started: Instant,
}

impl ProcessingStats {
    pub fn new(pair_count: usize) -> Self {
        Self {
            total_units: pair_count as u64 * UNITS_PER_PAIR,
            processed: 0,
            failed: 0,
            started: Instant::now(),
        }
    }

    pub fn record_success(&mut self) {
        self.processed += UNITS_PER_PAIR;
    }

    pub fn record_failure(&mut self) {
        self.processed += UNITS_PER_PAIR;
        self.failed += UNITS_PER_PAIR;
    }

    pub fn total_units(&self) -> u64 {
        self.total_units
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(self.elapsed())
    }

    /// 経過時間を与えて進捗を計算する
    pub fn snapshot_at(&self, elapsed: Duration) -> ProgressSnapshot {
        let percent = if self.total_units == 0 {
            0.0
        } else {
            self.processed as f64 / self.total_units as f64 * 100.0
        };
        let avg_per_unit = if self.processed == 0 {
            Duration::ZERO
        } else {
            elapsed.div_f64(self.processed as f64)
        };
        let left = self.total_units.saturating_sub(self.processed);
        let remaining = avg_per_unit.mul_f64(left as f64);
        let success_rate = if self.processed == 0 {
            0.0
        } else {
            (self.processed - self.failed) as f64 / self.processed as f64 * 100.0
        };

        ProgressSnapshot {
            processed: self.processed,
            total: self.total_units,
            percent,
            elapsed,
            avg_per_unit,
            remaining,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
    pub elapsed: Duration,
    pub avg_per_unit: Duration,
    pub remaining: Duration,
    /// 成功率（%）
    pub success_rate: f64,
}

impl ProgressSnapshot {
    /// 完了予定時刻
    pub fn eta_from(&self, now: DateTime<Local>) -> DateTime<Local> {
        TimeDelta::from_std(self.remaining)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(now)
    }
}

/// 進捗バー + ログ行
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total_units: u64) -> Self {
        let bar = ProgressBar::new(total_units);
        bar.set_style(
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} 枚 [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    /// 表示なし（テスト・非対話環境用）
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// ペア完了ごとに呼ぶ。失敗しない
    pub fn report(&self, stats: &ProcessingStats) {
        let snap = stats.snapshot();
        let eta = snap.eta_from(Local::now()).format("%H:%M:%S").to_string();
        let percent = format!("{:.1}", snap.percent);
        let success_rate = format!("{:.1}", snap.success_rate);

        tracing::info!(
            processed = snap.processed,
            total = snap.total,
            percent = %percent,
            elapsed_secs = snap.elapsed.as_secs(),
            avg_secs = snap.avg_per_unit.as_secs_f64(),
            remaining_secs = snap.remaining.as_secs(),
            eta = %eta,
            success_rate = %success_rate,
            "進捗"
        );

        self.bar.set_position(snap.processed);
        self.bar.set_message(format!(
            "成功率 {}% / 残り {}秒 / 完了予定 {}",
            success_rate,
            snap.remaining.as_secs(),
            eta
        ));
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_counts_two_units_per_pair() {
        let mut stats = ProcessingStats::new(3);
        stats.record_success();
        stats.record_failure();

        assert_eq!(stats.total_units(), 6);
        assert_eq!(stats.processed(), 4);
        assert_eq!(stats.failed(), 2);
    }

    #[test]
    fn test_snapshot_math() {
        let mut stats = ProcessingStats::new(4);
        stats.record_success();
        stats.record_failure();

        let snap = stats.snapshot_at(Duration::from_secs(40));
        assert_eq!(snap.percent, 50.0);
        assert_eq!(snap.avg_per_unit, Duration::from_secs(10));
        assert_eq!(snap.remaining, Duration::from_secs(40));
        assert_eq!(snap.success_rate, 50.0);
    }

    #[test]
    fn test_snapshot_before_any_completion() {
        let stats = ProcessingStats::new(0);
        let snap = stats.snapshot_at(Duration::from_secs(5));
        assert_eq!(snap.percent, 0.0);
        assert_eq!(snap.avg_per_unit, Duration::ZERO);
        assert_eq!(snap.remaining, Duration::ZERO);
        assert_eq!(snap.success_rate, 0.0);
    }

    #[test]
    fn test_eta() {
        let snap = ProgressSnapshot {
            processed: 2,
            total: 4,
            percent: 50.0,
            elapsed: Duration::from_secs(20),
            avg_per_unit: Duration::from_secs(10),
            remaining: Duration::from_secs(90),
            success_rate: 100.0,
        };
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(snap.eta_from(now).format("%H:%M:%S").to_string(), "12:01:30");
    }

    #[test]
    fn test_hidden_reporter_never_fails() {
        let mut stats = ProcessingStats::new(1);
        let reporter = ProgressReporter::hidden();
        reporter.report(&stats);
        stats.record_failure();
        reporter.report(&stats);
        reporter.finish();
    }
}
