//! 1画像ぶんの抽出をリトライ付きで実行する
//!
//! 試行 k（k ≥ 2）の前に `min(unit × 5^(k-1), max_backoff)` 待機する。
//! 上限まで失敗したら隔離ファイルを書き、空の結果を返す（エラーにしない）。

use crate::artifacts::ArtifactDirs;
use crate::config::Config;
use crate::error::{Result, TableAiError};
use crate::extractor::VisionExtractor;
use crate::scanner::ImageFile;
use food_table_common::{parse_table, strip_code_fence, ParseOutcome, Row, Strategy};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// バックオフの底
const BACKOFF_BASE: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub unit: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.max_retries,
            unit: config.backoff_unit(),
            max_backoff: config.max_backoff(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// 試行 `attempt`（1始まり）の前の待機時間。初回は0
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        BACKOFF_BASE
            .checked_pow(attempt - 1)
            .and_then(|factor| self.unit.checked_mul(factor))
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// 1画像の取得結果
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// 成功時の行。隔離時は空
    pub rows: Vec<Row>,
    /// 識別列が欠けていたため採用しなかった行
    pub rejected: Vec<Row>,
    pub attempts: u32,
    /// 実際に待機した時間（試行2以降の前）
    pub backoffs: Vec<Duration>,
    pub quarantined: bool,
    pub strategy: Option<Strategy>,
}

pub struct RetryingFetcher {
    extractor: Arc<dyn VisionExtractor>,
    policy: RetryPolicy,
    request_timeout: Duration,
    dirs: ArtifactDirs,
}

impl RetryingFetcher {
    pub fn new(
        extractor: Arc<dyn VisionExtractor>,
        policy: RetryPolicy,
        request_timeout: Duration,
        dirs: ArtifactDirs,
    ) -> Self {
        Self {
            extractor,
            policy,
            request_timeout,
            dirs,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 画像1枚を取得する。失敗しても `FetchReport` を返す
    pub async fn fetch(&self, image: &ImageFile) -> FetchReport {
        let mut report = FetchReport::default();
        let mut last_error: Option<TableAiError> = None;

        for attempt in 1..=self.policy.max_attempts() {
            if attempt > 1 {
                let wait = self.policy.backoff_for(attempt);
                tracing::warn!(
                    image = %image.file_name(),
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "リトライ待機"
                );
                tokio::time::sleep(wait).await;
                report.backoffs.push(wait);
            }
            report.attempts = attempt;

            let started = Instant::now();
            match self.attempt(image).await {
                Ok(outcome) => {
                    tracing::info!(
                        image = %image.file_name(),
                        strategy = outcome.strategy.name(),
                        rows = outcome.rows.len(),
                        rejected = outcome.rejected.len(),
                        quality = outcome.quality,
                        elapsed_secs = started.elapsed().as_secs_f64(),
                        "抽出完了"
                    );
                    self.clear_quarantine(image).await;
                    report.strategy = Some(outcome.strategy);
                    report.rows = outcome.rows;
                    report.rejected = outcome.rejected;
                    return report;
                }
                Err(e) => {
                    tracing::warn!(
                        image = %image.file_name(),
                        attempt,
                        max_attempts = self.policy.max_attempts(),
                        error = %e,
                        "抽出失敗"
                    );
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "試行なし".to_string());
        self.quarantine(image, &message).await;
        report.quarantined = true;
        report
    }

    /// 1回の試行: 呼び出し → 生レスポンス保存 → 解析
    async fn attempt(&self, image: &ImageFile) -> Result<ParseOutcome> {
        let kind = image.role;
        let response = tokio::time::timeout(self.request_timeout, self.extractor.extract(image, kind))
            .await
            .map_err(|_| {
                TableAiError::Timeout(format!(
                    "{} ({}秒)",
                    image.file_name(),
                    self.request_timeout.as_secs()
                ))
            })??;

        let text = strip_code_fence(&response);
        let log_path = self.dirs.response_log(image);
        if let Err(e) = tokio::fs::write(&log_path, text).await {
            tracing::warn!(path = %log_path.display(), error = %e, "レスポンスログの保存に失敗");
        }

        let outcome = parse_table(text, kind)
            .map_err(|e| TableAiError::Extraction(format!("{}: {}", image.file_name(), e)))?;
        if !outcome.header_matches(kind) {
            tracing::debug!(
                image = %image.file_name(),
                header = ?outcome.header,
                "ヘッダがスキーマと一致しません（位置で束縛）"
            );
        }
        Ok(outcome)
    }

    async fn quarantine(&self, image: &ImageFile, message: &str) {
        let path = self.dirs.quarantine(image);
        let body = format!("Error after {} retries: {}", self.policy.max_retries, message);
        match tokio::fs::write(&path, body).await {
            Ok(()) => tracing::error!(image = %image.file_name(), path = %path.display(), "リトライ上限に達したため隔離"),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "隔離ファイルの保存に失敗"),
        }
    }

    async fn clear_quarantine(&self, image: &ImageFile) {
        let path = self.dirs.quarantine(image);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!(path = %path.display(), "以前の隔離ファイルを削除"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "隔離ファイルの削除に失敗"),
        }
    }
}
