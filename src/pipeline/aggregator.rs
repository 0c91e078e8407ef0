//! カテゴリ集約タスク
//!
//! ペアタスクからの `PairEvent` を受け取り、カテゴリごとのバケツと
//! 進捗集計を単独で保持する。チャネルが閉じたらカテゴリを書き出す。

use crate::artifacts::{save_json, ArtifactDirs};
use crate::progress::{ProcessingStats, ProgressReporter};
use food_table_common::MergedRecord;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// ペア処理の終了通知
#[derive(Debug, Clone)]
pub enum PairEvent {
    Merged {
        base_name: String,
        category: String,
        records: Vec<MergedRecord>,
    },
    Failed {
        base_name: String,
        reason: String,
    },
}

/// 集約結果
#[derive(Debug, Clone)]
pub struct AggregateReport {
    pub succeeded: Vec<String>,
    /// 失敗ペアの基本名（ソート済み）
    pub failed: Vec<String>,
    pub stats: ProcessingStats,
    /// 書き出したカテゴリファイル
    pub category_files: Vec<PathBuf>,
    /// 失敗ペア一覧ファイル（失敗がなければ None）
    pub failed_list: Option<PathBuf>,
}

pub struct Aggregator {
    dirs: ArtifactDirs,
    categories: BTreeMap<String, Vec<MergedRecord>>,
    succeeded: Vec<String>,
    failed: Vec<String>,
    stats: ProcessingStats,
    reporter: ProgressReporter,
}

impl Aggregator {
    pub fn new(dirs: ArtifactDirs, pair_count: usize, reporter: ProgressReporter) -> Self {
        Self {
            dirs,
            categories: BTreeMap::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
            stats: ProcessingStats::new(pair_count),
            reporter,
        }
    }

    /// チャネルが閉じるまで受信し、最後に書き出す
    pub async fn run(mut self, mut rx: mpsc::Receiver<PairEvent>) -> AggregateReport {
        while let Some(event) = rx.recv().await {
            self.record(event);
        }
        self.finish().await
    }

    pub fn record(&mut self, event: PairEvent) {
        match event {
            PairEvent::Merged {
                base_name,
                category,
                records,
            } => {
                tracing::info!(pair = %base_name, category = %category, records = records.len(), "ペア完了");
                self.categories.entry(category).or_default().extend(records);
                self.succeeded.push(base_name);
                self.stats.record_success();
            }
            PairEvent::Failed { base_name, reason } => {
                tracing::error!(pair = %base_name, reason = %reason, "ペア失敗");
                self.failed.push(base_name);
                self.stats.record_failure();
            }
        }
        self.reporter.report(&self.stats);
    }

    pub async fn finish(mut self) -> AggregateReport {
        self.reporter.finish();

        let mut category_files = Vec::new();
        for (category, records) in &self.categories {
            if records.is_empty() {
                continue;
            }
            let path = self.dirs.category_artifact(category);
            match save_json(records, &path).await {
                Ok(()) => {
                    tracing::info!(category = %category, records = records.len(), "カテゴリを保存");
                    category_files.push(path);
                }
                Err(e) => tracing::error!(path = %path.display(), error = %e, "カテゴリの保存に失敗"),
            }
        }

        self.failed.sort();
        let failed_list = if self.failed.is_empty() {
            None
        } else {
            let path = self.dirs.failed_pairs_list();
            let body = self.failed.join("\n") + "\n";
            match tokio::fs::write(&path, body).await {
                Ok(()) => Some(path),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "失敗ペア一覧の保存に失敗");
                    None
                }
            }
        };

        AggregateReport {
            succeeded: self.succeeded,
            failed: self.failed,
            stats: self.stats,
            category_files,
            failed_list,
        }
    }
}
