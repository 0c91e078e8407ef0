//! ディレクトリ単位の処理パイプライン
//!
//! 走査 → ペアごとのタスク（セマフォで同時実行数を制限）→ 集約タスク
//! → カテゴリ二次マージ。1ペアの失敗は他のペアに影響しない。

mod aggregator;

pub use aggregator::{AggregateReport, Aggregator, PairEvent};

use crate::artifacts::{save_json, ArtifactDirs};
use crate::config::Config;
use crate::error::{Result, TableAiError};
use crate::fetcher::RetryingFetcher;
use crate::merger::{CategoryMerger, MergeSummary};
use crate::progress::ProgressReporter;
use crate::scanner::{scan_pairs, ImagePair, ScanResult};
use food_table_common::{collect_rejected, merge_pair, MergedRecord, TableKind};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_workers: usize,
    /// ペア全体の時間上限（None は無制限）
    pub pair_timeout: Option<Duration>,
    pub prune_merged: bool,
    pub show_progress: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_workers: config.max_workers.max(1),
            pair_timeout: config.pair_timeout(),
            prune_merged: false,
            show_progress: true,
        }
    }
}

/// 1回の実行結果
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pair_count: usize,
    pub unmatched: Vec<PathBuf>,
    pub aggregate: AggregateReport,
    pub merge: MergeSummary,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn success_rate(&self) -> f64 {
        if self.pair_count == 0 {
            0.0
        } else {
            self.aggregate.succeeded.len() as f64 / self.pair_count as f64 * 100.0
        }
    }

    pub fn average_per_pair(&self) -> Duration {
        if self.pair_count == 0 {
            Duration::ZERO
        } else {
            self.elapsed.div_f64(self.pair_count as f64)
        }
    }
}

/// 抽出フェーズの結果（二次マージ前）
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub pair_count: usize,
    pub unmatched: Vec<PathBuf>,
    pub aggregate: AggregateReport,
    started: Instant,
}

pub struct Pipeline {
    fetcher: Arc<RetryingFetcher>,
    dirs: ArtifactDirs,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(fetcher: RetryingFetcher, dirs: ArtifactDirs, options: PipelineOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            dirs,
            options,
        }
    }

    /// 入力ディレクトリを処理して最終成果物まで書き出す
    pub async fn process_directory(&self, input: &Path) -> Result<RunSummary> {
        let scan = scan_pairs(input)?;
        let extraction = self.extract_pairs(scan).await?;
        self.merge_categories(extraction).await
    }

    /// 全ペアを並行に抽出し、ペア・カテゴリ成果物を書き出す
    pub async fn extract_pairs(&self, scan: ScanResult) -> Result<ExtractionReport> {
        let started = Instant::now();
        let pair_count = scan.pairs.len();
        tracing::info!(
            pairs = pair_count,
            unmatched = scan.unmatched.len(),
            workers = self.options.max_workers,
            "抽出開始"
        );

        self.dirs.create_all().await?;

        let reporter = if self.options.show_progress {
            ProgressReporter::new(pair_count as u64 * crate::progress::UNITS_PER_PAIR)
        } else {
            ProgressReporter::hidden()
        };
        let (tx, rx) = mpsc::channel(pair_count.max(1));
        let aggregator = tokio::spawn(Aggregator::new(self.dirs.clone(), pair_count, reporter).run(rx));

        let gate = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut handles = Vec::with_capacity(pair_count);
        for pair in scan.pairs {
            let gate = Arc::clone(&gate);
            let fetcher = Arc::clone(&self.fetcher);
            let dirs = self.dirs.clone();
            let budget = self.options.pair_timeout;
            let tx = tx.clone();
            let base_name = pair.base_name.clone();

            let handle = tokio::spawn(async move {
                let event = match gate.acquire_owned().await {
                    Ok(_permit) => process_pair(&fetcher, &dirs, &pair, budget).await,
                    Err(e) => PairEvent::Failed {
                        base_name: pair.base_name.clone(),
                        reason: e.to_string(),
                    },
                };
                if tx.send(event).await.is_err() {
                    tracing::error!(pair = %pair.base_name, "集約タスクが終了しています");
                }
            });
            handles.push((base_name, handle));
        }

        for (base_name, handle) in handles {
            if let Err(e) = handle.await {
                let event = PairEvent::Failed {
                    base_name,
                    reason: TableAiError::TaskFailed(e.to_string()).to_string(),
                };
                if tx.send(event).await.is_err() {
                    tracing::error!("集約タスクが終了しています");
                }
            }
        }
        drop(tx);

        let aggregate = aggregator
            .await
            .map_err(|e| TableAiError::TaskFailed(format!("集約タスク: {}", e)))?;

        Ok(ExtractionReport {
            pair_count,
            unmatched: scan.unmatched,
            aggregate,
            started,
        })
    }

    /// カテゴリファイルを基本カテゴリ単位でまとめて最終ファイルを書く
    pub async fn merge_categories(&self, extraction: ExtractionReport) -> Result<RunSummary> {
        let merge = CategoryMerger::from_dirs(&self.dirs)
            .prune_merged(self.options.prune_merged)
            .run()
            .await?;

        Ok(RunSummary {
            pair_count: extraction.pair_count,
            unmatched: extraction.unmatched,
            aggregate: extraction.aggregate,
            merge,
            elapsed: extraction.started.elapsed(),
        })
    }
}

/// 1ペアを処理して終了通知を作る。パニック・時間切れも失敗として扱う
async fn process_pair(
    fetcher: &RetryingFetcher,
    dirs: &ArtifactDirs,
    pair: &ImagePair,
    budget: Option<Duration>,
) -> PairEvent {
    tracing::info!(pair = %pair.base_name, category = %pair.category, "ペア処理開始");
    let work = AssertUnwindSafe(run_pair(fetcher, dirs, pair)).catch_unwind();

    let outcome = match budget {
        Some(limit) => match tokio::time::timeout(limit, work).await {
            Ok(outcome) => outcome,
            Err(_) => Ok(Err(TableAiError::Timeout(format!(
                "{} ({}秒)",
                pair.base_name,
                limit.as_secs()
            )))),
        },
        None => work.await,
    };

    match outcome {
        Ok(Ok(records)) => PairEvent::Merged {
            base_name: pair.base_name.clone(),
            category: pair.category.clone(),
            records,
        },
        Ok(Err(e)) => PairEvent::Failed {
            base_name: pair.base_name.clone(),
            reason: e.to_string(),
        },
        Err(panic) => PairEvent::Failed {
            base_name: pair.base_name.clone(),
            reason: TableAiError::TaskFailed(panic_message(panic.as_ref())).to_string(),
        },
    }
}

/// 2画像を同時に取得し、マージしてペア成果物を書く
async fn run_pair(
    fetcher: &RetryingFetcher,
    dirs: &ArtifactDirs,
    pair: &ImagePair,
) -> Result<Vec<MergedRecord>> {
    let (energy, nutrient) = tokio::join!(
        fetcher.fetch(pair.image(TableKind::Energy)),
        fetcher.fetch(pair.image(TableKind::Nutrient))
    );

    let merged = merge_pair(&energy.rows, &nutrient.rows);
    let rejected = collect_rejected(&energy.rejected, &nutrient.rejected);
    for dropped in rejected.iter().chain(&merged.dropped) {
        tracing::warn!(
            pair = %pair.base_name,
            reason = %dropped.reason,
            food_code = dropped.food_code.as_deref().unwrap_or(""),
            food_name = dropped.food_name.as_deref().unwrap_or(""),
            "識別列が欠けたレコードを除外"
        );
    }

    if merged.is_empty() {
        return Err(TableAiError::Extraction(format!(
            "{}: マージ結果が空です",
            pair.base_name
        )));
    }

    let path = dirs.pair_artifact(&pair.base_name);
    save_json(&merged.records, &path).await?;
    Ok(merged.records)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "不明なパニック".to_string())
}
