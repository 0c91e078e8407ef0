//! カテゴリファイルの二次マージ
//!
//! `beef1.json` `beef2.json` → `beef.json`（連結して食品コード順）、
//! `duck.json` → `duck.json`（ソートしてコピー）。
//! `merged_` で始まるファイルは処理済みとして対象外。

use crate::artifacts::{load_records, save_json, ArtifactDirs};
use crate::error::Result;
use food_table_common::{sort_by_food_code, split_numbered, MergedRecord};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 処理済みファイルの接頭辞
const MERGED_MARKER: &str = "merged_";

/// グループ内の1ファイル
#[derive(Debug, Clone)]
struct Member {
    /// 番号なし（単独ファイル）は None
    number: Option<u64>,
    path: PathBuf,
}

/// 1グループの結果
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub base_category: String,
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub records: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergeSummary {
    pub groups: Vec<GroupResult>,
    /// 読み書きに失敗して出力しなかった基本カテゴリ
    pub failed: Vec<String>,
    pub pruned: Vec<PathBuf>,
}

impl MergeSummary {
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.groups.iter().map(|g| g.output.as_path())
    }
}

pub struct CategoryMerger {
    source: PathBuf,
    output: PathBuf,
    prune: bool,
}

impl CategoryMerger {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            prune: false,
        }
    }

    pub fn from_dirs(dirs: &ArtifactDirs) -> Self {
        Self::new(&dirs.categories, &dirs.output)
    }

    /// マージ後に番号付きファイルを削除する
    pub fn prune_merged(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    pub async fn run(&self) -> Result<MergeSummary> {
        tokio::fs::create_dir_all(&self.output).await?;

        let groups = self.collect_groups().await?;
        let mut summary = MergeSummary::default();

        for (base, mut members) in groups {
            members.sort_by(|a, b| a.number.cmp(&b.number).then_with(|| a.path.cmp(&b.path)));

            match self.merge_group(&base, &members).await {
                Ok(result) => {
                    tracing::info!(
                        category = %base,
                        files = result.sources.len(),
                        records = result.records,
                        output = %result.output.display(),
                        "カテゴリをマージ"
                    );
                    if self.prune {
                        self.prune_members(&members, &mut summary.pruned).await;
                    }
                    summary.groups.push(result);
                }
                Err(e) => {
                    tracing::error!(category = %base, error = %e, "カテゴリのマージに失敗");
                    summary.failed.push(base);
                }
            }
        }

        Ok(summary)
    }

    /// 基本カテゴリごとにファイルをまとめる
    async fn collect_groups(&self) -> Result<BTreeMap<String, Vec<Member>>> {
        let mut groups: BTreeMap<String, Vec<Member>> = BTreeMap::new();
        let mut entries = tokio::fs::read_dir(&self.source).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with(MERGED_MARKER) {
                tracing::debug!(path = %path.display(), "処理済みファイルをスキップ");
                continue;
            }

            let (base, number) = match split_numbered(stem) {
                Some(n) => (n.base.to_string(), Some(n.number)),
                None => (stem.to_string(), None),
            };
            groups.entry(base).or_default().push(Member { number, path });
        }

        Ok(groups)
    }

    async fn merge_group(&self, base: &str, members: &[Member]) -> Result<GroupResult> {
        let mut records: Vec<MergedRecord> = Vec::new();
        let mut sources = Vec::with_capacity(members.len());

        for member in members {
            records.extend(load_records(&member.path).await?);
            sources.push(member.path.clone());
        }
        sort_by_food_code(&mut records);

        let output = self.output.join(format!("{}.json", base));
        save_json(&records, &output).await?;

        Ok(GroupResult {
            base_category: base.to_string(),
            sources,
            output,
            records: records.len(),
        })
    }

    async fn prune_members(&self, members: &[Member], pruned: &mut Vec<PathBuf>) {
        for member in members.iter().filter(|m| m.number.is_some()) {
            match tokio::fs::remove_file(&member.path).await {
                Ok(()) => {
                    tracing::debug!(path = %member.path.display(), "マージ済みファイルを削除");
                    pruned.push(member.path.clone());
                }
                Err(e) => {
                    tracing::warn!(path = %member.path.display(), error = %e, "マージ済みファイルの削除に失敗")
                }
            }
        }
    }
}

/// ディレクトリ内の JSON 配列ファイルを食品コード順に並べ替えて上書きする
///
/// 配列でないファイル・読めないファイルは警告してスキップ。
/// 並べ替えたファイル数を返す。
pub async fn sort_json_files_in_directory(dir: &Path) -> Result<usize> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sorted = 0;
    for path in paths {
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "ファイルを読めません");
                continue;
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "JSONを解析できません");
                continue;
            }
        };
        if !value.is_array() {
            tracing::warn!(path = %path.display(), "配列ではないためスキップ");
            continue;
        }

        let mut records: Vec<MergedRecord> = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "レコード配列ではないためスキップ");
                continue;
            }
        };
        sort_by_food_code(&mut records);
        if let Err(e) = save_json(&records, &path).await {
            tracing::error!(path = %path.display(), error = %e, "書き込みに失敗したためスキップ");
            continue;
        }
        tracing::info!(path = %path.display(), records = records.len(), "並べ替え完了");
        sorted += 1;
    }

    Ok(sorted)
}
