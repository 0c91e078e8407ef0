//! 中間・最終成果物の配置と JSON 入出力
//!
//! ```text
//! <temp>/responses/<画像stem>_response.md   生レスポンス（デバッグ用）
//! <temp>/failed/<画像stem>_error.txt        リトライ上限後の隔離記録
//! <temp>/failed/failed_pairs.txt            失敗ペアの基本名一覧
//! <temp>/pairs/<基本名>.json                ペアごとのマージ結果
//! <temp>/categories/<カテゴリ>.json         カテゴリごとの蓄積結果
//! <output>/<基本カテゴリ>.json              最終成果物（食品コード順）
//! ```

use crate::error::Result;
use crate::scanner::ImageFile;
use food_table_common::MergedRecord;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    pub responses: PathBuf,
    pub failed: PathBuf,
    pub pairs: PathBuf,
    pub categories: PathBuf,
    pub output: PathBuf,
}

impl ArtifactDirs {
    pub fn new(temp_dir: &Path, output_dir: &Path) -> Self {
        Self {
            responses: temp_dir.join("responses"),
            failed: temp_dir.join("failed"),
            pairs: temp_dir.join("pairs"),
            categories: temp_dir.join("categories"),
            output: output_dir.to_path_buf(),
        }
    }

    pub async fn create_all(&self) -> Result<()> {
        for dir in [
            &self.responses,
            &self.failed,
            &self.pairs,
            &self.categories,
            &self.output,
        ] {
            tokio::fs::create_dir_all(dir).await?;
        }
        Ok(())
    }

    pub fn response_log(&self, image: &ImageFile) -> PathBuf {
        self.responses.join(format!("{}_response.md", image.stem()))
    }

    pub fn quarantine(&self, image: &ImageFile) -> PathBuf {
        self.failed.join(format!("{}_error.txt", image.stem()))
    }

    pub fn failed_pairs_list(&self) -> PathBuf {
        self.failed.join("failed_pairs.txt")
    }

    pub fn pair_artifact(&self, base_name: &str) -> PathBuf {
        self.pairs.join(format!("{}.json", base_name))
    }

    pub fn category_artifact(&self, category: &str) -> PathBuf {
        self.categories.join(format!("{}.json", category))
    }

    pub fn final_artifact(&self, base_category: &str) -> PathBuf {
        self.output.join(format!("{}.json", base_category))
    }
}

/// レコード配列を整形 JSON で保存（非ASCIIはそのまま）
pub async fn save_json(records: &[MergedRecord], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    tokio::fs::write(path, json).await?;
    tracing::debug!(path = %path.display(), count = records.len(), "JSONを保存");
    Ok(())
}

/// レコード配列を読み込み
pub async fn load_records(path: &Path) -> Result<Vec<MergedRecord>> {
    let content = tokio::fs::read_to_string(path).await?;
    let records: Vec<MergedRecord> = serde_json::from_str(&content)?;
    Ok(records)
}
