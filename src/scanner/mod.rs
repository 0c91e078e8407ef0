//! 画像ペアの検出
//!
//! 入力フォルダを再帰的に走査し、`<基本名>-energy.png` と
//! `<基本名>-nutrient.png` を基本名で対にする。片方しかない画像は処理対象外。

use crate::error::{Result, TableAiError};
use food_table_common::{category_from_stem, split_role, TableKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// 検出した画像1枚
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub path: PathBuf,
    pub role: TableKind,
    pub base_name: String,
    pub category: String,
}

impl ImageFile {
    /// 拡張子を除いたファイル名（成果物の命名に使う）
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}{}", self.base_name, self.role.suffix()))
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// data URL 用の MIME タイプ
    pub fn mime_type(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => "image/png",
        }
    }

    fn extension(&self) -> Option<String> {
        self.path.extension().map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// 能量表・栄養素表の画像ペア
#[derive(Debug, Clone)]
pub struct ImagePair {
    pub energy: ImageFile,
    pub nutrient: ImageFile,
    pub base_name: String,
    pub category: String,
}

impl ImagePair {
    pub fn image(&self, kind: TableKind) -> &ImageFile {
        match kind {
            TableKind::Energy => &self.energy,
            TableKind::Nutrient => &self.nutrient,
        }
    }
}

/// 走査結果
#[derive(Debug, Default)]
pub struct ScanResult {
    /// 基本名順
    pub pairs: Vec<ImagePair>,
    /// 対になる画像が見つからなかった画像
    pub unmatched: Vec<PathBuf>,
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// パスから ImageFile を作る。役割サフィックスがなければ None
pub fn classify_image(path: &Path) -> Option<ImageFile> {
    let ext = path.extension()?.to_string_lossy();
    if !is_image_extension(&ext) {
        return None;
    }

    let stem = path.file_stem()?.to_string_lossy();
    let (base_name, role) = split_role(&stem)?;

    Some(ImageFile {
        path: path.to_path_buf(),
        role,
        base_name: base_name.to_string(),
        category: category_from_stem(&stem),
    })
}

/// フォルダを再帰的に走査して画像ペアを返す
pub fn scan_pairs(folder: &Path) -> Result<ScanResult> {
    if !folder.is_dir() {
        return Err(TableAiError::FolderNotFound(folder.display().to_string()));
    }

    let mut slots: BTreeMap<String, (Option<ImageFile>, Option<ImageFile>)> = BTreeMap::new();

    for entry in WalkDir::new(folder)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(image) = classify_image(path) else {
            continue;
        };

        let slot = slots.entry(image.base_name.clone()).or_default();
        let target = match image.role {
            TableKind::Energy => &mut slot.0,
            TableKind::Nutrient => &mut slot.1,
        };
        // 同名が複数あれば後勝ち
        if let Some(previous) = target.replace(image) {
            tracing::warn!(
                base_name = %previous.base_name,
                replaced = %previous.path.display(),
                "同じ基本名の画像が複数あります"
            );
        }
    }

    let mut result = ScanResult::default();
    for (base_name, slot) in slots {
        match slot {
            (Some(energy), Some(nutrient)) => {
                let category = energy.category.clone();
                result.pairs.push(ImagePair {
                    energy,
                    nutrient,
                    base_name,
                    category,
                });
            }
            (Some(single), None) | (None, Some(single)) => {
                tracing::debug!(path = %single.path.display(), "ペアのない画像を除外");
                result.unmatched.push(single.path);
            }
            (None, None) => {}
        }
    }

    Ok(result)
}
