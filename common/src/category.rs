//! ファイル名からの名前導出
//!
//! - ペア基本名: `<基本名>-energy` / `<基本名>-nutrient`
//! - カテゴリ: `名前-数字-役割` → 名前、`名前-役割` → 名前、それ以外は stem
//! - 基本カテゴリ: 末尾の数字を除いたカテゴリ名（`beef2` → `beef`）

use crate::types::TableKind;
use regex::Regex;

lazy_static::lazy_static! {
    static ref NUMBERED_ROLE_RE: Regex = Regex::new(r"^(.+?)-[0-9]+-(?:energy|nutrient)$").unwrap();
    static ref ROLE_RE: Regex = Regex::new(r"^(.+?)-(?:energy|nutrient)$").unwrap();
    static ref TRAILING_DIGITS_RE: Regex = Regex::new(r"^(.+?)([0-9]+)$").unwrap();
}

/// stem から役割サフィックスを外して (基本名, 役割) を返す
///
/// # Examples
/// ```
/// use food_table_common::{split_role, TableKind};
///
/// assert_eq!(split_role("beef-1-energy"), Some(("beef-1", TableKind::Energy)));
/// assert_eq!(split_role("beef"), None);
/// ```
pub fn split_role(stem: &str) -> Option<(&str, TableKind)> {
    TableKind::ALL.into_iter().find_map(|kind| {
        stem.strip_suffix(kind.suffix())
            .filter(|base| !base.is_empty())
            .map(|base| (base, kind))
    })
}

/// 画像ファイルの stem からカテゴリを導出
pub fn category_from_stem(stem: &str) -> String {
    for re in [&*NUMBERED_ROLE_RE, &*ROLE_RE] {
        if let Some(name) = re.captures(stem).and_then(|c| c.get(1)) {
            return name.as_str().to_string();
        }
    }
    stem.to_string()
}

/// 末尾に番号を持つ名前の分解結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedName<'a> {
    pub base: &'a str,
    pub number: u64,
}

/// 末尾の数字を分離する。数字がなければ None（単独ファイル）
pub fn split_numbered(name: &str) -> Option<NumberedName<'_>> {
    let caps = TRAILING_DIGITS_RE.captures(name)?;
    let base = caps.get(1)?.as_str();
    let number = caps.get(2)?.as_str().parse().unwrap_or(u64::MAX);
    Some(NumberedName { base, number })
}

/// 基本カテゴリ名
pub fn base_category(name: &str) -> &str {
    split_numbered(name).map(|n| n.base).unwrap_or(name)
}
