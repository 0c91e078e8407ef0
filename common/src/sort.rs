//! 食品コード順ソート
//!
//! ソートキー:
//! - 数字のみ: (数値, "")
//! - 数字 + 英字: (数字部分, 英字部分)  例: "124201x" → (124201, "x")
//! - それ以外: (0, 元の文字列)
//!
//! 数値は桁数の制限なく比較する。

use crate::types::{MergedRecord, FOOD_CODE};
use regex::Regex;
use std::borrow::Cow;

lazy_static::lazy_static! {
    static ref CODE_PREFIX_RE: Regex = Regex::new(r"^([0-9]+)([a-zA-Z]*)").unwrap();
}

/// 食品コードのソートキー（数値 → 接尾辞の辞書順）
///
/// 数値部分は先頭の0を除いた桁列で持ち、(桁数, 桁列) で比較するので
/// 桁数に上限はない。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FoodCodeKey {
    width: usize,
    digits: String,
    suffix: String,
}

impl FoodCodeKey {
    fn new(digits: &str, suffix: &str) -> Self {
        let digits = digits.trim_start_matches('0');
        Self {
            width: digits.len(),
            digits: digits.to_string(),
            suffix: suffix.to_string(),
        }
    }
}

/// 食品コードからソートキーを作る
pub fn food_code_key(code: &str) -> FoodCodeKey {
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) {
        return FoodCodeKey::new(code, "");
    }

    if let Some(caps) = CODE_PREFIX_RE.captures(code) {
        if let (Some(digits), Some(letters)) = (caps.get(1), caps.get(2)) {
            return FoodCodeKey::new(digits.as_str(), letters.as_str());
        }
    }

    FoodCodeKey::new("0", code)
}

/// レコードを食品コード昇順に並べ替える（安定ソート）
///
/// foodCode のないレコードは "0" として扱う。数値で保存された foodCode も
/// 同じ規則で比較する。
pub fn sort_by_food_code(records: &mut [MergedRecord]) {
    records.sort_by_cached_key(|r| {
        food_code_key(&r.text(FOOD_CODE).unwrap_or(Cow::Borrowed("0")))
    });
}
