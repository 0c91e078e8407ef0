//! 能量表・栄養素表のマージ
//!
//! 同じ画像ペアから得た2つの行集合を食品コードで突き合わせ、
//! MergedRecord を生成する。
//!
//! - 能量側の行から能量スキーマの列を採用
//! - 栄養素側の行から栄養素スキーマの列を上書き（識別列は除く）
//! - 識別列が欠けていれば栄養素側から補完
//! - それでも欠けるレコードは `dropped` に回す

use crate::types::{MergedRecord, Row, FOOD_CODE, FOOD_NAME};
use std::collections::{HashMap, HashSet};

/// レコードを捨てた理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingFoodCode,
    MissingFoodName,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingFoodCode => write!(f, "foodCodeなし"),
            DropReason::MissingFoodName => write!(f, "foodNameなし"),
        }
    }
}

/// 捨てたレコード（呼び出し側で1件につき1回警告する）
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedRecord {
    pub reason: DropReason,
    pub food_code: Option<String>,
    pub food_name: Option<String>,
}

impl DroppedRecord {
    /// 識別列が欠けた行から作る
    pub fn from_row(row: &Row) -> Self {
        let reason = if row.food_code().is_none() {
            DropReason::MissingFoodCode
        } else {
            DropReason::MissingFoodName
        };
        Self {
            reason,
            food_code: row.food_code().map(str::to_string),
            food_name: row.food_name().map(str::to_string),
        }
    }
}

/// 両側のパーサーが捨てた行をまとめる
///
/// 同じ行が両側にあれば1件として数える（片側内の重複はそのまま残す）。
pub fn collect_rejected(energy: &[Row], nutrient: &[Row]) -> Vec<DroppedRecord> {
    let mut dropped: Vec<DroppedRecord> = energy.iter().map(DroppedRecord::from_row).collect();
    let mut matched = vec![false; dropped.len()];
    for record in nutrient.iter().map(DroppedRecord::from_row) {
        let twin = dropped
            .iter()
            .zip(matched.iter())
            .position(|(d, used)| !used && *d == record);
        match twin {
            Some(i) => matched[i] = true,
            None => dropped.push(record),
        }
    }
    dropped
}

/// 1ペア分のマージ結果
#[derive(Debug, Clone, Default)]
pub struct PairMerge {
    /// 食品コードの初出順（能量側 → 栄養素側のみのコード）
    pub records: Vec<MergedRecord>,
    pub dropped: Vec<DroppedRecord>,
}

impl PairMerge {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn drop_unkeyed(rows: &[Row], dropped: &mut Vec<DroppedRecord>) {
    dropped.extend(
        rows.iter()
            .filter(|r| r.food_code().is_none())
            .map(DroppedRecord::from_row),
    );
}

/// 食品コード → 行のマップを作り、初出順を `order` に記録する
fn index_rows<'a>(
    rows: &'a [Row],
    seen: &mut HashSet<&'a str>,
    order: &mut Vec<&'a str>,
) -> HashMap<&'a str, &'a Row> {
    let mut map = HashMap::new();
    for row in rows {
        let Some(code) = row.food_code() else {
            continue;
        };
        if seen.insert(code) {
            order.push(code);
        }
        map.insert(code, row);
    }
    map
}

/// 能量表と栄養素表の行をマージ
///
/// 同一側で食品コードが重複した場合は後の行が優先される。
pub fn merge_pair(energy: &[Row], nutrient: &[Row]) -> PairMerge {
    let mut result = PairMerge::default();
    if energy.is_empty() && nutrient.is_empty() {
        return result;
    }

    drop_unkeyed(energy, &mut result.dropped);
    drop_unkeyed(nutrient, &mut result.dropped);

    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let energy_map = index_rows(energy, &mut seen, &mut order);
    let nutrient_map = index_rows(nutrient, &mut seen, &mut order);

    for code in order {
        let energy_row = energy_map.get(code);
        let nutrient_row = nutrient_map.get(code);
        let mut record = MergedRecord::new();

        if let Some(row) = energy_row {
            for (field, value) in row.iter() {
                record.set(field, value);
            }
        }

        if let Some(row) = nutrient_row {
            for (field, value) in row.iter() {
                if field != FOOD_CODE && field != FOOD_NAME {
                    record.set(field, value);
                }
            }

            // 識別列の補完
            if record.food_code().is_none() {
                if let Some(v) = row.food_code() {
                    record.set(FOOD_CODE, v);
                }
            }
            if record.food_name().is_none() {
                if let Some(v) = row.food_name() {
                    record.set(FOOD_NAME, v);
                }
            }
        }

        if record.is_identified() {
            result.records.push(record);
        } else {
            let reason = if record.food_code().is_none() {
                DropReason::MissingFoodCode
            } else {
                DropReason::MissingFoodName
            };
            result.dropped.push(DroppedRecord {
                reason,
                food_code: record.food_code().map(str::to_string),
                food_name: record.food_name().map(str::to_string),
            });
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableKind;

    fn row(kind: TableKind, cells: &[&str]) -> Row {
        let mut row = Row::new(kind);
        for (i, cell) in cells.iter().enumerate() {
            row.set(i, *cell);
        }
        row
    }

    #[test]
    fn test_merge_both_sides() {
        let energy = vec![row(TableKind::Energy, &["121101", "白条鱼", "66", "77.9"])];
        let nutrient = vec![row(TableKind::Nutrient, &["121101", "白条鱼（裸鱼）", "2.7", "Tr"])];

        let merged = merge_pair(&energy, &nutrient);
        assert_eq!(merged.records.len(), 1);
        assert!(merged.dropped.is_empty());

        let record = &merged.records[0];
        assert_eq!(record.get("foodCode"), Some("121101"));
        // 食品名は能量側を優先
        assert_eq!(record.get("foodName"), Some("白条鱼"));
        assert_eq!(record.get("edible"), Some("66"));
        assert_eq!(record.get("niacin"), Some("2.7"));
        assert_eq!(record.get("vitaminC"), Some("Tr"));
    }

    #[test]
    fn test_merge_with_empty_nutrient_side() {
        let energy = vec![
            row(TableKind::Energy, &["1", "米", "100"]),
            row(TableKind::Energy, &["2", "麦", "100"]),
        ];

        let merged = merge_pair(&energy, &[]);
        assert_eq!(merged.records.len(), 2);
        for record in &merged.records {
            assert!(record.is_identified());
            assert!(record.iter().all(|(f, _)| TableKind::Energy.index_of(f).is_some()));
        }
    }

    #[test]
    fn test_merge_nutrient_only_code_backfills_identity() {
        let energy = vec![row(TableKind::Energy, &["1", "米"])];
        let nutrient = vec![
            row(TableKind::Nutrient, &["1", "米", "5"]),
            row(TableKind::Nutrient, &["2", "麦", "6"]),
        ];

        let merged = merge_pair(&energy, &nutrient);
        let codes: Vec<_> = merged.records.iter().filter_map(|r| r.food_code()).collect();
        assert_eq!(codes, vec!["1", "2"]);

        let second = &merged.records[1];
        assert_eq!(second.food_name(), Some("麦"));
        assert_eq!(second.get("niacin"), Some("6"));
        assert_eq!(second.get("edible"), None);
    }

    #[test]
    fn test_merge_drops_row_without_code_once() {
        let energy = vec![
            row(TableKind::Energy, &["1", "米"]),
            row(TableKind::Energy, &["", "名前だけ", "9"]),
        ];

        let merged = merge_pair(&energy, &[]);
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.dropped.len(), 1);
        assert_eq!(merged.dropped[0].reason, DropReason::MissingFoodCode);
        assert_eq!(merged.dropped[0].food_name.as_deref(), Some("名前だけ"));
    }

    #[test]
    fn test_merge_drops_record_without_name() {
        let nutrient = vec![row(TableKind::Nutrient, &["3", "", "1"])];

        let merged = merge_pair(&[], &nutrient);
        assert!(merged.is_empty());
        assert_eq!(merged.dropped.len(), 1);
        assert_eq!(merged.dropped[0].reason, DropReason::MissingFoodName);
        assert_eq!(merged.dropped[0].food_code.as_deref(), Some("3"));
    }

    #[test]
    fn test_merge_empty_inputs() {
        let merged = merge_pair(&[], &[]);
        assert!(merged.is_empty());
        assert!(merged.dropped.is_empty());
    }

    #[test]
    fn test_dropped_record_from_row() {
        let no_code = DroppedRecord::from_row(&row(TableKind::Energy, &["", "名前だけ"]));
        assert_eq!(no_code.reason, DropReason::MissingFoodCode);
        assert_eq!(no_code.food_name.as_deref(), Some("名前だけ"));

        let no_name = DroppedRecord::from_row(&row(TableKind::Nutrient, &["7"]));
        assert_eq!(no_name.reason, DropReason::MissingFoodName);
        assert_eq!(no_name.food_code.as_deref(), Some("7"));
        assert_eq!(no_name.food_name, None);
    }

    #[test]
    fn test_collect_rejected_counts_shared_row_once() {
        let energy = vec![
            row(TableKind::Energy, &["", "无码", "1"]),
            row(TableKind::Energy, &["", "无码", "2"]),
        ];
        let nutrient = vec![
            row(TableKind::Nutrient, &["", "无码", "3"]),
            row(TableKind::Nutrient, &["8"]),
        ];

        let dropped = collect_rejected(&energy, &nutrient);
        let keys: Vec<_> = dropped
            .iter()
            .map(|d| (d.reason, d.food_code.as_deref(), d.food_name.as_deref()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (DropReason::MissingFoodCode, None, Some("无码")),
                (DropReason::MissingFoodCode, None, Some("无码")),
                (DropReason::MissingFoodName, Some("8"), None),
            ]
        );
    }
}
