//! 食品成分表の型定義
//!
//! CLIとテストで共有される型:
//! - TableKind: 能量表 / 栄養素表の区別と列スキーマ
//! - Row: 1回の抽出で得られた行（スキーマ位置で束縛）
//! - MergedRecord: 能量表+栄養素表を食品コードで統合したレコード

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// 食品コード列名
pub const FOOD_CODE: &str = "foodCode";
/// 食品名列名
pub const FOOD_NAME: &str = "foodName";

/// 能量表の列定義（順序がそのまま位置束縛になる）
pub const ENERGY_FIELDS: &[&str] = &[
    "foodCode",
    "foodName",
    "edible",
    "water",
    "energyKCal",
    "energyKJ",
    "protein",
    "fat",
    "CHO",
    "dietaryFiber",
    "cholesterol",
    "ash",
    "vitaminA",
    "carotene",
    "retinol",
    "thiamin",
    "riboflavin",
];

/// 栄養素表の列定義
pub const NUTRIENT_FIELDS: &[&str] = &[
    "foodCode",
    "foodName",
    "niacin",
    "vitaminC",
    "vitaminETotal",
    "vitaminE1",
    "vitaminE2",
    "vitaminE3",
    "Ca",
    "P",
    "K",
    "Na",
    "Mg",
    "Fe",
    "Zn",
    "Se",
    "Cu",
    "Mn",
    "remark",
];

/// 統合レコードの列定義: 能量表の全列 + 栄養素表の識別列以外
pub const MERGED_FIELDS: &[&str] = &[
    "foodCode",
    "foodName",
    "edible",
    "water",
    "energyKCal",
    "energyKJ",
    "protein",
    "fat",
    "CHO",
    "dietaryFiber",
    "cholesterol",
    "ash",
    "vitaminA",
    "carotene",
    "retinol",
    "thiamin",
    "riboflavin",
    "niacin",
    "vitaminC",
    "vitaminETotal",
    "vitaminE1",
    "vitaminE2",
    "vitaminE3",
    "Ca",
    "P",
    "K",
    "Na",
    "Mg",
    "Fe",
    "Zn",
    "Se",
    "Cu",
    "Mn",
    "remark",
];

/// 表の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// 能量表（energy）
    Energy,
    /// 栄養素表（nutrient）
    Nutrient,
}

impl TableKind {
    pub const ALL: [TableKind; 2] = [TableKind::Energy, TableKind::Nutrient];

    /// 列スキーマ
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            TableKind::Energy => ENERGY_FIELDS,
            TableKind::Nutrient => NUTRIENT_FIELDS,
        }
    }

    /// ファイル名の役割サフィックス
    pub fn suffix(self) -> &'static str {
        match self {
            TableKind::Energy => "-energy",
            TableKind::Nutrient => "-nutrient",
        }
    }

    pub fn index_of(self, field: &str) -> Option<usize> {
        self.fields().iter().position(|f| *f == field)
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::Energy => write!(f, "energy"),
            TableKind::Nutrient => write!(f, "nutrient"),
        }
    }
}

/// 抽出結果の1行
///
/// セル位置 i はスキーマの i 番目の列に対応する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    kind: TableKind,
    cells: Vec<Option<String>>,
}

impl Row {
    pub fn new(kind: TableKind) -> Self {
        Self {
            kind,
            cells: vec![None; kind.fields().len()],
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// スキーマ位置に値を設定する。スキーマ外の位置なら false
    pub fn set(&mut self, index: usize, value: impl Into<String>) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = Some(value.into());
                true
            }
            None => false,
        }
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.kind.index_of(field).and_then(|i| self.cell(i))
    }

    /// 空でない食品コード
    pub fn food_code(&self) -> Option<&str> {
        self.get(FOOD_CODE).filter(|v| !v.is_empty())
    }

    /// 空でない食品名
    pub fn food_name(&self) -> Option<&str> {
        self.get(FOOD_NAME).filter(|v| !v.is_empty())
    }

    /// 保持条件: 食品コードと食品名がそろっている
    pub fn is_identified(&self) -> bool {
        self.food_code().is_some() && self.food_name().is_some()
    }

    /// 値の入った列がひとつもない
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.as_deref().map_or(true, str::is_empty))
    }

    /// 値が入っている列の割合（0.0〜1.0）
    pub fn filled_ratio(&self) -> f32 {
        let filled = self
            .cells
            .iter()
            .filter(|c| c.as_deref().is_some_and(|v| !v.is_empty()))
            .count();
        filled as f32 / self.cells.len() as f32
    }

    /// 設定済みの (列名, 値) を列順で返す
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.kind
            .fields()
            .iter()
            .zip(self.cells.iter())
            .filter_map(|(field, cell)| cell.as_deref().map(|v| (*field, v)))
    }
}

/// 能量表と栄養素表を統合したレコード
///
/// 既知列は MERGED_FIELDS の順で保持する。抽出結果は文字列で入るが、
/// ディスクから読み込んだ値（数値・null）は型を変えずに保持し、そのまま書き戻す。
/// 未知キーは `extra` に退避する。
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    cells: Vec<Option<Value>>,
    extra: BTreeMap<String, Value>,
}

impl Default for MergedRecord {
    fn default() -> Self {
        Self {
            cells: vec![None; MERGED_FIELDS.len()],
            extra: BTreeMap::new(),
        }
    }
}

impl MergedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(field: &str) -> Option<usize> {
        MERGED_FIELDS.iter().position(|f| *f == field)
    }

    /// 既知列の生の値（null を含む）
    pub fn value(&self, field: &str) -> Option<&Value> {
        Self::index_of(field).and_then(|i| self.cells[i].as_ref())
    }

    /// 文字列値のみ
    pub fn get(&self, field: &str) -> Option<&str> {
        self.value(field).and_then(Value::as_str)
    }

    /// 文字列・数値を文字列として取り出す
    pub fn text(&self, field: &str) -> Option<Cow<'_, str>> {
        match self.value(field)? {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.value(field).is_some()
    }

    /// 既知列に文字列値を設定する。未知列なら false
    pub fn set(&mut self, field: &str, value: impl Into<String>) -> bool {
        match Self::index_of(field) {
            Some(i) => {
                self.cells[i] = Some(Value::String(value.into()));
                true
            }
            None => false,
        }
    }

    pub fn food_code(&self) -> Option<&str> {
        self.get(FOOD_CODE).filter(|v| !v.is_empty())
    }

    pub fn food_name(&self) -> Option<&str> {
        self.get(FOOD_NAME).filter(|v| !v.is_empty())
    }

    pub fn is_identified(&self) -> bool {
        self.food_code().is_some() && self.food_name().is_some()
    }

    /// 未知キー（読み込み時のみ）
    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    /// 設定済みの既知列を列順で返す
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> + '_ {
        MERGED_FIELDS
            .iter()
            .zip(self.cells.iter())
            .filter_map(|(field, cell)| cell.as_ref().map(|v| (*field, v)))
    }
}

impl Serialize for MergedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = self.iter().count() + self.extra.len();
        let mut map = serializer.serialize_map(Some(len))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field, value)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for MergedRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = MergedRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a food record object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut record = MergedRecord::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    match MergedRecord::index_of(&key) {
                        Some(i) => {
                            record.cells[i] = Some(value);
                        }
                        None => {
                            record.extra.insert(key, value);
                        }
                    }
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_fields_follow_schemas() {
        let expected: Vec<&str> = ENERGY_FIELDS
            .iter()
            .chain(NUTRIENT_FIELDS.iter().skip(2))
            .copied()
            .collect();
        assert_eq!(MERGED_FIELDS, expected.as_slice());
    }

    #[test]
    fn test_identity_fields_lead_both_schemas() {
        for kind in TableKind::ALL {
            assert_eq!(kind.fields()[0], FOOD_CODE);
            assert_eq!(kind.fields()[1], FOOD_NAME);
        }
    }

    #[test]
    fn test_row_set_out_of_schema() {
        let mut row = Row::new(TableKind::Energy);
        assert!(row.set(0, "121101"));
        assert!(!row.set(ENERGY_FIELDS.len(), "overflow"));
        assert_eq!(row.food_code(), Some("121101"));
        assert!(!row.is_identified());
    }

    #[test]
    fn test_row_empty_name_not_identified() {
        let mut row = Row::new(TableKind::Nutrient);
        row.set(0, "121101");
        row.set(1, "");
        assert!(!row.is_identified());
        assert_eq!(row.get(FOOD_NAME), Some(""));
    }

    #[test]
    fn test_record_serializes_in_schema_order() {
        let mut record = MergedRecord::new();
        record.set("Ca", "38");
        record.set(FOOD_NAME, "草鱼");
        record.set(FOOD_CODE, "121102");

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"foodCode":"121102","foodName":"草鱼","Ca":"38"}"#);
    }

    #[test]
    fn test_record_keeps_unknown_keys() {
        let json = r#"{"foodCode":"1","foodName":"米","note":"x","water":12.5}"#;
        let record: MergedRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.value("water"), Some(&serde_json::json!(12.5)));
        assert_eq!(record.text("water").as_deref(), Some("12.5"));
        assert_eq!(record.get("water"), None);
        assert_eq!(record.extra().get("note"), Some(&serde_json::json!("x")));

        let back = serde_json::to_string(&record).unwrap();
        assert!(back.contains(r#""note":"x""#));
    }

    #[test]
    fn test_record_reload_keeps_numbers_and_nulls() {
        let json = r#"{"foodCode":"2","foodName":"b","water":77.9,"remark":null}"#;
        let record: MergedRecord = serde_json::from_str(json).unwrap();

        assert!(record.contains("remark"));
        assert_eq!(record.value("remark"), Some(&Value::Null));
        assert_eq!(serde_json::to_string(&record).unwrap(), json);
    }

    #[test]
    fn test_numeric_food_code_text() {
        let record: MergedRecord = serde_json::from_str(r#"{"foodCode":121101}"#).unwrap();
        assert_eq!(record.text(FOOD_CODE).as_deref(), Some("121101"));
        assert_eq!(record.food_code(), None);
    }
}
