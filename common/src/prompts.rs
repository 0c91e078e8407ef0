//! プロンプト生成モジュール
//!
//! 食品成分表の画像抽出用プロンプト。列スキーマはパーサーと共有しているので、
//! 列順を変える場合はプロンプトも同時に変わる。

use crate::types::TableKind;

/// 表中の特殊記号（微量・未検出など）
pub const SPECIAL_MARKERS: &[&str] = &["—", "-", "Tr"];

/// 表抽出プロンプト生成
///
/// # Arguments
/// * `kind` - 能量表 / 栄養素表
///
/// # Returns
/// Markdownテーブルのみを出力させるプロンプト文字列
pub fn build_table_prompt(kind: TableKind) -> String {
    let fields = kind.fields();
    let columns = fields.join(", ");
    let header = format!("| {} |", fields.join(" | "));
    let separator = format!("|{}", " --- |".repeat(fields.len()));
    let markers = SPECIAL_MARKERS
        .iter()
        .map(|m| format!("「{}」", m))
        .collect::<Vec<_>>()
        .join("、");

    format!(
        r#"画像は中国食物成分表の1ページです。表のすべてのデータ行を読み取り、Markdownテーブルで出力してください。

## 列（この順序で出力）
{columns}

## 注意
1. {markers} は微量・未検出を表すので、そのまま残す
2. 数値は元の表記のまま出力する
3. 不完全な行も含め、すべての行を出力する
4. 1行目はヘッダ（列名）、2行目は区切り行、3行目以降がデータ行
5. JSONは出力しない
6. 表以外のテキスト、コードブロック記号、説明は出力しない

## 出力例
{header}
{separator}
| 121101 | 白条鱼（裸鱼） | ... |
| 121102 | 草鱼 | ... |"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_prompt_lists_schema_in_order() {
        let prompt = build_table_prompt(TableKind::Energy);
        assert!(prompt.contains("foodCode, foodName, edible, water"));
        assert!(prompt.contains("| foodCode | foodName | edible |"));
        assert!(!prompt.contains("niacin"));
    }

    #[test]
    fn test_nutrient_prompt_lists_schema_in_order() {
        let prompt = build_table_prompt(TableKind::Nutrient);
        assert!(prompt.contains("niacin, vitaminC"));
        assert!(prompt.contains("remark"));
        assert!(prompt.contains("「Tr」"));
    }
}
