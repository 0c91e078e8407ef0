//! Food Table Common Library
//!
//! 食品成分表の抽出結果を扱う共通ロジック（I/Oなし）:
//! 列スキーマ、応答パーサー、ペアマージ、食品コード順ソート、名前導出

pub mod category;
pub mod error;
pub mod merge;
pub mod parser;
pub mod prompts;
pub mod sort;
pub mod types;

pub use category::{base_category, category_from_stem, split_numbered, split_role, NumberedName};
pub use error::{Error, Result};
pub use merge::{collect_rejected, merge_pair, DropReason, DroppedRecord, PairMerge};
pub use parser::{parse_table, strip_code_fence, ParseOutcome, Strategy};
pub use prompts::build_table_prompt;
pub use sort::{food_code_key, sort_by_food_code, FoodCodeKey};
pub use types::{
    MergedRecord, Row, TableKind, ENERGY_FIELDS, FOOD_CODE, FOOD_NAME, MERGED_FIELDS,
    NUTRIENT_FIELDS,
};
