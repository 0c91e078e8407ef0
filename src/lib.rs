//! food-table-ai: 食品成分表スクリーンショットから JSON を生成する
//!
//! 純粋なロジック（スキーマ・解析・マージ・ソート）は `food_table_common`、
//! I/O と並行処理はこのクレート。

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod logging;
pub mod merger;
pub mod pipeline;
pub mod progress;
pub mod scanner;
