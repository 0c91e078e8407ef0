//! モデル応答パーサー
//!
//! 画像抽出APIの応答テキストから、スキーマ位置で束縛した行を取り出す。
//!
//! 抽出優先順位（最初に1行以上得られた戦略を採用）:
//! 1. Markdownテーブル（ヘッダ行 + 区切り行 + `|` 区切りのデータ行）
//! 2. 構造化行（先頭の食品コード + 食品名 + 値トークン列）
//! 3. 空白区切りヒューリスティック
//! 4. エラー
//!
//! どの戦略も食品コードと食品名がそろわない行は捨てる（エラーにはしない）。

use crate::error::{Error, Result};
use crate::types::{Row, TableKind};
use regex::Regex;

lazy_static::lazy_static! {
    // ```markdown / ```MD / ``` など、大文字小文字を問わないコードフェンス
    static ref FENCED_RE: Regex =
        Regex::new(r"(?s)^\s*```(?i:markdown|md)?[ \t]*\r?\n?(.*?)\s*```\s*$").unwrap();
    // 閉じフェンスが欠けた応答
    static ref OPEN_FENCE_RE: Regex =
        Regex::new(r"(?s)^\s*```(?i:markdown|md)?[ \t]*\r?\n(.*)$").unwrap();
    static ref PIPE_ROW_RE: Regex = Regex::new(r"^\s*\|(.*)\|\s*$").unwrap();
    static ref SEPARATOR_RE: Regex = Regex::new(r"^\s*\|[\s:|-]*-[\s:|-]*\|\s*$").unwrap();
    static ref CODE_RE: Regex = Regex::new(r"^([0-9]+[a-zA-Z]?)\s+").unwrap();
    static ref VALUE_TOKEN_RE: Regex =
        Regex::new(r"(?:[0-9]+\.[0-9]+|[0-9]+|Tr|—|-|–|[A-Za-z]+)(?:\s+|$)").unwrap();
}

/// 微量・未検出を表すマーカー
const MARKER_TOKENS: &[&str] = &["Tr", "—", "-", "–"];

/// 解析戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    MarkdownTable,
    StructuredLine,
    Whitespace,
}

impl Strategy {
    /// 適用順
    pub const CHAIN: [Strategy; 3] = [
        Strategy::MarkdownTable,
        Strategy::StructuredLine,
        Strategy::Whitespace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::MarkdownTable => "markdown-table",
            Strategy::StructuredLine => "structured-line",
            Strategy::Whitespace => "whitespace",
        }
    }

    /// この戦略だけを適用する
    pub fn apply(self, text: &str, kind: TableKind) -> ParseOutcome {
        match self {
            Strategy::MarkdownTable => {
                let (header, split) = parse_markdown_table(text, kind);
                ParseOutcome::new(self, header, split)
            }
            Strategy::StructuredLine => {
                ParseOutcome::new(self, Vec::new(), parse_structured_lines(text, kind))
            }
            Strategy::Whitespace => {
                ParseOutcome::new(self, Vec::new(), parse_whitespace_lines(text, kind))
            }
        }
    }
}

/// 1戦略の解析結果
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub strategy: Strategy,
    /// Markdownテーブルのヘッダ（他の戦略では空）
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    /// 行として読めたが識別列が欠けていたもの（入力順）
    pub rejected: Vec<Row>,
    /// 行ごとの列充足率の平均（0.0〜1.0）
    pub quality: f32,
}

/// 保持する行と捨てた行
#[derive(Debug, Default)]
struct RowSplit {
    kept: Vec<Row>,
    rejected: Vec<Row>,
}

impl RowSplit {
    fn push(&mut self, row: Row) {
        if row.is_identified() {
            self.kept.push(row);
        } else if !row.is_blank() {
            self.rejected.push(row);
        }
    }
}

impl ParseOutcome {
    fn new(strategy: Strategy, header: Vec<String>, split: RowSplit) -> Self {
        let RowSplit { kept: rows, rejected } = split;
        let quality = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(Row::filled_ratio).sum::<f32>() / rows.len() as f32
        };
        Self {
            strategy,
            header,
            rows,
            rejected,
            quality,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// ヘッダがスキーマと一致するか（ヘッダなしは true）
    pub fn header_matches(&self, kind: TableKind) -> bool {
        self.header.is_empty() || self.header.iter().map(String::as_str).eq(kind.fields().iter().copied())
    }
}

/// 応答を包むコードフェンスを取り除く
///
/// # Examples
/// ```
/// use food_table_common::strip_code_fence;
///
/// assert_eq!(strip_code_fence("```MD\n| a |\n```"), "| a |");
/// assert_eq!(strip_code_fence("  | a |  "), "| a |");
/// ```
pub fn strip_code_fence(response: &str) -> &str {
    if let Some(caps) = FENCED_RE.captures(response) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim();
        }
    }
    if let Some(caps) = OPEN_FENCE_RE.captures(response) {
        if let Some(inner) = caps.get(1) {
            return inner.as_str().trim();
        }
    }
    response.trim()
}

/// 応答テキストを解析する
///
/// 戦略チェーンを順に適用し、最初に行が得られた結果を返す。
/// Markdownテーブルで捨てた行は後続の戦略が採用されても `rejected` に残す。
/// 全戦略で0行なら `Error::Parse`。
pub fn parse_table(response: &str, kind: TableKind) -> Result<ParseOutcome> {
    let text = strip_code_fence(response);
    let mut carried: Vec<Row> = Vec::new();

    for strategy in Strategy::CHAIN {
        let mut outcome = strategy.apply(text, kind);
        if !outcome.is_empty() {
            carried.append(&mut outcome.rejected);
            outcome.rejected = carried;
            return Ok(outcome);
        }
        // 後続の戦略はパイプ行を読まない
        if strategy == Strategy::MarkdownTable {
            carried = outcome.rejected;
        }
    }

    Err(Error::Parse(format!("{}表の行を抽出できません", kind)))
}

// =============================================
// 戦略1: Markdownテーブル
// =============================================

fn is_separator(line: &str) -> bool {
    SEPARATOR_RE.is_match(line)
}

fn split_cells(line: &str) -> Option<Vec<String>> {
    let caps = PIPE_ROW_RE.captures(line)?;
    let inner = caps.get(1)?.as_str();
    Some(inner.split('|').map(|c| c.trim().to_string()).collect())
}

fn parse_markdown_table(text: &str, kind: TableKind) -> (Vec<String>, RowSplit) {
    let lines: Vec<&str> = text.lines().collect();

    let header_idx = (0..lines.len().saturating_sub(1)).find(|&i| {
        PIPE_ROW_RE.is_match(lines[i]) && !is_separator(lines[i]) && is_separator(lines[i + 1])
    });
    let Some(header_idx) = header_idx else {
        return (Vec::new(), RowSplit::default());
    };

    let header = split_cells(lines[header_idx]).unwrap_or_default();
    let mut split = RowSplit::default();

    for line in &lines[header_idx + 2..] {
        if line.trim().is_empty() || is_separator(line) {
            continue;
        }
        // テーブル外の行に達したら終了
        let Some(cells) = split_cells(line) else {
            break;
        };
        let mut row = Row::new(kind);
        for (i, cell) in cells.into_iter().enumerate() {
            row.set(i, cell);
        }
        split.push(row);
    }

    (header, split)
}

// =============================================
// 戦略2/3共通: データ行候補
// =============================================

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("---") && !l.starts_with('|'))
}

fn starts_with_marker(s: &str) -> bool {
    MARKER_TOKENS.iter().any(|m| s.starts_with(m))
}

// =============================================
// 戦略2: 構造化行
// =============================================

/// 食品名とそれ以降を分ける
///
/// 食品名は数字、または空白に続く Tr / ダッシュ類の直前までの文字列
fn split_food_name(rest: &str) -> (&str, &str) {
    let mut end = rest.len();
    for (i, c) in rest.char_indices() {
        if c.is_ascii_digit() {
            end = i;
            break;
        }
        if c.is_whitespace() && starts_with_marker(rest[i..].trim_start()) {
            end = i;
            break;
        }
    }
    (rest[..end].trim(), rest[end..].trim())
}

fn parse_structured_lines(text: &str, kind: TableKind) -> RowSplit {
    let mut split = RowSplit::default();

    for line in data_lines(text) {
        if line.chars().count() < 10 || !line.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }

        let Some(caps) = CODE_RE.captures(line) else {
            continue;
        };
        let (Some(code), Some(whole)) = (caps.get(1), caps.get(0)) else {
            continue;
        };

        let (name, remaining) = split_food_name(&line[whole.end()..]);

        let mut row = Row::new(kind);
        row.set(0, code.as_str());
        if !name.is_empty() {
            row.set(1, name);
        }
        for (j, token) in VALUE_TOKEN_RE.find_iter(remaining).enumerate() {
            // スキーマを超えるトークンは捨てる
            row.set(j + 2, token.as_str().trim());
        }
        split.push(row);
    }

    split
}

// =============================================
// 戦略3: 空白区切り
// =============================================

/// 数字のみ、または数字 + 末尾1文字の英字
fn is_food_code_token(token: &str) -> bool {
    let digits = match token.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => &token[..token.len() - 1],
        _ => token,
    };
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// 整数または小数（小数点1つまで）
fn is_numeric_token(token: &str) -> bool {
    let stripped = token.replacen('.', "", 1);
    !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit())
}

fn parse_whitespace_lines(text: &str, kind: TableKind) -> RowSplit {
    let mut split = RowSplit::default();

    for line in data_lines(text) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 || !is_food_code_token(parts[0]) {
            continue;
        }

        let name_len = parts[1..]
            .iter()
            .take_while(|p| !is_numeric_token(p) && !MARKER_TOKENS.contains(*p))
            .count();

        let mut row = Row::new(kind);
        row.set(0, parts[0]);
        if name_len > 0 {
            row.set(1, parts[1..=name_len].join(" "));
        }
        for (j, value) in parts[name_len + 1..].iter().enumerate() {
            row.set(j + 2, *value);
        }
        split.push(row);
    }

    split
}
