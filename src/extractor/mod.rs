//! 画像抽出サービス連携
//!
//! パイプラインは `VisionExtractor` だけに依存する。実装は OpenAI 互換の
//! chat/completions API（`openai`）。テストではモック実装に差し替える。

mod openai;

pub use openai::OpenAiVisionClient;

use crate::error::Result;
use crate::scanner::ImageFile;
use async_trait::async_trait;
use food_table_common::TableKind;

/// 画像1枚から表テキストを取り出すサービス
///
/// 失敗（通信エラー・レート制限・不正なレスポンス）はそのまま `Err` で返す。
/// リトライは呼び出し側（`fetcher`）が行う。
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    async fn extract(&self, image: &ImageFile, kind: TableKind) -> Result<String>;
}
