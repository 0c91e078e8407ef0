//! 統合テスト用のモック抽出クライアントとヘルパー

#![allow(dead_code)]

use async_trait::async_trait;
use food_table_ai::error::Result;
use food_table_ai::extractor::VisionExtractor;
use food_table_ai::scanner::ImageFile;
use food_table_common::TableKind;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// (画像stem, 表の種類, 何回目の呼び出しか) → 応答
pub type Script = dyn Fn(&str, TableKind, u32) -> Result<String> + Send + Sync;

pub struct MockExtractor {
    script: Box<Script>,
    delay: Duration,
    calls: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockExtractor {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&str, TableKind, u32) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, stem: &str) -> u32 {
        self.calls.lock().unwrap().get(stem).copied().unwrap_or(0)
    }

    /// 同時に実行中だった呼び出し数の最大値
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionExtractor for MockExtractor {
    async fn extract(&self, image: &ImageFile, kind: TableKind) -> Result<String> {
        let stem = image.stem();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(stem.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        (self.script)(&stem, kind, call)
    }
}

/// スキーマどおりのMarkdownテーブル応答を作る
///
/// 各行の3列目以降には列番号を値として入れる。
pub fn markdown_table(kind: TableKind, rows: &[(&str, &str)]) -> String {
    let fields = kind.fields();
    let mut lines = vec![
        "```markdown".to_string(),
        format!("| {} |", fields.join(" | ")),
        format!("|{}", "---|".repeat(fields.len())),
    ];
    for (code, name) in rows {
        let mut cells = vec![code.to_string(), name.to_string()];
        cells.extend((2..fields.len()).map(|i| i.to_string()));
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    lines.push("```".to_string());
    lines.join("\n")
}

/// 中身がダミーの画像ファイルを作る
pub fn touch_images(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), b"fake-image").unwrap();
    }
}

/// ログ出力を溜めるバッファ
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes).lines().map(str::to_string).collect()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// 現在のスレッドで WARN 以上のイベントを捕捉する
///
/// ガードが生きている間だけ有効。current_thread ランタイムのテストで使う。
pub fn capture_warnings() -> (tracing::subscriber::DefaultGuard, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    (tracing::subscriber::set_default(subscriber), buffer)
}
