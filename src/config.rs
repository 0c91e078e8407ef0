use crate::error::{Result, TableAiError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// 実行設定
///
/// 優先順位: デフォルト < 設定ファイル < 環境変数(.env含む) < CLI引数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_workers: usize,
    pub max_retries: u32,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub request_timeout_secs: u64,
    /// 0 で無効
    pub pair_timeout_secs: u64,
    pub backoff_unit_ms: u64,
    pub max_backoff_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.siliconflow.cn/v1".into(),
            model: "Qwen/Qwen2.5-VL-72B-Instruct".into(),
            max_tokens: 4000,
            temperature: 0.1,
            max_workers: 3,
            max_retries: 3,
            input_dir: PathBuf::from("test_images"),
            output_dir: PathBuf::from("_self_json_data"),
            temp_dir: PathBuf::from("temp"),
            request_timeout_secs: 180,
            pair_timeout_secs: 3600,
            backoff_unit_ms: 1000,
            max_backoff_secs: 300,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TableAiError::Config(format!("{}={} を解釈できません", key, value)))
}

impl Config {
    /// 設定ファイル + 環境変数から読み込み
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 設定ファイルのみ読み込み（なければデフォルト）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// 環境変数で上書き
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("API_KEY").filter(|v| !v.trim().is_empty()) {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = lookup("MODEL_NAME") {
            self.model = v;
        }
        if let Some(v) = lookup("INPUT_DIR") {
            self.input_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TEMP_DIR") {
            self.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("TEMPERATURE") {
            self.temperature = parse_env("TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("MAX_WORKERS") {
            self.max_workers = parse_env("MAX_WORKERS", &v)?;
        }
        if let Some(v) = lookup("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PAIR_TIMEOUT_SECS") {
            self.pair_timeout_secs = parse_env("PAIR_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("BACKOFF_UNIT_MS") {
            self.backoff_unit_ms = parse_env("BACKOFF_UNIT_MS", &v)?;
        }
        if let Some(v) = lookup("MAX_BACKOFF_SECS") {
            self.max_backoff_secs = parse_env("MAX_BACKOFF_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(TableAiError::Config("max_workers は1以上にしてください".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(TableAiError::Config("request_timeout_secs は1以上にしてください".into()));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| TableAiError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("food-table-ai").join("config.json"))
    }

    pub fn get_api_key(&self) -> Result<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(TableAiError::MissingApiKey)
    }

    /// APIキーを設定ファイルに保存する
    ///
    /// 環境変数やCLI引数で上書きされた値は書き込まない。
    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        Self::store_api_key_at(&Self::config_path()?, &key)?;
        self.api_key = Some(key);
        Ok(())
    }

    /// 指定ファイルの内容だけを読み直し、APIキーを差し替えて書き戻す
    pub fn store_api_key_at(path: &Path, key: &str) -> Result<()> {
        let mut on_disk = Self::load_from(path)?;
        on_disk.api_key = Some(key.to_string());
        on_disk.save_to(path)
    }

    /// 表示用（先頭4文字以外を伏せる）
    pub fn masked_api_key(&self) -> String {
        match &self.api_key {
            Some(key) if !key.is_empty() => {
                let head: String = key.chars().take(4).collect();
                format!("{}****", head)
            }
            _ => "未設定".into(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pair_timeout(&self) -> Option<Duration> {
        (self.pair_timeout_secs > 0).then(|| Duration::from_secs(self.pair_timeout_secs))
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}
