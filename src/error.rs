use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableAiError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。環境変数 API_KEY か `food-table-ai config --set-api-key YOUR_KEY` で設定してください")]
    MissingApiKey,

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("表データを抽出できません: {0}")]
    Extraction(String),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("タスク異常終了: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, TableAiError>;
