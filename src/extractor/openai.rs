//! OpenAI 互換 chat/completions クライアント

use super::VisionExtractor;
use crate::config::Config;
use crate::error::{Result, TableAiError};
use crate::scanner::ImageFile;
use async_trait::async_trait;
use base64::Engine;
use food_table_common::{build_table_prompt, TableKind};
use serde::{Deserialize, Serialize};

/// chat/completions リクエスト
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// chat/completions レスポンス
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub struct OpenAiVisionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiVisionClient {
    pub fn new(config: &Config) -> Result<Self> {
        let api_key = config.get_api_key()?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_workers * 2)
            .build()
            .map_err(|e| TableAiError::Config(format!("HTTPクライアント初期化エラー: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn build_request(&self, kind: TableKind, data_url: String) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: build_table_prompt(kind),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// 画像を data URL（base64）に変換
async fn encode_data_url(image: &ImageFile) -> Result<String> {
    let bytes = tokio::fs::read(&image.path)
        .await
        .map_err(|e| TableAiError::ImageLoad(format!("{}: {}", image.path.display(), e)))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", image.mime_type(), encoded))
}

fn first_content(response: ChatResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| TableAiError::ApiParse("空のレスポンス".into()))
}

#[async_trait]
impl VisionExtractor for OpenAiVisionClient {
    async fn extract(&self, image: &ImageFile, kind: TableKind) -> Result<String> {
        let data_url = encode_data_url(image).await?;
        let request = self.build_request(kind, data_url);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TableAiError::ApiCall(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(300).collect();
            return Err(TableAiError::ApiCall(format!("HTTP {}: {}", status, preview)));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| TableAiError::ApiParse(e.to_string()))?;

        first_content(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn client() -> OpenAiVisionClient {
        let config = Config {
            api_key: Some("sk-test".into()),
            api_base: "https://example.invalid/v1/".into(),
            ..Default::default()
        };
        OpenAiVisionClient::new(&config).unwrap()
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = OpenAiVisionClient::new(&Config::default());
        assert!(matches!(result, Err(TableAiError::MissingApiKey)));
    }

    #[test]
    fn test_endpoint_trailing_slash() {
        assert_eq!(client().endpoint, "https://example.invalid/v1/chat/completions");
    }

    #[test]
    fn test_request_shape() {
        let c = client();
        let request = c.build_request(TableKind::Nutrient, "data:image/png;base64,AAAA".into());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "Qwen/Qwen2.5-VL-72B-Instruct");
        assert_eq!(json["max_tokens"], 4000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert!(json["messages"][0]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("niacin"));
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_first_content() {
        let payload: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"| a |"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(payload).unwrap(), "| a |");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(empty), Err(TableAiError::ApiParse(_))));
    }

    #[tokio::test]
    async fn test_encode_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a-energy.jpg");
        std::fs::write(&path, b"abc").unwrap();

        let image = ImageFile {
            path,
            role: TableKind::Energy,
            base_name: "a".into(),
            category: "a".into(),
        };
        assert_eq!(encode_data_url(&image).await.unwrap(), "data:image/jpeg;base64,YWJj");
    }

    #[tokio::test]
    async fn test_encode_missing_image() {
        let image = ImageFile {
            path: PathBuf::from("/nonexistent/a-energy.png"),
            role: TableKind::Energy,
            base_name: "a".into(),
            category: "a".into(),
        };
        assert!(matches!(encode_data_url(&image).await, Err(TableAiError::ImageLoad(_))));
    }
}
