//! 视觉模型分类模块
//!
//! 把上传的图片交给外部视觉模型（Gemini 或兼容接口）判断废弃物类别。
//!
//! 设计原则：
//! - 模型只负责分类，处置建议一律来自规则表
//! - 输出必须是结构化JSON，类别必须在已配置的类别集合内
//! - 网络/配额错误与响应格式错误分开报告

use crate::core::models::{normalize_category_id, Classification, ClassifierConfig, WasteCategory};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// 分类错误
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// 网络、超时、限流或服务端错误，可重试
    #[error("classification service unavailable: {0}")]
    Unavailable(String),

    /// 服务端拒绝请求（如密钥无效、图片不被接受）
    #[error("classification request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// 模型返回内容无法解析或不合规
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

impl ClassifierError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Unavailable(_))
    }
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        ClassifierError::Unavailable(e.to_string())
    }
}

/// 一次分类请求
#[derive(Debug, Clone, Copy)]
pub struct ClassifyRequest<'a> {
    /// 图片内容
    pub image: &'a [u8],
    /// 图片MIME类型
    pub mime_type: &'a str,
    /// 原始文件名
    pub file_name: &'a str,
    /// 邦代码
    pub state_code: &'a str,
    /// 邦名称
    pub state_name: &'a str,
    /// 允许的类别
    pub categories: &'a [WasteCategory],
}

/// 分类服务
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 服务名称（日志用）
    fn name(&self) -> &str;

    /// 对图片进行分类
    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Classification, ClassifierError>;
}

/// Gemini 视觉模型客户端
pub struct GeminiClassifier {
    /// 模型配置
    config: ClassifierConfig,
    /// HTTP客户端
    client: reqwest::Client,
}

impl GeminiClassifier {
    /// 创建客户端
    pub fn new(config: ClassifierConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self { config, client })
    }

    /// 计算 generateContent 地址
    ///
    /// 允许只填基地址（如 `https://generativelanguage.googleapis.com/v1beta`），
    /// 也允许填写完整的 `...:generateContent` 地址。
    fn generate_content_url(&self) -> Result<String, ClassifierError> {
        let raw = self.config.api_endpoint.trim();
        if raw.is_empty() {
            return Err(ClassifierError::InvalidResponse(
                "classifier endpoint is empty".to_string(),
            ));
        }
        let endpoint = raw.trim_end_matches('/');

        if endpoint.contains(":generateContent") {
            return Ok(endpoint.to_string());
        }
        if endpoint.ends_with("/models") {
            return Ok(format!("{}/{}:generateContent", endpoint, self.config.model_name));
        }
        Ok(format!(
            "{}/models/{}:generateContent",
            endpoint, self.config.model_name
        ))
    }
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: String },
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn name(&self) -> &str {
        &self.config.model_name
    }

    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Classification, ClassifierError> {
        let url = self.generate_content_url()?;
        let prompt = build_prompt(&request);

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text { text: prompt },
                    Part::Image {
                        inline_data: InlineData {
                            mime_type: request.mime_type,
                            data: BASE64.encode(request.image),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
                response_mime_type: "application/json",
            },
        };

        let mut req = self.client.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            req = req.header("x-goog-api-key", &self.config.api_key);
        }

        let response = req.send().await?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ClassifierError::Unavailable(format!(
                "HTTP {} from classifier",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Rejected {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let value: serde_json::Value = response.json().await?;
        let text = extract_candidate_text(&value).ok_or_else(|| {
            ClassifierError::InvalidResponse("no text candidate in model response".to_string())
        })?;

        tracing::debug!("模型原始响应: {}", truncate(&text, 200));
        parse_model_response(&text, request.categories)
    }
}

/// 构建分类提示词
fn build_prompt(request: &ClassifyRequest<'_>) -> String {
    let codes = request
        .categories
        .iter()
        .map(|c| format!("- {} ({})", c.id.to_uppercase().replace('-', "_"), c.display_name))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are a waste management expert for India. Classify the waste shown in the image.
The user is located in {} ({}).

Allowed categories:
{}

Respond with ONLY this JSON object, no markdown and no other text:
{{
  "category": "<one of the allowed category codes>",
  "confidence": 0.85,
  "description": "short description of the waste item"
}}

confidence is a number between 0 and 1."#,
        request.state_name, request.state_code, codes
    )
}

/// 从 generateContent 响应中取出文本
fn extract_candidate_text(value: &serde_json::Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 从响应中提取JSON
///
/// 模型经常把JSON包在 ```json 代码块里，或在前后夹带说明文字。
fn extract_json(response: &str) -> &str {
    let mut cleaned = response.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();

    if serde_json::from_str::<serde_json::Value>(cleaned).is_ok() {
        return cleaned;
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => &cleaned[start..=end],
        _ => cleaned,
    }
}

/// 解析并校验模型响应
///
/// 同时接受扁平对象和嵌套在 `waste_classification` 下的对象。
pub fn parse_model_response(
    response: &str,
    categories: &[WasteCategory],
) -> Result<Classification, ClassifierError> {
    let json_str = extract_json(response);
    let value: serde_json::Value = serde_json::from_str(json_str).map_err(|e| {
        ClassifierError::InvalidResponse(format!(
            "failed to parse JSON: {}, response: {}",
            e,
            truncate(response, 200)
        ))
    })?;

    let body = value.get("waste_classification").unwrap_or(&value);

    let raw_category = body
        .get("category")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ClassifierError::InvalidResponse("missing category".to_string()))?;
    let category = normalize_category_id(raw_category);
    if !categories.iter().any(|c| c.id == category) {
        return Err(ClassifierError::InvalidResponse(format!(
            "unexpected category: {}",
            raw_category
        )));
    }

    let confidence = body
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ClassifierError::InvalidResponse("missing confidence".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ClassifierError::InvalidResponse(format!(
            "confidence out of range: {}",
            confidence
        )));
    }

    let description = body
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Classification {
        category,
        confidence: confidence as f32,
        description,
        raw_response: Some(response.to_string()),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// 离线分类器
///
/// 未配置API密钥时使用，仅根据文件名关键词猜测类别，置信度固定为0.3。
pub struct OfflineClassifier;

/// 离线分类的固定置信度
pub const OFFLINE_CONFIDENCE: f32 = 0.3;

#[async_trait]
impl Classifier for OfflineClassifier {
    fn name(&self) -> &str {
        "offline"
    }

    async fn classify(&self, request: ClassifyRequest<'_>) -> Result<Classification, ClassifierError> {
        Ok(offline_classification(request.file_name, request.categories))
    }
}

/// 根据文件名关键词推断类别
pub fn offline_classification(file_name: &str, categories: &[WasteCategory]) -> Classification {
    const KEYWORDS: &[(&str, &[&str])] = &[
        ("medical", &["syringe", "needle", "mask", "bandage", "medicine", "tablet", "glove"]),
        ("e-waste", &["phone", "laptop", "battery", "charger", "cable", "circuit", "bulb"]),
        ("hazardous", &["paint", "chemical", "acid", "pesticide", "solvent", "oil"]),
        ("organic", &["food", "peel", "vegetable", "fruit", "leaf", "leaves", "garden"]),
        ("recyclable", &["bottle", "can", "paper", "cardboard", "carton", "glass", "newspaper"]),
        ("non-recyclable", &["wrapper", "chips", "sachet", "styrofoam", "thermocol"]),
    ];

    let name_lower = file_name.to_lowercase();
    let guessed = KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| name_lower.contains(w)))
        .map(|(category, _)| *category)
        .unwrap_or("general");

    let category = if categories.iter().any(|c| c.id == guessed) {
        guessed.to_string()
    } else if categories.iter().any(|c| c.id == "general") {
        "general".to_string()
    } else {
        categories
            .first()
            .map(|c| c.id.clone())
            .unwrap_or_else(|| guessed.to_string())
    };

    Classification {
        category,
        confidence: OFFLINE_CONFIDENCE,
        description: "Offline guess based on the file name".to_string(),
        raw_response: None,
    }
}
