//! HTTP请求/响应模型

use crate::core::analysis::AnalysisOutcome;
use crate::core::models::{
    state_display_name, ClassificationRecord, DisposalRule, ResolvedRule, RuleExtras, RuleScope,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 上传分析结果
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub id: String,
    pub waste_category: String,
    pub category_display: String,
    pub confidence_score: f32,
    pub confidence_percentage: f32,
    pub low_confidence: bool,
    pub state: String,
    pub state_display: String,
    pub waste_description: String,
    pub guidance: GuidanceResponse,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResponse {
    pub fn from_outcome(outcome: AnalysisOutcome) -> Self {
        let record = outcome.record;
        Self {
            id: record.id,
            waste_category: record.predicted_category,
            category_display: outcome.category.display_name,
            confidence_score: record.confidence,
            confidence_percentage: confidence_percentage(record.confidence),
            low_confidence: record.low_confidence,
            state: record.state,
            state_display: outcome.state_name,
            waste_description: record.description,
            guidance: GuidanceResponse::from(outcome.resolved),
            image_url: media_url(&record.image_path),
            created_at: record.created_at,
        }
    }
}

/// 处置建议
#[derive(Debug, Serialize, Deserialize)]
pub struct GuidanceResponse {
    pub rule_id: String,
    pub scope: RuleScope,
    pub is_state_specific: bool,
    pub disposal_method: String,
    pub hazards: String,
    pub precautions: String,
    pub source: String,
    #[serde(flatten)]
    pub extras: RuleExtras,
}

impl From<ResolvedRule> for GuidanceResponse {
    fn from(resolved: ResolvedRule) -> Self {
        let is_state_specific = !resolved.is_fallback();
        let rule = resolved.rule;
        Self {
            rule_id: rule.id,
            scope: resolved.scope,
            is_state_specific,
            disposal_method: rule.disposal_method,
            hazards: rule.hazards,
            precautions: rule.precautions,
            source: rule.source,
            extras: rule.extras,
        }
    }
}

/// 分页参数
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// 历史记录分页
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryPage {
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub items: Vec<HistoryItem>,
}

/// 历史记录列表项
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub record: ClassificationRecord,
    pub state_display: String,
    pub confidence_percentage: f32,
    pub image_url: String,
}

impl From<ClassificationRecord> for HistoryItem {
    fn from(mut record: ClassificationRecord) -> Self {
        // 列表不返回模型原始响应
        record.raw_response = None;
        Self {
            state_display: state_display_name(&record.state),
            confidence_percentage: confidence_percentage(record.confidence),
            image_url: media_url(&record.image_path),
            record,
        }
    }
}

/// 历史记录详情
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryDetail {
    #[serde(flatten)]
    pub record: ClassificationRecord,
    pub state_display: String,
    pub confidence_percentage: f32,
    pub image_url: String,
    /// 记录引用的规则的当前版本（可能已被修改或删除）
    ///
    /// 当时给出的建议见 `guidance`。
    pub current_rule: Option<DisposalRule>,
}

/// 规则解析参数
#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub category: String,
    pub state: Option<String>,
}

/// 规则解析结果
#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub category: String,
    pub category_display: String,
    pub state: Option<String>,
    pub guidance: GuidanceResponse,
}

/// 规则编辑请求
#[derive(Debug, Deserialize)]
pub struct RuleInput {
    pub category: String,
    pub state: Option<String>,
    pub disposal_method: String,
    pub hazards: String,
    pub precautions: String,
    pub source: String,
    #[serde(flatten)]
    pub extras: RuleExtras,
}

impl From<RuleInput> for DisposalRule {
    fn from(input: RuleInput) -> Self {
        DisposalRule::new(
            &input.category,
            input.state.as_deref(),
            input.disposal_method.trim(),
            input.hazards.trim(),
            input.precautions.trim(),
            input.source.trim(),
        )
        .with_extras(input.extras)
    }
}

fn confidence_percentage(confidence: f32) -> f32 {
    (confidence * 10000.0).round() / 100.0
}

fn media_url(relative_path: &str) -> String {
    format!("/media/{}", relative_path)
}
