//! HTTP处理函数

use crate::core::models::{state_display_name, DisposalRule, IndianState, WasteCategory, INDIAN_STATES};
use crate::core::upload::{ImageUpload, ALLOWED_EXTENSIONS};
use crate::web::error::ApiError;
use crate::web::models::*;
use crate::web::state::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// 历史分页偏移上限（SQLite OFFSET 为有符号整数）
const MAX_HISTORY_OFFSET: usize = i64::MAX as usize;

/// 表单读取错误，超出请求体上限时返回 413
fn multipart_error(context: &str, e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(format!("{}: {}", context, e.body_text()))
    } else {
        ApiError::BadRequest(format!("{}: {}", context, e.body_text()))
    }
}

/// 健康检查
pub async fn health() -> &'static str {
    "OK"
}

/// 分析接口说明
pub async fn analyze_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    let categories = state
        .resolver()
        .categories()
        .into_iter()
        .map(|c| json!({ "code": c.id, "name": c.display_name }))
        .collect::<Vec<_>>();

    Json(json!({
        "message": "Waste Analysis API - POST an image and state to analyze waste",
        "endpoint": "/api/analyze",
        "method": "POST",
        "required_fields": {
            "image": format!(
                "Image file ({}) - Max {} bytes",
                ALLOWED_EXTENSIONS.join(", "),
                state.analysis.uploads().max_bytes()
            ),
            "state": "Indian state code or name",
        },
        "classifier": state.analysis.classifier_name(),
        "available_states": INDIAN_STATES,
        "waste_categories": categories,
    }))
}

/// 上传图片并分析
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let mut image: Option<ImageUpload> = None;
    let mut selected_state = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Invalid multipart body", e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error("Failed to read image", e))?;
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "state" => {
                selected_state = field
                    .text()
                    .await
                    .map_err(|e| multipart_error("Failed to read state", e))?;
            }
            other => {
                tracing::debug!("忽略未知表单字段: {}", other);
            }
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("image is required".to_string()))?;
    let resolver = state.resolver();

    let outcome = state
        .analysis
        .analyze(image, &selected_state, &resolver, &state.db)
        .await?;

    Ok(Json(AnalysisResponse::from_outcome(outcome)))
}

/// 历史记录列表（按时间倒序）
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(state.config.history_page_size)
        .clamp(1, 200);
    let offset = query.offset.unwrap_or(0).min(MAX_HISTORY_OFFSET);

    let db = state.db()?;
    let total = db.count_history()?;
    let items = db
        .load_history(limit, offset)?
        .into_iter()
        .map(HistoryItem::from)
        .collect();

    Ok(Json(HistoryPage {
        total,
        limit,
        offset,
        items,
    }))
}

/// 单条历史记录
pub async fn history_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HistoryDetail>, ApiError> {
    let db = state.db()?;
    let record = db
        .get_record(&id)?
        .ok_or_else(|| ApiError::NotFound(format!("classification {}", id)))?;
    let current_rule = db.get_rule(&record.rule_id)?;

    let item = HistoryItem::from(record.clone());
    Ok(Json(HistoryDetail {
        record,
        state_display: item.state_display,
        confidence_percentage: item.confidence_percentage,
        image_url: item.image_url,
        current_rule,
    }))
}

/// 直接解析处置规则
pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let resolver = state.resolver();
    let resolved = resolver.resolve(&query.category, query.state.as_deref())?;
    let category = resolver
        .category(&query.category)
        .map(|c| c.display_name.clone())
        .unwrap_or_default();

    Ok(Json(ResolveResponse {
        category: resolved.rule.category.clone(),
        category_display: category,
        state: query
            .state
            .as_deref()
            .and_then(crate::core::models::canonical_state)
            .map(|code| state_display_name(&code)),
        guidance: GuidanceResponse::from(resolved),
    }))
}

/// 类别列表
pub async fn categories(State(state): State<Arc<AppState>>) -> Json<Vec<WasteCategory>> {
    Json(state.resolver().categories())
}

/// 邦列表
pub async fn states() -> Json<&'static [IndianState]> {
    Json(INDIAN_STATES)
}

/// 规则列表
pub async fn rules(State(state): State<Arc<AppState>>) -> Json<Vec<DisposalRule>> {
    Json(state.resolver().rules())
}

/// 新增或替换规则
pub async fn put_rule(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RuleInput>,
) -> Result<Json<DisposalRule>, ApiError> {
    let rule = DisposalRule::from(input);
    state.resolver().check_upsert(&rule)?;

    let stored = state.db()?.upsert_rule(&rule)?;
    state.reload_rules()?;

    tracing::info!(
        "已保存处置规则 {} (类别: {}, 邦: {:?})",
        stored.id,
        stored.category,
        stored.state
    );
    Ok(Json(stored))
}

/// 删除规则
pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    {
        let db = state.db()?;
        let rule = db
            .get_rule(&id)?
            .ok_or_else(|| ApiError::NotFound(format!("rule {}", id)))?;
        state.resolver().check_delete(&rule)?;
        db.delete_rule(&id)?;
    }
    state.reload_rules()?;

    tracing::info!("已删除处置规则 {}", id);
    Ok(StatusCode::NO_CONTENT)
}
