//! Web模块 - HTTP接口

pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// 表单中除图片以外的字段预留空间
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// 构建路由
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.analysis.uploads().max_bytes() as usize + MULTIPART_OVERHEAD;
    let media = ServeDir::new(state.analysis.uploads().root());

    Router::new()
        // 健康检查
        .route("/health", get(handlers::health))
        // 上传分析
        .route(
            "/api/analyze",
            get(handlers::analyze_info).post(handlers::analyze),
        )
        // 历史记录
        .route("/api/history", get(handlers::history))
        .route("/api/history/:id", get(handlers::history_detail))
        // 规则查询与维护
        .route("/api/resolve", get(handlers::resolve))
        .route("/api/categories", get(handlers::categories))
        .route("/api/states", get(handlers::states))
        .route("/api/rules", get(handlers::rules).put(handlers::put_rule))
        .route("/api/rules/:id", delete(handlers::delete_rule))
        // 上传图片
        .nest_service("/media", media)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
