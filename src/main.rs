//! WasteWise - 废弃物图片分类与处置建议服务
//!
//! 核心设计原则：
//! - 视觉模型只负责判断类别
//! - 处置建议只来自规则表，邦规则优先，缺失时回退到全国规则
//! - 历史记录只追加，不修改

pub mod core;
pub mod storage;
pub mod web;

use crate::core::classifier::{Classifier, GeminiClassifier, OfflineClassifier};
use crate::core::models::ClassifierConfig;
use crate::storage::config::load_effective_config;
use crate::storage::database::Database;
use crate::web::state::AppState;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 根据配置选择分类器
fn build_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>> {
    if config.api_key.trim().is_empty() {
        tracing::warn!("未配置 GEMINI_API_KEY，使用离线分类（仅根据文件名猜测）");
        return Ok(Arc::new(OfflineClassifier));
    }

    tracing::info!("使用视觉模型: {}", config.model_name);
    Ok(Arc::new(GeminiClassifier::new(config.clone())?))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wastewise=info,tower_http=info")),
        )
        .init();

    tracing::info!("启动 WasteWise - 废弃物分类与处置建议服务");

    let config = load_effective_config()?;

    let db = Database::open(&config.database_path)?;
    tracing::info!("数据库: {}", config.database_path.display());
    db.seed_builtin()?;

    let classifier = build_classifier(&config.classifier)?;
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config, db, classifier)?);

    let app = web::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("监听 http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
