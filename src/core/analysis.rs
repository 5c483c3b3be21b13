//! 分析服务模块
//!
//! 串起一次完整的上传分析：校验图片 → 调用视觉模型 → 解析处置规则 → 保存图片并写入历史。
//! 图片只在分析成功后落盘，写历史失败时删除已保存的图片。

use crate::core::classifier::{Classifier, ClassifierError, ClassifyRequest};
use crate::core::models::{
    canonical_state, state_display_name, Classification, ClassificationRecord, GuidanceSnapshot,
    ResolvedRule, WasteCategory,
};
use crate::core::resolver::{ResolveError, RuleResolver};
use crate::core::upload::{ImageUpload, UploadError, UploadStore};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// 重试前的等待时间
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// 分析错误
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("a state must be selected")]
    MissingState,

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to save classification history: {0}")]
    History(#[source] anyhow::Error),
}

/// 历史记录写入端
///
/// 只允许追加。
pub trait HistorySink: Send + Sync {
    fn append(&self, record: &ClassificationRecord) -> anyhow::Result<()>;
}

/// 一次分析的结果
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// 已写入的历史记录
    pub record: ClassificationRecord,
    /// 命中的处置规则
    pub resolved: ResolvedRule,
    /// 预测类别
    pub category: WasteCategory,
    /// 邦显示名称
    pub state_name: String,
}

/// 分析服务
pub struct AnalysisService {
    /// 视觉模型
    classifier: Arc<dyn Classifier>,
    /// 图片存储
    uploads: UploadStore,
    /// 置信度阈值
    confidence_threshold: f32,
    /// 不可用时的重试次数
    max_retries: u32,
}

impl AnalysisService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        uploads: UploadStore,
        confidence_threshold: f32,
        max_retries: u32,
    ) -> Self {
        Self {
            classifier,
            uploads,
            confidence_threshold,
            max_retries,
        }
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// 分析一张上传的图片
    pub async fn analyze(
        &self,
        upload: ImageUpload,
        state: &str,
        resolver: &RuleResolver,
        history: &dyn HistorySink,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let state_code = canonical_state(state).ok_or(AnalysisError::MissingState)?;
        let state_name = state_display_name(&state_code);

        let (_, mime_type) = self.uploads.validate(&upload)?;
        let categories = resolver.categories();

        let request = ClassifyRequest {
            image: &upload.bytes,
            mime_type: &mime_type,
            file_name: &upload.file_name,
            state_code: &state_code,
            state_name: &state_name,
            categories: &categories,
        };
        let classification = self.classify_with_retry(request).await?;

        let resolved = resolver.resolve(&classification.category, Some(&state_code))?;
        let category = resolver
            .category(&classification.category)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownCategory(classification.category.clone()))?;

        let low_confidence = classification.confidence < self.confidence_threshold;
        if low_confidence {
            tracing::warn!(
                "分类置信度偏低: {} ({:.2} < {:.2})",
                classification.category,
                classification.confidence,
                self.confidence_threshold
            );
        }

        let stored = self.uploads.store(&upload)?;
        let record = ClassificationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            image_path: stored.relative_path,
            image_sha256: stored.sha256,
            predicted_category: classification.category,
            confidence: classification.confidence,
            description: classification.description,
            state: state_code,
            rule_id: resolved.rule.id.clone(),
            rule_scope: resolved.scope,
            guidance: GuidanceSnapshot::from(&resolved.rule),
            low_confidence,
            raw_response: classification.raw_response,
            created_at: Utc::now(),
        };

        if let Err(e) = history.append(&record) {
            self.uploads.remove(&record.image_path);
            return Err(AnalysisError::History(e));
        }

        tracing::info!(
            "分类完成: {} -> {} ({}, 置信度 {:.2})",
            record.id,
            record.predicted_category,
            resolved.scope,
            record.confidence
        );

        Ok(AnalysisOutcome {
            record,
            resolved,
            category,
            state_name,
        })
    }

    /// 调用视觉模型，服务不可用时按配置重试
    async fn classify_with_retry(
        &self,
        request: ClassifyRequest<'_>,
    ) -> Result<Classification, ClassifierError> {
        let mut attempt = 0;
        loop {
            match self.classifier.classify(request).await {
                Ok(classification) => return Ok(classification),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "分类服务 {} 暂不可用，第 {} 次重试: {}",
                        self.classifier.name(),
                        attempt,
                        e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    tracing::error!("分类失败 ({}): {}", self.classifier.name(), e);
                    return Err(e);
                }
            }
        }
    }
}
