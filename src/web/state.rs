//! 应用共享状态

use crate::core::analysis::AnalysisService;
use crate::core::classifier::Classifier;
use crate::core::models::AppConfig;
use crate::core::resolver::RuleResolver;
use crate::core::upload::UploadStore;
use crate::storage::database::Database;
use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

pub struct AppState {
    pub config: AppConfig,
    pub db: Mutex<Database>,
    /// 规则快照，编辑规则后整体替换
    resolver: RwLock<Arc<RuleResolver>>,
    pub analysis: AnalysisService,
}

impl AppState {
    pub fn new(config: AppConfig, db: Database, classifier: Arc<dyn Classifier>) -> Result<Self> {
        let resolver = db.load_resolver()?;
        for category in resolver.missing_national_rules() {
            tracing::error!("类别 {} 缺少全国处置规则", category);
        }

        let uploads = UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes);
        let analysis = AnalysisService::new(
            classifier,
            uploads,
            config.confidence_threshold,
            config.classifier.max_retries,
        );

        Ok(Self {
            config,
            db: Mutex::new(db),
            resolver: RwLock::new(Arc::new(resolver)),
            analysis,
        })
    }

    /// 当前规则快照
    pub fn resolver(&self) -> Arc<RuleResolver> {
        match self.resolver.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 获取数据库连接
    pub fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    /// 从数据库重建规则快照
    pub fn reload_rules(&self) -> Result<()> {
        let resolver = self.db()?.load_resolver()?;
        tracing::info!("规则已重新加载: {} 条", resolver.rules().len());

        let mut guard = match self.resolver.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(resolver);
        Ok(())
    }
}
