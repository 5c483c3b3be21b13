//! 配置文件管理模块

use crate::core::models::AppConfig;
use anyhow::Result;
use std::path::PathBuf;

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 获取默认配置路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "wastewise", "WasteWise")
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    /// 加载配置
    pub fn load(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(AppConfig::default())
        }
    }

    /// 加载配置，文件不存在时写入默认配置
    pub fn load_or_init(&self) -> Result<AppConfig> {
        if self.config_path.exists() {
            return self.load();
        }

        let config = AppConfig::default();
        match self.save(&config) {
            Ok(()) => tracing::info!("已写入默认配置: {}", self.config_path.display()),
            Err(e) => tracing::warn!(
                "无法写入默认配置 {}: {:#}",
                self.config_path.display(),
                e
            ),
        }
        Ok(config)
    }

    /// 保存配置
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;
        Ok(())
    }
}

/// 默认数据目录
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "wastewise", "WasteWise")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// 用环境变量覆盖配置
///
/// `lookup` 通常是 `std::env::var`，测试时可替换。
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(bind) = get("WASTEWISE_BIND") {
        config.bind_addr = bind;
    }
    if let Some(db) = get("WASTEWISE_DB") {
        config.database_path = PathBuf::from(db);
    }
    if let Some(dir) = get("WASTEWISE_UPLOAD_DIR") {
        config.upload_dir = PathBuf::from(dir);
    }
    if let Some(key) = get("GEMINI_API_KEY") {
        config.classifier.api_key = key;
    }
    if let Some(model) = get("GEMINI_MODEL") {
        config.classifier.model_name = model;
    }
    if let Some(threshold) = get("WASTEWISE_CONFIDENCE_THRESHOLD") {
        match threshold.parse::<f32>() {
            Ok(t) if (0.0..=1.0).contains(&t) => config.confidence_threshold = t,
            _ => tracing::warn!("忽略无效的置信度阈值: {}", threshold),
        }
    }
}

/// 加载最终生效的配置：配置文件 + 环境变量
pub fn load_effective_config() -> Result<AppConfig> {
    let path = std::env::var("WASTEWISE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| ConfigManager::default_path());

    tracing::info!("加载配置文件: {}", path.display());
    let mut config = ConfigManager::new(path).load_or_init()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}
