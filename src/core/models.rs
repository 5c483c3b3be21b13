//! 核心数据模型定义
//!
//! 废弃物类别、邦/中央直辖区、处置规则与分类历史记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 废弃物类别
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteCategory {
    /// 类别标识（小写短横线形式，如 `e-waste`）
    pub id: String,
    /// 显示名称
    pub display_name: String,
}

impl WasteCategory {
    /// 创建类别，标识会被规范化
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: normalize_category_id(id),
            display_name: display_name.trim().to_string(),
        }
    }
}

/// 规范化类别标识
///
/// 模型返回的 `E_WASTE`、用户输入的 `E-Waste` 都归一为 `e-waste`。
pub fn normalize_category_id(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// 印度的邦与中央直辖区
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndianState {
    /// 两位字母代码
    pub code: &'static str,
    /// 名称
    pub name: &'static str,
}

/// 全部邦与中央直辖区
pub const INDIAN_STATES: &[IndianState] = &[
    IndianState { code: "AP", name: "Andhra Pradesh" },
    IndianState { code: "AR", name: "Arunachal Pradesh" },
    IndianState { code: "AS", name: "Assam" },
    IndianState { code: "BR", name: "Bihar" },
    IndianState { code: "CT", name: "Chhattisgarh" },
    IndianState { code: "GA", name: "Goa" },
    IndianState { code: "GJ", name: "Gujarat" },
    IndianState { code: "HR", name: "Haryana" },
    IndianState { code: "HP", name: "Himachal Pradesh" },
    IndianState { code: "JH", name: "Jharkhand" },
    IndianState { code: "KA", name: "Karnataka" },
    IndianState { code: "KL", name: "Kerala" },
    IndianState { code: "MP", name: "Madhya Pradesh" },
    IndianState { code: "MH", name: "Maharashtra" },
    IndianState { code: "MN", name: "Manipur" },
    IndianState { code: "ML", name: "Meghalaya" },
    IndianState { code: "MZ", name: "Mizoram" },
    IndianState { code: "NL", name: "Nagaland" },
    IndianState { code: "OR", name: "Odisha" },
    IndianState { code: "PB", name: "Punjab" },
    IndianState { code: "RJ", name: "Rajasthan" },
    IndianState { code: "SK", name: "Sikkim" },
    IndianState { code: "TN", name: "Tamil Nadu" },
    IndianState { code: "TG", name: "Telangana" },
    IndianState { code: "TR", name: "Tripura" },
    IndianState { code: "UP", name: "Uttar Pradesh" },
    IndianState { code: "UT", name: "Uttarakhand" },
    IndianState { code: "WB", name: "West Bengal" },
    IndianState { code: "AN", name: "Andaman and Nicobar" },
    IndianState { code: "CH", name: "Chandigarh" },
    IndianState { code: "DH", name: "Dadra and Nagar Haveli" },
    IndianState { code: "DD", name: "Daman and Diu" },
    IndianState { code: "DL", name: "Delhi" },
    IndianState { code: "JK", name: "Jammu and Kashmir" },
    IndianState { code: "LA", name: "Ladakh" },
    IndianState { code: "LD", name: "Lakshadweep" },
    IndianState { code: "PY", name: "Puducherry" },
];

/// 按代码或名称查找邦（不区分大小写）
pub fn find_state(raw: &str) -> Option<&'static IndianState> {
    let needle = raw.trim();
    INDIAN_STATES.iter().find(|s| {
        s.code.eq_ignore_ascii_case(needle) || s.name.eq_ignore_ascii_case(needle)
    })
}

/// 把用户给出的邦参数归一为规则表中使用的键
///
/// 空白视为未选择；已知的邦统一为代码；未知字符串原样保留（只会命中全国规则）。
pub fn canonical_state(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        find_state(trimmed)
            .map(|s| s.code.to_string())
            .unwrap_or_else(|| trimmed.to_string()),
    )
}

/// 邦的显示名称，未知代码原样返回
pub fn state_display_name(code: &str) -> String {
    find_state(code)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// 处置规则的补充信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleExtras {
    /// 授权处置设施
    #[serde(default)]
    pub authorized_facilities: Option<String>,
    /// 防护装备
    #[serde(default)]
    pub protective_equipment: Option<String>,
    /// 应急处理
    #[serde(default)]
    pub emergency_procedures: Option<String>,
    /// 可回收性说明
    #[serde(default)]
    pub recyclability: Option<String>,
    /// 环境风险（与健康危害分开记录）
    #[serde(default)]
    pub environmental_risks: Option<String>,
    /// 适用的邦法规
    #[serde(default)]
    pub state_specific_laws: Option<String>,
    /// 处置费用说明
    #[serde(default)]
    pub cost_implications: Option<String>,
}

/// 处置规则
/// 以 (类别, 邦) 唯一；`state` 为空即全国（CPCB）默认规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisposalRule {
    /// 规则唯一ID
    pub id: String,
    /// 类别标识
    pub category: String,
    /// 邦代码，None 表示全国默认
    pub state: Option<String>,
    /// 处置方法
    pub disposal_method: String,
    /// 危害说明
    pub hazards: String,
    /// 安全注意事项
    pub precautions: String,
    /// 出处（法规或主管机构）
    pub source: String,
    /// 补充信息
    #[serde(flatten)]
    pub extras: RuleExtras,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最后修改时间
    pub updated_at: DateTime<Utc>,
}

impl DisposalRule {
    /// 创建新规则
    pub fn new(
        category: &str,
        state: Option<&str>,
        disposal_method: &str,
        hazards: &str,
        precautions: &str,
        source: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category: normalize_category_id(category),
            state: state.and_then(canonical_state),
            disposal_method: disposal_method.to_string(),
            hazards: hazards.to_string(),
            precautions: precautions.to_string(),
            source: source.to_string(),
            extras: RuleExtras::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// 设置补充信息
    pub fn with_extras(mut self, extras: RuleExtras) -> Self {
        self.extras = extras;
        self
    }

    /// 是否为全国默认规则
    pub fn is_national(&self) -> bool {
        self.state.is_none()
    }
}

/// 规则命中范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    /// 命中邦规则（SPCB）
    StateSpecific,
    /// 回退到全国规则（CPCB）
    NationalDefault,
}

impl RuleScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleScope::StateSpecific => "state_specific",
            RuleScope::NationalDefault => "national_default",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "state_specific" => Some(RuleScope::StateSpecific),
            "national_default" => Some(RuleScope::NationalDefault),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleScope::StateSpecific => write!(f, "state guideline"),
            RuleScope::NationalDefault => write!(f, "national guideline"),
        }
    }
}

/// 规则解析结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRule {
    pub rule: DisposalRule,
    pub scope: RuleScope,
}

impl ResolvedRule {
    /// 是否为回退结果
    pub fn is_fallback(&self) -> bool {
        self.scope == RuleScope::NationalDefault
    }
}

/// 记录生成时给出的处置建议副本
///
/// 规则之后被修改或删除，不影响已有记录。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuidanceSnapshot {
    pub disposal_method: String,
    pub hazards: String,
    pub precautions: String,
    pub source: String,
    #[serde(flatten)]
    pub extras: RuleExtras,
}

impl From<&DisposalRule> for GuidanceSnapshot {
    fn from(rule: &DisposalRule) -> Self {
        Self {
            disposal_method: rule.disposal_method.clone(),
            hazards: rule.hazards.clone(),
            precautions: rule.precautions.clone(),
            source: rule.source.clone(),
            extras: rule.extras.clone(),
        }
    }
}

/// 视觉模型的分类结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// 规范化后的类别标识
    pub category: String,
    /// 置信度 (0.0 - 1.0)
    pub confidence: f32,
    /// 模型对废弃物的描述
    pub description: String,
    /// 模型原始响应（调试用）
    pub raw_response: Option<String>,
}

/// 分类历史记录
/// 创建后不可修改，不会被自动删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    /// 记录ID
    pub id: String,
    /// 上传图片的相对路径
    pub image_path: String,
    /// 图片SHA-256
    pub image_sha256: String,
    /// 预测类别
    pub predicted_category: String,
    /// 置信度
    pub confidence: f32,
    /// 模型描述
    pub description: String,
    /// 所选邦
    pub state: String,
    /// 解析得到的规则ID
    pub rule_id: String,
    /// 规则命中范围
    pub rule_scope: RuleScope,
    /// 当时给出的处置建议
    pub guidance: GuidanceSnapshot,
    /// 是否低于置信度阈值
    pub low_confidence: bool,
    /// 模型原始响应
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 视觉模型配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// API端点URL
    pub api_endpoint: String,
    /// API密钥，为空时使用离线分类
    pub api_key: String,
    /// 模型名称
    pub model_name: String,
    /// 最大token数
    pub max_tokens: u32,
    /// 温度参数
    pub temperature: f32,
    /// 单次请求超时（秒）
    pub timeout_secs: u64,
    /// 服务不可用时的重试次数
    pub max_retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: String::new(),
            model_name: "gemini-1.5-flash".to_string(),
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 30,
            max_retries: 1,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 监听地址
    pub bind_addr: String,
    /// 数据库文件路径
    pub database_path: PathBuf,
    /// 上传图片根目录
    pub upload_dir: PathBuf,
    /// 单张图片最大字节数
    pub max_upload_bytes: u64,
    /// 置信度阈值（低于此值的结果会被标记）
    pub confidence_threshold: f32,
    /// 历史记录默认分页大小
    pub history_page_size: usize,
    /// 视觉模型配置
    pub classifier: ClassifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = crate::storage::config::default_data_dir();
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            database_path: data_dir.join("wastewise.db"),
            upload_dir: data_dir.join("media"),
            max_upload_bytes: 10 * 1024 * 1024,
            confidence_threshold: 0.5,
            history_page_size: 20,
            classifier: ClassifierConfig::default(),
        }
    }
}
