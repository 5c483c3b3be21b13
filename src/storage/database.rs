//! 数据库存储模块
//!
//! 使用SQLite存储类别、处置规则和分类历史记录

use crate::core::analysis::HistorySink;
use crate::core::builtin::{builtin_categories, builtin_rules};
use crate::core::models::{
    canonical_state, ClassificationRecord, DisposalRule, GuidanceSnapshot, RuleExtras, RuleScope,
    WasteCategory,
};
use crate::core::resolver::RuleResolver;
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;

const RULE_COLUMNS: &str = "id, category, state, disposal_method, hazards, precautions, source, \
     authorized_facilities, protective_equipment, emergency_procedures, recyclability, \
     environmental_risks, state_specific_laws, cost_implications, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, image_path, image_sha256, predicted_category, confidence, \
     description, state, rule_id, rule_scope, guidance, low_confidence, raw_response, created_at";

/// 数据库管理器
pub struct Database {
    conn: Connection,
}

impl Database {
    /// 打开或创建数据库
    pub fn open(path: &Path) -> Result<Self> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_tables()?;
        Ok(db)
    }

    /// 打开内存数据库
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_tables()?;
        Ok(db)
    }

    /// 初始化表结构
    fn init_tables(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- 类别表
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            );

            -- 处置规则表（state 为空串表示全国规则）
            CREATE TABLE IF NOT EXISTS disposal_rules (
                id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT '',
                disposal_method TEXT NOT NULL,
                hazards TEXT NOT NULL,
                precautions TEXT NOT NULL,
                source TEXT NOT NULL,
                authorized_facilities TEXT,
                protective_equipment TEXT,
                emergency_procedures TEXT,
                recyclability TEXT,
                environmental_risks TEXT,
                state_specific_laws TEXT,
                cost_implications TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (category, state)
            );

            -- 分类历史表（只追加）
            CREATE TABLE IF NOT EXISTS classifications (
                id TEXT PRIMARY KEY,
                image_path TEXT NOT NULL,
                image_sha256 TEXT NOT NULL,
                predicted_category TEXT NOT NULL,
                confidence REAL NOT NULL,
                description TEXT NOT NULL,
                state TEXT NOT NULL,
                rule_id TEXT NOT NULL,
                rule_scope TEXT NOT NULL,
                -- 生成记录时的处置建议副本（JSON）
                guidance TEXT NOT NULL,
                low_confidence INTEGER NOT NULL DEFAULT 0,
                raw_response TEXT,
                created_at TEXT NOT NULL
            );

            -- 创建索引
            CREATE INDEX IF NOT EXISTS idx_rules_category ON disposal_rules(category);
            CREATE INDEX IF NOT EXISTS idx_classifications_created ON classifications(created_at DESC);
            "#,
        )?;
        Ok(())
    }

    /// 首次启动时写入内置类别与规则，返回写入的规则数
    pub fn seed_builtin(&self) -> Result<usize> {
        let existing: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        for category in builtin_categories() {
            self.save_category(&category)?;
        }
        let rules = builtin_rules();
        for rule in &rules {
            self.upsert_rule(rule)?;
        }
        tx.commit()?;

        tracing::info!("已写入内置规则: {} 条", rules.len());
        Ok(rules.len())
    }

    /// 保存类别
    pub fn save_category(&self, category: &WasteCategory) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO categories (id, display_name) VALUES (?1, ?2)",
            params![category.id, category.display_name],
        )?;
        Ok(())
    }

    /// 加载所有类别
    pub fn load_categories(&self) -> Result<Vec<WasteCategory>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, display_name FROM categories ORDER BY id")?;
        let categories = stmt.query_map([], |row| {
            Ok(WasteCategory {
                id: row.get(0)?,
                display_name: row.get(1)?,
            })
        })?;
        categories.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// 新增或替换 (类别, 邦) 对应的规则，返回库中的最终规则
    ///
    /// 已存在时保留原ID与创建时间。
    pub fn upsert_rule(&self, rule: &DisposalRule) -> Result<DisposalRule> {
        let state = rule
            .state
            .as_deref()
            .and_then(canonical_state)
            .unwrap_or_default();

        self.conn.execute(
            r#"
            INSERT INTO disposal_rules
            (id, category, state, disposal_method, hazards, precautions, source,
             authorized_facilities, protective_equipment, emergency_procedures, recyclability,
             environmental_risks, state_specific_laws, cost_implications,
             created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(category, state) DO UPDATE SET
                disposal_method = excluded.disposal_method,
                hazards = excluded.hazards,
                precautions = excluded.precautions,
                source = excluded.source,
                authorized_facilities = excluded.authorized_facilities,
                protective_equipment = excluded.protective_equipment,
                emergency_procedures = excluded.emergency_procedures,
                recyclability = excluded.recyclability,
                environmental_risks = excluded.environmental_risks,
                state_specific_laws = excluded.state_specific_laws,
                cost_implications = excluded.cost_implications,
                updated_at = excluded.updated_at
            "#,
            params![
                rule.id,
                rule.category,
                state,
                rule.disposal_method,
                rule.hazards,
                rule.precautions,
                rule.source,
                rule.extras.authorized_facilities,
                rule.extras.protective_equipment,
                rule.extras.emergency_procedures,
                rule.extras.recyclability,
                rule.extras.environmental_risks,
                rule.extras.state_specific_laws,
                rule.extras.cost_implications,
                format_time(&rule.created_at),
                format_time(&rule.updated_at),
            ],
        )?;

        let sql = format!(
            "SELECT {} FROM disposal_rules WHERE category = ?1 AND state = ?2",
            RULE_COLUMNS
        );
        let stored = self
            .conn
            .query_row(&sql, params![rule.category, state], row_to_rule)?;
        Ok(stored)
    }

    /// 加载所有规则
    pub fn load_rules(&self) -> Result<Vec<DisposalRule>> {
        let sql = format!(
            "SELECT {} FROM disposal_rules ORDER BY category, state",
            RULE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rules = stmt.query_map([], row_to_rule)?;
        rules.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// 按ID查询规则
    pub fn get_rule(&self, rule_id: &str) -> Result<Option<DisposalRule>> {
        let sql = format!("SELECT {} FROM disposal_rules WHERE id = ?1", RULE_COLUMNS);
        self.conn
            .query_row(&sql, params![rule_id], row_to_rule)
            .optional()
            .map_err(Into::into)
    }

    /// 删除规则
    pub fn delete_rule(&self, rule_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM disposal_rules WHERE id = ?1", params![rule_id])?;
        Ok(affected > 0)
    }

    /// 由当前库内容构建规则解析器
    pub fn load_resolver(&self) -> Result<RuleResolver> {
        Ok(RuleResolver::new(self.load_categories()?, self.load_rules()?))
    }

    /// 追加一条分类记录
    ///
    /// 记录不可修改，重复ID会报错。
    pub fn append_record(&self, record: &ClassificationRecord) -> Result<()> {
        let guidance = serde_json::to_string(&record.guidance)?;
        self.conn.execute(
            r#"
            INSERT INTO classifications
            (id, image_path, image_sha256, predicted_category, confidence, description, state,
             rule_id, rule_scope, guidance, low_confidence, raw_response, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                record.id,
                record.image_path,
                record.image_sha256,
                record.predicted_category,
                record.confidence as f64,
                record.description,
                record.state,
                record.rule_id,
                record.rule_scope.as_str(),
                guidance,
                record.low_confidence,
                record.raw_response,
                format_time(&record.created_at),
            ],
        )?;
        Ok(())
    }

    /// 按时间倒序加载历史记录
    pub fn load_history(&self, limit: usize, offset: usize) -> Result<Vec<ClassificationRecord>> {
        let sql = format!(
            "SELECT {} FROM classifications ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
            RECORD_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        // SQLite 的 LIMIT/OFFSET 是有符号整数
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let records = stmt.query_map(params![limit, offset], row_to_record)?;
        records.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// 按ID查询历史记录
    pub fn get_record(&self, record_id: &str) -> Result<Option<ClassificationRecord>> {
        let sql = format!("SELECT {} FROM classifications WHERE id = ?1", RECORD_COLUMNS);
        self.conn
            .query_row(&sql, params![record_id], row_to_record)
            .optional()
            .map_err(Into::into)
    }

    /// 历史记录总数
    pub fn count_history(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM classifications", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl HistorySink for Mutex<Database> {
    fn append(&self, record: &ClassificationRecord) -> Result<()> {
        let db = self
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))?;
        db.append_record(record)
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 读取时间列，格式错误时返回转换错误
fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<DisposalRule> {
    let state: String = row.get(2)?;

    Ok(DisposalRule {
        id: row.get(0)?,
        category: row.get(1)?,
        state: if state.is_empty() { None } else { Some(state) },
        disposal_method: row.get(3)?,
        hazards: row.get(4)?,
        precautions: row.get(5)?,
        source: row.get(6)?,
        extras: RuleExtras {
            authorized_facilities: row.get(7)?,
            protective_equipment: row.get(8)?,
            emergency_procedures: row.get(9)?,
            recyclability: row.get(10)?,
            environmental_risks: row.get(11)?,
            state_specific_laws: row.get(12)?,
            cost_implications: row.get(13)?,
        },
        created_at: time_column(row, 14)?,
        updated_at: time_column(row, 15)?,
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ClassificationRecord> {
    let confidence: f64 = row.get(4)?;
    let scope: String = row.get(8)?;
    let rule_scope = RuleScope::parse(&scope).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            format!("unknown rule scope {:?}", scope).into(),
        )
    })?;
    let guidance: String = row.get(9)?;
    let guidance: GuidanceSnapshot = serde_json::from_str(&guidance)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

    Ok(ClassificationRecord {
        id: row.get(0)?,
        image_path: row.get(1)?,
        image_sha256: row.get(2)?,
        predicted_category: row.get(3)?,
        confidence: confidence as f32,
        description: row.get(5)?,
        state: row.get(6)?,
        rule_id: row.get(7)?,
        rule_scope,
        guidance,
        low_confidence: row.get(10)?,
        raw_response: row.get(11)?,
        created_at: time_column(row, 12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(id: &str, created_at: DateTime<Utc>) -> ClassificationRecord {
        ClassificationRecord {
            id: id.to_string(),
            image_path: format!("waste_images/{}.png", id),
            image_sha256: "ab".repeat(32),
            predicted_category: "e-waste".to_string(),
            confidence: 0.75,
            description: "phone".to_string(),
            state: "MH".to_string(),
            rule_id: "rule-1".to_string(),
            rule_scope: RuleScope::StateSpecific,
            guidance: GuidanceSnapshot {
                disposal_method: "collector".to_string(),
                hazards: "lead".to_string(),
                precautions: "tape terminals".to_string(),
                source: "MPCB".to_string(),
                extras: RuleExtras::default(),
            },
            low_confidence: false,
            raw_response: Some("{}".to_string()),
            created_at,
        }
    }

    #[test]
    fn test_database_init() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let db = Database::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(db.count_history().unwrap(), 0);
    }

    #[test]
    fn test_seed_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let seeded = db.seed_builtin().unwrap();
        assert_eq!(seeded, builtin_rules().len());
        assert_eq!(db.seed_builtin().unwrap(), 0);

        assert_eq!(db.load_categories().unwrap().len(), builtin_categories().len());
        assert_eq!(db.load_rules().unwrap().len(), seeded);

        let resolver = db.load_resolver().unwrap();
        assert!(resolver.missing_national_rules().is_empty());
        let resolved = resolver.resolve("e-waste", Some("Maharashtra")).unwrap();
        assert_eq!(resolved.rule.state.as_deref(), Some("MH"));
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let db = Database::open_in_memory().unwrap();
        db.save_category(&WasteCategory::new("organic", "Organic")).unwrap();

        let first = db
            .upsert_rule(&DisposalRule::new("organic", Some("Goa"), "compost", "h", "p", "GSPCB"))
            .unwrap();
        assert_eq!(first.state.as_deref(), Some("GA"));

        let second = db
            .upsert_rule(&DisposalRule::new("organic", Some("GA"), "biogas", "h", "p", "GSPCB"))
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.disposal_method, "biogas");
        assert_eq!(db.load_rules().unwrap().len(), 1);
    }

    #[test]
    fn test_national_and_state_rules_coexist() {
        let db = Database::open_in_memory().unwrap();
        db.save_category(&WasteCategory::new("organic", "Organic")).unwrap();
        let national = db
            .upsert_rule(&DisposalRule::new("organic", None, "wet bin", "h", "p", "CPCB"))
            .unwrap();
        db.upsert_rule(&DisposalRule::new("organic", Some("KL"), "compost", "h", "p", "KSPCB"))
            .unwrap();

        assert!(national.is_national());
        assert_eq!(db.load_rules().unwrap().len(), 2);

        assert!(db.delete_rule(&national.id).unwrap());
        assert!(!db.delete_rule(&national.id).unwrap());
        assert!(db.get_rule(&national.id).unwrap().is_none());
    }

    #[test]
    fn test_history_is_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc::now();
        db.append_record(&record("old", base - Duration::minutes(5))).unwrap();
        db.append_record(&record("new", base)).unwrap();
        db.append_record(&record("mid", base - Duration::minutes(1))).unwrap();

        let ids: Vec<_> = db
            .load_history(10, 0)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);

        let page: Vec<_> = db.load_history(1, 1).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(page, vec!["mid"]);
        assert_eq!(db.count_history().unwrap(), 3);
    }

    #[test]
    fn test_records_are_append_only() {
        let db = Database::open_in_memory().unwrap();
        let original = record("r1", Utc::now());
        db.append_record(&original).unwrap();

        let mut altered = original.clone();
        altered.predicted_category = "medical".to_string();
        assert!(db.append_record(&altered).is_err());

        let stored = db.get_record("r1").unwrap().unwrap();
        assert_eq!(stored.predicted_category, "e-waste");
        assert_eq!(stored.rule_scope, RuleScope::StateSpecific);
        assert_eq!(stored.raw_response.as_deref(), Some("{}"));
        assert!(db.get_record("missing").unwrap().is_none());
    }

    #[test]
    fn test_rule_extras_round_trip() {
        let db = Database::open_in_memory().unwrap();
        db.save_category(&WasteCategory::new("hazardous", "Hazardous")).unwrap();

        let extras = RuleExtras {
            environmental_risks: Some("groundwater".to_string()),
            state_specific_laws: Some("TN hazardous waste order".to_string()),
            cost_implications: Some("free drop-off".to_string()),
            ..Default::default()
        };
        let rule = DisposalRule::new("hazardous", Some("TN"), "TSDF", "toxic", "gloves", "TNPCB")
            .with_extras(extras.clone());
        let stored = db.upsert_rule(&rule).unwrap();
        assert_eq!(stored.extras, extras);

        let replaced = db
            .upsert_rule(&DisposalRule::new("hazardous", Some("TN"), "TSDF", "toxic", "gloves", "TNPCB"))
            .unwrap();
        assert_eq!(replaced.id, stored.id);
        assert_eq!(replaced.extras, RuleExtras::default());
    }

    #[test]
    fn test_history_keeps_guidance_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let mut original = record("r1", Utc::now());
        original.guidance.extras.cost_implications = Some("free".to_string());
        db.append_record(&original).unwrap();

        let stored = db.get_record("r1").unwrap().unwrap();
        assert_eq!(stored.guidance, original.guidance);
    }

    #[test]
    fn test_huge_offset_returns_empty_page() {
        let db = Database::open_in_memory().unwrap();
        db.append_record(&record("r1", Utc::now())).unwrap();

        assert!(db.load_history(10, usize::MAX).unwrap().is_empty());
        assert_eq!(db.load_history(usize::MAX, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.append_record(&record("r1", Utc::now())).unwrap();
        db.conn
            .execute(
                "UPDATE classifications SET created_at = 'yesterday' WHERE id = 'r1'",
                [],
            )
            .unwrap();

        assert!(db.get_record("r1").is_err());
        assert!(db.load_history(10, 0).is_err());
    }

    #[test]
    fn test_mutex_database_is_history_sink() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        HistorySink::append(&db, &record("r1", Utc::now())).unwrap();
        assert_eq!(db.lock().unwrap().count_history().unwrap(), 1);
    }
}
