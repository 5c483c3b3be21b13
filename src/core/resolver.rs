//! 处置规则解析模块
//!
//! 给定类别与可选的邦，返回适用的处置规则：
//! 先查 (类别, 邦)，没有则回退到 (类别, 全国)。
//! 解析器是存储中规则表的只读快照，编辑规则后整体重建。

use crate::core::models::{
    canonical_state, normalize_category_id, DisposalRule, ResolvedRule, RuleScope, WasteCategory,
};
use std::collections::HashMap;
use thiserror::Error;

/// 规则解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown waste category: {0}")]
    UnknownCategory(String),

    #[error("no disposal rule configured for category {category} (state: {state:?})")]
    NoRuleConfigured {
        category: String,
        state: Option<String>,
    },
}

/// 规则编辑错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleEditError {
    #[error("unknown waste category: {0}")]
    UnknownCategory(String),

    #[error("national rule for {0} cannot be removed; every category needs one")]
    NationalRuleRequired(String),

    #[error("rule text must not be empty: {0}")]
    EmptyField(&'static str),
}

type RuleKey = (String, Option<String>);

/// 规则解析器
#[derive(Debug, Clone, Default)]
pub struct RuleResolver {
    /// 类别表
    categories: HashMap<String, WasteCategory>,
    /// (类别, 邦) -> 规则
    rules: HashMap<RuleKey, DisposalRule>,
}

impl RuleResolver {
    /// 由类别与规则构建解析器
    ///
    /// 同一 (类别, 邦) 出现多条时保留最后修改的一条。
    pub fn new(categories: Vec<WasteCategory>, rules: Vec<DisposalRule>) -> Self {
        let categories = categories
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect::<HashMap<_, _>>();

        let mut table: HashMap<RuleKey, DisposalRule> = HashMap::new();
        for mut rule in rules {
            rule.category = normalize_category_id(&rule.category);
            rule.state = rule.state.as_deref().and_then(canonical_state);
            let key = (rule.category.clone(), rule.state.clone());

            match table.get(&key) {
                Some(existing) if existing.updated_at > rule.updated_at => {
                    tracing::warn!(
                        "重复的处置规则 {} 被忽略 (类别: {}, 邦: {:?})",
                        rule.id,
                        key.0,
                        key.1
                    );
                }
                _ => {
                    table.insert(key, rule);
                }
            }
        }

        Self {
            categories,
            rules: table,
        }
    }

    /// 解析处置规则
    pub fn resolve(
        &self,
        category: &str,
        state: Option<&str>,
    ) -> Result<ResolvedRule, ResolveError> {
        let category_id = normalize_category_id(category);
        if !self.categories.contains_key(&category_id) {
            return Err(ResolveError::UnknownCategory(category.trim().to_string()));
        }

        let state = state.and_then(canonical_state);

        if let Some(code) = &state {
            if let Some(rule) = self.rules.get(&(category_id.clone(), Some(code.clone()))) {
                return Ok(ResolvedRule {
                    rule: rule.clone(),
                    scope: RuleScope::StateSpecific,
                });
            }
        }

        self.rules
            .get(&(category_id.clone(), None))
            .map(|rule| ResolvedRule {
                rule: rule.clone(),
                scope: RuleScope::NationalDefault,
            })
            .ok_or(ResolveError::NoRuleConfigured {
                category: category_id,
                state,
            })
    }

    /// 查找类别
    pub fn category(&self, id: &str) -> Option<&WasteCategory> {
        self.categories.get(&normalize_category_id(id))
    }

    /// 全部类别（按标识排序）
    pub fn categories(&self) -> Vec<WasteCategory> {
        let mut list: Vec<_> = self.categories.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// 全部规则（按类别、邦排序，全国规则在前）
    pub fn rules(&self) -> Vec<DisposalRule> {
        let mut list: Vec<_> = self.rules.values().cloned().collect();
        list.sort_by(|a, b| (&a.category, &a.state).cmp(&(&b.category, &b.state)));
        list
    }

    /// 缺少全国规则的类别
    pub fn missing_national_rules(&self) -> Vec<String> {
        let mut missing: Vec<_> = self
            .categories
            .keys()
            .filter(|id| !self.rules.contains_key(&((*id).clone(), None)))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    /// 检查新增/替换规则是否合法
    pub fn check_upsert(&self, rule: &DisposalRule) -> Result<(), RuleEditError> {
        if !self.categories.contains_key(&normalize_category_id(&rule.category)) {
            return Err(RuleEditError::UnknownCategory(rule.category.clone()));
        }
        if rule.disposal_method.trim().is_empty() {
            return Err(RuleEditError::EmptyField("disposal_method"));
        }
        if rule.source.trim().is_empty() {
            return Err(RuleEditError::EmptyField("source"));
        }
        Ok(())
    }

    /// 检查删除规则是否合法
    pub fn check_delete(&self, rule: &DisposalRule) -> Result<(), RuleEditError> {
        if rule.is_national() && self.categories.contains_key(&rule.category) {
            return Err(RuleEditError::NationalRuleRequired(rule.category.clone()));
        }
        Ok(())
    }
}
