//! Storage模块 - 配置与数据库

pub mod config;
pub mod database;
