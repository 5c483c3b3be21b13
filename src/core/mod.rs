//! Core模块 - 包含所有核心业务逻辑

pub mod analysis;
pub mod builtin;
pub mod classifier;
pub mod models;
pub mod resolver;
pub mod upload;
