//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for Build Matrix,
//! including shell command execution, isolated cell workspaces, secret
//! handling and diagnostic logging.
//!
//! 此模块为 Build Matrix 提供基础设施服务，
//! 包括 shell 命令执行、隔离的单元工作区、密钥处理和诊断日志。

pub mod command;
pub mod fs;
pub mod logging;
pub mod secret;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
