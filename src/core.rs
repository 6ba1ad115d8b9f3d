//! # Core Module / 核心模块
//!
//! This module contains the core functionality of Build Matrix:
//! configuration, matrix expansion, per-cell execution, the whole-build
//! runner and the deployment gate.
//!
//! 此模块包含 Build Matrix 的核心功能：
//! 配置、矩阵展开、单元执行、整体构建运行器和部署门控。

pub mod config;
pub mod deploy;
pub mod execution;
pub mod matrix;
pub mod models;
pub mod runner;

// Re-exports
pub use config::BuildMatrix;
pub use deploy::{maybe_deploy, DeploymentGate, GateDecision};
pub use execution::run_cell;
pub use matrix::{Cell, CellIter};
pub use models::{BuildOutcome, CellResult, Outcome};
pub use runner::run_all;
