//! # Reporting Module / 报告模块
//!
//! This module handles the generation and display of build reports in multiple formats.
//! It provides functionality for printing colorful, formatted summaries to the console,
//! creating styled HTML reports and writing machine-readable JSON reports.
//!
//! 此模块处理多种格式的构建报告生成和显示。
//! 它提供在控制台打印彩色格式化摘要、创建样式化 HTML 报告以及写入机器可读 JSON 报告的功能。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{print_build_verdict, print_failure_details, print_summary};
pub use html::generate_html_report;
pub use json::write_json_report;
