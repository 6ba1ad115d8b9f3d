//! Diagnostic logging. User-facing progress goes to stdout through the
//! console reporter; these traces go to stderr.
//!
//! 诊断日志。面向用户的进度信息通过控制台报告输出到 stdout，这些跟踪信息输出到 stderr。

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `build_matrix=debug`.
pub const LOG_ENV: &str = "BUILD_MATRIX_LOG";

/// Installs the global subscriber. `BUILD_MATRIX_LOG` wins over `verbosity`
/// (the number of `-v` flags). Safe to call more than once.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        EnvFilter::new(level)
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .ok();
}
