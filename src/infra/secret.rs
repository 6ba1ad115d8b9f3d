//! # Secret Handling Module / 密钥处理模块
//!
//! A [`Secret`] holds a decrypted credential. It never prints its contents
//! through `Debug` or `Display`, and [`Secret::redact`] masks it inside text
//! that is about to be shown or written to a report.
//!
//! [`Secret`] 保存已解密的凭据。它不会通过 `Debug` 或 `Display` 输出其内容，
//! 并且 [`Secret::redact`] 会在文本被显示或写入报告前将其遮蔽。

use std::fmt;

/// Placeholder written in place of a secret.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The plaintext. Only hand this to a child process environment.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replaces every occurrence of the secret in `text` with [`REDACTED`].
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(&self.0, REDACTED)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({REDACTED})")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}
