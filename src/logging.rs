//! 安全的日志记录工具
//!
//! 日志初始化，以及凭证脱敏（access/refresh token、session token 不会完整出现在日志中）。

use std::fmt;
use tracing_subscriber::{fmt as tracing_fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(log_level: &str, log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if log_format == "json" {
        registry
            .with(tracing_fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_fmt::layer().with_target(true))
            .try_init()
    };

    // A second init (tests, CLI subcommands) is harmless
    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing already initialized");
    }
}

/// 脱敏后的凭证表示
///
/// 只显示前 8 个字符，其余替换为 `***`
#[derive(Clone, Debug)]
pub struct Redacted<'a> {
    inner: &'a str,
}

impl<'a> Redacted<'a> {
    /// # 示例
    /// ```
    /// use recruit_gateway::logging::Redacted;
    ///
    /// let token = "eyJhbGciOiJSUzI1NiJ9.payload";
    /// assert_eq!(format!("{}", Redacted::new(token)), "eyJhbGci***");
    /// ```
    pub fn new(value: &'a str) -> Self {
        Self { inner: value }
    }
}

impl<'a> fmt::Display for Redacted<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const VISIBLE: usize = 8;
        // 太短的凭证全部脱敏
        if self.inner.len() <= VISIBLE * 2 || !self.inner.is_char_boundary(VISIBLE) {
            write!(f, "***")
        } else {
            write!(f, "{}***", &self.inner[..VISIBLE])
        }
    }
}

/// Shorthand for `Redacted::new`
pub fn redact(value: &str) -> Redacted<'_> {
    Redacted::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_display() {
        let token = "AQVx7Yk2b3d4e5f6g7h8i9j0";
        assert_eq!(format!("{}", redact(token)), "AQVx7Yk2***");
    }

    #[test]
    fn test_short_values_fully_hidden() {
        assert_eq!(format!("{}", redact("tok1")), "***");
        assert_eq!(format!("{}", redact("")), "***");
    }

    #[test]
    fn test_multibyte_boundary() {
        let value = "ééééééééééééééééé";
        // byte 8 is a char boundary here, but never panics either way
        let _ = redact(value).to_string();
    }
}
