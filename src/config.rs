//! Console limits and tunables, with environment overrides.

use std::env;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_CODE_LENGTH: usize = 50_000;
pub const DEFAULT_LINT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Substrings that block a run. Advisory only, the server decides what runs.
pub const DEFAULT_FORBIDDEN_PATTERNS: [&str; 10] = [
    "import os",
    "import sys",
    "import subprocess",
    "eval(",
    "exec(",
    "__import__",
    "open(",
    "system(",
    "popen(",
    "subprocess",
];

/// Terms that hide a completion suggestion when its lower-cased label contains one.
pub const DEFAULT_COMPLETION_BLACKLIST: [&str; 9] = [
    "system",
    "os",
    "path",
    "subprocess",
    "eval",
    "exec",
    "__import__",
    "open",
    "file",
];

pub const MAX_CODE_LENGTH_ENV_VAR: &str = "EXEC_CONSOLE_MAX_CODE_LENGTH";
pub const LINT_DEBOUNCE_ENV_VAR: &str = "EXEC_CONSOLE_LINT_DEBOUNCE_MS";
/// `0` disables the timeout, as does leaving it unset.
pub const COMPLETION_TIMEOUT_ENV_VAR: &str = "EXEC_CONSOLE_COMPLETION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got '{value}'")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Upper bound on code length, counted in characters.
    pub max_code_length: usize,
    pub forbidden_patterns: Vec<String>,
    pub completion_blacklist: Vec<String>,
    pub lint_debounce: Duration,
    /// `None` keeps a completion request pending until superseded.
    pub completion_timeout: Option<Duration>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_code_length: DEFAULT_MAX_CODE_LENGTH,
            forbidden_patterns: to_strings(&DEFAULT_FORBIDDEN_PATTERNS),
            completion_blacklist: to_strings(&DEFAULT_COMPLETION_BLACKLIST),
            lint_debounce: DEFAULT_LINT_DEBOUNCE,
            completion_timeout: None,
        }
    }
}

impl ConsoleConfig {
    /// Defaults overlaid with any `EXEC_CONSOLE_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(length) = env_u64(MAX_CODE_LENGTH_ENV_VAR)? {
            config.max_code_length = usize::try_from(length).unwrap_or(usize::MAX);
        }
        if let Some(millis) = env_u64(LINT_DEBOUNCE_ENV_VAR)? {
            config.lint_debounce = Duration::from_millis(millis);
        }
        if let Some(millis) = env_u64(COMPLETION_TIMEOUT_ENV_VAR)? {
            config.completion_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        Ok(config)
    }

    pub fn with_max_code_length(mut self, max_code_length: usize) -> Self {
        self.max_code_length = max_code_length;
        self
    }

    pub fn with_forbidden_patterns<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.forbidden_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_completion_blacklist<I, P>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.completion_blacklist = terms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_lint_debounce(mut self, debounce: Duration) -> Self {
        self.lint_debounce = debounce;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_u64(key: &'static str) -> Result<Option<u64>, ConfigError> {
    let Some(value) = env_string_opt(key) else {
        return Ok(None);
    };

    value
        .trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidNumber { key, value })
}
