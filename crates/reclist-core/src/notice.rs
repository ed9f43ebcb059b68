//! User-facing notices.
//!
//! Notices carry a message key rather than text; translation happens in
//! whatever renders them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Work in progress ("please wait").
    Progress,
    Success,
    Warning,
    Error,
}

/// A notification for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,

    /// Message key, e.g. `massRemoveResult`.
    pub key: String,

    /// Placeholder values substituted into the translated template.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl Notice {
    fn new(level: NoticeLevel, key: impl Into<String>) -> Self {
        Self {
            level,
            key: key.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn progress(key: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Progress, key)
    }

    pub fn success(key: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, key)
    }

    pub fn warning(key: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, key)
    }

    pub fn error(key: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, key)
    }

    /// Attach a placeholder value.
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Attach the `{count}` placeholder.
    pub fn with_count(self, count: u64) -> Self {
        self.with_param("count", count)
    }

    /// The `{count}` placeholder, if set.
    pub fn count(&self) -> Option<u64> {
        self.params.get("count").and_then(|c| c.parse().ok())
    }

    /// Substitute `{name}` placeholders in a translated template.
    pub fn render(&self, template: &str) -> String {
        self.params
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("{{{}}}", name), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_params() {
        let notice = Notice::success("massRemoveResult").with_count(3);
        assert_eq!(notice.count(), Some(3));
        assert_eq!(notice.render("{count} records removed"), "3 records removed");
    }

    #[test]
    fn test_render_without_params_is_identity() {
        let notice = Notice::warning("noRecordsRemoved");
        assert_eq!(notice.render("Nothing removed"), "Nothing removed");
        assert_eq!(notice.count(), None);
    }
}
