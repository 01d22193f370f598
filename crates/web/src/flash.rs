//! One-shot notices carried in the redirect query string.

use axum::response::Redirect;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Success,
    Warning,
    Danger,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "warning" => Self::Warning,
            _ => Self::Danger,
        }
    }
}

/// Query parameters a page reads its notice from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Flash {
    pub notice: Option<String>,
    pub level: Option<String>,
}

impl Flash {
    pub fn message(&self) -> Option<(Level, &str)> {
        let notice = self.notice.as_deref().filter(|n| !n.trim().is_empty())?;
        let level = self.level.as_deref().map(Level::parse).unwrap_or(Level::Success);
        Some((level, notice))
    }
}

pub fn location(path: &str, level: Level, message: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("level", level.as_str())
        .append_pair("notice", message)
        .finish();
    format!("{path}?{query}")
}

pub fn redirect_with(path: &str, level: Level, message: &str) -> Redirect {
    Redirect::to(&location(path, level, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_notice_into_query() {
        let loc = location("/history", Level::Danger, "Original file not found on disk.");
        assert_eq!(
            loc,
            "/history?level=danger&notice=Original+file+not+found+on+disk."
        );
    }

    #[test]
    fn blank_notice_is_ignored() {
        let flash = Flash {
            notice: Some("  ".into()),
            level: None,
        };
        assert!(flash.message().is_none());
        let flash = Flash {
            notice: Some("Saved".into()),
            level: Some("warning".into()),
        };
        assert_eq!(flash.message(), Some((Level::Warning, "Saved")));
    }
}
