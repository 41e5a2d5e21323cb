use serde::Serialize;
use thiserror::Error;

/// Machine-checkable classification of a [`PortalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    MarkupChanged,
    UpstreamUnreachable,
    SessionExpired,
    Cache,
    Config,
}

#[derive(Debug, Error)]
pub enum PortalError {
    /// A mandatory section, table or row is structurally absent.
    #[error("Portal markup changed: {section} not found")]
    MarkupChanged {
        section: &'static str,
        detail: Option<String>,
    },

    #[error("Portal unreachable: {summary}")]
    UpstreamUnreachable {
        summary: String,
        detail: Option<String>,
    },

    #[error("Session expired")]
    SessionExpired,

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl PortalError {
    pub fn markup_with(section: &'static str, detail: impl Into<String>) -> Self {
        PortalError::MarkupChanged {
            section,
            detail: Some(detail.into()),
        }
    }

    pub fn unreachable(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        PortalError::UpstreamUnreachable {
            summary: summary.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PortalError::MarkupChanged { .. } => ErrorKind::MarkupChanged,
            PortalError::UpstreamUnreachable { .. } => ErrorKind::UpstreamUnreachable,
            PortalError::SessionExpired => ErrorKind::SessionExpired,
            PortalError::Cache(_) => ErrorKind::Cache,
            PortalError::Config(_) => ErrorKind::Config,
        }
    }

    /// Short human summary, safe to show to end users.
    pub fn summary(&self) -> String {
        match self {
            PortalError::MarkupChanged { .. } => {
                "The ERP portal returned a page in an unexpected format.".to_string()
            }
            PortalError::UpstreamUnreachable { summary, .. } => summary.clone(),
            PortalError::SessionExpired => "Session expired".to_string(),
            PortalError::Cache(_) => "Session cache unavailable.".to_string(),
            PortalError::Config(_) => "Invalid configuration.".to_string(),
        }
    }

    /// Operator-facing diagnostic (missing element id, status code, ...).
    pub fn detail(&self) -> Option<String> {
        match self {
            PortalError::MarkupChanged { section, detail } => Some(match detail {
                Some(d) => format!("{}: {}", section, d),
                None => section.to_string(),
            }),
            PortalError::UpstreamUnreachable { detail, .. } => detail.clone(),
            PortalError::SessionExpired => None,
            PortalError::Cache(msg) | PortalError::Config(msg) => Some(msg.clone()),
        }
    }
}
