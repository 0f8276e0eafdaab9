//! Notion client configuration

/// Pinned API version header value
pub const NOTION_VERSION: &str = "2025-09-03";

/// Connection settings for the Notion API
#[derive(Debug, Clone)]
pub struct NotionConfig {
    /// Integration token used as the Bearer credential
    pub token: String,
    pub api_version: String,
    /// API origin; tests point this at a local mock
    pub base_url: String,
    pub timeout_secs: u64,
}

impl NotionConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_version: NOTION_VERSION.to_string(),
            base_url: "https://api.notion.com".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}
