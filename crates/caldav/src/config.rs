//! CalDAV client configuration

/// Connection settings for the calendar server
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Basic-auth principal (e.g. the Apple ID)
    pub username: String,
    /// App-specific password
    pub password: String,
    /// Per-call deadline in seconds
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl CalDavConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            timeout_secs: 30,
            user_agent: concat!("notidav/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
