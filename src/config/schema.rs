use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PanelConfig {
    /// Base URL of the collection service; routes are resolved against it.
    #[serde(default = "default_server_url")]
    #[validate(url)]
    pub server_url: String,

    /// Page to collect from. Forwarded verbatim, even when empty.
    #[serde(default)]
    pub target_url: Option<String>,

    /// Collection interval (seconds) requested from the service.
    #[serde(default = "default_interval")]
    pub interval: i64,

    #[serde(default = "default_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    #[validate(length(min = 1))]
    pub user_agent: String,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            target_url: None,
            interval: default_interval(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            extends: None,
        }
    }
}

/// One configuration file as written. Only the keys a file actually sets
/// are `Some`, so a child that repeats a default still overrides its parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfigLayer {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
}

impl PanelConfigLayer {
    /// Keys set in `self` win; the rest come from `parent`.
    pub fn over(self, parent: PanelConfigLayer) -> PanelConfigLayer {
        PanelConfigLayer {
            server_url: self.server_url.or(parent.server_url),
            target_url: self.target_url.or(parent.target_url),
            interval: self.interval.or(parent.interval),
            timeout_secs: self.timeout_secs.or(parent.timeout_secs),
            user_agent: self.user_agent.or(parent.user_agent),
            extends: None,
        }
    }

    /// Fills whatever is still unset with the built-in defaults.
    pub fn resolve(self) -> PanelConfig {
        PanelConfig {
            server_url: self.server_url.unwrap_or_else(default_server_url),
            target_url: self.target_url,
            interval: self.interval.unwrap_or_else(default_interval),
            timeout_secs: self.timeout_secs.unwrap_or_else(default_timeout),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            extends: self.extends,
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_interval() -> i64 {
    10
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Collection-Panel/1.0".to_string()
}
