//! Session security configuration: timeouts and login rate limiting.

use serde::Deserialize;

fn default_login_burst() -> u32 {
    5
}

fn default_login_per_minute() -> u32 {
    20
}

fn default_logout_disconnect_secs() -> u64 {
    10
}

/// Rate limiting and timeout knobs for the login/logout path.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Burst size for the per-IP login rate limiter.
    #[serde(default = "default_login_burst")]
    pub login_burst: u32,
    /// Sustained login attempts allowed per minute per IP.
    #[serde(default = "default_login_per_minute")]
    pub login_per_minute: u32,
    /// Seconds between `HandleLogoutRequest` and the forced disconnect if
    /// the client never follows through.
    #[serde(default = "default_logout_disconnect_secs")]
    pub logout_disconnect_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            login_burst: default_login_burst(),
            login_per_minute: default_login_per_minute(),
            logout_disconnect_secs: default_logout_disconnect_secs(),
        }
    }
}
