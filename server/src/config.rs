//! Runtime configuration for the server and its group rules.

use shared::READY_CHECK_DURATION_MS;
use std::time::Duration;

/// Rules applied while validating group commands.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Lets regular players invite game masters.
    pub allow_gm_group: bool,
    /// Lets players of opposite teams group up.
    pub allow_cross_faction: bool,
    pub ready_check_duration: Duration,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            allow_gm_group: false,
            allow_cross_faction: false,
            ready_check_duration: Duration::from_millis(u64::from(READY_CHECK_DURATION_MS)),
        }
    }
}

impl GroupConfig {
    pub fn ready_check_millis(&self) -> u32 {
        u32::try_from(self.ready_check_duration.as_millis()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    pub max_sessions: usize,
    /// Sessions silent for longer than this are closed.
    pub session_timeout: Duration,
    pub group: GroupConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_string(),
            max_sessions: 256,
            session_timeout: Duration::from_secs(5),
            group: GroupConfig::default(),
        }
    }
}
