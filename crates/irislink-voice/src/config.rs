//! Projector configuration.

use std::time::Duration;

use irislink_protocol::RpcUser;

/// Settings for [`CallStateProjector`](crate::CallStateProjector).
#[derive(Debug, Clone)]
pub struct ProjectorConfig {
    /// How long an unanswered call rings before it counts as missed.
    pub ring_timeout: Duration,

    /// Base URL avatars are served from: `{base}/{user_id}/{hash}?size=N`.
    pub avatar_cdn: String,

    /// Requested avatar edge length in pixels.
    pub avatar_size: u32,
}

impl ProjectorConfig {
    pub const MIN_RING_TIMEOUT: Duration = Duration::from_secs(1);

    /// Returns a copy with out-of-range values clamped.
    pub fn validated(mut self) -> Self {
        if self.ring_timeout < Self::MIN_RING_TIMEOUT {
            tracing::warn!(
                ring_timeout_ms = self.ring_timeout.as_millis() as u64,
                "ring_timeout too short, clamping to 1s"
            );
            self.ring_timeout = Self::MIN_RING_TIMEOUT;
        }
        if !self.avatar_size.is_power_of_two() || !(16..=4096).contains(&self.avatar_size) {
            tracing::warn!(avatar_size = self.avatar_size, "avatar_size invalid, using 1024");
            self.avatar_size = 1024;
        }
        let trimmed = self.avatar_cdn.trim_end_matches('/').len();
        self.avatar_cdn.truncate(trimmed);
        self
    }

    /// Avatar URL for `user`, or `None` when they have no custom avatar.
    pub fn avatar_url(&self, user: &RpcUser) -> Option<String> {
        let hash = user.avatar.as_deref().filter(|h| !h.is_empty())?;
        Some(format!(
            "{}/{}/{}?size={}",
            self.avatar_cdn, user.id, hash, self.avatar_size
        ))
    }
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(30),
            avatar_cdn: "https://cdn.discordapp.com/avatars".to_string(),
            avatar_size: 1024,
        }
    }
}
