//! Connection lifecycle of the ingestion loop.
//!
//! The loop owns a single [`ConnectionState`] and advances it with
//! [`ConnectionState::on`]. Transitions that make no sense for the current
//! state leave it unchanged.

use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// `attempt` counts consecutive failures since the last good session.
    Connecting { attempt: u32 },
    Connected,
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect,
    Established,
    Failed,
    Shutdown,
    Drained,
}

impl ConnectionState {
    pub fn on(self, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent::*;
        use ConnectionState::*;

        match (self, event) {
            (Draining, Drained) => Disconnected,
            (Draining, _) => Draining,
            (_, Shutdown) => Draining,
            (Disconnected, Connect) => Connecting { attempt: 0 },
            (Connecting { .. }, Established) => Connected,
            (Connecting { attempt }, Failed) => Connecting {
                attempt: attempt.saturating_add(1),
            },
            (Connected, Failed) => Disconnected,
            (state, _) => state,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Draining => "draining",
        }
    }

    /// Compact encoding used to share the state across tasks.
    pub fn code(&self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting { .. } => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Draining => 3,
        }
    }

    pub fn label_for(code: u8) -> &'static str {
        match code {
            1 => "connecting",
            2 => "connected",
            3 => "draining",
            _ => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`, capped at `max`.
pub fn backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent).min(max)
}
