//! Зовнішня конфігурація: `Settings.toml` плюс змінні `FLEET__*`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::FULL_CHARGE;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fleet: FleetSettings,
    pub agent: AgentSettings,
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    pub room_file: PathBuf,
    pub robots_file: PathBuf,
    pub initial_charge: u8,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            room_file: PathBuf::from("room.txt"),
            robots_file: PathBuf::from("robots.txt"),
            initial_charge: FULL_CHARGE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Період розряду на 1 одиницю.
    pub drain_period_ms: u64,
    /// `bat`/`pos` відповідають і під час призупинення.
    pub answer_queries_when_suspended: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            drain_period_ms: 1000,
            answer_queries_when_suspended: true,
        }
    }
}

impl AgentSettings {
    pub fn drain_period(&self) -> Duration {
        Duration::from_millis(self.drain_period_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub buffer_bytes: usize,
    pub control_capacity: usize,
    /// Скільки чекати на знімок стану після сигналу.
    pub status_wait_ms: u64,
    /// Без значення контролер чекає на відповідь необмежено.
    pub request_timeout_ms: Option<u64>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            buffer_bytes: 4096,
            control_capacity: 32,
            status_wait_ms: 250,
            request_timeout_ms: None,
        }
    }
}

impl TransportSettings {
    pub fn status_wait(&self) -> Duration {
        Duration::from_millis(self.status_wait_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Settings {
    /// Файл необов'язковий: без нього діють значення за замовчуванням.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
