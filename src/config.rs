//! Application-level configuration loading: room pacing, engine settle delays and fixtures.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ARENA_CONFIG_PATH";

/// Pacing and sizing of every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    /// Players needed to start when the challenge does not say.
    pub players_to_start: usize,
    /// Winners sharing the prize pool when the challenge does not say.
    pub winners_number: usize,
    pub countdown_seconds: u32,
    pub countdown_tick: Duration,
    /// Pause between the last countdown tick and the first question.
    pub countdown_settle: Duration,
    /// Pause granting a new player's transport subscription time to establish.
    pub join_settle: Duration,
    /// Fixed delay between two questions.
    pub question_delay: Duration,
    /// Pause after the last question before the winners table.
    pub questions_settle: Duration,
    /// Pause letting outbound messages flush before the room closes.
    pub finish_drain: Duration,
    /// Capacity of the room's internal channels.
    pub channel_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            players_to_start: 2,
            winners_number: 3,
            countdown_seconds: 3,
            countdown_tick: Duration::from_secs(1),
            countdown_settle: Duration::from_secs(1),
            join_settle: Duration::from_millis(100),
            question_delay: Duration::from_secs(3),
            questions_settle: Duration::from_secs(1),
            finish_drain: Duration::from_secs(1),
            channel_capacity: 10,
        }
    }
}

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause after handing a player to a room before checking whether it is full.
    pub registration_settle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registration_settle: Duration::from_millis(300),
        }
    }
}

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub room: RoomConfig,
    pub engine: EngineConfig,
    /// JSON file seeding the in-memory challenge store.
    pub challenges_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    room: RawRoomConfig,
    engine: RawEngineConfig,
    challenges_path: Option<PathBuf>,
}

/// Room section; every field is optional and durations are milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoomConfig {
    players_to_start: Option<usize>,
    winners_number: Option<usize>,
    countdown_seconds: Option<u32>,
    countdown_tick_ms: Option<u64>,
    countdown_settle_ms: Option<u64>,
    join_settle_ms: Option<u64>,
    question_delay_ms: Option<u64>,
    questions_settle_ms: Option<u64>,
    finish_drain_ms: Option<u64>,
    channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEngineConfig {
    registration_settle_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            room: value.room.into(),
            engine: value.engine.into(),
            challenges_path: value.challenges_path,
        }
    }
}

impl From<RawRoomConfig> for RoomConfig {
    fn from(value: RawRoomConfig) -> Self {
        let defaults = RoomConfig::default();
        let millis = |raw: Option<u64>, fallback: Duration| {
            raw.map(Duration::from_millis).unwrap_or(fallback)
        };
        Self {
            players_to_start: value
                .players_to_start
                .filter(|count| *count > 0)
                .unwrap_or(defaults.players_to_start),
            winners_number: value
                .winners_number
                .filter(|count| *count > 0)
                .unwrap_or(defaults.winners_number),
            countdown_seconds: value.countdown_seconds.unwrap_or(defaults.countdown_seconds),
            countdown_tick: millis(value.countdown_tick_ms, defaults.countdown_tick),
            countdown_settle: millis(value.countdown_settle_ms, defaults.countdown_settle),
            join_settle: millis(value.join_settle_ms, defaults.join_settle),
            question_delay: millis(value.question_delay_ms, defaults.question_delay),
            questions_settle: millis(value.questions_settle_ms, defaults.questions_settle),
            finish_drain: millis(value.finish_drain_ms, defaults.finish_drain),
            channel_capacity: value
                .channel_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.channel_capacity),
        }
    }
}

impl From<RawEngineConfig> for EngineConfig {
    fn from(value: RawEngineConfig) -> Self {
        let defaults = EngineConfig::default();
        Self {
            registration_settle: value
                .registration_settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.registration_settle),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
