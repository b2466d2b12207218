//! Application configuration: an optional JSON file, then environment overrides.

use std::{env, fs, path::PathBuf, str::FromStr, time::Duration};

use log::LevelFilter;
use serde::Deserialize;
use shakmaty::Color;

use crate::{engine::EngineSettings, error::ConfigError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// External binary speaking UCI on stdin/stdout.
    Uci,
    /// In-process engine playing random legal moves.
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Opponent {
    Engine,
    Human,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn color(self) -> Color {
        match self {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine_path: String,
    pub engine_kind: EngineKind,
    pub opponent: Opponent,
    pub human_color: Side,
    /// Overrides the stored preference when set.
    pub difficulty: Option<String>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub preferences_path: PathBuf,
    pub handshake_timeout_ms: u64,
    pub search_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_path: "stockfish".to_string(),
            engine_kind: EngineKind::Uci,
            opponent: Opponent::Engine,
            human_color: Side::White,
            difficulty: None,
            log_level: "info".to_string(),
            log_file: None,
            preferences_path: PathBuf::from("chess-preferences.json"),
            handshake_timeout_ms: 10_000,
            search_grace_ms: 5_000,
        }
    }
}

impl AppConfig {
    /// Reads the file named by `CHESS_CONFIG` (or `chess.json` if present)
    /// and applies `CHESS_*` environment overrides. Also returns the file
    /// that was read, if any; logging is not set up yet at this point.
    pub fn load() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_with(|key| env::var(key).ok())
    }

    pub fn load_with(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let source = match lookup("CHESS_CONFIG") {
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from("chess.json")).filter(|path| path.exists()),
        };

        let mut config = match &source {
            Some(path) => Self::from_json(&fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok((config, source))
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides looked up by variable name.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(path) = lookup("CHESS_ENGINE_PATH") {
            self.engine_path = path;
        }
        if let Some(kind) = lookup("CHESS_ENGINE_KIND") {
            self.engine_kind = parse_lowercase(&kind, "CHESS_ENGINE_KIND")?;
        }
        if let Some(opponent) = lookup("CHESS_OPPONENT") {
            self.opponent = parse_lowercase(&opponent, "CHESS_OPPONENT")?;
        }
        if let Some(side) = lookup("CHESS_HUMAN_COLOR") {
            self.human_color = parse_lowercase(&side, "CHESS_HUMAN_COLOR")?;
        }
        if let Some(level) = lookup("CHESS_DIFFICULTY") {
            self.difficulty = Some(level);
        }
        if let Some(level) = lookup("CHESS_LOG") {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("log level {:?}", self.log_level)))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            search_grace: Duration::from_millis(self.search_grace_ms),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        if self.engine_path.trim().is_empty() {
            return Err(ConfigError::Invalid("engine path is empty".to_string()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Same spelling as the JSON file accepts.
fn parse_lowercase<T: for<'de> Deserialize<'de>>(value: &str, key: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|_| ConfigError::Invalid(format!("{key}={value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine_path, "stockfish");
        assert_eq!(config.engine_kind, EngineKind::Uci);
        assert_eq!(config.human_color.color(), Color::White);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Info);
        assert_eq!(
            config.engine_settings(),
            EngineSettings {
                handshake_timeout: Duration::from_secs(10),
                search_grace: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(
            r#"{ "engine_kind": "random", "human_color": "black", "search_grace_ms": 250 }"#,
        )
        .unwrap();
        assert_eq!(config.engine_kind, EngineKind::Random);
        assert_eq!(config.human_color, Side::Black);
        assert_eq!(config.engine_settings().search_grace, Duration::from_millis(250));
        assert_eq!(config.engine_path, "stockfish");
        assert_eq!(config.opponent, Opponent::Engine);
    }

    #[test]
    fn test_load_reads_named_file_then_overrides() {
        let path = std::env::temp_dir().join(format!("chess-config-{}.json", std::process::id()));
        fs::write(&path, r#"{ "engine_kind": "random", "log_level": "warn" }"#).unwrap();
        let path_text = path.to_string_lossy().into_owned();

        let (config, source) = AppConfig::load_with(env_of(&[
            ("CHESS_CONFIG", path_text.as_str()),
            ("CHESS_LOG", "trace"),
        ]))
        .unwrap();
        assert_eq!(source.as_deref(), Some(path.as_path()));
        assert_eq!(config.engine_kind, EngineKind::Random);
        assert_eq!(config.log_level().unwrap(), LevelFilter::Trace);
        fs::remove_file(&path).unwrap();

        assert!(matches!(
            AppConfig::load_with(env_of(&[("CHESS_CONFIG", path_text.as_str())])),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(env_of(&[
                ("CHESS_ENGINE_PATH", "/opt/sf"),
                ("CHESS_ENGINE_KIND", "Random"),
                ("CHESS_HUMAN_COLOR", "BLACK"),
                ("CHESS_DIFFICULTY", "expert"),
                ("CHESS_LOG", "debug"),
                ("CHESS_OPPONENT", "human"),
            ]))
            .unwrap();
        assert_eq!(config.engine_path, "/opt/sf");
        assert_eq!(config.engine_kind, EngineKind::Random);
        assert_eq!(config.human_color, Side::Black);
        assert_eq!(config.difficulty.as_deref(), Some("expert"));
        assert_eq!(config.log_level().unwrap(), LevelFilter::Debug);
        assert_eq!(config.opponent, Opponent::Human);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env_of(&[("CHESS_ENGINE_KIND", "neural")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("CHESS_ENGINE_KIND")));

        assert!(matches!(
            AppConfig::from_json(r#"{ "log_level": "loud" }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_json(r#"{ "handshake_timeout_ms": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_json("{ not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
