//! Strength levels and the engine parameters each one maps to.

use std::{fmt, str::FromStr};

use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl DifficultyLevel {
    pub const ALL: [DifficultyLevel; 4] = [
        DifficultyLevel::Easy,
        DifficultyLevel::Medium,
        DifficultyLevel::Hard,
        DifficultyLevel::Expert,
    ];
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DifficultyLevel::Easy => "Easy",
            DifficultyLevel::Medium => "Medium",
            DifficultyLevel::Hard => "Hard",
            DifficultyLevel::Expert => "Expert",
        };
        write!(f, "{name} (Level {})", resolve(*self).skill_level)
    }
}

impl FromStr for DifficultyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            "expert" => Ok(DifficultyLevel::Expert),
            _ => Err(format!("unknown difficulty: {s:?}")),
        }
    }
}

/// What the engine is told before each search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineParams {
    /// `Skill Level` option, 0..=20.
    pub skill_level: u8,
    pub search_depth: u32,
    pub move_time_ms: u64,
}

pub fn resolve(level: DifficultyLevel) -> EngineParams {
    let (skill_level, search_depth, move_time_ms) = match level {
        DifficultyLevel::Easy => (1, 3, 500),
        DifficultyLevel::Medium => (5, 8, 1000),
        DifficultyLevel::Hard => (10, 12, 1500),
        DifficultyLevel::Expert => (15, 15, 2000),
    };
    EngineParams {
        skill_level,
        search_depth,
        move_time_ms,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDifficulty {
    pub level: DifficultyLevel,
    pub params: EngineParams,
    /// Set when the name was not recognised and Easy was used instead.
    pub diagnostic: Option<String>,
}

/// Resolves a level by name. Unknown names fall back to Easy, never to
/// something stronger, and the fallback is reported.
pub fn resolve_name(name: &str) -> ResolvedDifficulty {
    match name.parse::<DifficultyLevel>() {
        Ok(level) => ResolvedDifficulty {
            level,
            params: resolve(level),
            diagnostic: None,
        },
        Err(e) => {
            warn!("{e}, using Easy settings");
            ResolvedDifficulty {
                level: DifficultyLevel::Easy,
                params: resolve(DifficultyLevel::Easy),
                diagnostic: Some(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_never_decreases() {
        let profiles = DifficultyLevel::ALL.map(resolve);
        for pair in profiles.windows(2) {
            assert!(pair[0].skill_level <= pair[1].skill_level);
            assert!(pair[0].search_depth <= pair[1].search_depth);
            assert!(pair[0].move_time_ms <= pair[1].move_time_ms);
        }
        assert!(profiles.iter().all(|p| p.skill_level <= 20));
    }

    #[test]
    fn test_table_values() {
        assert_eq!(
            resolve(DifficultyLevel::Hard),
            EngineParams {
                skill_level: 10,
                search_depth: 12,
                move_time_ms: 1500
            }
        );
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let resolved = resolve_name("MEDIUM");
        assert_eq!(resolved.level, DifficultyLevel::Medium);
        assert_eq!(resolved.diagnostic, None);
        assert_eq!(resolve_name(" expert ").level, DifficultyLevel::Expert);
    }

    #[test]
    fn test_unknown_name_fails_closed_to_easy() {
        let resolved = resolve_name("grandmaster");
        assert_eq!(resolved.level, DifficultyLevel::Easy);
        assert_eq!(resolved.params, resolve(DifficultyLevel::Easy));
        assert!(resolved.diagnostic.unwrap().contains("grandmaster"));
    }

    #[test]
    fn test_display() {
        assert_eq!(DifficultyLevel::Medium.to_string(), "Medium (Level 5)");
    }
}
