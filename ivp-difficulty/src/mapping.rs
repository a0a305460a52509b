//! Difficulty normalization
//!
//! Callers hand difficulty around as ordinals, database tokens or display
//! labels. This module turns any of them into a [`DifficultyLevel`].
//! Unrecognized input falls back to medium with a warning: difficulty tracking
//! must never reject a session over a bad value.

use ivp_common::DifficultyLevel;
use tracing::warn;

/// Anything a caller may pass as a difficulty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifficultyInput {
    Level(DifficultyLevel),
    Ordinal(i64),
    Text(String),
}

impl From<DifficultyLevel> for DifficultyInput {
    fn from(level: DifficultyLevel) -> Self {
        DifficultyInput::Level(level)
    }
}

impl From<i64> for DifficultyInput {
    fn from(ordinal: i64) -> Self {
        DifficultyInput::Ordinal(ordinal)
    }
}

impl From<i32> for DifficultyInput {
    fn from(ordinal: i32) -> Self {
        DifficultyInput::Ordinal(ordinal as i64)
    }
}

impl From<u8> for DifficultyInput {
    fn from(ordinal: u8) -> Self {
        DifficultyInput::Ordinal(ordinal as i64)
    }
}

impl From<&str> for DifficultyInput {
    fn from(text: &str) -> Self {
        DifficultyInput::Text(text.to_string())
    }
}

impl From<String> for DifficultyInput {
    fn from(text: String) -> Self {
        DifficultyInput::Text(text)
    }
}

impl From<&String> for DifficultyInput {
    fn from(text: &String) -> Self {
        DifficultyInput::Text(text.clone())
    }
}

/// Stateless difficulty normalization
pub struct DifficultyMappingService;

impl DifficultyMappingService {
    /// Level used for any input that cannot be recognized
    pub const FALLBACK: DifficultyLevel = DifficultyLevel::Medium;

    /// Strict conversion, None for unrecognized input
    pub fn try_resolve(input: impl Into<DifficultyInput>) -> Option<DifficultyLevel> {
        match input.into() {
            DifficultyInput::Level(level) => Some(level),
            DifficultyInput::Ordinal(ordinal) => DifficultyLevel::from_ordinal(ordinal),
            DifficultyInput::Text(text) => DifficultyLevel::parse(&text),
        }
    }

    /// Fail-open conversion to a level
    pub fn resolve(input: impl Into<DifficultyInput>) -> DifficultyLevel {
        let input = input.into();
        match Self::try_resolve(input.clone()) {
            Some(level) => level,
            None => {
                warn!(
                    "Unrecognized difficulty {:?}, defaulting to {}",
                    input,
                    Self::FALLBACK
                );
                Self::FALLBACK
            }
        }
    }

    /// Fail-open conversion to an ordinal in 1..=4
    pub fn normalize(input: impl Into<DifficultyInput>) -> u8 {
        Self::resolve(input).ordinal()
    }

    /// Database token for an ordinal
    pub fn level_to_token(ordinal: u8) -> &'static str {
        Self::resolve(ordinal).as_token()
    }

    /// Display label for an ordinal
    pub fn level_to_label(ordinal: u8) -> &'static str {
        Self::resolve(ordinal).label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_all_representations() {
        assert_eq!(DifficultyMappingService::normalize(1i64), 1);
        assert_eq!(DifficultyMappingService::normalize(4u8), 4);
        assert_eq!(DifficultyMappingService::normalize("easy"), 1);
        assert_eq!(DifficultyMappingService::normalize("Medium"), 2);
        assert_eq!(DifficultyMappingService::normalize("HARD"), 3);
        assert_eq!(DifficultyMappingService::normalize("expert"), 4);
        assert_eq!(DifficultyMappingService::normalize(DifficultyLevel::Hard), 3);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs: Vec<DifficultyInput> = vec![
            1i64.into(),
            2i64.into(),
            3i64.into(),
            4i64.into(),
            "easy".into(),
            "Medium".into(),
            "HARD".into(),
            "expert".into(),
            "garbage".into(),
            0i64.into(),
        ];

        for input in inputs {
            let once = DifficultyMappingService::normalize(input.clone());
            let twice = DifficultyMappingService::normalize(once);
            assert_eq!(once, twice, "normalize not idempotent for {:?}", input);
            assert!((1..=4).contains(&once));
        }
    }

    #[test]
    fn test_unrecognized_input_defaults_to_medium() {
        assert_eq!(DifficultyMappingService::normalize("impossible"), 2);
        assert_eq!(DifficultyMappingService::normalize(""), 2);
        assert_eq!(DifficultyMappingService::normalize(0i64), 2);
        assert_eq!(DifficultyMappingService::normalize(17i64), 2);
        assert_eq!(DifficultyMappingService::normalize(-3i64), 2);
    }

    #[test]
    fn test_try_resolve_is_strict() {
        assert_eq!(DifficultyMappingService::try_resolve("impossible"), None);
        assert_eq!(DifficultyMappingService::try_resolve(5i64), None);
        assert_eq!(
            DifficultyMappingService::try_resolve("Expert"),
            Some(DifficultyLevel::Expert)
        );
    }

    #[test]
    fn test_token_and_label_are_bijective() {
        for ordinal in 1u8..=4 {
            let token = DifficultyMappingService::level_to_token(ordinal);
            let label = DifficultyMappingService::level_to_label(ordinal);
            assert_eq!(DifficultyMappingService::normalize(token), ordinal);
            assert_eq!(DifficultyMappingService::normalize(label), ordinal);
        }

        assert_eq!(DifficultyMappingService::level_to_token(1), "easy");
        assert_eq!(DifficultyMappingService::level_to_label(4), "Expert");
    }
}
