//! Difficulty levels for interview questions
//!
//! The single canonical difficulty type shared by every component that reads or
//! writes session difficulty. Levels are totally ordered (easy < medium < hard
//! < expert) and have three equivalent representations:
//! - Ordinal: 1..=4
//! - Token: lowercase string stored in the database ("easy" .. "expert")
//! - Label: capitalized string shown to users ("Easy" .. "Expert")

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

/// Interview difficulty level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DifficultyLevel {
    Easy = 1,
    Medium = 2,
    Hard = 3,
    Expert = 4,
}

impl DifficultyLevel {
    /// Ordinal value (1 = easy, 4 = expert)
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Level for an ordinal, or None outside 1..=4
    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        match ordinal {
            1 => Some(DifficultyLevel::Easy),
            2 => Some(DifficultyLevel::Medium),
            3 => Some(DifficultyLevel::Hard),
            4 => Some(DifficultyLevel::Expert),
            _ => None,
        }
    }

    /// Lowercase token used in the database and in the state blob
    pub fn as_token(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
            DifficultyLevel::Expert => "expert",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "Easy",
            DifficultyLevel::Medium => "Medium",
            DifficultyLevel::Hard => "Hard",
            DifficultyLevel::Expert => "Expert",
        }
    }

    /// Strict parse of a token, label or ordinal string
    ///
    /// Case-insensitive and whitespace-tolerant. Returns None for anything that
    /// is not one of the four canonical levels; callers decide whether to fall
    /// back to a default.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if let Ok(ordinal) = trimmed.parse::<i64>() {
            return Self::from_ordinal(ordinal);
        }
        match trimmed.to_lowercase().as_str() {
            "easy" => Some(DifficultyLevel::Easy),
            "medium" => Some(DifficultyLevel::Medium),
            "hard" => Some(DifficultyLevel::Hard),
            "expert" => Some(DifficultyLevel::Expert),
            _ => None,
        }
    }

    /// All levels in ascending order
    pub fn all_variants() -> &'static [DifficultyLevel] {
        &[
            DifficultyLevel::Easy,
            DifficultyLevel::Medium,
            DifficultyLevel::Hard,
            DifficultyLevel::Expert,
        ]
    }
}

impl Default for DifficultyLevel {
    /// Medium is the module-wide fallback difficulty
    fn default() -> Self {
        DifficultyLevel::Medium
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_token())
    }
}

impl FromStr for DifficultyLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| crate::Error::InvalidDifficulty(s.to_string()))
    }
}

impl Serialize for DifficultyLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_token())
    }
}

/// Raw on-disk representation, accepted before strict validation
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Ordinal(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for DifficultyLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawLevel::deserialize(deserializer)?;
        let level = match &raw {
            RawLevel::Ordinal(n) => DifficultyLevel::from_ordinal(*n),
            RawLevel::Text(s) => DifficultyLevel::parse(s),
        };
        level.ok_or_else(|| D::Error::custom(format!("unrecognized difficulty level: {:?}", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered() {
        assert!(DifficultyLevel::Easy < DifficultyLevel::Medium);
        assert!(DifficultyLevel::Medium < DifficultyLevel::Hard);
        assert!(DifficultyLevel::Hard < DifficultyLevel::Expert);
    }

    #[test]
    fn test_token_and_label_round_trip() {
        for level in DifficultyLevel::all_variants() {
            assert_eq!(DifficultyLevel::parse(level.as_token()), Some(*level));
            assert_eq!(DifficultyLevel::parse(level.label()), Some(*level));
            assert_eq!(
                DifficultyLevel::from_ordinal(level.ordinal() as i64),
                Some(*level)
            );
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(DifficultyLevel::parse("HARD"), Some(DifficultyLevel::Hard));
        assert_eq!(DifficultyLevel::parse("  Expert "), Some(DifficultyLevel::Expert));
        assert_eq!(DifficultyLevel::parse("3"), Some(DifficultyLevel::Hard));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert_eq!(DifficultyLevel::parse("impossible"), None);
        assert_eq!(DifficultyLevel::parse("0"), None);
        assert_eq!(DifficultyLevel::parse(""), None);
        assert!(matches!(
            "legendary".parse::<DifficultyLevel>(),
            Err(crate::Error::InvalidDifficulty(text)) if text == "legendary"
        ));
    }

    #[test]
    fn test_default_is_medium() {
        assert_eq!(DifficultyLevel::default(), DifficultyLevel::Medium);
    }

    #[test]
    fn test_serde_uses_token() {
        let json = serde_json::to_string(&DifficultyLevel::Expert).unwrap();
        assert_eq!(json, "\"expert\"");

        let from_label: DifficultyLevel = serde_json::from_str("\"Hard\"").unwrap();
        assert_eq!(from_label, DifficultyLevel::Hard);

        let from_ordinal: DifficultyLevel = serde_json::from_str("1").unwrap();
        assert_eq!(from_ordinal, DifficultyLevel::Easy);

        assert!(serde_json::from_str::<DifficultyLevel>("\"brutal\"").is_err());
        assert!(serde_json::from_str::<DifficultyLevel>("7").is_err());
    }
}
