use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Highest value on the self-assessment scale
pub const MAX_RATING: u8 = 5;

/// Upper bound for reflection text, in characters
pub const MAX_REFLECTION_CHARS: usize = 10_000;

/// Learner response submitted with a completion.
///
/// Closed set of variants, one per content kind. Validated at the boundary
/// so the engine never interprets raw JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CompletionPayload {
    /// Page was read; nothing to grade
    Reading {},
    /// Free-form written reflection
    Reflection { text: String },
    /// One rating per prompt on a 1..=MAX_RATING scale
    SelfAssessment { ratings: Vec<u8> },
}

/// Discriminant of [`CompletionPayload`], used by nodes to declare what they accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadKind {
    Reading,
    Reflection,
    SelfAssessment,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Reflection => "reflection",
            Self::SelfAssessment => "self-assessment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(Self::Reading),
            "reflection" => Some(Self::Reflection),
            "self-assessment" => Some(Self::SelfAssessment),
            _ => None,
        }
    }
}

impl CompletionPayload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Reading {} => PayloadKind::Reading,
            Self::Reflection { .. } => PayloadKind::Reflection,
            Self::SelfAssessment { .. } => PayloadKind::SelfAssessment,
        }
    }

    /// Parse and validate a JSON payload
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let payload: CompletionPayload = serde_json::from_str(raw)
            .map_err(|e| EngineError::Validation(format!("malformed payload: {e}")))?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            Self::Reading {} => Ok(()),
            Self::Reflection { text } => {
                if text.trim().is_empty() {
                    return Err(EngineError::Validation("reflection text is empty".into()));
                }
                if text.chars().count() > MAX_REFLECTION_CHARS {
                    return Err(EngineError::Validation(format!(
                        "reflection text exceeds {MAX_REFLECTION_CHARS} characters"
                    )));
                }
                Ok(())
            }
            Self::SelfAssessment { ratings } => {
                if ratings.is_empty() {
                    return Err(EngineError::Validation("self-assessment has no ratings".into()));
                }
                if let Some(bad) = ratings.iter().find(|r| !(1..=MAX_RATING).contains(*r)) {
                    return Err(EngineError::Validation(format!(
                        "rating {bad} outside 1..={MAX_RATING}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// True when every recorded rating is at the top of the scale
    pub fn is_perfect(&self) -> bool {
        match self {
            Self::SelfAssessment { ratings } => {
                !ratings.is_empty() && ratings.iter().all(|r| *r == MAX_RATING)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_variants() {
        let p = CompletionPayload::from_json(r#"{"kind":"self-assessment","ratings":[5,5,4]}"#)
            .unwrap();
        assert_eq!(p.kind(), PayloadKind::SelfAssessment);
        assert!(!p.is_perfect());

        let p = CompletionPayload::from_json(r#"{"kind":"reading"}"#).unwrap();
        assert_eq!(p, CompletionPayload::Reading {});
    }

    #[test]
    fn test_rejects_unknown_kind_and_bad_ratings() {
        assert!(CompletionPayload::from_json(r#"{"kind":"essay","text":"x"}"#).is_err());
        assert!(CompletionPayload::from_json(r#"{"kind":"self-assessment","ratings":[]}"#).is_err());
        assert!(CompletionPayload::from_json(r#"{"kind":"self-assessment","ratings":[0,5]}"#).is_err());
        assert!(CompletionPayload::from_json(r#"{"kind":"reflection","text":"   "}"#).is_err());
    }

    #[test]
    fn test_perfect_score() {
        let perfect = CompletionPayload::SelfAssessment { ratings: vec![5, 5, 5] };
        assert!(perfect.is_perfect());
        let reflection = CompletionPayload::Reflection { text: "done".into() };
        assert!(!reflection.is_perfect());
    }
}
