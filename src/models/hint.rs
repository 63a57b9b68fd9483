use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hint level 1 explains why the code fails; level 2 sketches a solution
/// approach. Both forbid code in the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HintLevel {
    One,
    Two,
}

impl HintLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            HintLevel::One => 1,
            HintLevel::Two => 2,
        }
    }

    /// Static label for metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HintLevel::One => "1",
            HintLevel::Two => "2",
        }
    }
}

impl TryFrom<u8> for HintLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(HintLevel::One),
            2 => Ok(HintLevel::Two),
            other => Err(format!("invalid hint level: {}", other)),
        }
    }
}

impl From<HintLevel> for u8 {
    fn from(level: HintLevel) -> Self {
        level.as_u8()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintStatus {
    Ok,
    Error,
}

/// Durable record of one hint-generation attempt: the exact prompt
/// snapshot sent and what came back. Doubles as the cache behind the
/// denormalized text on TaskProgress and as an audit trail for failed
/// calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub progress_id: String,
    pub level: HintLevel,
    pub prompt_snapshot: String,
    #[serde(default)]
    pub response_text: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub tokens_in: Option<u32>,
    #[serde(default)]
    pub tokens_out: Option<u32>,
    pub status: HintStatus,
    #[serde(default)]
    pub error_message: String,
    pub created_at: DateTime<Utc>,
}
