use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A class group (e.g. "7A"). Names are unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassGroup {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A student account. Students authenticate with their full name plus a
/// six-digit PIN; only the bcrypt hash of the PIN is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub full_name: String,
    /// Lowercased full name used for case-insensitive login lookup.
    pub name_key: String,
    pub class_group_id: String,
    pub pin_hash: String,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

fn default_is_active() -> bool {
    true
}

impl Student {
    pub fn name_key_for(full_name: &str) -> String {
        full_name.trim().to_lowercase()
    }
}
