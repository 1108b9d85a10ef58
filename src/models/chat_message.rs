use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp;

/// One side of an exchange with the sleep assistant. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub is_user: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(user_id: &str, message: impl Into<String>, is_user: bool, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message: message.into(),
            is_user,
            created_at: at,
        }
    }
}
