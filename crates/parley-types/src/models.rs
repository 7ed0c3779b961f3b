use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One message of a two-party conversation, as clients see it.
/// `read_at` is set exactly once: either at send time (recipient was viewing
/// the conversation) or when the recipient next opens the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_username: String,
    pub sender_display_name: String,
    pub recipient_username: String,
    pub recipient_display_name: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Durable conversation context shared by exactly two usernames.
/// The name is the sorted pair of usernames, so both parties always
/// address the same group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub members: Vec<GroupMember>,
}

/// One live connection currently joined to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub connection_id: Uuid,
    pub username: String,
}

impl Group {
    /// Whether any member connection belongs to `username`.
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m.username == username)
    }
}
