/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types wire models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use parley_types::models::{GroupMember, Message};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_username: String,
    pub sender_display_name: String,
    pub recipient_username: String,
    pub recipient_display_name: String,
    pub content: String,
    pub sent_at: String,
    pub read_at: Option<String>,
    pub sender_deleted: bool,
    pub recipient_deleted: bool,
}

pub struct ConnectionRow {
    pub id: String,
    pub room_name: String,
    pub username: String,
}

/// Result of detaching a connection from its room: who owned it, which room
/// it was in, and who is still there.
pub struct RemovedConnection {
    pub username: String,
    pub room_name: String,
    pub remaining: Vec<ConnectionRow>,
}

impl MessageRow {
    pub fn into_model(self) -> Message {
        Message {
            id: parse_uuid(&self.id, "message id"),
            sender_username: self.sender_username,
            sender_display_name: self.sender_display_name,
            recipient_username: self.recipient_username,
            recipient_display_name: self.recipient_display_name,
            content: self.content,
            sent_at: parse_timestamp(&self.sent_at, &self.id),
            read_at: self.read_at.as_deref().map(|t| parse_timestamp(t, &self.id)),
        }
    }
}

impl ConnectionRow {
    pub fn into_member(self) -> GroupMember {
        GroupMember {
            connection_id: parse_uuid(&self.id, "connection id"),
            username: self.username,
        }
    }
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, message_id: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') stores "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on message '{}': {}", raw, message_id, e);
            DateTime::default()
        })
}
