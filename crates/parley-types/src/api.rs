use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared across parley-api (REST middleware) and parley-server
/// (WebSocket upgrade authentication). Canonical definition lives here in
/// parley-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub token: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_username: String,
    pub content: String,
}

/// Which slice of a user's messages a listing request selects.
/// A closed set — the selection predicate is decided here, never by
/// matching on a free-form string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageContainer {
    Inbox,
    Outbox,
    #[default]
    Unread,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_parses_lowercase() {
        assert_eq!(
            serde_json::from_str::<MessageContainer>("\"inbox\"").unwrap(),
            MessageContainer::Inbox
        );
        assert_eq!(
            serde_json::from_str::<MessageContainer>("\"outbox\"").unwrap(),
            MessageContainer::Outbox
        );
        assert_eq!(MessageContainer::default(), MessageContainer::Unread);
    }
}
