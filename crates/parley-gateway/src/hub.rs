use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::MessageRow;
use parley_types::events::GatewayEvent;
use parley_types::models::{Group, Message};

use crate::error::HubError;
use crate::presence::PresenceTracker;
use crate::registry::Registry;

/// Coordinates the room store, the presence tracker and the transport
/// registry for every live conversation: join/leave lifecycle and message
/// fan-out with the in-room / online-elsewhere / offline delivery decision.
#[derive(Clone)]
pub struct Hub {
    db: Arc<Database>,
    presence: PresenceTracker,
    registry: Registry,
}

impl Hub {
    pub fn new(db: Arc<Database>, presence: PresenceTracker, registry: Registry) -> Self {
        Self {
            db,
            presence,
            registry,
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Canonical room name for a pair of usernames. The lexicographically
    /// smaller name goes first, so both parties compute the same key no
    /// matter who connects first.
    pub fn room_key(a: &str, b: &str) -> String {
        if a < b {
            format!("{a}-{b}")
        } else {
            format!("{b}-{a}")
        }
    }

    /// Open a conversation: join the room, go online, announce the updated
    /// membership to everyone in the room, then deliver the thread to the
    /// connecting client (marking its unread messages read first).
    ///
    /// Returns the event receiver the transport should drain into the
    /// client's socket.
    pub async fn connect(
        &self,
        username: &str,
        peer: &str,
        connection_id: Uuid,
    ) -> Result<mpsc::UnboundedReceiver<GatewayEvent>, HubError> {
        if peer.is_empty() {
            return Err(HubError::validation("peer username is required"));
        }
        if peer == username {
            return Err(HubError::validation(
                "you cannot open a conversation with yourself",
            ));
        }

        // Channel first, so the caller receives the group broadcast below.
        let rx = self.registry.register(connection_id).await;

        let room = Self::room_key(username, peer);
        let joined = {
            let room = room.clone();
            let conn = connection_id.to_string();
            let user = username.to_string();
            self.run_db(move |db| db.join_room(&room, &conn, &user)).await
        };

        let members = match joined {
            Ok(members) => members,
            Err(e) => {
                // Store commit failed: withdraw the channel and announce
                // nothing, or peers would see a member that is not durable.
                self.registry.unregister(connection_id).await;
                return Err(e);
            }
        };

        // Presence only after the store commit succeeded.
        self.presence.register(username, connection_id).await;

        let group = Group {
            name: room.clone(),
            members: members.into_iter().map(|m| m.into_member()).collect(),
        };
        let member_ids: Vec<Uuid> = group.members.iter().map(|m| m.connection_id).collect();
        self.registry
            .send_to_each(&member_ids, &GatewayEvent::UpdatedGroup { group })
            .await;

        // Thread read marks unread incoming messages; the mark commits
        // before the thread is delivered.
        let thread = {
            let user = username.to_string();
            let peer = peer.to_string();
            let now = Utc::now().to_rfc3339();
            self.run_db(move |db| db.message_thread(&user, &peer, &now))
                .await
        };
        let rows = match thread {
            Ok(rows) => rows,
            Err(e) => {
                // Already joined and announced: tear down symmetrically.
                warn!("Thread read failed for {} in {}: {}", username, room, e);
                self.disconnect(connection_id).await;
                return Err(e);
            }
        };

        let messages: Vec<Message> = rows.into_iter().map(|r| r.into_model()).collect();
        self.registry
            .send_to(connection_id, GatewayEvent::ReceiveMessageThread { messages })
            .await;

        info!("{} joined {} (connection {})", username, room, connection_id);
        Ok(rx)
    }

    /// Close a connection: detach from the room, drop presence, announce the
    /// shrunk membership. A connection that is in no room (duplicate
    /// disconnect, or a join that never completed) is a no-op.
    pub async fn disconnect(&self, connection_id: Uuid) {
        let removed = {
            let conn = connection_id.to_string();
            self.run_db(move |db| db.remove_connection(&conn)).await
        };

        let removed = match removed {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to detach connection {}: {}", connection_id, e);
                self.registry.unregister(connection_id).await;
                return;
            }
        };

        let Some(removed) = removed else {
            debug!("Connection {} was not joined to any room", connection_id);
            self.registry.unregister(connection_id).await;
            return;
        };

        // Store before registry: a stale presence entry is only a harmless
        // "appears online", a stale room row would corrupt read-marking.
        self.presence
            .unregister(&removed.username, connection_id)
            .await;

        info!(
            "{} left {} (connection {})",
            removed.username, removed.room_name, connection_id
        );

        let group = Group {
            name: removed.room_name,
            members: removed
                .remaining
                .into_iter()
                .map(|m| m.into_member())
                .collect(),
        };
        let member_ids: Vec<Uuid> = group.members.iter().map(|m| m.connection_id).collect();
        self.registry
            .send_to_each(&member_ids, &GatewayEvent::UpdatedGroup { group })
            .await;

        self.registry.unregister(connection_id).await;
    }

    /// Send a message. The delivery mode is decided before persisting, in
    /// order of decreasing signal strength:
    ///
    /// 1. recipient has a connection in this room — they are looking at this
    ///    exact thread, so the message is stored already read;
    /// 2. recipient is online somewhere else — store unread, push a
    ///    lightweight notification (sender identity only) to every one of
    ///    their connections;
    /// 3. offline — store unread, no push; they will see it on next poll.
    ///
    /// On success the full message is broadcast to every room member,
    /// including the sender's own other devices.
    pub async fn send_message(
        &self,
        sender_username: &str,
        recipient_username: &str,
        content: &str,
    ) -> Result<Message, HubError> {
        let recipient_username = recipient_username.to_lowercase();
        if recipient_username.is_empty() {
            return Err(HubError::validation("recipient is required"));
        }
        if content.trim().is_empty() {
            return Err(HubError::validation("message content is required"));
        }
        if sender_username == recipient_username {
            return Err(HubError::validation(
                "you cannot send messages to yourself",
            ));
        }

        let (sender, recipient) = {
            let sender = sender_username.to_string();
            let recipient = recipient_username.clone();
            self.run_db(move |db| {
                let sender = db.get_user_by_username(&sender)?;
                let recipient = db.get_user_by_username(&recipient)?;
                Ok((sender, recipient))
            })
            .await?
        };
        let sender = sender
            .ok_or_else(|| HubError::not_found(format!("user {sender_username} not found")))?;
        let recipient = recipient.ok_or_else(|| {
            HubError::not_found(format!("user {recipient_username} not found"))
        })?;

        let room = Self::room_key(&sender.username, &recipient.username);
        let members = {
            let room = room.clone();
            self.run_db(move |db| db.room_members(&room)).await?
        };
        let recipient_in_room = members.iter().any(|m| m.username == recipient.username);

        let message_id = Uuid::new_v4();
        let sent_at = Utc::now();
        let read_at = recipient_in_room.then_some(sent_at);

        let row = MessageRow {
            id: message_id.to_string(),
            sender_username: sender.username.clone(),
            sender_display_name: sender.display_name.clone(),
            recipient_username: recipient.username.clone(),
            recipient_display_name: recipient.display_name.clone(),
            content: content.to_string(),
            sent_at: sent_at.to_rfc3339(),
            read_at: read_at.map(|t| t.to_rfc3339()),
            sender_deleted: false,
            recipient_deleted: false,
        };
        // Persist before any push; a failed commit broadcasts nothing.
        self.run_db(move |db| db.insert_message(&row)).await?;

        let message = Message {
            id: message_id,
            sender_username: sender.username.clone(),
            sender_display_name: sender.display_name.clone(),
            recipient_username: recipient.username.clone(),
            recipient_display_name: recipient.display_name.clone(),
            content: content.to_string(),
            sent_at,
            read_at,
        };

        if !recipient_in_room {
            let recipient_conns = self.presence.connections_for(&recipient.username).await;
            if !recipient_conns.is_empty() {
                debug!(
                    "{} online elsewhere, notifying {} connection(s)",
                    recipient.username,
                    recipient_conns.len()
                );
                self.registry
                    .send_to_each(
                        &recipient_conns,
                        &GatewayEvent::NewMessageNotification {
                            sender_username: sender.username.clone(),
                            sender_display_name: sender.display_name.clone(),
                        },
                    )
                    .await;
            }
        }

        let member_ids: Vec<Uuid> = members
            .iter()
            .filter_map(|m| m.id.parse().ok())
            .collect();
        self.registry
            .send_to_each(
                &member_ids,
                &GatewayEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    async fn run_db<T, F>(&self, f: F) -> Result<T, HubError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| HubError::Storage(anyhow::anyhow!("blocking task failed: {e}")))?
            .map_err(HubError::Storage)
    }
}
