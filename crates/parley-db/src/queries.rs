use crate::Database;
use crate::models::{ConnectionRow, MessageRow, RemovedConnection, UserRow};
use anyhow::Result;
use rusqlite::Connection;

use parley_types::api::MessageContainer;

const MESSAGE_COLUMNS: &str = "m.id, m.sender_username, \
     COALESCE(su.display_name, m.sender_username), \
     m.recipient_username, \
     COALESCE(ru.display_name, m.recipient_username), \
     m.content, m.sent_at, m.read_at, m.sender_deleted, m.recipient_deleted";

const MESSAGE_JOINS: &str = "FROM messages m \
     LEFT JOIN users su ON su.username = m.sender_username \
     LEFT JOIN users ru ON ru.username = m.recipient_username";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, username, display_name, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages \
                 (id, sender_username, recipient_username, content, sent_at, read_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.sender_username,
                    row.recipient_username,
                    row.content,
                    row.sent_at,
                    row.read_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Full thread between two users, oldest first, each side's deleted rows
    /// filtered out. Any unread messages addressed to `current_username` are
    /// marked read in the same transaction, so the returned rows already
    /// carry their read timestamp.
    pub fn message_thread(
        &self,
        current_username: &str,
        other_username: &str,
        read_at: &str,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "UPDATE messages SET read_at = ?1 \
                 WHERE recipient_username = ?2 AND sender_username = ?3 \
                   AND read_at IS NULL AND recipient_deleted = 0",
                rusqlite::params![read_at, current_username, other_username],
            )?;

            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} {MESSAGE_JOINS} \
                 WHERE (m.recipient_username = ?1 AND m.sender_username = ?2 \
                        AND m.recipient_deleted = 0) \
                    OR (m.recipient_username = ?2 AND m.sender_username = ?1 \
                        AND m.sender_deleted = 0) \
                 ORDER BY m.sent_at"
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![current_username, other_username],
                    map_message_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);

            tx.commit()?;
            Ok(rows)
        })
    }

    /// Newest-first listing for one container, cursor-paginated: pass the
    /// `sent_at` of the oldest row from the previous page as `before`.
    pub fn messages_for_user(
        &self,
        username: &str,
        container: MessageContainer,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        let predicate = match container {
            MessageContainer::Inbox => {
                "m.recipient_username = ?1 AND m.recipient_deleted = 0"
            }
            MessageContainer::Outbox => "m.sender_username = ?1 AND m.sender_deleted = 0",
            MessageContainer::Unread => {
                "m.recipient_username = ?1 AND m.recipient_deleted = 0 AND m.read_at IS NULL"
            }
        };

        self.with_conn(|conn| {
            let cursor = if before.is_some() {
                " AND m.sent_at < ?3"
            } else {
                ""
            };
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} {MESSAGE_JOINS} \
                 WHERE {predicate}{cursor} \
                 ORDER BY m.sent_at DESC \
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = match before {
                Some(cursor) => stmt
                    .query_map(rusqlite::params![username, limit, cursor], map_message_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map(rusqlite::params![username, limit], map_message_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?,
            };
            Ok(rows)
        })
    }

    /// Soft delete for one party. Returns `None` when the message does not
    /// exist or `username` is neither party (a third party learns nothing).
    /// `Some(true)` means both sides had deleted and the row was physically
    /// removed. Re-deleting an already-deleted side is a no-op.
    pub fn delete_message(&self, id: &str, username: &str) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<(String, String, bool, bool)> = tx
                .query_row(
                    "SELECT sender_username, recipient_username, \
                            sender_deleted, recipient_deleted \
                     FROM messages WHERE id = ?1",
                    [id],
                    |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                    },
                )
                .optional()?;

            let Some((sender, recipient, mut sender_deleted, mut recipient_deleted)) = row
            else {
                return Ok(None);
            };

            if username != sender && username != recipient {
                return Ok(None);
            }

            if username == sender {
                sender_deleted = true;
            }
            if username == recipient {
                recipient_deleted = true;
            }

            let removed = sender_deleted && recipient_deleted;
            if removed {
                tx.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            } else {
                tx.execute(
                    "UPDATE messages SET sender_deleted = ?1, recipient_deleted = ?2 \
                     WHERE id = ?3",
                    rusqlite::params![sender_deleted, recipient_deleted, id],
                )?;
            }

            tx.commit()?;
            Ok(Some(removed))
        })
    }

    // -- Rooms & connections --

    /// Attach a connection to its room, creating the room if this is the
    /// first join by either party. One transaction: the INSERT OR IGNORE is
    /// the create-if-absent primitive that serializes two peers racing on a
    /// new room. Returns the member set as of the commit.
    pub fn join_room(
        &self,
        room_name: &str,
        connection_id: &str,
        username: &str,
    ) -> Result<Vec<ConnectionRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("INSERT OR IGNORE INTO rooms (name) VALUES (?1)", [room_name])?;
            tx.execute(
                "INSERT INTO connections (id, room_name, username) VALUES (?1, ?2, ?3)",
                (connection_id, room_name, username),
            )?;
            let members = query_members(&tx, room_name)?;

            tx.commit()?;
            Ok(members)
        })
    }

    /// Detach a connection from the room containing it (at most one).
    /// `None` means the connection was never joined or was already removed —
    /// a duplicate-disconnect race, not an error.
    pub fn remove_connection(&self, connection_id: &str) -> Result<Option<RemovedConnection>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT room_name, username FROM connections WHERE id = ?1",
                    [connection_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((room_name, username)) = row else {
                return Ok(None);
            };

            tx.execute("DELETE FROM connections WHERE id = ?1", [connection_id])?;
            let remaining = query_members(&tx, &room_name)?;

            tx.commit()?;
            Ok(Some(RemovedConnection {
                username,
                room_name,
                remaining,
            }))
        })
    }

    pub fn room_members(&self, room_name: &str) -> Result<Vec<ConnectionRow>> {
        self.with_conn(|conn| query_members(conn, room_name))
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, display_name, password, created_at \
         FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_members(conn: &Connection, room_name: &str) -> Result<Vec<ConnectionRow>> {
    let mut stmt =
        conn.prepare("SELECT id, room_name, username FROM connections WHERE room_name = ?1")?;

    let rows = stmt
        .query_map([room_name], |row| {
            Ok(ConnectionRow {
                id: row.get(0)?,
                room_name: row.get(1)?,
                username: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_username: row.get(1)?,
        sender_display_name: row.get(2)?,
        recipient_username: row.get(3)?,
        recipient_display_name: row.get(4)?,
        content: row.get(5)?,
        sent_at: row.get(6)?,
        read_at: row.get(7)?,
        sender_deleted: row.get(8)?,
        recipient_deleted: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageRow;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "Alice", "hash").unwrap();
        db.create_user("u2", "bob", "Bob", "hash").unwrap();
        db
    }

    fn message(id: &str, sender: &str, recipient: &str, content: &str, sent_at: &str) -> MessageRow {
        MessageRow {
            id: id.into(),
            sender_username: sender.into(),
            sender_display_name: String::new(),
            recipient_username: recipient.into(),
            recipient_display_name: String::new(),
            content: content.into(),
            sent_at: sent_at.into(),
            read_at: None,
            sender_deleted: false,
            recipient_deleted: false,
        }
    }

    #[test]
    fn thread_marks_unread_incoming_read() {
        let db = test_db();
        db.insert_message(&message("m1", "bob", "alice", "hi", "2026-01-01T10:00:00Z"))
            .unwrap();
        db.insert_message(&message("m2", "alice", "bob", "hey", "2026-01-01T10:01:00Z"))
            .unwrap();

        let thread = db
            .message_thread("alice", "bob", "2026-01-01T10:02:00Z")
            .unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "hi");

        // Incoming message now read, outgoing untouched
        assert_eq!(thread[0].read_at.as_deref(), Some("2026-01-01T10:02:00Z"));
        assert!(thread[1].read_at.is_none());
    }

    #[test]
    fn thread_filters_rows_deleted_for_the_reader() {
        let db = test_db();
        db.insert_message(&message("m1", "bob", "alice", "one", "2026-01-01T10:00:00Z"))
            .unwrap();
        db.insert_message(&message("m2", "alice", "bob", "two", "2026-01-01T10:01:00Z"))
            .unwrap();

        // alice deletes the incoming message
        db.delete_message("m1", "alice").unwrap();

        let thread = db
            .message_thread("alice", "bob", "2026-01-01T10:02:00Z")
            .unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread[0].content, "two");

        // bob still sees both
        let thread = db
            .message_thread("bob", "alice", "2026-01-01T10:03:00Z")
            .unwrap();
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn delete_is_idempotent_per_side_and_removes_when_both_sides_delete() {
        let db = test_db();
        db.insert_message(&message("m1", "alice", "bob", "hi", "2026-01-01T10:00:00Z"))
            .unwrap();

        assert_eq!(db.delete_message("m1", "alice").unwrap(), Some(false));
        // Second delete by the same side: no error, still not removed
        assert_eq!(db.delete_message("m1", "alice").unwrap(), Some(false));

        // Other side deletes: physically removed
        assert_eq!(db.delete_message("m1", "bob").unwrap(), Some(true));

        // Third attempt by either party: gone
        assert_eq!(db.delete_message("m1", "alice").unwrap(), None);
        assert_eq!(db.delete_message("m1", "bob").unwrap(), None);
    }

    #[test]
    fn delete_by_third_party_reports_not_found() {
        let db = test_db();
        db.create_user("u3", "carol", "Carol", "hash").unwrap();
        db.insert_message(&message("m1", "alice", "bob", "hi", "2026-01-01T10:00:00Z"))
            .unwrap();

        assert_eq!(db.delete_message("m1", "carol").unwrap(), None);

        // Untouched for the real parties
        let thread = db
            .message_thread("bob", "alice", "2026-01-01T10:01:00Z")
            .unwrap();
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn containers_select_disjoint_slices() {
        let db = test_db();
        db.insert_message(&message("m1", "bob", "alice", "unread", "2026-01-01T10:00:00Z"))
            .unwrap();
        let mut read = message("m2", "bob", "alice", "read", "2026-01-01T10:01:00Z");
        read.read_at = Some("2026-01-01T10:05:00Z".into());
        db.insert_message(&read).unwrap();
        db.insert_message(&message("m3", "alice", "bob", "sent", "2026-01-01T10:02:00Z"))
            .unwrap();

        let inbox = db
            .messages_for_user("alice", MessageContainer::Inbox, 50, None)
            .unwrap();
        assert_eq!(inbox.len(), 2);
        // Newest first
        assert_eq!(inbox[0].id, "m2");

        let unread = db
            .messages_for_user("alice", MessageContainer::Unread, 50, None)
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "m1");

        let outbox = db
            .messages_for_user("alice", MessageContainer::Outbox, 50, None)
            .unwrap();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].id, "m3");
    }

    #[test]
    fn listing_paginates_with_before_cursor() {
        let db = test_db();
        for i in 0..5 {
            db.insert_message(&message(
                &format!("m{i}"),
                "bob",
                "alice",
                "x",
                &format!("2026-01-01T10:0{i}:00Z"),
            ))
            .unwrap();
        }

        let page1 = db
            .messages_for_user("alice", MessageContainer::Inbox, 2, None)
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].id, "m4");

        let page2 = db
            .messages_for_user(
                "alice",
                MessageContainer::Inbox,
                2,
                Some(&page1[1].sent_at),
            )
            .unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].id, "m2");
    }

    #[test]
    fn join_room_is_create_if_absent_and_tracks_members() {
        let db = test_db();

        let members = db.join_room("alice-bob", "c1", "alice").unwrap();
        assert_eq!(members.len(), 1);

        // Second join of the same room: no duplicate room row, two members
        let members = db.join_room("alice-bob", "c2", "bob").unwrap();
        assert_eq!(members.len(), 2);

        let usernames: Vec<_> = members.iter().map(|m| m.username.as_str()).collect();
        assert!(usernames.contains(&"alice"));
        assert!(usernames.contains(&"bob"));
    }

    #[test]
    fn remove_connection_returns_owner_and_remaining() {
        let db = test_db();
        db.join_room("alice-bob", "c1", "alice").unwrap();
        db.join_room("alice-bob", "c2", "bob").unwrap();

        let removed = db.remove_connection("c1").unwrap().unwrap();
        assert_eq!(removed.username, "alice");
        assert_eq!(removed.room_name, "alice-bob");
        assert_eq!(removed.remaining.len(), 1);
        assert_eq!(removed.remaining[0].username, "bob");

        // Duplicate disconnect is a no-op
        assert!(db.remove_connection("c1").unwrap().is_none());

        // Room row survives with zero members
        assert!(db.room_members("alice-bob").unwrap().len() == 1);
        db.remove_connection("c2").unwrap().unwrap();
        assert!(db.room_members("alice-bob").unwrap().is_empty());
    }
}
