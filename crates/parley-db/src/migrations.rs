use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            display_name    TEXT NOT NULL,
            password        TEXT NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            sender_username     TEXT NOT NULL REFERENCES users(username),
            recipient_username  TEXT NOT NULL REFERENCES users(username),
            content             TEXT NOT NULL,
            sent_at             TEXT NOT NULL,
            read_at             TEXT,
            sender_deleted      INTEGER NOT NULL DEFAULT 0,
            recipient_deleted   INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_recipient
            ON messages(recipient_username, sent_at);

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_username, sent_at);

        -- One room per pair of usernames; the name is the sorted pair.
        CREATE TABLE IF NOT EXISTS rooms (
            name        TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS connections (
            id          TEXT PRIMARY KEY,
            room_name   TEXT NOT NULL REFERENCES rooms(name),
            username    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_connections_room
            ON connections(room_name);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
