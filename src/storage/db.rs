use crate::types::{
    Message, MessageState, PartyKind, PartyRef, Recipient, RecipientKind, RecipientState, User,
    now_ts,
};
use anyhow::{Context, Result, anyhow};
use dirs::home_dir;

use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DB_FILE_NAME: &str = "postbox.db";

/// Listing filter; the default matches everything, tombstones included.
#[derive(Clone, Debug, Default)]
pub struct MessageFilter {
    /// Only messages whose hidden_at is null.
    pub visible_only: bool,
    pub state: Option<MessageState>,
    pub sender: Option<PartyRef>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    pub async fn new_default() -> Result<Self> {
        Self::new_named(DB_FILE_NAME).await
    }

    pub async fn new_named(file_name: &str) -> Result<Self> {
        let base = default_data_dir()?;
        Self::open(&base.join(file_name)).await
    }

    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }

        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .with_context(|| format!("connecting to sqlite at {}", db_path.display()))?;

        let db = Database {
            pool,
            path: db_path.to_path_buf(),
        };
        db.migrate().await?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query("PRAGMA foreign_keys = ON;")
            .execute(&self.pool)
            .await
            .context("enabling foreign keys")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_kind TEXT NOT NULL,
                sender_id INTEGER NOT NULL,
                subject TEXT,
                body TEXT,
                state TEXT NOT NULL,
                hidden_at INTEGER,
                deleted_at INTEGER,
                original_message_id INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (original_message_id) REFERENCES messages(id)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_kind, sender_id);
            CREATE INDEX IF NOT EXISTS idx_messages_original ON messages(original_message_id);

            CREATE TABLE IF NOT EXISTS message_recipients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id INTEGER NOT NULL,
                receiver_kind TEXT NOT NULL,
                receiver_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                hidden_at INTEGER,
                position INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_recipients_message ON message_recipients(message_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("running migrations")?;

        Ok(())
    }

    pub async fn save_user(&self, name: &str) -> Result<User> {
        let now = now_ts();
        sqlx::query(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at;
            "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("upserting user")?;

        let row = sqlx::query("SELECT id, name, created_at, updated_at FROM users WHERE name = ?1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .context("reloading user")?;

        Ok(user_from_row(&row))
    }

    pub async fn load_user(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, created_at, updated_at FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("loading user")?;
        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows =
            sqlx::query("SELECT id, name, created_at, updated_at FROM users ORDER BY id ASC")
                .fetch_all(&self.pool)
                .await
                .context("listing users")?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Persists a message and all of its recipients in one transaction,
    /// writing assigned row ids back into the model. Ok(false) without
    /// touching the store when the message fails validation.
    pub async fn save_message(&self, message: &mut Message) -> Result<bool> {
        let Some(sender) = message.sender else {
            return Ok(false);
        };
        if !message.is_valid() {
            return Ok(false);
        }

        let now = now_ts();
        message.updated_at = now;

        let mut tx = self.pool.begin().await.context("beginning save tx")?;

        let message_id = match message.id {
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET sender_kind = ?1, sender_id = ?2, subject = ?3, body = ?4,
                        state = ?5, hidden_at = ?6, deleted_at = ?7,
                        original_message_id = ?8, updated_at = ?9
                    WHERE id = ?10;
                    "#,
                )
                .bind(sender.kind.as_str())
                .bind(sender.id)
                .bind(&message.subject)
                .bind(&message.body)
                .bind(message.state.as_str())
                .bind(message.hidden_at)
                .bind(message.deleted_at)
                .bind(message.original_message_id)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("updating message")?;
                id
            }
            None => {
                let res = sqlx::query(
                    r#"
                    INSERT INTO messages (
                        sender_kind, sender_id, subject, body, state,
                        hidden_at, deleted_at, original_message_id,
                        created_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);
                    "#,
                )
                .bind(sender.kind.as_str())
                .bind(sender.id)
                .bind(&message.subject)
                .bind(&message.body)
                .bind(message.state.as_str())
                .bind(message.hidden_at)
                .bind(message.deleted_at)
                .bind(message.original_message_id)
                .bind(message.created_at)
                .bind(now)
                .execute(&mut *tx)
                .await
                .context("inserting message")?;
                let id = res.last_insert_rowid();
                message.id = Some(id);
                id
            }
        };

        for recipient in &mut message.recipients {
            recipient.message_id = Some(message_id);
            match recipient.id {
                Some(recipient_id) => {
                    sqlx::query(
                        r#"
                        UPDATE message_recipients
                        SET state = ?1, hidden_at = ?2, position = ?3, updated_at = ?4
                        WHERE id = ?5;
                        "#,
                    )
                    .bind(recipient.state.as_str())
                    .bind(recipient.hidden_at)
                    .bind(recipient.position)
                    .bind(now)
                    .bind(recipient_id)
                    .execute(&mut *tx)
                    .await
                    .context("updating recipient")?;
                }
                None => {
                    let res = sqlx::query(
                        r#"
                        INSERT INTO message_recipients (
                            message_id, receiver_kind, receiver_id, kind, state,
                            hidden_at, position, created_at, updated_at
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);
                        "#,
                    )
                    .bind(message_id)
                    .bind(recipient.receiver.kind.as_str())
                    .bind(recipient.receiver.id)
                    .bind(recipient.kind.as_str())
                    .bind(recipient.state.as_str())
                    .bind(recipient.hidden_at)
                    .bind(recipient.position)
                    .bind(recipient.created_at)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .context("inserting recipient")?;
                    recipient.id = Some(res.last_insert_rowid());
                }
            }
        }

        tx.commit().await.context("committing save tx")?;
        debug!(id = message_id, "Saved message");
        Ok(true)
    }

    pub async fn load_message(&self, id: i64) -> Result<Option<Message>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        load_message_conn(&mut conn, id).await
    }

    pub async fn message_exists(&self, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("checking message existence")?;
        Ok(row.is_some())
    }

    /// Ok(false) when the transition is denied or the message is missing.
    pub async fn queue_message(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("beginning queue tx")?;

        let Some(mut message) = load_message_conn(&mut tx, id).await? else {
            return Ok(false);
        };
        if !message.queue() {
            return Ok(false);
        }

        persist_transition(&mut tx, &message).await?;
        tx.commit().await.context("committing queue tx")?;
        debug!(id, "Queued message");
        Ok(true)
    }

    /// Marks the message sent and every recipient unread, atomically.
    pub async fn deliver_message(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("beginning deliver tx")?;

        let Some(mut message) = load_message_conn(&mut tx, id).await? else {
            return Ok(false);
        };
        if !message.deliver() {
            return Ok(false);
        }

        persist_transition(&mut tx, &message).await?;
        tx.commit().await.context("committing deliver tx")?;
        debug!(id, recipients = message.recipients.len(), "Delivered message");
        Ok(true)
    }

    /// Unsent and queued messages are removed outright; sent messages are
    /// soft-deleted until every recipient has deleted their copy. Ok(false)
    /// when already deleted or missing.
    pub async fn delete_message(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("beginning delete tx")?;

        let Some(mut message) = load_message_conn(&mut tx, id).await? else {
            return Ok(false);
        };
        if !message.delete() {
            return Ok(false);
        }

        let hard = match message.state {
            MessageState::Unsent | MessageState::Queued => true,
            MessageState::Sent => message
                .recipients
                .iter()
                .all(|r| r.state == RecipientState::Deleted),
        };

        if hard {
            // Children first; robust even if foreign key cascading is off.
            sqlx::query("DELETE FROM message_recipients WHERE message_id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("deleting recipients")?;
            sqlx::query("DELETE FROM messages WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("deleting message")?;
        } else {
            sqlx::query("UPDATE messages SET deleted_at = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(message.deleted_at)
                .bind(message.updated_at)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("soft-deleting message")?;
        }

        tx.commit().await.context("committing delete tx")?;
        debug!(id, hard, "Deleted message");
        Ok(true)
    }

    /// Marks one recipient's copy deleted.
    pub async fn delete_recipient(&self, id: i64) -> Result<bool> {
        let row = sqlx::query("SELECT state FROM message_recipients WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("loading recipient state")?;

        let Some(row) = row else {
            return Ok(false);
        };
        let state = parse_recipient_state(&row.get::<String, _>(0))?;
        if state == RecipientState::Deleted {
            return Ok(false);
        }

        sqlx::query("UPDATE message_recipients SET state = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(RecipientState::Deleted.as_str())
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("deleting recipient copy")?;
        Ok(true)
    }

    pub async fn hide_message(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("UPDATE messages SET hidden_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(now_ts())
            .bind(id)
            .execute(&self.pool)
            .await
            .context("hiding message")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn unhide_message(&self, id: i64) -> Result<bool> {
        let res =
            sqlx::query("UPDATE messages SET hidden_at = NULL, updated_at = ?1 WHERE id = ?2")
                .bind(now_ts())
                .bind(id)
                .execute(&self.pool)
                .await
                .context("unhiding message")?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn list_messages(&self, filter: &MessageFilter) -> Result<Vec<Message>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, sender_kind, sender_id, subject, body, state, hidden_at, deleted_at, \
             original_message_id, created_at, updated_at FROM messages WHERE 1 = 1",
        );
        if filter.visible_only {
            qb.push(" AND hidden_at IS NULL");
        }
        if let Some(state) = filter.state {
            qb.push(" AND state = ");
            qb.push_bind(state.as_str());
        }
        if let Some(sender) = filter.sender {
            qb.push(" AND sender_kind = ");
            qb.push_bind(sender.kind.as_str());
            qb.push(" AND sender_id = ");
            qb.push_bind(sender.id);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("listing messages")?;

        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let mut out = Vec::new();
        for row in rows {
            let mut message = message_from_row(&row)?;
            message.recipients = load_recipients_conn(&mut conn, row.get::<i64, _>(0)).await?;
            out.push(message);
        }
        Ok(out)
    }

    /// Ancestor chain of a reply thread, nearest parent first. A seen-set
    /// keeps a corrupt id cycle from hanging the walk.
    pub async fn thread(&self, id: i64) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await.context("acquiring connection")?;

        let Some(message) = load_message_conn(&mut conn, id).await? else {
            return Ok(Vec::new());
        };

        let mut seen = std::collections::HashSet::from([id]);
        let mut ancestors = Vec::new();
        let mut next = message.original_message_id;
        while let Some(parent_id) = next {
            if !seen.insert(parent_id) {
                warn!(id, parent_id, "Thread cycle detected; truncating walk");
                break;
            }
            let Some(parent) = load_message_conn(&mut conn, parent_id).await? else {
                break;
            };
            next = parent.original_message_id;
            ancestors.push(parent);
        }
        Ok(ancestors)
    }
}

async fn load_message_conn(conn: &mut SqliteConnection, id: i64) -> Result<Option<Message>> {
    let row = sqlx::query(
        r#"
        SELECT id, sender_kind, sender_id, subject, body, state, hidden_at, deleted_at,
               original_message_id, created_at, updated_at
        FROM messages
        WHERE id = ?1;
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .context("loading message")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut message = message_from_row(&row)?;
    message.recipients = load_recipients_conn(conn, id).await?;
    Ok(Some(message))
}

async fn load_recipients_conn(conn: &mut SqliteConnection, message_id: i64) -> Result<Vec<Recipient>> {
    let rows = sqlx::query(
        r#"
        SELECT id, message_id, receiver_kind, receiver_id, kind, state, hidden_at, position,
               created_at, updated_at
        FROM message_recipients
        WHERE message_id = ?1
        ORDER BY CASE kind WHEN 'to' THEN 0 WHEN 'cc' THEN 1 ELSE 2 END, position ASC, id ASC;
        "#,
    )
    .bind(message_id)
    .fetch_all(&mut *conn)
    .await
    .context("loading recipients")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(Recipient {
            id: Some(row.get(0)),
            message_id: Some(row.get(1)),
            receiver: PartyRef {
                kind: parse_party_kind(&row.get::<String, _>(2))?,
                id: row.get(3),
            },
            kind: parse_recipient_kind(&row.get::<String, _>(4))?,
            state: parse_recipient_state(&row.get::<String, _>(5))?,
            hidden_at: row.get(6),
            position: row.get(7),
            created_at: row.get(8),
            updated_at: row.get(9),
        });
    }
    Ok(out)
}

// Message row and the uniform recipient-state cascade, on the caller's tx.
async fn persist_transition(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    message: &Message,
) -> Result<()> {
    let Some(id) = message.id else {
        return Err(anyhow!("cannot persist transition for unsaved message"));
    };

    sqlx::query("UPDATE messages SET state = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(message.state.as_str())
        .bind(message.updated_at)
        .bind(id)
        .execute(&mut **tx)
        .await
        .context("updating message state")?;

    if let Some(first) = message.recipients.first() {
        sqlx::query(
            "UPDATE message_recipients SET state = ?1, updated_at = ?2 WHERE message_id = ?3",
        )
        .bind(first.state.as_str())
        .bind(message.updated_at)
        .bind(id)
        .execute(&mut **tx)
        .await
        .context("cascading recipient state")?;
    }

    Ok(())
}

fn message_from_row(row: &SqliteRow) -> Result<Message> {
    Ok(Message {
        id: Some(row.get(0)),
        sender: Some(PartyRef {
            kind: parse_party_kind(&row.get::<String, _>(1))?,
            id: row.get(2),
        }),
        subject: row.get(3),
        body: row.get(4),
        state: parse_message_state(&row.get::<String, _>(5))?,
        hidden_at: row.get(6),
        deleted_at: row.get(7),
        original_message_id: row.get(8),
        recipients: Vec::new(),
        created_at: row.get(9),
        updated_at: row.get(10),
    })
}

fn user_from_row(row: &SqliteRow) -> User {
    User {
        id: row.get(0),
        name: row.get(1),
        created_at: row.get(2),
        updated_at: row.get(3),
    }
}

fn parse_party_kind(raw: &str) -> Result<PartyKind> {
    PartyKind::parse(raw).ok_or_else(|| anyhow!("unknown party kind '{raw}'"))
}

fn parse_message_state(raw: &str) -> Result<MessageState> {
    MessageState::parse(raw).ok_or_else(|| anyhow!("unknown message state '{raw}'"))
}

fn parse_recipient_kind(raw: &str) -> Result<RecipientKind> {
    RecipientKind::parse(raw).ok_or_else(|| anyhow!("unknown recipient kind '{raw}'"))
}

fn parse_recipient_state(raw: &str) -> Result<RecipientState> {
    RecipientState::parse(raw).ok_or_else(|| anyhow!("unknown recipient state '{raw}'"))
}

pub(crate) fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = env::var("POSTBOX_DATA_DIR") {
        let path = PathBuf::from(custom);
        std::fs::create_dir_all(&path)
            .with_context(|| format!("creating POSTBOX_DATA_DIR at {}", path.display()))?;
        return Ok(path);
    }

    if let Some(home) = home_dir() {
        let path = home.join("postbox");
        if std::fs::create_dir_all(&path).is_ok() {
            return Ok(path);
        } else {
            warn!(
                "Unable to create {}/postbox; falling back to workspace-local storage",
                home.display()
            );
        }
    }

    let cwd = env::current_dir().context("determining current directory")?;
    let path = cwd.join("postbox-data");
    std::fs::create_dir_all(&path)
        .with_context(|| format!("creating fallback data directory {}", path.display()))?;
    Ok(path)
}
