//! SQLite store for newsletter groups and subscription records.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::{GmailError, Result};
use crate::models::{NewsletterGroup, NewsletterGroupItem, SubscriptionRecord, SubscriptionStatus};

pub const DEFAULT_COLOR: &str = "#3b82f6";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS newsletter_group (
    id          TEXT PRIMARY KEY,
    user_email  TEXT NOT NULL,
    group_name  TEXT NOT NULL,
    description TEXT,
    color       TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (user_email, group_name)
);

CREATE TABLE IF NOT EXISTS newsletter_group_item (
    id           TEXT PRIMARY KEY,
    group_id     TEXT NOT NULL REFERENCES newsletter_group(id) ON DELETE CASCADE,
    sender_email TEXT NOT NULL,
    sender_name  TEXT,
    added_at     TEXT NOT NULL,
    UNIQUE (group_id, sender_email)
);

CREATE TABLE IF NOT EXISTS subscription_record (
    user_email      TEXT NOT NULL,
    sender_email    TEXT NOT NULL,
    sender_name     TEXT,
    status          TEXT NOT NULL,
    subscribe_link  TEXT,
    subscribe_email TEXT,
    method          TEXT,
    last_updated    TEXT NOT NULL,
    PRIMARY KEY (user_email, sender_email)
);
"#;

/// Sender to place in a group on creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupMember {
    pub sender_email: String,
    #[serde(default)]
    pub sender_name: Option<String>,
}

/// Fields to change on a group; at least one must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupUpdate {
    pub group_name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl GroupUpdate {
    fn is_empty(&self) -> bool {
        self.group_name.as_deref().map_or(true, |n| n.trim().is_empty())
            && self.description.is_none()
            && self.color.is_none()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeletedGroup {
    pub id: String,
    pub group_name: String,
    pub newsletters_removed: usize,
}

/// Ids look like `c3f0...`: a `c` followed by a simple uuid
pub fn new_id() -> String {
    format!("c{}", uuid::Uuid::new_v4().simple())
}

pub struct NewsletterStore {
    conn: Mutex<Connection>,
}

impl NewsletterStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self::init(Connection::open(path)?)?;
        info!("Opened newsletter store at {:?}", path);
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| GmailError::StoreError("store lock poisoned".to_string()))
    }

    /// Create a group and add `newsletters`, skipping duplicates.
    /// Returns the group and how many newsletters were added.
    pub fn create_group(
        &self,
        user_email: &str,
        group_name: &str,
        description: Option<&str>,
        color: Option<&str>,
        newsletters: &[GroupMember],
    ) -> Result<(NewsletterGroup, usize)> {
        let user_email = user_email.trim();
        let group_name = group_name.trim();
        if user_email.is_empty() || group_name.is_empty() {
            return Err(GmailError::BadRequest(
                "User email and group name are required".to_string(),
            ));
        }

        let mut conn = self.conn()?;
        if name_taken(&conn, user_email, group_name, None)? {
            return Err(GmailError::Conflict("A group with this name already exists".to_string()));
        }

        let tx = conn.transaction()?;
        let id = new_id();
        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO newsletter_group (id, user_email, group_name, description, color, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                user_email,
                group_name,
                description.unwrap_or_default(),
                color.unwrap_or(DEFAULT_COLOR),
                now
            ],
        )?;

        let mut added = 0;
        for member in newsletters {
            added += tx.execute(
                "INSERT OR IGNORE INTO newsletter_group_item (id, group_id, sender_email, sender_name, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![new_id(), id, member.sender_email, member.sender_name, now],
            )?;
        }
        tx.commit()?;

        debug!("Created group {} ({}) with {} newsletters", group_name, id, added);
        let group = load_group(&conn, user_email, &id)?;
        Ok((group, added))
    }

    /// All groups for the user, newest first
    pub fn list_groups(&self, user_email: &str) -> Result<Vec<NewsletterGroup>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_email, group_name, description, color, created_at, updated_at
             FROM newsletter_group WHERE user_email = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let mut groups = stmt
            .query_map(params![user_email], map_group_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for group in &mut groups {
            group.newsletters = load_items(&conn, &group.id)?;
            group.newsletter_count = group.newsletters.len();
        }
        Ok(groups)
    }

    pub fn get_group(&self, user_email: &str, group_id: &str) -> Result<NewsletterGroup> {
        let conn = self.conn()?;
        load_group(&conn, user_email, group_id)
    }

    pub fn update_group(&self, user_email: &str, group_id: &str, update: &GroupUpdate) -> Result<NewsletterGroup> {
        let conn = self.conn()?;
        // existence first: a missing group is NotFound even for an empty update
        load_group(&conn, user_email, group_id)?;

        if update.is_empty() {
            return Err(GmailError::BadRequest("No fields to update".to_string()));
        }

        let name = update
            .group_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if let Some(name) = name {
            if name_taken(&conn, user_email, name, Some(group_id))? {
                return Err(GmailError::Conflict("A group with this name already exists".to_string()));
            }
        }

        conn.execute(
            "UPDATE newsletter_group SET
                group_name  = COALESCE(?1, group_name),
                description = COALESCE(?2, description),
                color       = COALESCE(?3, color),
                updated_at  = ?4
             WHERE id = ?5 AND user_email = ?6",
            params![
                name,
                update.description,
                update.color,
                Utc::now().to_rfc3339(),
                group_id,
                user_email
            ],
        )?;

        load_group(&conn, user_email, group_id)
    }

    /// Delete a group; its items go with it
    pub fn delete_group(&self, user_email: &str, group_id: &str) -> Result<DeletedGroup> {
        let conn = self.conn()?;
        let group = load_group(&conn, user_email, group_id)?;

        conn.execute("DELETE FROM newsletter_group WHERE id = ?1", params![group_id])?;
        info!("Deleted group {} ({} newsletters)", group.group_name, group.newsletter_count);

        Ok(DeletedGroup {
            id: group.id,
            group_name: group.group_name,
            newsletters_removed: group.newsletter_count,
        })
    }

    /// Returns the new item's id
    pub fn add_newsletter(
        &self,
        user_email: &str,
        group_id: &str,
        sender_email: &str,
        sender_name: Option<&str>,
    ) -> Result<String> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM newsletter_group WHERE id = ?1 AND user_email = ?2",
                params![group_id, user_email],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Err(GmailError::NotFound("Group not found".to_string()));
        }

        let id = new_id();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO newsletter_group_item (id, group_id, sender_email, sender_name, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, group_id, sender_email, sender_name, Utc::now().to_rfc3339()],
        )?;
        if inserted == 0 {
            return Err(GmailError::Conflict("Newsletter is already in this group".to_string()));
        }
        Ok(id)
    }

    pub fn remove_newsletter(&self, user_email: &str, group_id: &str, sender_email: &str) -> Result<NewsletterGroupItem> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                "SELECT i.id, i.group_id, i.sender_email, i.sender_name, i.added_at
                 FROM newsletter_group_item i
                 JOIN newsletter_group g ON g.id = i.group_id
                 WHERE i.group_id = ?1 AND i.sender_email = ?2 AND g.user_email = ?3",
                params![group_id, sender_email, user_email],
                map_item_row,
            )
            .optional()?
            .ok_or_else(|| GmailError::NotFound("Newsletter not found in this group".to_string()))?;

        conn.execute("DELETE FROM newsletter_group_item WHERE id = ?1", params![item.id])?;
        Ok(item)
    }

    pub fn upsert_subscription_record(&self, record: &SubscriptionRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO subscription_record
                (user_email, sender_email, sender_name, status, subscribe_link, subscribe_email, method, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (user_email, sender_email) DO UPDATE SET
                sender_name = excluded.sender_name,
                status = excluded.status,
                subscribe_link = excluded.subscribe_link,
                subscribe_email = excluded.subscribe_email,
                method = excluded.method,
                last_updated = excluded.last_updated",
            params![
                record.user_email,
                record.sender_email,
                record.sender_name,
                record.status.as_str(),
                record.subscribe_link,
                record.subscribe_email,
                record.method,
                record.last_updated.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_subscription_record(&self, user_email: &str, sender_email: &str) -> Result<Option<SubscriptionRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT user_email, sender_email, sender_name, status, subscribe_link, subscribe_email, method, last_updated
                 FROM subscription_record WHERE user_email = ?1 AND sender_email = ?2",
                params![user_email, sender_email],
                |row| {
                    Ok(SubscriptionRecord {
                        user_email: row.get(0)?,
                        sender_email: row.get(1)?,
                        sender_name: row.get(2)?,
                        status: SubscriptionStatus::parse(&row.get::<_, String>(3)?),
                        subscribe_link: row.get(4)?,
                        subscribe_email: row.get(5)?,
                        method: row.get(6)?,
                        last_updated: parse_ts(&row.get::<_, String>(7)?),
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn name_taken(conn: &Connection, user_email: &str, group_name: &str, except_id: Option<&str>) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT id FROM newsletter_group
             WHERE user_email = ?1 AND group_name = ?2 AND id != COALESCE(?3, '')",
            params![user_email, group_name, except_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn load_group(conn: &Connection, user_email: &str, group_id: &str) -> Result<NewsletterGroup> {
    let mut group = conn
        .query_row(
            "SELECT id, user_email, group_name, description, color, created_at, updated_at
             FROM newsletter_group WHERE id = ?1 AND user_email = ?2",
            params![group_id, user_email],
            map_group_row,
        )
        .optional()?
        .ok_or_else(|| GmailError::NotFound("Group not found".to_string()))?;

    group.newsletters = load_items(conn, &group.id)?;
    group.newsletter_count = group.newsletters.len();
    Ok(group)
}

fn load_items(conn: &Connection, group_id: &str) -> Result<Vec<NewsletterGroupItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, sender_email, sender_name, added_at
         FROM newsletter_group_item WHERE group_id = ?1
         ORDER BY added_at DESC, rowid DESC",
    )?;
    let items = stmt
        .query_map(params![group_id], map_item_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(items)
}

fn map_group_row(row: &Row<'_>) -> rusqlite::Result<NewsletterGroup> {
    Ok(NewsletterGroup {
        id: row.get(0)?,
        user_email: row.get(1)?,
        group_name: row.get(2)?,
        description: row.get(3)?,
        color: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?),
        updated_at: parse_ts(&row.get::<_, String>(6)?),
        newsletter_count: 0,
        newsletters: Vec::new(),
    })
}

fn map_item_row(row: &Row<'_>) -> rusqlite::Result<NewsletterGroupItem> {
    Ok(NewsletterGroupItem {
        id: row.get(0)?,
        group_id: row.get(1)?,
        sender_email: row.get(2)?,
        sender_name: row.get(3)?,
        added_at: parse_ts(&row.get::<_, String>(4)?),
    })
}

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
