use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use thiserror::Error;

use crate::models::{Category, Comment, Ticket, TicketStatus};

const SCHEMA_VERSION: i32 = 1;

const TICKET_COLUMNS: &str = "ticket_id, title, description, status, user_assigned, assigned_to, category_id, created_at, updated_at, closed_at";
const COMMENT_COLUMNS: &str = "comment_id, ticket_id, comment_text, user_commented, created_at";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The sentinel for "no rows". Callers match on this variant, never on the message.
    #[error("no rows in result set")]
    NotFound,
    #[error("database error: {0}")]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Sqlite(other),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct CreateTicketParams {
    pub title: String,
    pub description: String,
    pub status: TicketStatus,
    pub user_assigned: String,
    pub category_id: i64,
}

/// `None` fields are left untouched. `assigned_to: Some(None)` clears the assignee.
#[derive(Debug, Clone)]
pub struct UpdateTicketParams {
    pub ticket_id: i64,
    pub updated_at: DateTime<Utc>,
    pub status: Option<TicketStatus>,
    pub assigned_to: Option<Option<String>>,
}

impl UpdateTicketParams {
    /// Advance `updated_at` only.
    pub fn touch(ticket_id: i64, updated_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            updated_at,
            status: None,
            assigned_to: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTicketsParams {
    pub user_assigned: String,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAllTicketsParams {
    pub user_assigned: Option<String>,
    pub assigned_to: Option<String>,
    pub category_id: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub ticket_id: i64,
    pub comment_text: String,
    pub user_commented: String,
}

#[derive(Debug, Clone)]
pub struct UpdateCommentParams {
    pub comment_id: i64,
    pub comment_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCommentsParams {
    pub ticket_id: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCategoriesParams {
    pub limit: i64,
    pub offset: i64,
}

/// Persistent CRUD interface. Every lookup of a missing row yields `StoreError::NotFound`.
pub trait Store {
    fn create_ticket(&self, arg: &CreateTicketParams) -> StoreResult<Ticket>;
    fn get_ticket(&self, ticket_id: i64) -> StoreResult<Ticket>;
    fn get_ticket_for_update(&self, ticket_id: i64) -> StoreResult<Ticket>;
    fn update_ticket(&self, arg: &UpdateTicketParams) -> StoreResult<Ticket>;
    fn delete_ticket(&self, ticket_id: i64) -> StoreResult<()>;
    fn list_tickets(&self, arg: &ListTicketsParams) -> StoreResult<Vec<Ticket>>;
    fn list_all_tickets(&self, arg: &ListAllTicketsParams) -> StoreResult<Vec<Ticket>>;

    fn create_comment(&self, arg: &CreateCommentParams) -> StoreResult<Comment>;
    fn get_comment(&self, comment_id: i64) -> StoreResult<Comment>;
    fn get_comment_for_update(&self, comment_id: i64) -> StoreResult<Comment>;
    fn update_comment(&self, arg: &UpdateCommentParams) -> StoreResult<Comment>;
    fn delete_comment(&self, comment_id: i64) -> StoreResult<()>;
    fn list_comments(&self, arg: &ListCommentsParams) -> StoreResult<Vec<Comment>>;

    fn create_category(&self, name: &str) -> StoreResult<Category>;
    fn get_category(&self, category_id: i64) -> StoreResult<Category>;
    fn list_categories(&self, arg: &ListCategoriesParams) -> StoreResult<Vec<Category>>;
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS categories (
                    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS tickets (
                    ticket_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL,
                    status TEXT NOT NULL CHECK (status IN ('open', 'inprogress', 'closed')),
                    user_assigned TEXT NOT NULL,
                    assigned_to TEXT,
                    category_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    closed_at TEXT,
                    FOREIGN KEY (category_id) REFERENCES categories(category_id)
                );

                CREATE TABLE IF NOT EXISTS comments (
                    comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ticket_id INTEGER NOT NULL,
                    comment_text TEXT NOT NULL,
                    user_commented TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY (ticket_id) REFERENCES tickets(ticket_id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_tickets_user_assigned ON tickets(user_assigned);
                CREATE INDEX IF NOT EXISTS idx_tickets_assigned_to ON tickets(assigned_to);
                CREATE INDEX IF NOT EXISTS idx_tickets_category ON tickets(category_id);
                CREATE INDEX IF NOT EXISTS idx_comments_ticket ON comments(ticket_id);
                "#,
            )?;

            self.conn
                .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }

        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;

        Ok(())
    }

    fn query_tickets(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<Ticket>> {
        let mut stmt = self.conn.prepare(sql)?;
        let tickets = stmt
            .query_map(params, ticket_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tickets)
    }
}

impl Store for Database {
    fn create_ticket(&self, arg: &CreateTicketParams) -> StoreResult<Ticket> {
        let now = format_datetime(Utc::now());
        self.conn.execute(
            "INSERT INTO tickets (title, description, status, user_assigned, category_id, created_at, updated_at, closed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, CASE WHEN ?3 = 'closed' THEN ?6 END)",
            params![
                arg.title,
                arg.description,
                arg.status.as_str(),
                arg.user_assigned,
                arg.category_id,
                now
            ],
        )?;
        self.get_ticket(self.conn.last_insert_rowid())
    }

    fn get_ticket(&self, ticket_id: i64) -> StoreResult<Ticket> {
        let ticket = self.conn.query_row(
            &format!("SELECT {} FROM tickets WHERE ticket_id = ?1", TICKET_COLUMNS),
            [ticket_id],
            ticket_from_row,
        )?;
        Ok(ticket)
    }

    // SQLite has no row locks; the read is the same as get_ticket.
    fn get_ticket_for_update(&self, ticket_id: i64) -> StoreResult<Ticket> {
        self.get_ticket(ticket_id)
    }

    fn update_ticket(&self, arg: &UpdateTicketParams) -> StoreResult<Ticket> {
        let updated_at = format_datetime(arg.updated_at);
        let mut updates = vec!["updated_at = ?1".to_string()];
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(updated_at.clone())];

        if let Some(status) = arg.status {
            updates.push(format!("status = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(status.as_str()));

            // Closing an already closed ticket keeps the first close time.
            match status {
                TicketStatus::Closed => {
                    updates.push(format!("closed_at = COALESCE(closed_at, ?{})", params_vec.len() + 1));
                    params_vec.push(Box::new(updated_at));
                }
                _ => updates.push("closed_at = NULL".to_string()),
            }
        }

        if let Some(assigned_to) = &arg.assigned_to {
            updates.push(format!("assigned_to = ?{}", params_vec.len() + 1));
            params_vec.push(Box::new(assigned_to.clone()));
        }

        params_vec.push(Box::new(arg.ticket_id));
        let sql = format!(
            "UPDATE tickets SET {} WHERE ticket_id = ?{}",
            updates.join(", "),
            params_vec.len()
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        let rows = self.conn.execute(&sql, params_refs.as_slice())?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_ticket(arg.ticket_id)
    }

    fn delete_ticket(&self, ticket_id: i64) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM tickets WHERE ticket_id = ?1", [ticket_id])?;
        Ok(())
    }

    fn list_tickets(&self, arg: &ListTicketsParams) -> StoreResult<Vec<Ticket>> {
        self.query_tickets(
            &format!(
                "SELECT {} FROM tickets WHERE user_assigned = ?1 ORDER BY ticket_id LIMIT ?2 OFFSET ?3",
                TICKET_COLUMNS
            ),
            params![arg.user_assigned, arg.limit, arg.offset],
        )
    }

    fn list_all_tickets(&self, arg: &ListAllTicketsParams) -> StoreResult<Vec<Ticket>> {
        let mut sql = format!("SELECT {} FROM tickets", TICKET_COLUMNS);
        let mut conditions = Vec::new();
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(owner) = &arg.user_assigned {
            params_vec.push(Box::new(owner.clone()));
            conditions.push(format!("user_assigned = ?{}", params_vec.len()));
        }

        if let Some(assignee) = &arg.assigned_to {
            params_vec.push(Box::new(assignee.clone()));
            conditions.push(format!("assigned_to = ?{}", params_vec.len()));
        }

        if let Some(category_id) = arg.category_id {
            params_vec.push(Box::new(category_id));
            conditions.push(format!("category_id = ?{}", params_vec.len()));
        }

        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        params_vec.push(Box::new(arg.limit));
        params_vec.push(Box::new(arg.offset));
        sql.push_str(&format!(
            " ORDER BY ticket_id LIMIT ?{} OFFSET ?{}",
            params_vec.len() - 1,
            params_vec.len()
        ));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();
        self.query_tickets(&sql, params_refs.as_slice())
    }

    fn create_comment(&self, arg: &CreateCommentParams) -> StoreResult<Comment> {
        let now = format_datetime(Utc::now());
        self.conn.execute(
            "INSERT INTO comments (ticket_id, comment_text, user_commented, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![arg.ticket_id, arg.comment_text, arg.user_commented, now],
        )?;
        self.get_comment(self.conn.last_insert_rowid())
    }

    fn get_comment(&self, comment_id: i64) -> StoreResult<Comment> {
        let comment = self.conn.query_row(
            &format!(
                "SELECT {} FROM comments WHERE comment_id = ?1",
                COMMENT_COLUMNS
            ),
            [comment_id],
            comment_from_row,
        )?;
        Ok(comment)
    }

    fn get_comment_for_update(&self, comment_id: i64) -> StoreResult<Comment> {
        self.get_comment(comment_id)
    }

    fn update_comment(&self, arg: &UpdateCommentParams) -> StoreResult<Comment> {
        let rows = self.conn.execute(
            "UPDATE comments SET comment_text = ?1 WHERE comment_id = ?2",
            params![arg.comment_text, arg.comment_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_comment(arg.comment_id)
    }

    fn delete_comment(&self, comment_id: i64) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM comments WHERE comment_id = ?1", [comment_id])?;
        Ok(())
    }

    fn list_comments(&self, arg: &ListCommentsParams) -> StoreResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM comments WHERE ticket_id = ?1 ORDER BY created_at, comment_id LIMIT ?2 OFFSET ?3",
            COMMENT_COLUMNS
        ))?;
        let comments = stmt
            .query_map(params![arg.ticket_id, arg.limit, arg.offset], comment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    fn create_category(&self, name: &str) -> StoreResult<Category> {
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
        self.get_category(self.conn.last_insert_rowid())
    }

    fn get_category(&self, category_id: i64) -> StoreResult<Category> {
        let category = self.conn.query_row(
            "SELECT category_id, name FROM categories WHERE category_id = ?1",
            [category_id],
            |row| {
                Ok(Category {
                    category_id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )?;
        Ok(category)
    }

    fn list_categories(&self, arg: &ListCategoriesParams) -> StoreResult<Vec<Category>> {
        let mut stmt = self.conn.prepare(
            "SELECT category_id, name FROM categories ORDER BY category_id LIMIT ?1 OFFSET ?2",
        )?;
        let categories = stmt
            .query_map(params![arg.limit, arg.offset], |row| {
                Ok(Category {
                    category_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }
}

fn ticket_from_row(row: &Row<'_>) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        ticket_id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_status(3, row.get::<_, String>(3)?)?,
        user_assigned: row.get(4)?,
        assigned_to: row.get(5)?,
        category_id: row.get(6)?,
        created_at: parse_datetime(7, row.get::<_, String>(7)?)?,
        updated_at: parse_datetime(8, row.get::<_, String>(8)?)?,
        closed_at: row
            .get::<_, Option<String>>(9)?
            .map(|s| parse_datetime(9, s))
            .transpose()?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        comment_id: row.get(0)?,
        ticket_id: row.get(1)?,
        comment_text: row.get(2)?,
        user_commented: row.get(3)?,
        created_at: parse_datetime(4, row.get::<_, String>(4)?)?,
    })
}

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_datetime(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_status(idx: usize, s: String) -> rusqlite::Result<TicketStatus> {
    s.parse::<TicketStatus>().map_err(|msg| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
    })
}
