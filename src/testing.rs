//! Test doubles shared by the in-crate test modules.
use std::cell::RefCell;
use tempfile::TempDir;

use crate::db::*;
use crate::models::{Category, Comment, Ticket, TicketStatus};

/// A [`Store`] that records every call by name and can be told to fail one of them.
pub struct RecordingStore {
    inner: Database,
    calls: RefCell<Vec<&'static str>>,
    fail_on: RefCell<Option<&'static str>>,
    _dir: TempDir,
}

impl RecordingStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let inner = Database::open(&dir.path().join("test.db")).unwrap();
        RecordingStore {
            inner,
            calls: RefCell::new(Vec::new()),
            fail_on: RefCell::new(None),
            _dir: dir,
        }
    }

    pub fn fail_on(&self, call: &'static str) {
        *self.fail_on.borrow_mut() = Some(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// True if any recorded call changes data.
    pub fn mutated(&self) -> bool {
        self.calls.borrow().iter().any(|c| {
            c.starts_with("create_") || c.starts_with("update_") || c.starts_with("delete_")
        })
    }

    pub fn seed_ticket(&self, owner: &str) -> Ticket {
        let category = self.inner.create_category("general").unwrap();
        self.inner
            .create_ticket(&CreateTicketParams {
                title: format!("{}'s laptop", owner),
                description: "won't boot".to_string(),
                status: TicketStatus::Open,
                user_assigned: owner.to_string(),
                category_id: category.category_id,
            })
            .unwrap()
    }

    pub fn seed_comment(&self, ticket_id: i64, text: &str) -> Comment {
        self.inner
            .create_comment(&CreateCommentParams {
                ticket_id,
                comment_text: text.to_string(),
                user_commented: "agent".to_string(),
            })
            .unwrap()
    }

    pub fn db(&self) -> &Database {
        &self.inner
    }

    fn record(&self, call: &'static str) -> StoreResult<()> {
        self.calls.borrow_mut().push(call);
        if *self.fail_on.borrow() == Some(call) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        Ok(())
    }
}

impl Store for RecordingStore {
    fn create_ticket(&self, arg: &CreateTicketParams) -> StoreResult<Ticket> {
        self.record("create_ticket")?;
        self.inner.create_ticket(arg)
    }

    fn get_ticket(&self, ticket_id: i64) -> StoreResult<Ticket> {
        self.record("get_ticket")?;
        self.inner.get_ticket(ticket_id)
    }

    fn get_ticket_for_update(&self, ticket_id: i64) -> StoreResult<Ticket> {
        self.record("get_ticket_for_update")?;
        self.inner.get_ticket_for_update(ticket_id)
    }

    fn update_ticket(&self, arg: &UpdateTicketParams) -> StoreResult<Ticket> {
        self.record("update_ticket")?;
        self.inner.update_ticket(arg)
    }

    fn delete_ticket(&self, ticket_id: i64) -> StoreResult<()> {
        self.record("delete_ticket")?;
        self.inner.delete_ticket(ticket_id)
    }

    fn list_tickets(&self, arg: &ListTicketsParams) -> StoreResult<Vec<Ticket>> {
        self.record("list_tickets")?;
        self.inner.list_tickets(arg)
    }

    fn list_all_tickets(&self, arg: &ListAllTicketsParams) -> StoreResult<Vec<Ticket>> {
        self.record("list_all_tickets")?;
        self.inner.list_all_tickets(arg)
    }

    fn create_comment(&self, arg: &CreateCommentParams) -> StoreResult<Comment> {
        self.record("create_comment")?;
        self.inner.create_comment(arg)
    }

    fn get_comment(&self, comment_id: i64) -> StoreResult<Comment> {
        self.record("get_comment")?;
        self.inner.get_comment(comment_id)
    }

    fn get_comment_for_update(&self, comment_id: i64) -> StoreResult<Comment> {
        self.record("get_comment_for_update")?;
        self.inner.get_comment_for_update(comment_id)
    }

    fn update_comment(&self, arg: &UpdateCommentParams) -> StoreResult<Comment> {
        self.record("update_comment")?;
        self.inner.update_comment(arg)
    }

    fn delete_comment(&self, comment_id: i64) -> StoreResult<()> {
        self.record("delete_comment")?;
        self.inner.delete_comment(comment_id)
    }

    fn list_comments(&self, arg: &ListCommentsParams) -> StoreResult<Vec<Comment>> {
        self.record("list_comments")?;
        self.inner.list_comments(arg)
    }

    fn create_category(&self, name: &str) -> StoreResult<Category> {
        self.record("create_category")?;
        self.inner.create_category(name)
    }

    fn get_category(&self, category_id: i64) -> StoreResult<Category> {
        self.record("get_category")?;
        self.inner.get_category(category_id)
    }

    fn list_categories(&self, arg: &ListCategoriesParams) -> StoreResult<Vec<Category>> {
        self.record("list_categories")?;
        self.inner.list_categories(arg)
    }
}
