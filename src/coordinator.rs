//! Existence preconditions and multi-write mutations.
//!
//! Each mutation first reads the rows it depends on, then issues its writes as
//! separate store calls. There is no enclosing transaction: when the second
//! write of [`update_comment`] fails, the comment keeps its new text while the
//! ticket keeps its old `updated_at`. That window is logged and reported as an
//! internal error.
use chrono::{DateTime, Duration, Timelike, Utc};
use tracing::{error, info};

use crate::db::{
    CreateCommentParams, ListCommentsParams, Store, UpdateCommentParams, UpdateTicketParams,
};
use crate::error::ApiError;
use crate::models::{Comment, Ticket, TicketStatus};

/// Round to the nearest whole second.
pub fn round_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = t.nanosecond() % 1_000_000_000;
    let floor = t - Duration::nanoseconds(nanos as i64);
    if nanos >= 500_000_000 {
        floor + Duration::seconds(1)
    } else {
        floor
    }
}

/// The `updated_at` for a mutation at `now`: whole seconds, strictly after `previous`.
pub fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let candidate = round_to_second(now);
    if candidate > previous {
        candidate
    } else {
        let nanos = previous.nanosecond() % 1_000_000_000;
        previous - Duration::nanoseconds(nanos as i64) + Duration::seconds(1)
    }
}

fn comment_under<S: Store + ?Sized>(
    store: &S,
    ticket_id: i64,
    comment_id: i64,
) -> Result<Comment, ApiError> {
    let comment = store
        .get_comment_for_update(comment_id)
        .map_err(|e| ApiError::from_store(e, "comment"))?;
    if comment.ticket_id != ticket_id {
        return Err(ApiError::NotFound("comment not found".to_string()));
    }
    Ok(comment)
}

/// Edit a comment's text and advance its ticket's `updated_at`.
///
/// Steps run in order and each gates the next: ticket exists, comment exists
/// under that ticket, write comment text, touch the ticket.
pub fn update_comment<S: Store + ?Sized>(
    store: &S,
    ticket_id: i64,
    comment_id: i64,
    text: &str,
) -> Result<Comment, ApiError> {
    let ticket = store
        .get_ticket_for_update(ticket_id)
        .map_err(|e| ApiError::from_store(e, "ticket"))?;
    comment_under(store, ticket_id, comment_id)?;

    let comment = store
        .update_comment(&UpdateCommentParams {
            comment_id,
            comment_text: text.to_string(),
        })
        .map_err(|e| ApiError::from_store(e, "comment"))?;

    let touched_at = next_updated_at(ticket.updated_at, Utc::now());
    if let Err(e) = store.update_ticket(&UpdateTicketParams::touch(ticket_id, touched_at)) {
        error!(
            ticket_id,
            comment_id,
            error = %e,
            "comment updated but ticket timestamp was not advanced"
        );
        return Err(ApiError::internal(e));
    }

    info!(ticket_id, comment_id, "comment updated");
    Ok(comment)
}

/// Set a ticket's status and assignee. An empty or absent assignee clears it.
pub fn update_ticket<S: Store + ?Sized>(
    store: &S,
    ticket_id: i64,
    status: TicketStatus,
    assigned_to: Option<&str>,
) -> Result<Ticket, ApiError> {
    let current = store
        .get_ticket_for_update(ticket_id)
        .map_err(|e| ApiError::from_store(e, "ticket"))?;

    let assigned_to = assigned_to.filter(|a| !a.is_empty()).map(str::to_string);
    let ticket = store
        .update_ticket(&UpdateTicketParams {
            ticket_id,
            updated_at: next_updated_at(current.updated_at, Utc::now()),
            status: Some(status),
            assigned_to: Some(assigned_to),
        })
        .map_err(ApiError::internal)?;

    info!(ticket_id, status = %ticket.status, "ticket updated");
    Ok(ticket)
}

/// Delete a ticket. Its comments go with it.
pub fn delete_ticket<S: Store + ?Sized>(store: &S, ticket_id: i64) -> Result<(), ApiError> {
    store
        .get_ticket(ticket_id)
        .map_err(|e| ApiError::from_store(e, "ticket"))?;
    store.delete_ticket(ticket_id).map_err(ApiError::internal)?;
    info!(ticket_id, "ticket deleted");
    Ok(())
}

pub fn delete_comment<S: Store + ?Sized>(
    store: &S,
    ticket_id: i64,
    comment_id: i64,
) -> Result<(), ApiError> {
    comment_under(store, ticket_id, comment_id)?;
    store.delete_comment(comment_id).map_err(ApiError::internal)?;
    info!(ticket_id, comment_id, "comment deleted");
    Ok(())
}

pub fn create_comment<S: Store + ?Sized>(
    store: &S,
    arg: &CreateCommentParams,
) -> Result<Comment, ApiError> {
    store
        .get_ticket(arg.ticket_id)
        .map_err(|e| ApiError::from_store(e, "ticket"))?;
    store.create_comment(arg).map_err(ApiError::internal)
}

pub fn list_comments<S: Store + ?Sized>(
    store: &S,
    arg: &ListCommentsParams,
) -> Result<Vec<Comment>, ApiError> {
    store
        .get_ticket(arg.ticket_id)
        .map_err(|e| ApiError::from_store(e, "ticket"))?;
    store.list_comments(arg).map_err(ApiError::internal)
}
