//! Who may see or change what.
//!
//! Two modes coexist and differ in trust level, so they are separate types:
//! - Permission mode takes an [`Identity`] proven by a signed credential and
//!   checks it against exact permission strings.
//! - Flag mode takes a [`Declared`] claim (`is_admin`, `requester`) with no
//!   signature behind it. Routes that never went through the credential system
//!   use it for ownership scoping.
use thiserror::Error;
use tracing::debug;

use crate::auth::Identity;
use crate::db::{ListAllTicketsParams, ListTicketsParams};
use crate::models::Ticket;
use crate::pagination::Page;

pub const ADMIN_ONLY: &str = "only admins may perform this action";
pub const NOT_OWNER: &str = "user doesn't own that ticket";

pub const TICKETS_PUT: &str = "tickets.PUT";
pub const CATEGORIES_POST: &str = "categories.POST";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Denied(pub &'static str);

/// Flags a caller declares about itself on flag-scoped routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub is_admin: bool,
    pub requester: String,
}

/// Optional admin-side narrowing for ticket listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketFilter {
    pub owner: Option<String>,
    pub assignee: Option<String>,
    pub category_id: Option<i64>,
}

impl TicketFilter {
    /// Keep only the first supplied filter in owner > assignee > category order.
    pub fn narrowest(&self) -> TicketFilter {
        if let Some(owner) = &self.owner {
            TicketFilter {
                owner: Some(owner.clone()),
                ..Default::default()
            }
        } else if let Some(assignee) = &self.assignee {
            TicketFilter {
                assignee: Some(assignee.clone()),
                ..Default::default()
            }
        } else if let Some(category_id) = self.category_id {
            TicketFilter {
                category_id: Some(category_id),
                ..Default::default()
            }
        } else {
            TicketFilter::default()
        }
    }
}

/// The set of tickets a listing may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketScope {
    Owned(ListTicketsParams),
    All(ListAllTicketsParams),
}

/// Permission-string mode: the action token must be present verbatim.
pub fn require_permission(identity: &Identity, action: &str) -> Result<(), Denied> {
    if identity.has_permission(action) {
        Ok(())
    } else {
        debug!(action, subject = ?identity.subject, "permission denied");
        Err(Denied(ADMIN_ONLY))
    }
}

/// Flag mode listing scope. Non-admins get exactly their own tickets whatever
/// filter they pass.
pub fn ticket_list_scope(declared: &Declared, filter: &TicketFilter, page: Page) -> TicketScope {
    if !declared.is_admin {
        return TicketScope::Owned(ListTicketsParams {
            user_assigned: declared.requester.clone(),
            limit: page.limit,
            offset: page.offset,
        });
    }

    let active = filter.narrowest();
    TicketScope::All(ListAllTicketsParams {
        user_assigned: active.owner,
        assigned_to: active.assignee,
        category_id: active.category_id,
        limit: page.limit,
        offset: page.offset,
    })
}

/// Flag mode single-ticket read.
pub fn check_ticket_read(declared: &Declared, ticket: &Ticket) -> Result<(), Denied> {
    if declared.is_admin || ticket.user_assigned == declared.requester {
        Ok(())
    } else {
        debug!(
            ticket_id = ticket.ticket_id,
            requester = %declared.requester,
            "ticket read outside requester scope"
        );
        Err(Denied(NOT_OWNER))
    }
}
