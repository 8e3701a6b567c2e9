use anyhow::Result;
use clap::Args;
use std::io::{self, Write};
use tracing::debug;

use ticketdesk::cache::CacheService;
use ticketdesk::db::Store;
use ticketdesk::desk::{CreateTicketRequest, Desk, Query, UpdateTicketRequest};

use super::{print_json, query_from};

/// Who is asking. Passed through verbatim so the desk validates it.
#[derive(Debug, Clone, Default, Args)]
pub struct Requester {
    /// Declared admin flag (true/false)
    #[arg(long = "is-admin")]
    pub is_admin: Option<String>,
    /// Declared requester name
    #[arg(long)]
    pub requester: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ListFilters {
    #[command(flatten)]
    pub who: Requester,
    /// Page number, starting at 1
    #[arg(long = "page-id")]
    pub page_id: Option<String>,
    /// Rows per page (5-10)
    #[arg(long = "page-size")]
    pub page_size: Option<String>,
    /// Admin only: tickets owned by this user
    #[arg(long)]
    pub owner: Option<String>,
    /// Admin only: tickets assigned to this agent
    #[arg(long)]
    pub assignee: Option<String>,
    /// Admin only: tickets in this category
    #[arg(long)]
    pub category: Option<String>,
}

impl Requester {
    fn query(&self) -> Query {
        query_from(&[
            ("is_admin", self.is_admin.as_deref()),
            ("requester", self.requester.as_deref()),
        ])
    }
}

impl ListFilters {
    fn query(&self) -> Query {
        query_from(&[
            ("page_id", self.page_id.as_deref()),
            ("page_size", self.page_size.as_deref()),
            ("is_admin", self.who.is_admin.as_deref()),
            ("requester", self.who.requester.as_deref()),
            ("user_assigned", self.owner.as_deref()),
            ("assigned_to", self.assignee.as_deref()),
            ("category_id", self.category.as_deref()),
        ])
    }
}

pub fn create<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    title: &str,
    description: &str,
    status: &str,
    owner: &str,
    category_id: i64,
) -> Result<()> {
    let ticket = desk.create_ticket(&CreateTicketRequest {
        title: title.to_string(),
        description: description.to_string(),
        status: status.to_string(),
        user_assigned: owner.to_string(),
        category_id,
    })?;
    print_json(&ticket)
}

pub fn get<S: Store, C: CacheService>(desk: &Desk<S, C>, id: i64, who: &Requester) -> Result<()> {
    let ticket = desk.get_ticket(id, &who.query())?;
    print_json(&ticket)
}

pub fn list<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    authorization: Option<&str>,
    filters: &ListFilters,
) -> Result<()> {
    let listing = desk.list_tickets(authorization, &filters.query())?;
    debug!(source = ?listing.source, count = listing.items.len(), "tickets listed");
    print_json(&listing.items)
}

pub fn update<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    authorization: Option<&str>,
    id: i64,
    status: &str,
    assignee: Option<&str>,
) -> Result<()> {
    let ticket = desk.update_ticket(
        authorization,
        id,
        &UpdateTicketRequest {
            status: status.to_string(),
            assigned_to: assignee.map(str::to_string),
        },
    )?;
    print_json(&ticket)
}

pub fn delete<S: Store, C: CacheService>(desk: &Desk<S, C>, id: i64, force: bool) -> Result<()> {
    if !force {
        print!("Delete ticket #{} and all of its comments? [y/N] ", id);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    desk.delete_ticket(id)?;
    println!("Deleted ticket #{}", id);
    Ok(())
}
