use anyhow::Result;
use tracing::debug;

use ticketdesk::cache::CacheService;
use ticketdesk::db::Store;
use ticketdesk::desk::{CreateCategoryRequest, Desk};

use super::{print_json, query_from};

pub fn create<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    authorization: Option<&str>,
    name: &str,
) -> Result<()> {
    let category = desk.create_category(
        authorization,
        &CreateCategoryRequest {
            name: name.to_string(),
        },
    )?;
    print_json(&category)
}

pub fn list<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    page_id: Option<&str>,
    page_size: Option<&str>,
) -> Result<()> {
    let query = query_from(&[("page_id", page_id), ("page_size", page_size)]);
    let listing = desk.list_categories(&query)?;
    debug!(source = ?listing.source, count = listing.items.len(), "categories listed");
    print_json(&listing.items)
}
