use anyhow::Result;

use ticketdesk::cache::CacheService;
use ticketdesk::db::Store;
use ticketdesk::desk::{CreateCommentRequest, Desk, UpdateCommentRequest};

use super::{print_json, query_from};

pub fn add<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    ticket_id: i64,
    text: &str,
    author: &str,
) -> Result<()> {
    let comment = desk.create_comment(
        ticket_id,
        &CreateCommentRequest {
            comment_text: text.to_string(),
            user_commented: author.to_string(),
        },
    )?;
    print_json(&comment)
}

pub fn list<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    ticket_id: i64,
    page_id: Option<&str>,
    page_size: Option<&str>,
) -> Result<()> {
    let query = query_from(&[("page_id", page_id), ("page_size", page_size)]);
    let comments = desk.list_comments(ticket_id, &query)?;
    print_json(&comments)
}

pub fn edit<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    ticket_id: i64,
    comment_id: i64,
    text: &str,
) -> Result<()> {
    let comment = desk.update_comment(
        ticket_id,
        comment_id,
        &UpdateCommentRequest {
            comment_text: text.to_string(),
        },
    )?;
    print_json(&comment)
}

pub fn delete<S: Store, C: CacheService>(
    desk: &Desk<S, C>,
    ticket_id: i64,
    comment_id: i64,
) -> Result<()> {
    desk.delete_comment(ticket_id, comment_id)?;
    println!("Deleted comment #{} on ticket #{}", comment_id, ticket_id);
    Ok(())
}
