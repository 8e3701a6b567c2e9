//! The request pipeline, one method per route.
//!
//! A request is authenticated first (on routes that need it), then its paging
//! and filter inputs are validated, then the access policy narrows the scope.
//! Reads of list routes go through the query cache; writes go through the
//! coordinator's precondition checks.
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{AuthError, CredentialVerifier, Identity};
use crate::cache::{cache_key, CacheService, QueryCache, Source};
use crate::coordinator;
use crate::db::{
    CreateCommentParams, CreateTicketParams, ListCategoriesParams, ListCommentsParams, Store,
    StoreError,
};
use crate::error::ApiError;
use crate::models::{Category, Comment, Ticket, TicketStatus};
use crate::pagination::{self, PageBounds};
use crate::policy::{self, Declared, TicketFilter, TicketScope, CATEGORIES_POST, TICKETS_PUT};

pub const TICKETS_PATH: &str = "/tickets";
pub const CATEGORIES_PATH: &str = "/categories";

/// Query-string parameters exactly as received.
///
/// Values are taken literally; no percent-decoding is applied. The raw string
/// is kept because it is part of some cache keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    raw: String,
    pairs: Vec<(String, String)>,
}

impl Query {
    pub fn parse(raw: &str) -> Query {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs = raw
            .split('&')
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (p.to_string(), String::new()),
            })
            .collect();
        Query {
            raw: raw.to_string(),
            pairs,
        }
    }

    /// Build a query from pairs, rendering them in the given order.
    pub fn from_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Query {
        let raw = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k.as_ref(), v.as_ref()))
            .collect::<Vec<_>>()
            .join("&");
        Query::parse(&raw)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First non-empty value for `name`.
    fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    pub status: String,
    pub user_assigned: String,
    pub category_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTicketRequest {
    pub status: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub comment_text: String,
    pub user_commented: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCommentRequest {
    pub comment_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
}

/// A page of results and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub source: Source,
}

pub struct Desk<S, C> {
    store: S,
    cache: QueryCache<C>,
    verifier: CredentialVerifier,
}

impl<S: Store, C: CacheService> Desk<S, C> {
    pub fn new(store: S, cache: QueryCache<C>, verifier: CredentialVerifier) -> Self {
        Desk {
            store,
            cache,
            verifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, ApiError> {
        let header = authorization.ok_or(AuthError::MissingHeader)?;
        let identity = self.verifier.verify(header).map_err(|e| {
            debug!(error = %e, "credential rejected");
            e
        })?;
        Ok(identity)
    }

    // ---- tickets ----

    pub fn create_ticket(&self, req: &CreateTicketRequest) -> Result<Ticket, ApiError> {
        let title = required("title", &req.title)?;
        let description = required("description", &req.description)?;
        let user_assigned = required("user_assigned", &req.user_assigned)?;
        let status = parse_status(&req.status)?;
        let category_id = require_id("category_id", req.category_id)?;

        self.store
            .get_category(category_id)
            .map_err(|e| ApiError::from_store(e, "category"))?;

        let ticket = self
            .store
            .create_ticket(&CreateTicketParams {
                title: title.to_string(),
                description: description.to_string(),
                status,
                user_assigned: user_assigned.to_string(),
                category_id,
            })
            .map_err(ApiError::internal)?;
        info!(ticket_id = ticket.ticket_id, owner = %ticket.user_assigned, "ticket created");
        Ok(ticket)
    }

    /// Flag-mode single read. A non-admin asking for a ticket that is not
    /// theirs gets the same 401 whether or not the ticket exists.
    pub fn get_ticket(&self, ticket_id: i64, query: &Query) -> Result<Ticket, ApiError> {
        let ticket_id = require_id("ticket_id", ticket_id)?;
        let declared = declared(query)?;

        let ticket = match self.store.get_ticket(ticket_id) {
            Ok(ticket) => ticket,
            Err(e) if declared.is_admin => return Err(ApiError::from_store(e, "ticket")),
            Err(StoreError::NotFound) => {
                return Err(ApiError::Unauthorized(policy::NOT_OWNER.to_string()))
            }
            Err(e) => return Err(ApiError::internal(e)),
        };

        policy::check_ticket_read(&declared, &ticket)?;
        Ok(ticket)
    }

    /// Credential-guarded listing, scoped by the declared `is_admin`/`requester` flags.
    pub fn list_tickets(
        &self,
        authorization: Option<&str>,
        query: &Query,
    ) -> Result<Listing<Ticket>, ApiError> {
        self.authenticate(authorization)?;

        let page_id = query.get("page_id");
        let page_size = query.get("page_size");
        let page = pagination::parse(page_id, page_size, PageBounds::LISTING)?;
        let declared = declared(query)?;
        let filter = TicketFilter {
            owner: query.non_empty("user_assigned").map(str::to_string),
            assignee: query.non_empty("assigned_to").map(str::to_string),
            category_id: optional_category(query)?,
        };

        let scope = policy::ticket_list_scope(&declared, &filter, page);
        let key = match &scope {
            TicketScope::All(_) => cache_key(TICKETS_PATH, query.raw()),
            TicketScope::Owned(_) => cache_key(
                TICKETS_PATH,
                Query::from_pairs(&[
                    ("requester", declared.requester.as_str()),
                    ("page_id", page_id.unwrap_or_default()),
                    ("page_size", page_size.unwrap_or_default()),
                ])
                .raw(),
            ),
        };

        let (items, source) = self.cache.cached_list(&key, || {
            let rows = match &scope {
                TicketScope::Owned(params) => self.store.list_tickets(params),
                TicketScope::All(params) => self.store.list_all_tickets(params),
            };
            rows.map_err(ApiError::internal)
        })?;
        Ok(Listing { items, source })
    }

    pub fn update_ticket(
        &self,
        authorization: Option<&str>,
        ticket_id: i64,
        req: &UpdateTicketRequest,
    ) -> Result<Ticket, ApiError> {
        let identity = self.authenticate(authorization)?;
        policy::require_permission(&identity, TICKETS_PUT)?;

        let status = parse_status(&req.status)?;
        let ticket_id = require_id("ticket_id", ticket_id)?;
        coordinator::update_ticket(&self.store, ticket_id, status, req.assigned_to.as_deref())
    }

    pub fn delete_ticket(&self, ticket_id: i64) -> Result<(), ApiError> {
        let ticket_id = require_id("ticket_id", ticket_id)?;
        coordinator::delete_ticket(&self.store, ticket_id)
    }

    // ---- comments ----

    pub fn create_comment(
        &self,
        ticket_id: i64,
        req: &CreateCommentRequest,
    ) -> Result<Comment, ApiError> {
        let comment_text = required("comment_text", &req.comment_text)?;
        let user_commented = required("user_commented", &req.user_commented)?;
        let ticket_id = require_id("ticket_id", ticket_id)?;

        coordinator::create_comment(
            &self.store,
            &CreateCommentParams {
                ticket_id,
                comment_text: comment_text.to_string(),
                user_commented: user_commented.to_string(),
            },
        )
    }

    pub fn list_comments(&self, ticket_id: i64, query: &Query) -> Result<Vec<Comment>, ApiError> {
        let page = pagination::parse(
            query.get("page_id"),
            query.get("page_size"),
            PageBounds::LISTING,
        )?;
        let ticket_id = require_id("ticket_id", ticket_id)?;

        coordinator::list_comments(
            &self.store,
            &ListCommentsParams {
                ticket_id,
                limit: page.limit,
                offset: page.offset,
            },
        )
    }

    pub fn update_comment(
        &self,
        ticket_id: i64,
        comment_id: i64,
        req: &UpdateCommentRequest,
    ) -> Result<Comment, ApiError> {
        let comment_text = required("comment_text", &req.comment_text)?;
        let ticket_id = require_id("ticket_id", ticket_id)?;
        let comment_id = require_id("comment_id", comment_id)?;
        coordinator::update_comment(&self.store, ticket_id, comment_id, comment_text)
    }

    pub fn delete_comment(&self, ticket_id: i64, comment_id: i64) -> Result<(), ApiError> {
        let ticket_id = require_id("ticket_id", ticket_id)?;
        let comment_id = require_id("comment_id", comment_id)?;
        coordinator::delete_comment(&self.store, ticket_id, comment_id)
    }

    // ---- categories ----

    pub fn create_category(
        &self,
        authorization: Option<&str>,
        req: &CreateCategoryRequest,
    ) -> Result<Category, ApiError> {
        let identity = self.authenticate(authorization)?;
        policy::require_permission(&identity, CATEGORIES_POST)?;

        let name = required("name", &req.name)?;
        let category = self
            .store
            .create_category(name)
            .map_err(ApiError::internal)?;
        info!(category_id = category.category_id, "category created");
        Ok(category)
    }

    pub fn list_categories(&self, query: &Query) -> Result<Listing<Category>, ApiError> {
        let page_id = query.get("page_id");
        let page_size = query.get("page_size");
        let page = pagination::parse(page_id, page_size, PageBounds::CATEGORY)?;

        let key = cache_key(
            CATEGORIES_PATH,
            Query::from_pairs(&[
                ("page_id", page_id.unwrap_or_default()),
                ("page_size", page_size.unwrap_or_default()),
            ])
            .raw(),
        );
        let (items, source) = self.cache.cached_list(&key, || {
            self.store
                .list_categories(&ListCategoriesParams {
                    limit: page.limit,
                    offset: page.offset,
                })
                .map_err(ApiError::internal)
        })?;
        Ok(Listing { items, source })
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::Validation(format!("{} is required", field)))
    } else {
        Ok(value)
    }
}

fn require_id(field: &str, id: i64) -> Result<i64, ApiError> {
    if id < 1 {
        Err(ApiError::Validation(format!("{} must be at least 1", field)))
    } else {
        Ok(id)
    }
}

fn parse_status(raw: &str) -> Result<TicketStatus, ApiError> {
    raw.parse::<TicketStatus>().map_err(ApiError::Validation)
}

/// Accepts the usual spellings: 1/0, t/f, true/false in lower, upper or title case.
fn parse_flag(field: &str, raw: &str) -> Result<bool, ApiError> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ApiError::Validation(format!(
            "{} must be a boolean, got '{}'",
            field, raw
        ))),
    }
}

fn declared(query: &Query) -> Result<Declared, ApiError> {
    let is_admin = query
        .non_empty("is_admin")
        .ok_or_else(|| ApiError::Validation("is_admin is required".to_string()))?;
    let requester = query
        .non_empty("requester")
        .ok_or_else(|| ApiError::Validation("requester is required".to_string()))?;
    Ok(Declared {
        is_admin: parse_flag("is_admin", is_admin)?,
        requester: requester.to_string(),
    })
}

/// `category_id` filter; absent, empty and `0` all mean "no filter".
fn optional_category(query: &Query) -> Result<Option<i64>, ApiError> {
    match query.non_empty("category_id") {
        None => Ok(None),
        Some(raw) => {
            let id = raw.parse::<i64>().map_err(|_| {
                ApiError::Validation(format!("category_id must be an integer, got '{}'", raw))
            })?;
            Ok(if id == 0 { None } else { Some(id) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialIssuer;
    use crate::cache::{MemoryCache, SqliteCache};
    use crate::db::Database;
    use crate::policy::{ADMIN_ONLY, NOT_OWNER};
    use crate::testing::RecordingStore;
    use chrono::Duration;
    use proptest::prelude::*;

    const SECRET: &[u8] = b"desk-test-secret";

    fn desk() -> Desk<RecordingStore, MemoryCache> {
        Desk::new(
            RecordingStore::new(),
            QueryCache::new(MemoryCache::new()),
            CredentialVerifier::new(SECRET),
        )
    }

    fn bearer(perms: &[&str]) -> String {
        let perms: Vec<String> = perms.iter().map(|p| p.to_string()).collect();
        let token = CredentialIssuer::new(SECRET)
            .issue(Some("agent"), &perms, Duration::minutes(5))
            .unwrap();
        format!("Bearer {}", token)
    }

    fn listing_query(page_id: &str, page_size: &str, is_admin: &str, requester: &str) -> Query {
        Query::from_pairs(&[
            ("page_id", page_id),
            ("page_size", page_size),
            ("is_admin", is_admin),
            ("requester", requester),
        ])
    }

    fn flags(is_admin: &str, requester: &str) -> Query {
        Query::from_pairs(&[("is_admin", is_admin), ("requester", requester)])
    }

    // ==================== Unit Tests ====================

    #[test]
    fn test_query_parse() {
        let q = Query::parse("?page_id=1&page_size=5&flag&requester=");
        assert_eq!(q.raw(), "page_id=1&page_size=5&flag&requester=");
        assert_eq!(q.get("page_id"), Some("1"));
        assert_eq!(q.get("flag"), Some(""));
        assert_eq!(q.get("requester"), Some(""));
        assert_eq!(q.get("missing"), None);
    }

    #[test]
    fn test_parse_flag_spellings() {
        assert_eq!(parse_flag("is_admin", "TRUE"), Ok(true));
        assert_eq!(parse_flag("is_admin", "0"), Ok(false));
        assert!(parse_flag("is_admin", "yes").is_err());
    }

    #[test]
    fn test_empty_listing_for_requester() {
        let desk = desk();
        let listing = desk
            .list_tickets(Some(&bearer(&[])), &listing_query("1", "10", "false", "alice"))
            .unwrap();
        assert!(listing.items.is_empty());
        assert_eq!(listing.source, Source::Store);
    }

    #[test]
    fn test_page_zero_rejected_before_store_or_cache() {
        let desk = desk();
        for is_admin in ["true", "false"] {
            let err = desk
                .list_tickets(Some(&bearer(&[])), &listing_query("0", "10", is_admin, "alice"))
                .unwrap_err();
            assert_eq!(err.status(), 400);
        }
        let err = desk
            .list_categories(&Query::from_pairs(&[("page_id", "0"), ("page_size", "10")]))
            .unwrap_err();
        assert_eq!(err.status(), 400);
        let err = desk.list_comments(1, &Query::parse("page_id=0&page_size=5")).unwrap_err();
        assert_eq!(err.status(), 400);

        assert!(desk.store().calls().is_empty());
        assert!(desk.cache.service().is_empty());
    }

    #[test]
    fn test_list_tickets_requires_credential() {
        let desk = desk();
        let err = desk
            .list_tickets(None, &listing_query("1", "10", "false", "alice"))
            .unwrap_err();
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), "authorization header is not provided");

        let err = desk
            .list_tickets(Some("Token abc"), &listing_query("1", "10", "false", "alice"))
            .unwrap_err();
        assert_eq!(err.status(), 401);
    }

    #[test]
    fn test_non_admin_sees_only_own_tickets() {
        let desk = desk();
        desk.store().seed_ticket("alice");
        desk.store().seed_ticket("bob");
        desk.store().seed_ticket("alice");

        let query = Query::from_pairs(&[
            ("page_id", "1"),
            ("page_size", "10"),
            ("is_admin", "false"),
            ("requester", "alice"),
            ("user_assigned", "bob"),
        ]);
        let listing = desk.list_tickets(Some(&bearer(&[])), &query).unwrap();
        assert_eq!(listing.items.len(), 2);
        assert!(listing.items.iter().all(|t| t.user_assigned == "alice"));
    }

    #[test]
    fn test_admin_listing_with_filter_precedence() {
        let desk = desk();
        let bobs = desk.store().seed_ticket("bob");
        desk.store().seed_ticket("carol");

        let query = Query::from_pairs(&[
            ("page_id", "1"),
            ("page_size", "5"),
            ("is_admin", "true"),
            ("requester", "root"),
            ("user_assigned", "bob"),
            ("category_id", "999"),
        ]);
        let listing = desk.list_tickets(Some(&bearer(&[])), &query).unwrap();
        assert_eq!(listing.items, vec![bobs]);

        let everything = desk
            .list_tickets(Some(&bearer(&[])), &listing_query("1", "5", "true", "root"))
            .unwrap();
        assert_eq!(everything.items.len(), 2);
    }

    #[test]
    fn test_repeated_listing_served_from_cache_identically() {
        let desk = desk();
        desk.store().seed_ticket("alice");
        let auth = bearer(&[]);
        let query = listing_query("1", "10", "false", "alice");

        let first = desk.list_tickets(Some(&auth), &query).unwrap();
        desk.store().reset_calls();
        let second = desk.list_tickets(Some(&auth), &query).unwrap();

        assert_eq!(second.source, Source::Cache);
        assert!(desk.store().calls().is_empty());
        assert_eq!(
            serde_json::to_string(&first.items).unwrap(),
            serde_json::to_string(&second.items).unwrap()
        );
    }

    #[test]
    fn test_cached_listing_is_stale_after_write() {
        let desk = desk();
        let auth = bearer(&[]);
        let query = listing_query("1", "10", "false", "alice");

        assert!(desk.list_tickets(Some(&auth), &query).unwrap().items.is_empty());
        desk.store().seed_ticket("alice");
        let again = desk.list_tickets(Some(&auth), &query).unwrap();
        assert!(again.items.is_empty());
        assert_eq!(again.source, Source::Cache);
    }

    #[test]
    fn test_requesters_do_not_share_cached_pages() {
        let desk = desk();
        desk.store().seed_ticket("alice");
        let auth = bearer(&[]);

        desk.list_tickets(Some(&auth), &listing_query("1", "10", "false", "alice"))
            .unwrap();
        let bobs = desk
            .list_tickets(Some(&auth), &listing_query("1", "10", "false", "bob"))
            .unwrap();
        assert!(bobs.items.is_empty());
        assert_eq!(bobs.source, Source::Store);
    }

    #[test]
    fn test_admin_parameter_order_is_a_distinct_key() {
        let desk = desk();
        let auth = bearer(&[]);
        desk.list_tickets(Some(&auth), &listing_query("1", "5", "true", "root"))
            .unwrap();
        let reordered = Query::from_pairs(&[
            ("page_size", "5"),
            ("page_id", "1"),
            ("is_admin", "true"),
            ("requester", "root"),
        ]);
        let listing = desk.list_tickets(Some(&auth), &reordered).unwrap();
        assert_eq!(listing.source, Source::Store);
    }

    #[test]
    fn test_get_ticket_ownership() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");

        let own = desk.get_ticket(ticket.ticket_id, &flags("false", "alice")).unwrap();
        assert_eq!(own, ticket);

        let admin = desk.get_ticket(ticket.ticket_id, &flags("true", "root")).unwrap();
        assert_eq!(admin, ticket);

        let err = desk
            .get_ticket(ticket.ticket_id, &flags("false", "bob"))
            .unwrap_err();
        assert_eq!(err, ApiError::Unauthorized(NOT_OWNER.to_string()));
    }

    #[test]
    fn test_get_missing_ticket() {
        let desk = desk();
        let err = desk.get_ticket(404, &flags("false", "bob")).unwrap_err();
        assert_eq!(err, ApiError::Unauthorized(NOT_OWNER.to_string()));

        let err = desk.get_ticket(404, &flags("true", "root")).unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_get_ticket_requires_flags() {
        let desk = desk();
        let err = desk.get_ticket(1, &Query::parse("requester=alice")).unwrap_err();
        assert_eq!(err.status(), 400);
        let err = desk.get_ticket(1, &Query::parse("is_admin=maybe&requester=alice")).unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_update_ticket_without_permission() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        desk.store().reset_calls();

        let req = UpdateTicketRequest {
            status: "closed".to_string(),
            assigned_to: None,
        };
        let err = desk
            .update_ticket(Some(&bearer(&["tickets.POST"])), ticket.ticket_id, &req)
            .unwrap_err();
        assert_eq!(err.status(), 401);
        assert_eq!(err.message(), ADMIN_ONLY);
        assert!(desk.store().calls().is_empty());
    }

    #[test]
    fn test_update_ticket_with_permission() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        let req = UpdateTicketRequest {
            status: "inprogress".to_string(),
            assigned_to: Some("dave".to_string()),
        };
        let updated = desk
            .update_ticket(Some(&bearer(&[TICKETS_PUT])), ticket.ticket_id, &req)
            .unwrap();
        assert_eq!(updated.status, TicketStatus::InProgress);
        assert_eq!(updated.assigned_to.as_deref(), Some("dave"));

        let err = desk
            .update_ticket(Some(&bearer(&[TICKETS_PUT])), 999, &req)
            .unwrap_err();
        assert_eq!(err.status(), 404);

        let bad = UpdateTicketRequest {
            status: "done".to_string(),
            assigned_to: None,
        };
        let err = desk
            .update_ticket(Some(&bearer(&[TICKETS_PUT])), ticket.ticket_id, &bad)
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_update_comment_for_missing_ticket() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        let comment = desk.store().seed_comment(ticket.ticket_id, "hi");
        desk.store().reset_calls();

        let err = desk
            .update_comment(
                ticket.ticket_id + 100,
                comment.comment_id,
                &UpdateCommentRequest {
                    comment_text: "edited".to_string(),
                },
            )
            .unwrap_err();
        assert_eq!(err.status(), 404);
        assert!(!desk.store().mutated());
    }

    #[test]
    fn test_update_comment_refreshes_ticket() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        let comment = desk.store().seed_comment(ticket.ticket_id, "hi");

        let updated = desk
            .update_comment(
                ticket.ticket_id,
                comment.comment_id,
                &UpdateCommentRequest {
                    comment_text: "edited".to_string(),
                },
            )
            .unwrap();
        assert_eq!(updated.comment_text, "edited");
        let after = desk.store().db().get_ticket(ticket.ticket_id).unwrap();
        assert!(after.updated_at > ticket.updated_at);
    }

    #[test]
    fn test_empty_comment_text_rejected() {
        let desk = desk();
        let err = desk
            .update_comment(1, 1, &UpdateCommentRequest {
                comment_text: " ".to_string(),
            })
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(desk.store().calls().is_empty());
    }

    #[test]
    fn test_comment_lifecycle() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        let created = desk
            .create_comment(
                ticket.ticket_id,
                &CreateCommentRequest {
                    comment_text: "looking".to_string(),
                    user_commented: "agent".to_string(),
                },
            )
            .unwrap();

        let page = Query::parse("page_id=1&page_size=5");
        assert_eq!(desk.list_comments(ticket.ticket_id, &page).unwrap(), vec![created.clone()]);

        desk.delete_comment(ticket.ticket_id, created.comment_id).unwrap();
        assert!(desk.list_comments(ticket.ticket_id, &page).unwrap().is_empty());

        assert_eq!(desk.list_comments(999, &page).unwrap_err().status(), 404);
    }

    #[test]
    fn test_create_ticket_validation_and_category_precondition() {
        let desk = desk();
        let mut req = CreateTicketRequest {
            title: "VPN down".to_string(),
            description: "since noon".to_string(),
            status: "open".to_string(),
            user_assigned: "alice".to_string(),
            category_id: 1,
        };
        assert_eq!(desk.create_ticket(&req).unwrap_err().status(), 404);

        let category = desk.store().db().create_category("network").unwrap();
        req.category_id = category.category_id;
        let ticket = desk.create_ticket(&req).unwrap();
        assert_eq!(ticket.user_assigned, "alice");

        req.status = "pending".to_string();
        assert_eq!(desk.create_ticket(&req).unwrap_err().status(), 400);

        req.status = "open".to_string();
        req.title = String::new();
        assert_eq!(desk.create_ticket(&req).unwrap_err().status(), 400);
    }

    #[test]
    fn test_delete_ticket() {
        let desk = desk();
        let ticket = desk.store().seed_ticket("alice");
        desk.delete_ticket(ticket.ticket_id).unwrap();
        assert_eq!(desk.delete_ticket(ticket.ticket_id).unwrap_err().status(), 404);
        assert_eq!(desk.delete_ticket(0).unwrap_err().status(), 400);
    }

    #[test]
    fn test_categories() {
        let desk = desk();
        let req = CreateCategoryRequest {
            name: "billing".to_string(),
        };

        let err = desk.create_category(Some(&bearer(&[])), &req).unwrap_err();
        assert_eq!(err.message(), ADMIN_ONLY);

        let created = desk
            .create_category(Some(&bearer(&[CATEGORIES_POST])), &req)
            .unwrap();
        assert_eq!(created.name, "billing");

        let page = Query::parse("page_id=1&page_size=50");
        let listing = desk.list_categories(&page).unwrap();
        assert_eq!(listing.items, vec![created]);
        assert_eq!(desk.list_categories(&page).unwrap().source, Source::Cache);
    }

    #[test]
    fn test_listing_cache_outlives_the_desk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.db");
        let open = || {
            Desk::new(
                Database::open(&path).unwrap(),
                QueryCache::new(SqliteCache::open(&path).unwrap()),
                CredentialVerifier::new(SECRET),
            )
        };
        let auth = bearer(&[CATEGORIES_POST]);
        let page = Query::parse("page_id=1&page_size=5");
        let category = |name: &str| CreateCategoryRequest {
            name: name.to_string(),
        };

        let first = open();
        first.create_category(Some(&auth), &category("net")).unwrap();
        let listed = first.list_categories(&page).unwrap();
        assert_eq!(listed.source, Source::Store);
        drop(first);

        let second = open();
        second.create_category(Some(&auth), &category("later")).unwrap();
        let again = second.list_categories(&page).unwrap();
        assert_eq!(again.source, Source::Cache);
        assert_eq!(again.items, listed.items);
        assert_eq!(again.items.len(), 1);
        assert_eq!(again.items[0].name, "net");
    }

    // ==================== Property-Based Tests ====================

    proptest! {
        #[test]
        fn prop_out_of_range_page_size_rejected(size in prop_oneof![0i64..5, 11i64..1000]) {
            let desk = desk();
            let size = size.to_string();
            let err = desk
                .list_tickets(Some(&bearer(&[])), &listing_query("1", &size, "false", "alice"))
                .unwrap_err();
            prop_assert_eq!(err.status(), 400);
            prop_assert!(desk.store().calls().is_empty());
        }

        #[test]
        fn prop_foreign_ticket_read_is_unauthorized(requester in "[a-z]{1,8}") {
            prop_assume!(requester != "alice");
            let desk = desk();
            let ticket = desk.store().seed_ticket("alice");
            let err = desk.get_ticket(ticket.ticket_id, &flags("false", &requester)).unwrap_err();
            prop_assert_eq!(err.status(), 401);
        }
    }
}
