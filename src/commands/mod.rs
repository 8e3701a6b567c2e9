pub mod categories;
pub mod comments;
pub mod tickets;
pub mod token;

use anyhow::Result;
use serde::Serialize;

use ticketdesk::desk::Query;

/// Write a value to stdout as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Build a query string from the optional flags that were actually given.
pub fn query_from(pairs: &[(&str, Option<&str>)]) -> Query {
    let present: Vec<(&str, &str)> = pairs
        .iter()
        .filter_map(|(k, v)| v.map(|v| (*k, v)))
        .collect();
    Query::from_pairs(&present)
}
