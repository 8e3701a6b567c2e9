#![no_main]

//! Fuzz target for page parameter parsing.
//!
//! Any accepted page must satisfy the bounds it was checked against and its
//! offset must be exactly `(page_id - 1) * page_size` with no overflow.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ticketdesk::desk::Query;
use ticketdesk::pagination::{self, PageBounds};

#[derive(Arbitrary, Debug)]
struct PageInput {
    raw_query: String,
    page_id: i64,
    page_size: i64,
    category: bool,
}

fuzz_target!(|input: PageInput| {
    let bounds = if input.category {
        PageBounds::CATEGORY
    } else {
        PageBounds::LISTING
    };

    if let Ok(page) = pagination::normalize(input.page_id, input.page_size, bounds) {
        assert!(page.limit >= bounds.min_size);
        if let Some(max) = bounds.max_size {
            assert!(page.limit <= max);
        }
        assert_eq!(page.offset, (input.page_id - 1) * input.page_size);
    }

    let query = Query::parse(&input.raw_query);
    let _ = pagination::parse(query.get("page_id"), query.get("page_size"), bounds);
});
