use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must be an integer, got '{value}'")]
    NotAnInteger { field: &'static str, value: String },
    #[error("{field} must be at least {min}")]
    BelowMinimum { field: &'static str, min: i64 },
    #[error("{field} must be at most {max}")]
    AboveMaximum { field: &'static str, max: i64 },
}

/// Inclusive page-size bounds for a listing route. Page ids always start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBounds {
    pub min_size: i64,
    pub max_size: Option<i64>,
}

impl PageBounds {
    /// Ticket and comment listings.
    pub const LISTING: PageBounds = PageBounds {
        min_size: 5,
        max_size: Some(10),
    };
    /// Category listing.
    pub const CATEGORY: PageBounds = PageBounds {
        min_size: 1,
        max_size: None,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

pub fn normalize(page_id: i64, page_size: i64, bounds: PageBounds) -> Result<Page, PageError> {
    if page_id < 1 {
        return Err(PageError::BelowMinimum {
            field: "page_id",
            min: 1,
        });
    }
    if page_size < bounds.min_size {
        return Err(PageError::BelowMinimum {
            field: "page_size",
            min: bounds.min_size,
        });
    }
    if let Some(max) = bounds.max_size {
        if page_size > max {
            return Err(PageError::AboveMaximum {
                field: "page_size",
                max,
            });
        }
    }

    let offset = page_size
        .checked_mul(page_id - 1)
        .ok_or(PageError::AboveMaximum {
            field: "page_id",
            max: i64::MAX / page_size,
        })?;

    Ok(Page {
        limit: page_size,
        offset,
    })
}

/// Parse raw query values, then [`normalize`].
pub fn parse(
    page_id: Option<&str>,
    page_size: Option<&str>,
    bounds: PageBounds,
) -> Result<Page, PageError> {
    let page_id = parse_field("page_id", page_id)?;
    let page_size = parse_field("page_size", page_size)?;
    normalize(page_id, page_size, bounds)
}

fn parse_field(field: &'static str, raw: Option<&str>) -> Result<i64, PageError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(PageError::Missing(field))?;
    raw.parse::<i64>().map_err(|_| PageError::NotAnInteger {
        field,
        value: raw.to_string(),
    })
}
