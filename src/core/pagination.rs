use serde::Serialize;

use crate::core::errors::ApiError;

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: usize,
    pub num_pages: usize,
    pub count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Slice `items` into the requested 1-based page.
///
/// A missing parameter means page 1, `last` means the final page. Anything
/// else that is not a page in range is a 404. An empty list still has one
/// (empty) first page.
pub fn paginate<T>(items: Vec<T>, page: Option<&str>, per_page: usize) -> Result<Page<T>, ApiError> {
    let per_page = per_page.max(1);
    let count = items.len();
    let num_pages = count.div_ceil(per_page).max(1);

    let number = match page.map(str::trim) {
        None | Some("") => 1,
        Some("last") => num_pages,
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ApiError::NotFound("That page number is not an integer".to_string()))?,
    };
    if number < 1 || number > num_pages {
        return Err(ApiError::NotFound("That page contains no results".to_string()));
    }

    let items: Vec<T> = items
        .into_iter()
        .skip((number - 1) * per_page)
        .take(per_page)
        .collect();

    Ok(Page {
        items,
        number,
        num_pages,
        count,
        has_next: number < num_pages,
        has_previous: number > 1,
    })
}
