//! Page slicing and the compact page-number strip shown under listings.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: usize,
}

/// Slice an already sorted list into fixed-size pages.
///
/// Pages are 1-based. An empty list has zero pages. A page past the end,
/// `page == 0` or `page_size == 0` yields no items instead of an error.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, current_page: usize) -> Page<T> {
    if page_size == 0 {
        return Page { items: Vec::new(), total_pages: 0 };
    }
    let total_pages = items.len().div_ceil(page_size);
    if current_page == 0 {
        return Page { items: Vec::new(), total_pages };
    }
    let start = (current_page - 1).saturating_mul(page_size).min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    Page { items: items[start..end].to_vec(), total_pages }
}

/// One slot of a compact pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageMarker {
    Page { number: usize },
    Ellipsis,
}

/// First page, last page and the neighbours of the current page, with every
/// gap between them collapsed into a single ellipsis.
pub fn visible_page_numbers(current_page: usize, total_pages: usize) -> Vec<PageMarker> {
    let mut out = Vec::new();
    let mut last_shown = 0usize;
    for page in 1..=total_pages {
        let near_current = page.abs_diff(current_page) <= 1;
        if page == 1 || page == total_pages || near_current {
            if last_shown != 0 && page > last_shown + 1 {
                out.push(PageMarker::Ellipsis);
            }
            out.push(PageMarker::Page { number: page });
            last_shown = page;
        }
    }
    out
}
