//! Forum listing: category filter, title search, pinned-first sorting.
//!
//! Operates on posts that are already loaded; nothing here touches the
//! repository.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::models::{Category, PostView};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Newest,
    Popular,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    /// `"all"`, empty or unknown ids select every category.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => CategoryFilter::All,
            Some(id) => id.parse().map(CategoryFilter::Only).unwrap_or(CategoryFilter::All),
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(c) => Some(*c),
        }
    }

    pub fn matches(&self, post: &PostView) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => post.category.id == *c,
        }
    }
}

/// Raw query string of `GET /posts`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingParams {
    /// Category id or `all`
    pub category: Option<String>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
    pub sort: Option<SortMode>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ListingFilter {
    pub category: CategoryFilter,
    pub search: String,
    pub sort: SortMode,
}

impl ListingFilter {
    pub fn from_params(params: &ListingParams) -> Self {
        ListingFilter {
            category: CategoryFilter::parse(params.category.as_deref()),
            search: params.search.as_deref().unwrap_or_default().trim().to_string(),
            sort: params.sort.unwrap_or_default(),
        }
    }

    fn keeps(&self, post: &PostView, needle: &str) -> bool {
        self.category.matches(post) && (needle.is_empty() || post.title.to_lowercase().contains(needle))
    }
}

/// Filter, then sort pinned posts first. `Popular` orders by views within
/// each pinned group; `Newest` keeps the caller's order.
pub fn filter_and_sort(posts: Vec<PostView>, filter: &ListingFilter) -> Vec<PostView> {
    let needle = filter.search.to_lowercase();
    let mut kept: Vec<PostView> = posts.into_iter().filter(|p| filter.keeps(p, &needle)).collect();
    // sort_by is stable, equal keys keep input order
    match filter.sort {
        SortMode::Newest => kept.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned)),
        SortMode::Popular => kept.sort_by(|a, b| b.is_pinned.cmp(&a.is_pinned).then(b.views.cmp(&a.views))),
    }
    kept
}

pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 60 => "just now".to_string(),
        s if s < 3_600 => format!("{} minutes ago", s / 60),
        s if s < 86_400 => format!("{} hours ago", s / 3_600),
        s if s < 604_800 => format!("{} days ago", s / 86_400),
        _ if at.year() == now.year() => at.format("%b %-d").to_string(),
        _ => at.format("%b %-d, %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AuthorSummary;
    use chrono::TimeZone;

    fn post(id: &str, title: &str, category: Category, pinned: bool, views: i64) -> PostView {
        PostView {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            category: category.info(),
            author: AuthorSummary { id: "a".into(), username: "ana".into(), avatar_url: None },
            replies: 0,
            views,
            is_pinned: pinned,
            is_locked: false,
            created_at: Utc::now(),
        }
    }

    fn ids(posts: &[PostView]) -> Vec<&str> {
        posts.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn pinned_beats_views_in_popular_mode() {
        let posts = vec![
            post("A", "Visa interview", Category::Visa, false, 10),
            post("B", "Read me first", Category::General, true, 1),
        ];
        let filter = ListingFilter { sort: SortMode::Popular, ..Default::default() };
        assert_eq!(ids(&filter_and_sort(posts, &filter)), vec!["B", "A"]);
    }

    #[test]
    fn newest_keeps_caller_order_within_pinned_groups() {
        let posts = vec![
            post("1", "one", Category::General, false, 5),
            post("2", "two", Category::General, true, 0),
            post("3", "three", Category::General, false, 50),
            post("4", "four", Category::General, true, 9),
        ];
        let out = filter_and_sort(posts, &ListingFilter::default());
        assert_eq!(ids(&out), vec!["2", "4", "1", "3"]);
    }

    #[test]
    fn popular_orders_by_views_descending() {
        let posts = vec![
            post("1", "one", Category::General, false, 5),
            post("2", "two", Category::General, false, 50),
            post("3", "three", Category::General, false, 20),
        ];
        let filter = ListingFilter { sort: SortMode::Popular, ..Default::default() };
        assert_eq!(ids(&filter_and_sort(posts, &filter)), vec!["2", "3", "1"]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let posts = vec![
            post("1", "Best TOEFL prep", Category::Tests, false, 0),
            post("2", "GRE vocabulary", Category::Tests, false, 0),
        ];
        let filter = ListingFilter { search: "toefl".into(), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(posts, &filter)), vec!["1"]);
    }

    #[test]
    fn category_filter_and_all() {
        let posts = vec![
            post("1", "Fulbright deadlines", Category::Scholarships, false, 0),
            post("2", "F-1 appointment", Category::Visa, false, 0),
        ];
        let visa = ListingFilter { category: CategoryFilter::parse(Some("visa")), ..Default::default() };
        assert_eq!(ids(&filter_and_sort(posts.clone(), &visa)), vec!["2"]);
        let all = ListingFilter { category: CategoryFilter::parse(Some("all")), ..Default::default() };
        assert_eq!(filter_and_sort(posts, &all).len(), 2);
    }

    #[test]
    fn unknown_category_selects_everything() {
        assert_eq!(CategoryFilter::parse(Some("cooking")), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(None), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(Some(" tests ")), CategoryFilter::Only(Category::Tests));
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let ago = |secs: i64| format_relative_time(now - chrono::Duration::seconds(secs), now);
        assert_eq!(ago(5), "just now");
        assert_eq!(ago(120), "2 minutes ago");
        assert_eq!(ago(3 * 3_600), "3 hours ago");
        assert_eq!(ago(2 * 86_400), "2 days ago");
        assert_eq!(ago(30 * 86_400), "May 16");
        let last_year = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        assert_eq!(format_relative_time(last_year, now), "Mar 2, 2024");
    }
}
