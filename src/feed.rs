//! Feed query construction.
//!
//! Turns the list endpoint's query string into a [`FeedQuery`]: a conjunction
//! of [`Predicate`]s, a [`SortKey`] and a page window. Building is pure; the
//! caller supplies the clock and the viewer. [`FeedQuery::where_sql`] and
//! [`SortKey::order_sql`] compile the query for the `posts p` table alias.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::db::models::timestamp;

/// Raw query parameters. Every field is optional and malformed values fall
/// back to defaults instead of failing the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    pub take: Option<String>,
    pub skip: Option<String>,
    pub sort: Option<String>,
    pub period: Option<String>,
    pub category: Option<String>,
    pub q: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    All,
    ThreeDays,
    SevenDays,
    ThirtyDays,
    OneYear,
    ThreeYears,
}

impl Period {
    /// Unknown values mean no time restriction.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "3days" => Period::ThreeDays,
            "7days" => Period::SevenDays,
            "30days" => Period::ThirtyDays,
            "1year" => Period::OneYear,
            "3years" => Period::ThreeYears,
            _ => Period::All,
        }
    }

    pub fn days(&self) -> Option<i64> {
        match self {
            Period::All => None,
            Period::ThreeDays => Some(3),
            Period::SevenDays => Some(7),
            Period::ThirtyDays => Some(30),
            Period::OneYear => Some(365),
            Period::ThreeYears => Some(365 * 3),
        }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days().map(|days| now - Duration::days(days))
    }
}

/// Feed ordering. Equal keys keep the store's natural row order, which is
/// not deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Latest,
    Views,
    Reactions,
}

impl SortKey {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "views" => SortKey::Views,
            "reactions" => SortKey::Reactions,
            _ => SortKey::Latest,
        }
    }

    /// Expects the `reaction_count` column alias from the feed select.
    pub fn order_sql(&self) -> &'static str {
        match self {
            SortKey::Latest => "p.created_at DESC",
            SortKey::Views => "p.view_count DESC",
            SortKey::Reactions => "reaction_count DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Description,
    Tags,
    Categories,
}

impl Field {
    fn column(&self) -> &'static str {
        match self {
            Field::Title => "p.title",
            Field::Description => "p.description",
            Field::Tags => "p.tags",
            Field::Categories => "p.categories",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Case-sensitive substring match.
    Contains { field: Field, needle: String },
    CreatedSince(DateTime<Utc>),
    BookmarkedBy(String),
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

impl Predicate {
    pub fn contains(field: Field, needle: &str) -> Self {
        Predicate::Contains {
            field,
            needle: needle.to_string(),
        }
    }

    /// Compile to SQL, appending bind values to `params`. Placeholders are
    /// numbered by their position in `params`.
    pub fn to_sql(&self, params: &mut Vec<Value>) -> String {
        match self {
            Predicate::Contains { field, needle } => {
                params.push(Value::Text(needle.clone()));
                // instr() is case-sensitive; LIKE would fold ASCII case
                format!("instr({}, ?{}) > 0", field.column(), params.len())
            }
            Predicate::CreatedSince(cutoff) => {
                params.push(Value::Text(timestamp(*cutoff)));
                format!("p.created_at >= ?{}", params.len())
            }
            Predicate::BookmarkedBy(user_id) => {
                params.push(Value::Text(user_id.clone()));
                format!(
                    "EXISTS (SELECT 1 FROM bookmarks bf WHERE bf.post_id = p.id AND bf.user_id = ?{})",
                    params.len()
                )
            }
            Predicate::Any(parts) => join_sql(parts, " OR ", "0", params),
            Predicate::All(parts) => join_sql(parts, " AND ", "1", params),
        }
    }
}

fn join_sql(parts: &[Predicate], sep: &str, empty: &str, params: &mut Vec<Value>) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let compiled: Vec<String> = parts.iter().map(|p| p.to_sql(params)).collect();
    format!("({})", compiled.join(sep))
}

/// `q` split into free text and `@tag` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchTerms {
    pub text: String,
    pub tags: Vec<String>,
}

/// Pull every `@token` (an `@` followed by non-whitespace) out of `q`.
/// A bare `@` is kept as text.
pub fn parse_search(q: &str) -> SearchTerms {
    let mut text = String::with_capacity(q.len());
    let mut tags = Vec::new();
    let mut chars = q.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '@' {
            text.push(c);
            continue;
        }

        let start = i + c.len_utf8();
        let mut end = start;
        while let Some(&(j, next)) = chars.peek() {
            if next.is_whitespace() {
                break;
            }
            end = j + next.len_utf8();
            chars.next();
        }

        if end > start {
            tags.push(q[start..end].to_string());
        } else {
            text.push(c);
        }
    }

    SearchTerms {
        text: text.trim().to_string(),
        tags,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedQuery {
    /// Conjuncts; an empty list matches every post.
    pub filters: Vec<Predicate>,
    pub sort: SortKey,
    pub skip: u32,
    pub take: u32,
}

impl FeedQuery {
    pub fn build(
        params: &FeedParams,
        viewer: Option<&str>,
        now: DateTime<Utc>,
        limits: &FeedConfig,
    ) -> Self {
        let mut filters = Vec::new();

        let search = parse_search(params.q.as_deref().unwrap_or(""));

        let text_match = (!search.text.is_empty()).then(|| {
            Predicate::Any(vec![
                Predicate::contains(Field::Title, &search.text),
                Predicate::contains(Field::Description, &search.text),
                Predicate::contains(Field::Tags, &search.text),
            ])
        });

        let mut categories = search.tags;
        if let Some(category) = params.category.as_deref().map(str::trim) {
            if !category.is_empty() && category != "all" {
                categories.push(category.to_string());
            }
        }
        let mut seen = HashSet::new();
        categories.retain(|c| seen.insert(c.clone()));

        let category_match = (!categories.is_empty()).then(|| {
            Predicate::Any(
                categories
                    .iter()
                    .map(|c| Predicate::contains(Field::Categories, c))
                    .collect(),
            )
        });

        match (text_match, category_match) {
            (Some(text), Some(category)) => filters.push(Predicate::All(vec![text, category])),
            (Some(only), None) | (None, Some(only)) => filters.push(only),
            (None, None) => {}
        }

        let period = Period::parse(params.period.as_deref().unwrap_or("all"));
        if let Some(cutoff) = period.cutoff(now) {
            filters.push(Predicate::CreatedSince(cutoff));
        }

        // Anonymous callers asking for bookmarks get the unfiltered feed.
        if params.filter.as_deref() == Some("bookmarked") {
            if let Some(user_id) = viewer {
                filters.push(Predicate::BookmarkedBy(user_id.to_string()));
            }
        }

        let sort = SortKey::parse(params.sort.as_deref().unwrap_or("latest"));

        let take = parse_number(params.take.as_deref())
            .filter(|&n| n > 0)
            .unwrap_or(limits.default_page_size)
            .min(limits.max_page_size.max(1));
        let skip = parse_number(params.skip.as_deref()).unwrap_or(0);

        FeedQuery {
            filters,
            sort,
            skip,
            take,
        }
    }

    /// Restrict an already built query to one user's bookmarks.
    pub fn bookmarked_by(mut self, user_id: &str) -> Self {
        let predicate = Predicate::BookmarkedBy(user_id.to_string());
        if !self.filters.contains(&predicate) {
            self.filters.push(predicate);
        }
        self
    }

    pub fn where_sql(&self, params: &mut Vec<Value>) -> String {
        if self.filters.is_empty() {
            return "1".to_string();
        }
        self.filters
            .iter()
            .map(|p| p.to_sql(params))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn parse_number(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
}
