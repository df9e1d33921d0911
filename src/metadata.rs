//! Page metadata ingestion: one GET of the submitted URL, then Open Graph
//! and `<meta>` extraction with CSS selectors.

use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub og_image: String,
    pub tags: Vec<String>,
}

impl PageMetadata {
    /// What a post gets when the page could not be fetched.
    pub fn fallback(url: &str) -> Self {
        Self {
            title: url.to_string(),
            description: String::new(),
            og_image: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Fetch and extract. Never fails: any error is logged and the raw URL
/// becomes the title.
pub async fn ingest(client: &reqwest::Client, url: &str) -> PageMetadata {
    match fetch_html(client, url).await {
        Ok(html) => extract_metadata(&html, url),
        Err(e) => {
            tracing::warn!(url, error = %e, "Metadata fetch failed, using URL as title");
            PageMetadata::fallback(url)
        }
    }
}

/// GET the page body. Non-2xx responses are returned like any other page.
pub async fn fetch_html(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let response = client.get(url).send().await?;
    Ok(response.text().await?)
}

pub fn extract_metadata(html: &str, url: &str) -> PageMetadata {
    let document = Html::parse_document(html);

    let title = meta_content(&document, r#"meta[property="og:title"]"#)
        .or_else(|| first_text(&document, "title"))
        .unwrap_or_else(|| url.to_string());

    let description = meta_content(&document, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(&document, r#"meta[name="description"]"#))
        .unwrap_or_default();

    let og_image = meta_content(&document, r#"meta[property="og:image"]"#).unwrap_or_default();

    PageMetadata {
        title,
        description,
        og_image,
        tags: host_tag(url).into_iter().collect(),
    }
}

/// Hostname with a leading `www.` removed.
pub fn host_tag(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Whitespace-collapsed text of `<body>`, without script/style contents,
/// cut to `max_chars` characters.
pub fn visible_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);
    let Some(body) = Selector::parse("body")
        .ok()
        .and_then(|sel| document.select(&sel).next())
    else {
        return String::new();
    };

    let mut raw = String::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|el| {
                matches!(el.name(), "script" | "style" | "noscript" | "template")
            })
        });
        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

/// Non-empty `content` attribute of the first match.
fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    document
        .select(&sel)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join("").trim().to_string()
}
