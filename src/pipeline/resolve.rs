//! Locate the current-period spreadsheet link on the prefectural page.
//!
//! The page offers no ids to anchor on: each region's downloads sit in their
//! own `div`, with a link whose thumbnail `img` carries the region in its
//! `alt` text. A block qualifies when its first link targets a spreadsheet
//! and its first image caption contains the locality token. When several
//! qualify the last one wins, because corrected files are appended below
//! the originals.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::fetch::Fetcher;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

static DIV: Lazy<Selector> = Lazy::new(|| Selector::parse("div").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static IMAGE: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Fetch the outpatient page and return the spreadsheet URL, or `None` when
/// the period's file has not been published.
pub async fn resolve(fetcher: &Fetcher, config: &IngestConfig) -> Result<Option<String>, IngestError> {
    let html = fetcher
        .html(&config.outpatients_page_url, &config.html_encoding)
        .await?;
    let url = find_spreadsheet_link(
        &html,
        &config.origin,
        &config.spreadsheet_extension,
        &config.caption_token,
    );
    match &url {
        Some(u) => info!("Spreadsheet link: {}", u),
        None => warn!(
            "No '{}' link captioned '{}' on {}",
            config.spreadsheet_extension, config.caption_token, config.outpatients_page_url
        ),
    }
    Ok(url)
}

/// Pure scan of an HTML document; see the module docs for the rules.
pub fn find_spreadsheet_link(
    html: &str,
    origin: &str,
    extension: &str,
    caption_token: &str,
) -> Option<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(origin).ok()?;

    let mut found = None;
    for block in document.select(&DIV) {
        let Some(href) = block
            .select(&LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::trim)
        else {
            continue;
        };
        if !link_path(href).ends_with(extension) {
            continue;
        }
        let captioned = block
            .select(&IMAGE)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .is_some_and(|alt| alt.contains(caption_token));
        if !captioned {
            continue;
        }
        match base.join(href) {
            Ok(resolved) => {
                debug!("Candidate spreadsheet link: {}", resolved);
                found = Some(resolved.to_string());
            }
            Err(e) => debug!("Unresolvable link '{}': {}", href, e),
        }
    }
    found
}

/// The part of an href before any query or fragment.
fn link_path(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}
