//! Catalog source: turns a collection name into an ordered list of songs.
//!
//! - [`client`] - Authenticated catalog session (one per run)
//! - [`spotify`] - Web API adapter walking saved tracks and playlists

mod client;
mod spotify;


pub use client::CatalogClient;
pub use spotify::SpotifyCatalog;

use crate::config::LIKED_COLLECTION_NAME;
use crate::error::Result;
use crate::types::SongDescriptor;
use async_trait::async_trait;
use std::future::Future;
use url::Url;

/// Which collection to acquire
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CollectionSelector {
    /// The account's saved ("liked") tracks
    Liked,
    /// A playlist, matched by name case-insensitively
    Named(String),
}

impl CollectionSelector {
    /// Interpret a configured collection name
    ///
    /// `"Liked Songs"` in any casing, or an empty name, selects the saved tracks.
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LIKED_COLLECTION_NAME) {
            CollectionSelector::Liked
        } else {
            CollectionSelector::Named(trimmed.to_string())
        }
    }
}

impl std::fmt::Display for CollectionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectionSelector::Liked => f.write_str(LIKED_COLLECTION_NAME),
            CollectionSelector::Named(name) => f.write_str(name),
        }
    }
}

/// Source of song descriptors
///
/// Failures are fatal for the run and surface as
/// [`Error::CatalogUnavailable`](crate::Error::CatalogUnavailable).
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every song of the selected collection, in catalog order
    async fn fetch(&self, collection: &CollectionSelector) -> Result<Vec<SongDescriptor>>;
}

/// One page of a paginated listing
#[derive(Debug)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Cursor for the next page, `None` on the last page
    pub next: Option<Url>,
}

/// Follow continuation cursors from `first` until the provider stops returning one
pub async fn walk_pages<T, F, Fut>(first: Url, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Url) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor = Some(first);
    let mut pages = 0usize;

    while let Some(url) = cursor.take() {
        let page = fetch_page(url.clone()).await?;
        pages += 1;
        items.extend(page.items);

        cursor = match page.next {
            Some(next) if next == url => {
                tracing::warn!(url = %url, "Catalog returned the same page cursor twice, stopping");
                None
            }
            other => other,
        };
    }

    tracing::debug!(pages, items = items.len(), "Finished walking catalog pages");
    Ok(items)
}
