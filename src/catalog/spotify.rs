//! Web API adapter for saved tracks and playlists.

use super::{CatalogClient, CatalogSource, CollectionSelector, Page, walk_pages};
use crate::error::{Error, Result};
use crate::types::SongDescriptor;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

/// Paging object as returned by every listing endpoint
#[derive(Debug, Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

/// Entry of a saved-tracks or playlist-tracks listing
#[derive(Debug, Deserialize)]
struct TrackItem {
    /// `null` for tracks removed from the catalog
    #[serde(default)]
    track: Option<TrackObject>,
}

#[derive(Debug, Deserialize)]
struct TrackObject {
    name: String,
    /// Absent for podcast episodes
    #[serde(default)]
    artists: Vec<ArtistObject>,
}

#[derive(Debug, Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistObject {
    id: String,
    name: String,
}

impl TrackItem {
    fn into_descriptor(self) -> Option<SongDescriptor> {
        let track = self.track?;
        let artist = track.artists.into_iter().next()?;
        Some(SongDescriptor::new(track.name, artist.name))
    }
}

impl<T> TryFrom<Paging<T>> for Page<T> {
    type Error = Error;

    fn try_from(paging: Paging<T>) -> Result<Self> {
        let next = paging
            .next
            .map(|next| {
                Url::parse(&next)
                    .map_err(|e| Error::Other(format!("invalid page cursor '{}': {}", next, e)))
            })
            .transpose()?;
        Ok(Page {
            items: paging.items,
            next,
        })
    }
}

/// Catalog source backed by the Spotify Web API
pub struct SpotifyCatalog {
    client: Arc<CatalogClient>,
    page_size: u32,
}

impl SpotifyCatalog {
    /// Create the adapter around a shared session
    pub fn new(client: Arc<CatalogClient>, page_size: u32) -> Self {
        Self { client, page_size }
    }

    async fn fetch_page<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<Page<T>> {
        let paging: Paging<T> = self.client.get_json(&url).await?;
        Page::try_from(paging)
    }

    async fn track_listing(&self, path: &str) -> Result<Vec<SongDescriptor>> {
        let limit = self.page_size.to_string();
        let first = self.client.endpoint(path, &[("limit", limit.as_str())])?;
        let items: Vec<TrackItem> = walk_pages(first, |url| self.fetch_page(url)).await?;

        let listed = items.len();
        let songs: Vec<SongDescriptor> = items
            .into_iter()
            .filter_map(TrackItem::into_descriptor)
            .collect();
        if songs.len() < listed {
            tracing::debug!(
                dropped = listed - songs.len(),
                "Dropped entries without a playable track or artist"
            );
        }
        Ok(songs)
    }

    async fn liked_songs(&self) -> Result<Vec<SongDescriptor>> {
        self.track_listing("me/tracks").await
    }

    async fn find_playlist(&self, name: &str) -> Result<Option<String>> {
        let limit = self.page_size.to_string();
        let first = self
            .client
            .endpoint("me/playlists", &[("limit", limit.as_str())])?;
        let playlists: Vec<PlaylistObject> = walk_pages(first, |url| self.fetch_page(url)).await?;

        let wanted = name.to_lowercase();
        Ok(playlists
            .into_iter()
            .find(|p| p.name.to_lowercase() == wanted)
            .map(|p| p.id))
    }

    async fn fetch_inner(&self, collection: &CollectionSelector) -> Result<Vec<SongDescriptor>> {
        match collection {
            CollectionSelector::Liked => self.liked_songs().await,
            CollectionSelector::Named(name) => match self.find_playlist(name).await? {
                Some(id) => {
                    tracing::debug!(playlist = %name, playlist_id = %id, "Found playlist");
                    self.track_listing(&format!("playlists/{}/tracks", id)).await
                }
                None => {
                    tracing::warn!(
                        playlist = %name,
                        "Playlist not found, falling back to liked songs"
                    );
                    self.liked_songs().await
                }
            },
        }
    }
}

#[async_trait]
impl CatalogSource for SpotifyCatalog {
    async fn fetch(&self, collection: &CollectionSelector) -> Result<Vec<SongDescriptor>> {
        let songs = self.fetch_inner(collection).await.map_err(|e| match e {
            Error::Config { .. } | Error::CatalogUnavailable(_) => e,
            other => Error::CatalogUnavailable(other.to_string()),
        })?;

        tracing::info!(collection = %collection, songs = songs.len(), "Fetched collection");
        Ok(songs)
    }
}
