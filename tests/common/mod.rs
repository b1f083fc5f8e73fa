//! Common test utilities for playlist-dl integration tests

#![allow(dead_code)]

use playlist_dl::config::{Config, RetryConfig};
use serde_json::json;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Tracks per catalog page served by [`mock_catalog`]
pub const PAGE_SIZE: usize = 2;

/// Start a catalog double serving `tracks` as the saved tracks, paginated
///
/// The token endpoint accepts any refresh token and hands out `test-token`.
pub async fn mock_catalog(tracks: &[(&str, &str)]) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(&server)
        .await;

    let pages: Vec<&[(&str, &str)]> = tracks.chunks(PAGE_SIZE).collect();
    let page_count = pages.len().max(1);
    for index in 0..page_count {
        let items: Vec<serde_json::Value> = pages
            .get(index)
            .map(|page| {
                page.iter()
                    .map(|(title, artist)| {
                        json!({ "track": { "name": title, "artists": [{ "name": artist }] } })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let next = (index + 1 < page_count).then(|| {
            format!(
                "{}/v1/me/tracks?offset={}&limit={}",
                server.uri(),
                (index + 1) * PAGE_SIZE,
                PAGE_SIZE
            )
        });
        let body = json!({ "items": items, "next": next });

        // The first request carries only `limit`, later ones follow the cursor
        let mock = if index == 0 {
            Mock::given(method("GET"))
                .and(path("/v1/me/tracks"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .with_priority(10)
        } else {
            Mock::given(method("GET"))
                .and(path("/v1/me/tracks"))
                .and(query_param("offset", (index * PAGE_SIZE).to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
        };
        mock.mount(&server).await;
    }

    server
}

/// Configuration pointing at `server` and storing artifacts in `output_dir`
pub fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    let mut config = Config::default();
    config.catalog.client_id = "client".into();
    config.catalog.client_secret = "secret".into();
    config.catalog.redirect_uri = "http://localhost:8888/callback".into();
    config.catalog.refresh_token = Some("refresh".into());
    config.catalog.api_base_url = format!("{}/v1", server.uri());
    config.catalog.accounts_base_url = server.uri();
    config.catalog.page_size = PAGE_SIZE as u32;
    config.download.output_dir = output_dir.to_path_buf();
    config.download.worker_count = 2;
    config.retry = RetryConfig::immediate(2);
    config.tools.search_path = false;
    config
}

/// Write a `/bin/sh` stand-in for yt-dlp into `dir`
///
/// Search mode answers every query except those in `misses` with a locator
/// derived from the query. Download mode writes the locator into the output
/// file, or fails with "Video unavailable" when the locator contains `FAIL`.
#[cfg(unix)]
pub fn fake_yt_dlp(dir: &Path, misses: &[&str]) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let miss_pattern = if misses.is_empty() {
        "\"__no_misses__\"".to_string()
    } else {
        misses
            .iter()
            .map(|m| format!("\"{}\"", m))
            .collect::<Vec<_>>()
            .join("|")
    };

    let script = format!(
        r#"#!/bin/sh
if [ "$1" = "--dump-single-json" ]; then
  q="${{4#ytsearch1:}}"
  case "$q" in
    {miss_pattern}) echo '{{"entries":[]}}' ;;
    *) printf '{{"entries":[{{"webpage_url":"https://video.example/watch?q=%s"}}]}}\n' "$q" | sed 's/ /+/g' ;;
  esac
  exit 0
fi
for a in "$@"; do locator="$a"; done
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then tmpl="$2"; fi
  shift
done
case "$locator" in
  *FAIL*) echo "ERROR: [youtube] x: Video unavailable" >&2; exit 1 ;;
esac
out=$(printf '%s' "$tmpl" | sed 's/%(ext)s/mp3/')
printf '%s' "$locator" > "$out"
"#
    );

    let path = dir.join("yt-dlp");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
