//! Fetching bytes that live outside the archive.
//!
//! The rewriter only reaches for this when the host policy forbids content
//! from loading an external resource directly and the bytes have to be
//! copied behind a locator instead.

use async_trait::async_trait;
use av_core::ViewerError;
use av_core::ViewerResult;
use core::fmt;
use std::collections::BTreeMap;
use url::Url;

/// Bytes and declared type of an external resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBytes {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait ExternalFetcher: Send + Sync + fmt::Debug {
    async fn fetch(&self, url: &str) -> ViewerResult<FetchedBytes>;
}

/// Only `http`/`https` targets are ever fetched.
pub fn validate_fetch_url(input: &str) -> ViewerResult<Url> {
    let parsed = Url::parse(input).map_err(|error| {
        ViewerError::new(
            "net.url.invalid",
            format!("failed to parse URL `{input}`: {error}"),
        )
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ViewerError::new(
            "net.url.scheme_unsupported",
            format!("unsupported scheme `{other}`"),
        )),
    }
}

/// Refuses every request. The default for a fully offline viewer.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

#[async_trait]
impl ExternalFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> ViewerResult<FetchedBytes> {
        validate_fetch_url(url)?;
        Err(ViewerError::new(
            "net.fetch.disabled",
            format!("network access is disabled, not fetching `{url}`"),
        ))
    }
}

/// Serves a fixed URL → bytes table.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    responses: BTreeMap<String, FetchedBytes>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(
        mut self,
        url: &str,
        content_type: &str,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        self.responses.insert(
            url.to_owned(),
            FetchedBytes {
                bytes: bytes.into(),
                content_type: content_type.to_owned(),
            },
        );
        self
    }
}

#[async_trait]
impl ExternalFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> ViewerResult<FetchedBytes> {
        let parsed = validate_fetch_url(url)?;
        self.responses
            .get(parsed.as_str())
            .or_else(|| self.responses.get(url))
            .cloned()
            .ok_or_else(|| {
                ViewerError::new("net.fetch.not_found", format!("no response for `{url}`"))
            })
    }
}
