use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use async_trait::async_trait;

/// The external cache/retrieval collaborator the probe service consults.
///
/// The service never downloads or caches media itself; deciding whether a
/// locator is already materialized locally, producing a local path, and
/// issuing signed URLs all belong to the implementor.
#[async_trait]
pub trait MediaCache: Send + Sync + 'static {
    /// Configuration flag: serve images by downloading them locally even
    /// when they are remote.
    fn serves_images_directly(&self) -> bool;

    /// Whether the locator is a local file or already cached on disk.
    async fn is_local_or_cached(&self, locator: &str) -> bool;

    /// Materializes (or reuses) a local copy and returns its path.
    ///
    /// May block on a download; callers offload it to a blocking worker.
    fn get_local_path(&self, locator: &str) -> Result<PathBuf>;

    /// Issues a time-limited signed URL granting read access to the asset.
    async fn get_signed_url(&self, locator: &str, method: &str, ttl_hours: u32)
        -> Result<String>;
}

/// Collaborator for deployments without a cache layer: locators are either
/// plain filesystem paths or already-public URLs that "sign" to themselves.
#[derive(Debug, Clone, Default)]
pub struct PassthroughCache {
    media_root: Option<PathBuf>,
    serve_images: bool,
}

impl PassthroughCache {
    pub fn new(media_root: Option<PathBuf>, serve_images: bool) -> Self {
        Self {
            media_root,
            serve_images,
        }
    }

    fn is_url(locator: &str) -> bool {
        locator.starts_with("http://") || locator.starts_with("https://")
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        match &self.media_root {
            Some(root) if Path::new(locator).is_relative() => root.join(locator),
            _ => PathBuf::from(locator),
        }
    }
}

#[async_trait]
impl MediaCache for PassthroughCache {
    fn serves_images_directly(&self) -> bool {
        self.serve_images
    }

    async fn is_local_or_cached(&self, locator: &str) -> bool {
        !Self::is_url(locator)
    }

    fn get_local_path(&self, locator: &str) -> Result<PathBuf> {
        if Self::is_url(locator) {
            bail!("remote locator has no local copy: {locator}");
        }
        Ok(self.resolve(locator))
    }

    async fn get_signed_url(
        &self,
        locator: &str,
        _method: &str,
        _ttl_hours: u32,
    ) -> Result<String> {
        if !Self::is_url(locator) {
            bail!("cannot issue a url for a local path: {locator}");
        }
        Ok(locator.to_string())
    }
}
