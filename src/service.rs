use std::path::Path;
use std::sync::Arc;

use log::warn;
use serde::Serialize;
use tokio::fs::File;

use crate::cache::MediaCache;
use crate::cursor::{LocalSource, RemoteSource, StreamCursor};
use crate::error::ProbeError;
use crate::ffprobe::FfprobeRunner;
use crate::mime;
use crate::settings::Settings;
use crate::sniffer;

/// Metadata record returned for every probe request.
///
/// `frame_rate` is present only for videos; `url` is set only when the
/// remote-URL strategy was used, telling the caller the bytes were never
/// materialized locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Metadata {
    /// Fixed placeholder used whenever probing fails.
    pub fn default_for(is_video: bool) -> Self {
        Self {
            width: 512,
            height: 512,
            frame_rate: is_video.then_some(30.0),
            url: None,
        }
    }
}

/// Top-level probe orchestrator.
///
/// Classifies a locator as image or video, picks a retrieval strategy
/// through the cache collaborator, and degrades every probe failure to the
/// fixed default record. Probing is a best-effort optimization; it never
/// fails the request it serves.
pub struct MetadataService {
    cache: Arc<dyn MediaCache>,
    ffprobe: FfprobeRunner,
    client: reqwest::Client,
    signed_url_ttl_hours: u32,
}

impl MetadataService {
    /// Builds the service, locating ffprobe up front.
    ///
    /// # Errors
    ///
    /// Returns [`ProbeError::UtilityMissing`] when ffprobe is not installed
    /// and no explicit path is configured. This is the one probe error that
    /// is surfaced rather than absorbed.
    pub fn new(cache: Arc<dyn MediaCache>, settings: &Settings) -> Result<Self, ProbeError> {
        let ffprobe = match &settings.ffprobe_path {
            Some(path) => FfprobeRunner::with_binary(path.clone()),
            None => FfprobeRunner::locate()?,
        };
        Ok(Self {
            cache,
            ffprobe,
            client: reqwest::Client::new(),
            signed_url_ttl_hours: settings.signed_url_ttl_hours,
        })
    }

    /// Probes the dimensions (and frame rate, for videos) of a media file.
    ///
    /// Infallible by design: any failure yields the default metadata for the
    /// media kind.
    pub async fn probe_metadata(&self, locator: &str) -> Metadata {
        let is_video = mime::is_video(locator);
        let download = !is_video && self.cache.serves_images_directly();

        if download || self.cache.is_local_or_cached(locator).await {
            let cache = Arc::clone(&self.cache);
            let owned = locator.to_string();
            // Path resolution may download; keep it off the async workers.
            let resolved =
                tokio::task::spawn_blocking(move || cache.get_local_path(&owned)).await;
            let local_path = match resolved {
                Ok(Ok(path)) => path,
                Ok(Err(e)) => {
                    warn!("no local path for {locator}: {e}");
                    return Metadata::default_for(is_video);
                }
                Err(e) => {
                    warn!("local path resolution for {locator} panicked: {e}");
                    return Metadata::default_for(is_video);
                }
            };
            return match self.read_local_metadata(&local_path, is_video).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("local probe of {locator} failed: {e}");
                    Metadata::default_for(is_video)
                }
            };
        }

        let url = match self
            .cache
            .get_signed_url(locator, "GET", self.signed_url_ttl_hours)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!("signed url for {locator} unavailable: {e}");
                return Metadata::default_for(is_video);
            }
        };

        let mut metadata = match self.read_url_metadata(&url, is_video).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("remote probe of {locator} failed: {e}");
                Metadata::default_for(is_video)
            }
        };
        // The URL is attached even to the fallback record so the caller can
        // still hand out the asset.
        metadata.url = Some(url);
        metadata
    }

    async fn read_local_metadata(
        &self,
        path: &Path,
        is_video: bool,
    ) -> Result<Metadata, ProbeError> {
        if is_video {
            let info = self.ffprobe.stream_info(&path.to_string_lossy()).await?;
            return Ok(Metadata {
                width: info.frame_size.0,
                height: info.frame_size.1,
                frame_rate: Some(info.frame_rate),
                url: None,
            });
        }

        let file = File::open(path).await?;
        let mut cursor = StreamCursor::new(LocalSource::new(file));
        let (width, height) = sniffer::image_dimensions(&mut cursor).await?;
        Ok(Metadata {
            width,
            height,
            frame_rate: None,
            url: None,
        })
    }

    async fn read_url_metadata(&self, url: &str, is_video: bool) -> Result<Metadata, ProbeError> {
        if is_video {
            let info = self.ffprobe.stream_info(url).await?;
            return Ok(Metadata {
                width: info.frame_size.0,
                height: info.frame_size.1,
                frame_rate: Some(info.frame_rate),
                url: None,
            });
        }

        let response = self.client.get(url).send().await?.error_for_status()?;
        let mut cursor = StreamCursor::new(RemoteSource::from_response(response));
        let (width, height) = sniffer::image_dimensions(&mut cursor).await?;
        Ok(Metadata {
            width,
            height,
            frame_rate: None,
            url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;

    struct StubCache {
        local_path: Option<PathBuf>,
        signed_url: Option<String>,
    }

    #[async_trait]
    impl MediaCache for StubCache {
        fn serves_images_directly(&self) -> bool {
            false
        }

        async fn is_local_or_cached(&self, _locator: &str) -> bool {
            self.local_path.is_some()
        }

        fn get_local_path(&self, locator: &str) -> Result<PathBuf> {
            match &self.local_path {
                Some(path) => Ok(path.clone()),
                None => bail!("not cached: {locator}"),
            }
        }

        async fn get_signed_url(
            &self,
            locator: &str,
            _method: &str,
            _ttl_hours: u32,
        ) -> Result<String> {
            match &self.signed_url {
                Some(url) => Ok(url.clone()),
                None => bail!("no signed url for {locator}"),
            }
        }
    }

    fn service(cache: StubCache) -> MetadataService {
        let settings = Settings {
            // Keeps construction off the host PATH so tests run without
            // ffmpeg installed.
            ffprobe_path: Some(PathBuf::from("/nonexistent/ffprobe")),
            ..Settings::default()
        };
        MetadataService::new(Arc::new(cache), &settings).expect("construction cannot fail")
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
        tmp.write_all(contents).expect("write temp file");
        tmp.flush().expect("flush temp file");
        tmp
    }

    #[tokio::test]
    async fn local_image_is_measured() {
        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&100u16.to_le_bytes());
        gif.extend_from_slice(&200u16.to_le_bytes());
        let tmp = temp_file(&gif);

        let svc = service(StubCache {
            local_path: Some(tmp.path().to_path_buf()),
            signed_url: None,
        });
        let metadata = svc.probe_metadata("photo.gif").await;
        assert_eq!(metadata.width, 100);
        assert_eq!(metadata.height, 200);
        assert_eq!(metadata.frame_rate, None);
        assert_eq!(metadata.url, None);
    }

    #[tokio::test]
    async fn corrupt_local_image_degrades_to_default() {
        let tmp = temp_file(&[0u8; 64]);
        let svc = service(StubCache {
            local_path: Some(tmp.path().to_path_buf()),
            signed_url: None,
        });
        let metadata = svc.probe_metadata("photo.png").await;
        assert_eq!(metadata, Metadata::default_for(false));
    }

    #[tokio::test]
    async fn failed_video_probe_degrades_to_video_default() {
        let tmp = temp_file(b"not a video");
        let svc = service(StubCache {
            local_path: Some(tmp.path().to_path_buf()),
            signed_url: None,
        });
        let metadata = svc.probe_metadata("clip.mp4").await;
        assert_eq!(metadata, Metadata::default_for(true));
        assert_eq!(metadata.frame_rate, Some(30.0));
    }

    #[tokio::test]
    async fn unreachable_remote_image_keeps_url_on_default() {
        // .invalid never resolves, so the fetch fails fast.
        let url = "http://media.invalid/img.png".to_string();
        let svc = service(StubCache {
            local_path: None,
            signed_url: Some(url.clone()),
        });
        let metadata = svc.probe_metadata("img.png").await;
        assert_eq!(metadata.width, 512);
        assert_eq!(metadata.height, 512);
        assert_eq!(metadata.frame_rate, None);
        assert_eq!(metadata.url, Some(url));
    }

    #[tokio::test]
    async fn missing_signed_url_degrades_without_url() {
        let svc = service(StubCache {
            local_path: None,
            signed_url: None,
        });
        let metadata = svc.probe_metadata("img.png").await;
        assert_eq!(metadata, Metadata::default_for(false));
    }

    #[tokio::test]
    async fn missing_local_path_degrades_to_default() {
        struct BrokenCache;

        #[async_trait]
        impl MediaCache for BrokenCache {
            fn serves_images_directly(&self) -> bool {
                false
            }
            async fn is_local_or_cached(&self, _locator: &str) -> bool {
                true
            }
            fn get_local_path(&self, locator: &str) -> Result<PathBuf> {
                bail!("download failed: {locator}")
            }
            async fn get_signed_url(
                &self,
                _locator: &str,
                _method: &str,
                _ttl_hours: u32,
            ) -> Result<String> {
                bail!("unreachable")
            }
        }

        let settings = Settings {
            ffprobe_path: Some(PathBuf::from("/nonexistent/ffprobe")),
            ..Settings::default()
        };
        let svc = MetadataService::new(Arc::new(BrokenCache), &settings).unwrap();
        assert_eq!(
            svc.probe_metadata("photo.jpg").await,
            Metadata::default_for(false)
        );
    }

    #[test]
    fn default_metadata_constants() {
        assert_eq!(
            Metadata::default_for(false),
            Metadata {
                width: 512,
                height: 512,
                frame_rate: None,
                url: None
            }
        );
        assert_eq!(Metadata::default_for(true).frame_rate, Some(30.0));
    }
}
