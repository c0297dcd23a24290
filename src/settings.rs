use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const fn default_ttl_hours() -> u32 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Serve images by downloading them locally instead of streaming the
    /// remote URL
    #[serde(default)]
    pub serve_images: bool,

    /// Lifetime of signed URLs requested from the cache collaborator
    #[serde(default = "default_ttl_hours")]
    pub signed_url_ttl_hours: u32,

    /// Explicit path to the ffprobe binary; looked up on PATH when unset
    pub ffprobe_path: Option<PathBuf>,

    /// Root directory that relative locators resolve against
    pub media_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serve_images: false,
            signed_url_ttl_hours: default_ttl_hours(),
            ffprobe_path: None,
            media_root: None,
        }
    }
}
