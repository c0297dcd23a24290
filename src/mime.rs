/// MIME type guessing from a locator's extension.
///
/// Classification happens before any bytes are fetched, so it can only look
/// at the path or URL itself.

/// Extension of the last path segment, lowercased, with any URL query or
/// fragment stripped.
fn extension(locator: &str) -> Option<String> {
    let trimmed = locator
        .split_once(['?', '#'])
        .map_or(locator, |(path, _)| path);
    let segment = trimmed.rsplit(['/', '\\']).next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Guesses a MIME type from the locator's extension.
pub fn guess_mime_type(locator: &str) -> Option<&'static str> {
    let ext = extension(locator)?;
    let mime = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/vnd.microsoft.icon",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" | "qt" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpg" | "mpeg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        _ => return None,
    };
    Some(mime)
}

/// Whether the locator looks like a video by its extension.
pub fn is_video(locator: &str) -> bool {
    guess_mime_type(locator).is_some_and(|mime| mime.starts_with("video/"))
}
