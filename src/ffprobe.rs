use std::path::PathBuf;

use log::debug;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::ProbeError;
use crate::mime;

/// The representative video stream of a probed file, plus the MIME type
/// guessed from the target's extension.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub frame_size: (u32, u32),
    pub frame_rate: f64,
    pub mime_type: String,
}

/// Top-level shape of the ffprobe JSON report.
#[derive(Debug, Deserialize)]
pub struct FfprobeReport {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
pub struct FfprobeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
}

/// Runs ffprobe against local paths or URLs and interprets its report.
///
/// The binary is located once at construction; a missing binary is a
/// deployment defect surfaced as [`ProbeError::UtilityMissing`].
#[derive(Debug, Clone)]
pub struct FfprobeRunner {
    binary: PathBuf,
}

impl FfprobeRunner {
    pub fn locate() -> Result<Self, ProbeError> {
        which::which("ffprobe")
            .map(|binary| Self { binary })
            .map_err(|_| ProbeError::UtilityMissing)
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Probes the video stream of a local path or remote URL.
    pub async fn stream_info(&self, target: &str) -> Result<VideoStreamInfo, ProbeError> {
        let output = Command::new(&self.binary)
            .args([
                "-loglevel",
                "error",
                "-show_format",
                "-show_streams",
                "-print_format",
                "json",
                "-i",
            ])
            .arg(target)
            .output()
            .await?;

        // ffprobe reports errors on stderr even when it exits zero.
        if !output.stderr.is_empty() {
            return Err(ProbeError::UtilityFailure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let report: FfprobeReport = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::UtilityFailure(format!("unparseable report: {e}")))?;
        stream_info_from_report(&report, target)
    }
}

/// Derives [`VideoStreamInfo`] from a parsed report, independently of how the
/// report was produced.
pub fn stream_info_from_report(
    report: &FfprobeReport,
    target: &str,
) -> Result<VideoStreamInfo, ProbeError> {
    let stream = select_stream(report)?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(width), Some(height)) => (width, height),
        _ => {
            return Err(ProbeError::UtilityFailure(
                "selected stream has no frame size".to_string(),
            ))
        }
    };
    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| ProbeError::UtilityFailure("selected stream has no frame rate".to_string()))?;

    let mime_type = mime::guess_mime_type(target)
        .unwrap_or("application/octet-stream")
        .to_string();

    Ok(VideoStreamInfo {
        frame_size: (width, height),
        frame_rate,
        mime_type,
    })
}

/// Picks the authoritative stream from the report.
///
/// Exactly one video stream is the normal case. Zero video streams falls
/// back to the first stream of any kind; several video streams use the first
/// one found. Both degenerate cases are logged and accepted.
fn select_stream(report: &FfprobeReport) -> Result<&FfprobeStream, ProbeError> {
    let mut video = report
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"));

    match (video.next(), video.next()) {
        (Some(first), None) => Ok(first),
        (Some(first), Some(_)) => {
            debug!("found multiple video streams; using first stream");
            Ok(first)
        }
        (None, _) => {
            debug!("no video stream found; defaulting to first stream");
            report.streams.first().ok_or_else(|| {
                ProbeError::UtilityFailure("report contains no streams".to_string())
            })
        }
    }
}

/// Parses ffprobe's `"num/den"` frame-rate fractions, or a plain number.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    if let Some((num, den)) = raw.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(json: &str) -> FfprobeReport {
        serde_json::from_str(json).expect("test report must parse")
    }

    #[test]
    fn parses_frame_rate_fractions() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("24000/1001"), Some(23.976023976023978));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn selects_single_video_stream() {
        let r = report(
            r#"{
                "streams": [
                    {"codec_type": "audio"},
                    {"codec_type": "video", "width": 1920, "height": 1080,
                     "avg_frame_rate": "30000/1001"}
                ],
                "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.5"}
            }"#,
        );
        let info = stream_info_from_report(&r, "clip.mp4").unwrap();
        assert_eq!(info.frame_size, (1920, 1080));
        assert!((info.frame_rate - 29.97).abs() < 0.01);
        assert_eq!(info.mime_type, "video/mp4");
    }

    #[test]
    fn multiple_video_streams_use_the_first() {
        let r = report(
            r#"{
                "streams": [
                    {"codec_type": "audio"},
                    {"codec_type": "video", "width": 640, "height": 480,
                     "avg_frame_rate": "24/1"},
                    {"codec_type": "video", "width": 1280, "height": 720,
                     "avg_frame_rate": "60/1"}
                ],
                "format": {}
            }"#,
        );
        let info = stream_info_from_report(&r, "double.mkv").unwrap();
        assert_eq!(info.frame_size, (640, 480));
        assert_eq!(info.frame_rate, 24.0);
    }

    #[test]
    fn selection_ignores_non_video_ordering() {
        // Same streams with the non-video entries shuffled still select the
        // same video stream.
        let a = report(
            r#"{"streams": [
                {"codec_type": "audio"},
                {"codec_type": "subtitle"},
                {"codec_type": "video", "width": 100, "height": 50, "r_frame_rate": "30/1"}
            ], "format": {}}"#,
        );
        let b = report(
            r#"{"streams": [
                {"codec_type": "video", "width": 100, "height": 50, "r_frame_rate": "30/1"},
                {"codec_type": "subtitle"},
                {"codec_type": "audio"}
            ], "format": {}}"#,
        );
        let info_a = stream_info_from_report(&a, "x.webm").unwrap();
        let info_b = stream_info_from_report(&b, "x.webm").unwrap();
        assert_eq!(info_a, info_b);
    }

    #[test]
    fn zero_video_streams_fall_back_to_first() {
        let r = report(
            r#"{"streams": [
                {"codec_type": "audio", "width": 8, "height": 8, "r_frame_rate": "1/1"}
            ], "format": {}}"#,
        );
        let info = stream_info_from_report(&r, "odd.mp4").unwrap();
        assert_eq!(info.frame_size, (8, 8));
    }

    #[test]
    fn empty_report_is_a_failure() {
        let r = report(r#"{"streams": [], "format": {}}"#);
        assert!(matches!(
            stream_info_from_report(&r, "empty.mp4"),
            Err(ProbeError::UtilityFailure(_))
        ));
    }

    #[test]
    fn missing_frame_rate_is_a_failure() {
        let r = report(
            r#"{"streams": [
                {"codec_type": "video", "width": 10, "height": 10, "avg_frame_rate": "0/0"}
            ], "format": {}}"#,
        );
        assert!(matches!(
            stream_info_from_report(&r, "x.mp4"),
            Err(ProbeError::UtilityFailure(_))
        ));
    }

    #[test]
    fn format_fields_deserialize() {
        let r = report(r#"{"streams": [], "format": {"format_name": "gif", "duration": "1.0"}}"#);
        assert_eq!(r.format.format_name.as_deref(), Some("gif"));
        assert_eq!(r.format.duration.as_deref(), Some("1.0"));
    }
}
