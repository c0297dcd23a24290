use crate::cursor::{ByteSource, StreamCursor};
use crate::error::ProbeError;

/// How many prefix bytes the dispatcher hands every sniffer.
const PREFIX_LEN: usize = 26;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// Outcome of trying one format sniffer against a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    /// The signature matched and dimensions were extracted.
    Matched { width: u32, height: u32 },
    /// The signature did not match; the next sniffer may be tried.
    NotThisFormat,
    /// The signature matched but the header structure is broken. No later
    /// sniffer is tried.
    Malformed,
}

/// Recognized container formats, in fixed precedence order.
#[derive(Debug, Clone, Copy)]
enum ImageFormat {
    Gif,
    Png,
    PngLegacy,
    Jpeg,
    Bmp,
    Tiff,
    Ico,
}

impl ImageFormat {
    const ORDER: [Self; 7] = [
        Self::Gif,
        Self::Png,
        Self::PngLegacy,
        Self::Jpeg,
        Self::Bmp,
        Self::Tiff,
        Self::Ico,
    ];

    const fn name(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Png | Self::PngLegacy => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Ico => "ico",
        }
    }
}

/// Determines image dimensions from a byte stream.
///
/// Reads a small prefix and tries each sniffer in precedence order. The first
/// structurally matching signature wins; a matched format with a broken
/// header fails rather than falling through to later formats.
pub async fn image_dimensions<S: ByteSource>(
    cursor: &mut StreamCursor<S>,
) -> Result<(u32, u32), ProbeError> {
    let prefix = cursor.read(PREFIX_LEN).await?;
    for format in ImageFormat::ORDER {
        let result = match format {
            ImageFormat::Gif => gif(&prefix),
            ImageFormat::Png => png(&prefix),
            ImageFormat::PngLegacy => png_legacy(&prefix),
            ImageFormat::Jpeg => jpeg(&prefix, cursor).await?,
            ImageFormat::Bmp => bmp(&prefix),
            ImageFormat::Tiff => tiff(&prefix, cursor).await?,
            ImageFormat::Ico => ico(&prefix, cursor).await?,
        };
        match result {
            Sniff::Matched { width, height } => return Ok((width, height)),
            Sniff::NotThisFormat => continue,
            Sniff::Malformed => return Err(ProbeError::MalformedHeader(format.name())),
        }
    }
    Err(ProbeError::UnrecognizedFormat)
}

/// Reads exactly `n` bytes, or `None` if the stream ends first.
async fn take<S: ByteSource>(
    cursor: &mut StreamCursor<S>,
    n: usize,
) -> Result<Option<Vec<u8>>, ProbeError> {
    let bytes = cursor.read(n).await?;
    Ok((bytes.len() == n).then_some(bytes))
}

fn read_u16(bytes: &[u8], big_endian: bool) -> u16 {
    let raw = [bytes[0], bytes[1]];
    if big_endian {
        u16::from_be_bytes(raw)
    } else {
        u16::from_le_bytes(raw)
    }
}

fn read_u32(bytes: &[u8], big_endian: bool) -> u32 {
    let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if big_endian {
        u32::from_be_bytes(raw)
    } else {
        u32::from_le_bytes(raw)
    }
}

fn read_u64(bytes: &[u8], big_endian: bool) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    if big_endian {
        u64::from_be_bytes(raw)
    } else {
        u64::from_le_bytes(raw)
    }
}

fn gif(prefix: &[u8]) -> Sniff {
    if !prefix.starts_with(b"GIF87a") && !prefix.starts_with(b"GIF89a") {
        return Sniff::NotThisFormat;
    }
    if prefix.len() < 10 {
        return Sniff::Malformed;
    }
    Sniff::Matched {
        width: u32::from(read_u16(&prefix[6..8], false)),
        height: u32::from(read_u16(&prefix[8..10], false)),
    }
}

fn png(prefix: &[u8]) -> Sniff {
    if !prefix.starts_with(&PNG_SIGNATURE) || prefix.len() < 16 || &prefix[12..16] != b"IHDR" {
        return Sniff::NotThisFormat;
    }
    if prefix.len() < 24 {
        return Sniff::Malformed;
    }
    Sniff::Matched {
        width: read_u32(&prefix[16..20], true),
        height: read_u32(&prefix[20..24], true),
    }
}

/// Pre-IHDR layout written by some ancient encoders: dimensions directly
/// after the signature. Only reached when the IHDR check above failed.
fn png_legacy(prefix: &[u8]) -> Sniff {
    if !prefix.starts_with(&PNG_SIGNATURE) {
        return Sniff::NotThisFormat;
    }
    if prefix.len() < 16 {
        return Sniff::Malformed;
    }
    Sniff::Matched {
        width: read_u32(&prefix[8..12], true),
        height: read_u32(&prefix[12..16], true),
    }
}

/// Walks JPEG marker segments looking for a start-of-frame (SOF0-SOF3)
/// segment, skipping everything else by its declared length. Reaching the
/// start-of-scan marker means the stream carries no SOF we can use.
async fn jpeg<S: ByteSource>(
    prefix: &[u8],
    cursor: &mut StreamCursor<S>,
) -> Result<Sniff, ProbeError> {
    if prefix.len() < 2 || prefix[..2] != [0xFF, 0xD8] {
        return Ok(Sniff::NotThisFormat);
    }
    cursor.seek(2).await?;

    let mut marker = match take(cursor, 1).await? {
        Some(b) => b[0],
        None => return Ok(Sniff::Malformed),
    };
    loop {
        while marker != 0xFF {
            marker = match take(cursor, 1).await? {
                Some(b) => b[0],
                None => return Ok(Sniff::Malformed),
            };
        }
        while marker == 0xFF {
            marker = match take(cursor, 1).await? {
                Some(b) => b[0],
                None => return Ok(Sniff::Malformed),
            };
        }
        if marker == 0xDA {
            // Start of scan without any SOF segment before it.
            return Ok(Sniff::Malformed);
        }
        if (0xC0..=0xC3).contains(&marker) {
            // Length and precision bytes precede the dimension pair.
            if take(cursor, 3).await?.is_none() {
                return Ok(Sniff::Malformed);
            }
            let Some(dims) = take(cursor, 4).await? else {
                return Ok(Sniff::Malformed);
            };
            return Ok(Sniff::Matched {
                width: u32::from(read_u16(&dims[2..4], true)),
                height: u32::from(read_u16(&dims[..2], true)),
            });
        }
        let Some(len_bytes) = take(cursor, 2).await? else {
            return Ok(Sniff::Malformed);
        };
        let segment_len = read_u16(&len_bytes, true) as usize;
        if segment_len < 2 || take(cursor, segment_len - 2).await?.is_none() {
            return Ok(Sniff::Malformed);
        }
        marker = match take(cursor, 1).await? {
            Some(b) => b[0],
            None => return Ok(Sniff::Malformed),
        };
    }
}

fn bmp(prefix: &[u8]) -> Sniff {
    if !prefix.starts_with(b"BM") {
        return Sniff::NotThisFormat;
    }
    if prefix.len() < 26 {
        return Sniff::Malformed;
    }
    let header_size = read_u32(&prefix[14..18], false);
    if header_size == 12 {
        // BITMAPCOREHEADER
        return Sniff::Matched {
            width: u32::from(read_u16(&prefix[18..20], false)),
            height: u32::from(read_u16(&prefix[20..22], false)),
        };
    }
    if header_size >= 40 {
        let width = read_u32(&prefix[18..22], false) as i32;
        // Height is negative for top-down row order.
        let height = read_u32(&prefix[22..26], false) as i32;
        let Ok(width) = u32::try_from(width) else {
            return Sniff::Malformed;
        };
        return Sniff::Matched {
            width,
            height: height.unsigned_abs(),
        };
    }
    Sniff::Malformed
}

/// Byte width of a TIFF IFD entry value, by field type. BigTIFF types are
/// not supported.
const fn tiff_type_size(field_type: u16) -> Option<usize> {
    match field_type {
        // BYTE, ASCII, SBYTE, UNDEFINED
        1 | 2 | 6 | 7 => Some(1),
        // SHORT, SSHORT
        3 | 8 => Some(2),
        // LONG, SLONG, FLOAT
        4 | 9 | 11 => Some(4),
        // RATIONAL, SRATIONAL, DOUBLE
        5 | 10 | 12 => Some(8),
        _ => None,
    }
}

/// Decodes an inline IFD value; rationals yield their numerator.
fn tiff_value(raw: &[u8], field_type: u16, big_endian: bool) -> Option<i64> {
    let value = match field_type {
        1 | 2 | 7 => i64::from(raw[0]),
        6 => i64::from(raw[0] as i8),
        3 => i64::from(read_u16(raw, big_endian)),
        8 => i64::from(read_u16(raw, big_endian) as i16),
        4 | 5 => i64::from(read_u32(&raw[..4], big_endian)),
        9 | 10 => i64::from(read_u32(&raw[..4], big_endian) as i32),
        11 => f32::from_bits(read_u32(&raw[..4], big_endian)) as i64,
        12 => f64::from_bits(read_u64(raw, big_endian)) as i64,
        _ => return None,
    };
    Some(value)
}

/// Scans the first IFD for the ImageWidth (256) and ImageLength (257) tags.
async fn tiff<S: ByteSource>(
    prefix: &[u8],
    cursor: &mut StreamCursor<S>,
) -> Result<Sniff, ProbeError> {
    if prefix.len() < 8 {
        return Ok(Sniff::NotThisFormat);
    }
    let big_endian = if prefix.starts_with(b"II\x2a\x00") {
        false
    } else if prefix.starts_with(b"MM\x00\x2a") {
        true
    } else {
        return Ok(Sniff::NotThisFormat);
    };

    let ifd_offset = read_u32(&prefix[4..8], big_endian) as usize;
    cursor.seek(ifd_offset).await?;
    let Some(count_bytes) = take(cursor, 2).await? else {
        return Ok(Sniff::Malformed);
    };
    let entry_count = read_u16(&count_bytes, big_endian) as usize;

    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    for i in 0..entry_count {
        // 2 bytes tag, 2 bytes type, 4 bytes count, 4 bytes value/offset
        let entry_offset = ifd_offset + 2 + i * 12;
        cursor.seek(entry_offset).await?;
        let Some(tag_bytes) = take(cursor, 2).await? else {
            return Ok(Sniff::Malformed);
        };
        let tag = read_u16(&tag_bytes, big_endian);
        if tag == 256 || tag == 257 {
            let Some(type_bytes) = take(cursor, 2).await? else {
                return Ok(Sniff::Malformed);
            };
            let field_type = read_u16(&type_bytes, big_endian);
            let Some(size) = tiff_type_size(field_type) else {
                return Ok(Sniff::Malformed);
            };
            // When the value fits in 4 bytes it is stored inline in the
            // last 4 bytes of the entry.
            cursor.seek(entry_offset + 8).await?;
            let Some(value_bytes) = take(cursor, size).await? else {
                return Ok(Sniff::Malformed);
            };
            let value = tiff_value(&value_bytes, field_type, big_endian)
                .and_then(|v| u32::try_from(v).ok());
            let Some(value) = value else {
                return Ok(Sniff::Malformed);
            };
            if tag == 256 {
                width = Some(value);
            } else {
                height = Some(value);
            }
        }
        if width.is_some() && height.is_some() {
            break;
        }
    }
    match (width, height) {
        (Some(width), Some(height)) => Ok(Sniff::Matched { width, height }),
        _ => Ok(Sniff::Malformed),
    }
}

/// ICO/CUR directory fallback tried when nothing else matched. Width and
/// height are single bytes from the first directory entry; a stored zero is
/// returned as zero even though the format documents it as meaning 256.
async fn ico<S: ByteSource>(
    prefix: &[u8],
    cursor: &mut StreamCursor<S>,
) -> Result<Sniff, ProbeError> {
    if prefix.len() < 2 {
        return Ok(Sniff::NotThisFormat);
    }
    cursor.seek(0).await?;
    let Some(reserved) = take(cursor, 2).await? else {
        return Ok(Sniff::NotThisFormat);
    };
    if read_u16(&reserved, false) != 0 {
        return Ok(Sniff::NotThisFormat);
    }
    let Some(format) = take(cursor, 2).await? else {
        return Ok(Sniff::NotThisFormat);
    };
    if read_u16(&format, false) != 1 {
        return Ok(Sniff::NotThisFormat);
    }
    // Image count precedes the first directory entry.
    if take(cursor, 2).await?.is_none() {
        return Ok(Sniff::Malformed);
    }
    let Some(dims) = take(cursor, 2).await? else {
        return Ok(Sniff::Malformed);
    };
    Ok(Sniff::Matched {
        width: u32::from(dims[0]),
        height: u32::from(dims[1]),
    })
}
