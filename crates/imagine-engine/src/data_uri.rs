use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Base64 body of a payload, with any `data:...;base64,` header removed.
pub fn strip_data_uri_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((head, body)) if head.starts_with("data:") => body,
        _ => payload,
    }
}

/// MIME type declared by a data URI header, if any.
pub fn declared_mime_type(payload: &str) -> Option<&str> {
    let (head, _) = payload.split_once(',')?;
    let rest = head.strip_prefix("data:")?;
    let mime = rest.split(';').next().unwrap_or_default().trim();
    if mime.is_empty() {
        return None;
    }
    Some(mime)
}

pub fn png_data_uri(base64_body: &str) -> String {
    format!("{PNG_DATA_URI_PREFIX}{}", strip_data_uri_prefix(base64_body))
}

pub fn encode_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64.encode(bytes))
}

pub fn decode_data_uri(payload: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(strip_data_uri_prefix(payload).trim().as_bytes())
        .context("image payload is not valid base64")
}

/// Reads a user-selected image into a data URI, the way a browser file
/// reader would.
pub fn read_file_as_data_uri(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = mime_for_path(path).unwrap_or(DEFAULT_MIME_TYPE);
    Ok(encode_data_uri(mime, &bytes))
}

pub fn write_data_uri_to_file(payload: &str, path: &Path) -> Result<()> {
    let bytes = decode_data_uri(payload)?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

/// Native pixel dimensions of an encoded image payload.
pub fn image_dimensions(payload: &str) -> Option<(u32, u32)> {
    let bytes = decode_data_uri(payload).ok()?;
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> anyhow::Result<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]))
            .write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    #[test]
    fn prefix_is_stripped_only_from_data_uris() {
        assert_eq!(strip_data_uri_prefix("data:image/jpeg;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri_prefix("QUJD"), "QUJD");
        assert_eq!(strip_data_uri_prefix("a,b"), "a,b");
        assert_eq!(
            declared_mime_type("data:image/jpeg;base64,QUJD"),
            Some("image/jpeg")
        );
        assert_eq!(declared_mime_type("QUJD"), None);
    }

    #[test]
    fn png_prefix_is_not_doubled() {
        assert_eq!(png_data_uri("QUJD"), "data:image/png;base64,QUJD");
        assert_eq!(
            png_data_uri("data:image/png;base64,QUJD"),
            "data:image/png;base64,QUJD"
        );
    }

    #[test]
    fn file_round_trips_through_data_uri() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("photo.png");
        std::fs::write(&path, png_bytes(6, 4)?)?;

        let payload = read_file_as_data_uri(&path)?;
        assert!(payload.starts_with("data:image/png;base64,"));
        assert_eq!(image_dimensions(&payload), Some((6, 4)));

        let copy = temp.path().join("out/copy.png");
        write_data_uri_to_file(&payload, &copy)?;
        assert_eq!(std::fs::read(copy)?, std::fs::read(path)?);
        Ok(())
    }

    #[test]
    fn garbage_payloads_have_no_dimensions() {
        assert_eq!(image_dimensions("data:image/png;base64,!!!"), None);
        assert_eq!(image_dimensions("QUJD"), None);
        assert!(decode_data_uri("%%%").is_err());
    }
}
