// ============================================================================
// IMAGE I/O — upload validation/decode and PNG export
// ============================================================================

use image::codecs::png::PngEncoder;
use image::{ImageError, ImageFormat};
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::bitmap::Bitmap;

/// Fixed default filename for exported images.
pub const DEFAULT_EXPORT_NAME: &str = "edited_image.png";

/// Upload formats the editor accepts.
pub const ACCEPTED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Gif,
];

// ---------------------------------------------------------------------------
//  Errors
// ---------------------------------------------------------------------------

/// Why an upload was rejected or failed to decode. Rejections happen before
/// any session state changes.
#[derive(Debug)]
pub enum UploadError {
    /// Payload exceeds the configured maximum.
    TooLarge { bytes: usize, max_bytes: usize },
    /// Not one of the accepted image formats (or not an image at all).
    UnsupportedFormat(String),
    /// Sniffed fine but the decoder failed partway.
    Decode(String),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::TooLarge { bytes, max_bytes } => write!(
                f,
                "image is {} bytes, the maximum is {} bytes",
                bytes, max_bytes
            ),
            UploadError::UnsupportedFormat(detail) => {
                write!(f, "unsupported image format: {}", detail)
            }
            UploadError::Decode(detail) => write!(f, "failed to decode image: {}", detail),
        }
    }
}

impl std::error::Error for UploadError {}

/// Why an export could not be produced or written.
#[derive(Debug)]
pub enum ExportError {
    Encode(ImageError),
    Io(std::io::Error),
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Encode(e) => write!(f, "PNG encode error: {}", e),
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<ImageError> for ExportError {
    fn from(e: ImageError) -> Self {
        ExportError::Encode(e)
    }
}

impl From<std::io::Error> for ExportError {
    fn from(e: std::io::Error) -> Self {
        ExportError::Io(e)
    }
}

// ---------------------------------------------------------------------------
//  Upload intake
// ---------------------------------------------------------------------------

/// Validate an upload payload without decoding it: size cap first, then
/// format sniffing against the accepted list.
pub fn validate_upload(bytes: &[u8], max_bytes: usize) -> Result<ImageFormat, UploadError> {
    if bytes.len() > max_bytes {
        return Err(UploadError::TooLarge {
            bytes: bytes.len(),
            max_bytes,
        });
    }
    let format = image::guess_format(bytes)
        .map_err(|e| UploadError::UnsupportedFormat(e.to_string()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(UploadError::UnsupportedFormat(format!("{:?}", format)));
    }
    Ok(format)
}

/// Validate and decode an upload into a session-ready bitmap.
pub fn decode_upload(bytes: &[u8], max_bytes: usize) -> Result<Bitmap, UploadError> {
    let format = validate_upload(bytes, max_bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| UploadError::Decode(e.to_string()))?;
    Ok(Bitmap::from_rgba(decoded.into_rgba8()))
}

// ---------------------------------------------------------------------------
//  Export
// ---------------------------------------------------------------------------

/// The encoded result of an export: PNG bytes plus the download filename.
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Encode a bitmap as a PNG byte stream.
pub fn encode_png(bitmap: &Bitmap) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new(&mut out);
    #[allow(deprecated)]
    encoder.encode(
        bitmap.as_raw(),
        bitmap.width(),
        bitmap.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(out)
}

/// Encode and write a bitmap to `path` as PNG.
pub fn write_png(bitmap: &Bitmap, path: &Path) -> Result<(), ExportError> {
    let bytes = encode_png(bitmap)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
//  File handler — native dialogs around the codec functions
// ---------------------------------------------------------------------------

/// Wraps the native file dialogs for interactive save/open. Everything else
/// in the crate works on in-memory bytes; this is the only place a path is
/// chosen by the user.
#[derive(Default)]
pub struct FileHandler {
    last_save_dir: Option<PathBuf>,
}

impl FileHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask where to save an export, pre-filled with the default filename.
    pub fn pick_save_path(&mut self) -> Option<PathBuf> {
        let mut dialog = FileDialog::new()
            .add_filter("PNG image", &["png"])
            .set_file_name(DEFAULT_EXPORT_NAME);
        if let Some(dir) = &self.last_save_dir {
            dialog = dialog.set_directory(dir);
        }
        let path = dialog.save_file()?;
        self.last_save_dir = path.parent().map(Path::to_path_buf);
        Some(path)
    }

    /// Ask for an image to open.
    pub fn pick_open_path(&mut self) -> Option<PathBuf> {
        FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp", "gif"])
            .pick_file()
    }

    /// Full interactive export: dialog, then encode + write. `Ok(None)`
    /// means the user cancelled the dialog.
    pub fn save_export(&mut self, bitmap: &Bitmap) -> Result<Option<PathBuf>, ExportError> {
        let Some(path) = self.pick_save_path() else {
            return Ok(None);
        };
        write_png(bitmap, &path)?;
        crate::log_info!("exported {}x{} to {}", bitmap.width(), bitmap.height(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const MAX: usize = 32 * 1024 * 1024;

    #[test]
    fn garbage_bytes_are_rejected_before_decode() {
        let err = validate_upload(b"definitely not an image", MAX).unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedFormat(_)));
    }

    #[test]
    fn oversized_payload_is_rejected_by_size_first() {
        let err = validate_upload(&[0u8; 64], 16).unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { bytes: 64, .. }));
    }

    #[test]
    fn png_round_trips_through_encode_and_decode() {
        let src = Bitmap::filled(12, 7, Rgba([90, 120, 30, 255]));
        let bytes = encode_png(&src).unwrap();
        let back = decode_upload(&bytes, MAX).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn write_png_produces_a_readable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_EXPORT_NAME);
        let src = Bitmap::filled(5, 5, Rgba([1, 2, 3, 255]));
        write_png(&src, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(validate_upload(&bytes, MAX).unwrap(), ImageFormat::Png);
    }
}
