use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

pub const CANONICAL_MIME: &str = "image/jpeg";
pub const CANONICAL_JPEG_QUALITY: u8 = 90;

/// Format the uploader claims, taken from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredFormat {
    Jpeg,
    Png,
    Webp,
    Heic,
}

impl DeclaredFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(DeclaredFormat::Jpeg),
            "png" => Some(DeclaredFormat::Png),
            "webp" => Some(DeclaredFormat::Webp),
            "heic" | "heif" => Some(DeclaredFormat::Heic),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeclaredFormat::Jpeg => "JPEG",
            DeclaredFormat::Png => "PNG",
            DeclaredFormat::Webp => "WEBP",
            DeclaredFormat::Heic => "HEIC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub name: String,
    pub bytes: Vec<u8>,
    pub declared_format: Option<DeclaredFormat>,
}

impl UploadedImage {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let declared_format = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DeclaredFormat::from_extension);
        Self {
            name,
            bytes,
            declared_format,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, bytes))
    }
}

/// JPEG bytes ready to be sent inline. Only `normalize` builds these, so
/// the bytes always decode as JPEG.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for CanonicalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanonicalImage")
            .field("len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl CanonicalImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn mime_type(&self) -> &'static str {
        CANONICAL_MIME
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / (1024.0 * 1024.0)
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub image: CanonicalImage,
    pub warning: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Couldn't open image: {format} images are not supported")]
    Unsupported { format: String },
    #[error("Couldn't open image: unrecognized image data")]
    Unrecognized,
    #[error("Couldn't open image: {source}")]
    Corrupt {
        #[source]
        source: image::ImageError,
    },
    #[error("Couldn't re-encode image: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },
}

/// Decodes an upload and re-encodes it as the canonical JPEG.
///
/// Transparent pixels are composited onto white first. Exceeding
/// `soft_limit_bytes` only attaches a warning.
pub fn normalize(upload: &UploadedImage, soft_limit_bytes: u64) -> Result<Normalized, DecodeError> {
    let format = sniff_format(upload)?;
    let decoded = image::load_from_memory_with_format(&upload.bytes, format)
        .map_err(|source| DecodeError::Corrupt { source })?;
    let rgb = flatten_onto_white(&decoded);
    let (width, height) = rgb.dimensions();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, CANONICAL_JPEG_QUALITY);
    encoder
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .map_err(|source| DecodeError::Encode { source })?;

    let image = CanonicalImage {
        bytes,
        width,
        height,
    };
    let warning = (image.len() as u64 > soft_limit_bytes).then(|| {
        format!(
            "Image size {:.1} MB is close to the inline limit (~20MB). Consider resizing for reliability.",
            image.size_mb()
        )
    });
    if let Some(message) = warning.as_deref() {
        log::warn!("{}: {message}", upload.name);
    }
    log::debug!(
        "normalized {} ({:?}) to {}x{} jpeg, {} bytes",
        upload.name,
        format,
        width,
        height,
        image.len()
    );

    Ok(Normalized { image, warning })
}

fn sniff_format(upload: &UploadedImage) -> Result<ImageFormat, DecodeError> {
    if looks_like_heif(&upload.bytes) {
        return Err(DecodeError::Unsupported {
            format: DeclaredFormat::Heic.label().to_string(),
        });
    }
    match image::guess_format(&upload.bytes) {
        Ok(ImageFormat::Jpeg) => Ok(ImageFormat::Jpeg),
        Ok(ImageFormat::Png) => Ok(ImageFormat::Png),
        Ok(ImageFormat::WebP) => Ok(ImageFormat::WebP),
        Ok(other) => Err(DecodeError::Unsupported {
            format: format!("{other:?}").to_ascii_uppercase(),
        }),
        Err(_) => match upload.declared_format {
            Some(DeclaredFormat::Heic) => Err(DecodeError::Unsupported {
                format: DeclaredFormat::Heic.label().to_string(),
            }),
            _ => Err(DecodeError::Unrecognized),
        },
    }
}

/// ISO-BMFF `ftyp` box with one of the HEIF brands.
fn looks_like_heif(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &bytes[8..12],
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1"
    )
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}
