//! # Media Pipeline Module
//!
//! Per-user image storage: archiving generated images, storing uploads and
//! normalizing an upload before it is used in a transformation.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::config::MAX_IMAGE_DIMENSION;

/// Minimum bytes needed to sniff an image format
pub const MIN_FORMAT_BYTES: usize = 8;
/// Name clashes tolerated within one timestamp before a save gives up
const MAX_NAME_SUFFIX: u32 = 100;

/// What produced an archived image; used as the file name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Generated,
    Transformed,
}

impl ImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Generated => "generated",
            ImageKind::Transformed => "transformed",
        }
    }
}

/// An image written to per-user storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub size_kb: u64,
}

/// One archived image listed by [`MediaStore::gallery`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub file_name: String,
    pub size_kb: u64,
}

/// Per-user image directories
pub struct MediaStore {
    generated_dir: PathBuf,
    uploaded_dir: PathBuf,
    download_timeout: Duration,
    http: reqwest::Client,
}

impl MediaStore {
    pub fn new(
        generated_dir: impl Into<PathBuf>,
        uploaded_dir: impl Into<PathBuf>,
        download_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .context("Failed to build image download client")?;

        Ok(Self {
            generated_dir: generated_dir.into(),
            uploaded_dir: uploaded_dir.into(),
            download_timeout,
            http,
        })
    }

    /// Upper bound for fetching one image, archive or upload
    pub fn download_timeout(&self) -> Duration {
        self.download_timeout
    }

    pub fn generated_dir_for(&self, user_id: u64) -> PathBuf {
        self.generated_dir.join(user_id.to_string())
    }

    pub fn uploaded_dir_for(&self, user_id: u64) -> PathBuf {
        self.uploaded_dir.join(user_id.to_string())
    }

    /// Fetch `image_url` and archive it for `user_id`.
    ///
    /// Archival never fails the caller: any error is logged and reported as
    /// `None`.
    pub async fn save(&self, image_url: &str, user_id: u64, kind: ImageKind) -> Option<SavedImage> {
        match self.try_save(image_url, user_id, kind).await {
            Ok(saved) => {
                info!(
                    user_id,
                    path = %saved.path.display(),
                    size_kb = saved.size_kb,
                    "Archived image"
                );
                Some(saved)
            }
            Err(e) => {
                warn!(user_id, kind = kind.as_str(), error = %e, "Failed to archive image, no file saved");
                None
            }
        }
    }

    async fn try_save(&self, image_url: &str, user_id: u64, kind: ImageKind) -> Result<SavedImage> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .context("Failed to download image")?
            .error_for_status()
            .context("Image download returned an error status")?;
        let bytes = response.bytes().await.context("Failed to read image body")?;

        self.save_bytes(&bytes, user_id, kind)
    }

    /// Write already downloaded image bytes to the user's generated images
    pub fn save_bytes(&self, bytes: &[u8], user_id: u64, kind: ImageKind) -> Result<SavedImage> {
        let dir = self.generated_dir_for(user_id);
        let stem = format!("{}_{}", kind.as_str(), timestamp());
        write_atomically(&dir, &stem, "png", bytes)
    }

    /// Store a user upload as `upload_<timestamp>.jpg`.
    ///
    /// Rejects bytes that are not a recognizable image.
    pub fn save_upload(&self, bytes: &[u8], user_id: u64) -> Result<SavedImage> {
        let format = detect_image_format(bytes)?;
        debug!(user_id, ?format, "Received upload");

        let dir = self.uploaded_dir_for(user_id);
        let stem = format!("upload_{}", timestamp());
        write_atomically(&dir, &stem, "jpg", bytes)
    }

    /// The user's archived images, newest first
    pub fn gallery(&self, user_id: u64) -> Result<Vec<GalleryEntry>> {
        let dir = self.generated_dir_for(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(GalleryEntry {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                size_kb: metadata.len() / 1024,
            });
        }

        // Timestamped names sort chronologically within one kind
        entries.sort_by(|a, b| timestamp_part(&b.file_name).cmp(timestamp_part(&a.file_name)));
        Ok(entries)
    }

    /// Delete every stored upload of `user_id`, returning how many were removed
    pub fn clear_uploads(&self, user_id: u64) -> Result<usize> {
        let dir = self.uploaded_dir_for(user_id);
        if !dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to read {}", dir.display()))? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed += 1;
            }
        }

        info!(user_id, removed, "Cleared uploads");
        Ok(removed)
    }
}

/// Normalize an image for use in a transformation.
///
/// Flattens any color mode onto an opaque white RGB canvas, shrinks the
/// image to fit within 1024x1024 keeping its aspect ratio and writes it as
/// PNG next to the input (`<stem>_prepared.png`). The caller owns the
/// returned file and removes it after use.
pub fn prepare(image_path: &Path) -> Result<PathBuf> {
    // Uploads are named .jpg whatever their real format
    let img = image::io::Reader::open(image_path)
        .with_context(|| format!("Failed to open image {}", image_path.display()))?
        .with_guessed_format()?
        .decode()
        .with_context(|| format!("Failed to decode image {}", image_path.display()))?;
    let (width, height) = img.dimensions();

    let mut rgb = flatten_to_rgb(&img);
    if width > MAX_IMAGE_DIMENSION || height > MAX_IMAGE_DIMENSION {
        rgb = DynamicImage::ImageRgb8(rgb)
            .resize(MAX_IMAGE_DIMENSION, MAX_IMAGE_DIMENSION, FilterType::Triangle)
            .to_rgb8();
    }

    let stem = image_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let output = image_path.with_file_name(format!("{stem}_prepared.png"));

    rgb.save_with_format(&output, ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    debug!(
        input = %image_path.display(),
        output = %output.display(),
        width,
        height,
        prepared_width = rgb.width(),
        prepared_height = rgb.height(),
        "Prepared image"
    );
    Ok(output)
}

/// Remove an intermediate file, logging instead of failing
pub fn discard(path: &Path) {
    if let Err(cleanup_err) = fs::remove_file(path) {
        error!(path = %path.display(), error = %cleanup_err, "Failed to clean up prepared image");
    } else {
        debug!(path = %path.display(), "Prepared image cleaned up");
    }
}

/// Sniff the image format of `bytes` with `image::guess_format`
pub fn detect_image_format(bytes: &[u8]) -> Result<ImageFormat> {
    if bytes.len() < MIN_FORMAT_BYTES {
        return Err(anyhow!(
            "Not enough data to determine image format ({} bytes)",
            bytes.len()
        ));
    }
    image::guess_format(bytes).context("Unrecognized image format")
}

fn flatten_to_rgb(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut canvas = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = u32::from(a);
        let blend = |channel: u8| ((u32::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8;
        canvas.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    canvas
}

/// Write `bytes` to `<dir>/<stem>.<extension>` through a temp file.
///
/// Existing files are never replaced: on a name clash a `_<n>` suffix is
/// appended to the stem.
fn write_atomically(dir: &Path, stem: &str, extension: &str, bytes: &[u8]) -> Result<SavedImage> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut temp_file = NamedTempFile::new_in(dir)?;
    temp_file.as_file_mut().write_all(bytes)?;

    let mut suffix = 0;
    loop {
        let file_name = if suffix == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{suffix}.{extension}")
        };
        let path = dir.join(file_name);

        match temp_file.persist_noclobber(&path) {
            Ok(_) => {
                return Ok(SavedImage {
                    path,
                    size_kb: bytes.len() as u64 / 1024,
                })
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && suffix < MAX_NAME_SUFFIX => {
                temp_file = e.file;
                suffix += 1;
            }
            Err(e) => {
                return Err(e.error).with_context(|| format!("Failed to persist {}", path.display()))
            }
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S_%3f").to_string()
}

fn timestamp_part(file_name: &str) -> &str {
    file_name
        .split_once('_')
        .map(|(_, rest)| rest)
        .unwrap_or(file_name)
}
