// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for saving photos and frames

use crate::backends::camera::{CapturedPhoto, Frame};
use crate::constants::file_formats::{DEFAULT_PHOTO_EXTENSION, PHOTO_FOLDER, WRITABLE_EXTENSIONS};
use crate::errors::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default photo directory (~/Pictures/tethercam)
pub fn default_photo_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(PHOTO_FOLDER)
}

/// Timestamped file name such as `IMG_20260115_143012.jpg`
pub fn timestamped_file_name(prefix: &str, extension: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, extension)
}

/// Resolve where a photo goes
///
/// `output` may name a file or an existing directory; without it the photo
/// lands in `default_dir` under the camera's own file name, or a
/// timestamped one when the camera gave none.
pub fn resolve_photo_path(
    output: Option<&Path>,
    default_dir: &Path,
    photo: &CapturedPhoto,
) -> PathBuf {
    let file_name = || {
        photo
            .file_name
            .clone()
            .unwrap_or_else(|| timestamped_file_name("IMG", DEFAULT_PHOTO_EXTENSION))
    };

    match output {
        Some(path) if path.is_dir() => path.join(file_name()),
        Some(path) => path.to_path_buf(),
        None => default_dir.join(file_name()),
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn is_jpeg(path: &Path) -> bool {
    matches!(extension_of(path).as_deref(), Some("jpg" | "jpeg"))
}

fn ensure_parent(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Save a captured photo
///
/// JPEG targets get the camera's original bytes; other formats are encoded
/// from the decoded pixels.
pub fn save_photo(photo: &CapturedPhoto, path: &Path) -> AppResult<()> {
    ensure_parent(path)?;

    if is_jpeg(path) && !photo.encoded.is_empty() {
        std::fs::write(path, &photo.encoded)?;
    } else {
        save_frame(&photo.pixels, path)?;
    }

    info!(path = %path.display(), bytes = photo.encoded.len(), "Photo saved");
    Ok(())
}

/// Encode a frame to an image file, format chosen by extension
pub fn save_frame(frame: &Frame, path: &Path) -> AppResult<()> {
    let extension = extension_of(path).unwrap_or_default();
    if !WRITABLE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::Storage(format!(
            "Unsupported image format: {}",
            path.display()
        )));
    }

    let image = frame
        .to_rgb_image()
        .ok_or_else(|| AppError::Image("Frame has no pixel data".to_string()))?;
    ensure_parent(path)?;
    image.save(path)?;
    debug!(path = %path.display(), width = frame.width, height = frame.height, "Frame saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::simulated::test_pattern_jpeg;
    use std::sync::Arc;

    fn photo(file_name: Option<&str>) -> CapturedPhoto {
        let encoded = test_pattern_jpeg(16, 8, 1);
        CapturedPhoto {
            pixels: Frame::decode(&encoded).unwrap(),
            encoded: Arc::from(encoded),
            metadata: None,
            file_name: file_name.map(str::to_string),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tethercam-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_timestamped_file_name() {
        let name = timestamped_file_name("IMG", "jpg");
        assert!(name.starts_with("IMG_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "IMG_20260115_143012.jpg".len());
    }

    #[test]
    fn test_resolve_photo_path() {
        let default_dir = Path::new("/photos");
        assert_eq!(
            resolve_photo_path(None, default_dir, &photo(Some("IMG_0001.JPG"))),
            PathBuf::from("/photos/IMG_0001.JPG")
        );
        assert_eq!(
            resolve_photo_path(Some(Path::new("/tmp/out.png")), default_dir, &photo(None)),
            PathBuf::from("/tmp/out.png")
        );
        let generated = resolve_photo_path(None, default_dir, &photo(None));
        assert_eq!(generated.parent(), Some(default_dir));
    }

    #[test]
    fn test_save_photo_keeps_jpeg_bytes() {
        let dir = scratch_dir("jpeg");
        let photo = photo(Some("IMG_0001.JPG"));
        let path = dir.join("IMG_0001.JPG");

        save_photo(&photo, &path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), photo.encoded.to_vec());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_photo_reencodes_png() {
        let dir = scratch_dir("png");
        let path = dir.join("photo.png");

        save_photo(&photo(None), &path).unwrap();
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (16, 8));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_save_frame_rejects_unknown_format() {
        let frame = Frame::new(2, 2, vec![0; 12]);
        assert!(matches!(
            save_frame(&frame, Path::new("/tmp/frame.xyz")),
            Err(AppError::Storage(_))
        ));
    }
}
