//! Expands command line paths into the image files to recognize.
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &[
  "png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp", "pnm", "pbm", "pgm", "ppm", "tga", "ico",
];

#[derive(Debug, Error)]
pub enum InputError {
  #[error("path not found: {0}")]
  NotFound(PathBuf),
  #[error("failed to walk {path}: {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },
}

pub fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

/// Files are taken as given; directories are walked recursively for files
/// with an image extension, in sorted order.
pub fn collect_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>, InputError> {
  let mut images = Vec::new();
  for path in paths {
    if path.is_file() {
      images.push(path.clone());
    } else if path.is_dir() {
      for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|source| InputError::Walk {
          path: path.clone(),
          source,
        })?;
        if entry.file_type().is_file() && is_image_path(entry.path()) {
          images.push(entry.into_path());
        }
      }
    } else {
      return Err(InputError::NotFound(path.clone()));
    }
  }
  Ok(images)
}
