use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::{safe_relative, CatalogConfig};
use crate::error::{CatalogError, Result};
use crate::slug::slugify;
use crate::uploads::{GoodsUpload, UploadedFile};

const IMAGE_UPLOAD_FAILED: &str = "Image upload failed.";
const ARCHIVE_UPLOAD_FAILED: &str = "Goods ZIP upload failed.";
const TREE_UPLOAD_FAILED: &str = "Goods directory upload failed.";

/// Places and removes the files behind a project's `image` and `goods_folder`.
///
/// Paths handed in and out are the stored, site-relative form; the manager
/// resolves them against the configured site root. Cleanup never fails the
/// caller: problems are logged and the operation moves on.
#[derive(Debug, Clone)]
pub struct AssetManager {
    config: CatalogConfig,
}

impl AssetManager {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    /// Store `upload` as `<slug(project_name)>.png` and return its stored path.
    ///
    /// `Ok(None)` means there was nothing to store. An `old_path` that differs
    /// from the new target is removed first.
    pub fn put_image(
        &self,
        upload: &UploadedFile,
        project_name: &str,
        old_path: Option<&str>,
    ) -> Result<Option<String>> {
        if let Some(reason) = &upload.error {
            tracing::warn!("image upload {:?} arrived broken: {}", upload.file_name, reason);
            return Err(CatalogError::Asset(IMAGE_UPLOAD_FAILED.to_string()));
        }
        if upload.file_name.is_empty() && upload.bytes.is_empty() {
            return Ok(None);
        }

        // Always PNG, whatever the source extension was.
        let file_name = format!("{}.png", slugify(project_name));
        let link = self.config.image_link(&file_name);
        let image_root = self.config.image_root();
        let target = image_root.join(&file_name);

        if let Err(err) = fs::create_dir_all(&image_root) {
            tracing::error!("failed to create image directory {}: {}", image_root.display(), err);
            return Err(CatalogError::Asset(IMAGE_UPLOAD_FAILED.to_string()));
        }

        if let Some(old) = old_path.filter(|old| !old.is_empty() && *old != link) {
            self.delete_image(old);
        }

        if let Err(err) = fs::write(&target, &upload.bytes) {
            tracing::error!("failed to store image {}: {}", target.display(), err);
            return Err(CatalogError::Asset(IMAGE_UPLOAD_FAILED.to_string()));
        }
        Ok(Some(link))
    }

    /// Remove a stored image. Returns whether a file was actually deleted.
    pub fn delete_image(&self, stored: &str) -> bool {
        if stored.is_empty() {
            return false;
        }
        let Some(path) = self
            .config
            .resolve_stored(stored)
            .filter(|path| is_strictly_within(path, &self.config.image_root()))
        else {
            tracing::warn!("refusing to delete image outside the image directory: {:?}", stored);
            return false;
        };
        if !path.is_file() {
            return false;
        }
        match fs::remove_file(&path) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!("failed to delete image file {}: {}", path.display(), err);
                false
            }
        }
    }

    /// Materialize a goods upload under `<goods_dir>/<slug(folder_name)>/`.
    ///
    /// Archives are all-or-nothing: an archive that cannot be opened touches
    /// nothing, and one that fails mid-extraction leaves no target directory.
    /// Directory uploads tolerate per-file failures; skipped files are logged and
    /// the folder is still returned.
    pub fn put_folder(
        &self,
        upload: &GoodsUpload,
        folder_name: &str,
        old_path: Option<&str>,
    ) -> Result<Option<String>> {
        let failure = match upload {
            GoodsUpload::None => return Ok(None),
            GoodsUpload::Tree(files) if files.is_empty() => return Ok(None),
            GoodsUpload::Archive(_) => ARCHIVE_UPLOAD_FAILED,
            GoodsUpload::Tree(_) => TREE_UPLOAD_FAILED,
        };
        let fail = || CatalogError::Asset(failure.to_string());

        let mut archive = match upload {
            GoodsUpload::Archive(file) => Some(open_archive(file).ok_or_else(fail)?),
            _ => None,
        };

        let slug = slugify(folder_name);
        let link = self.config.goods_link(&slug);
        let goods_root = self.config.goods_root();
        let target = goods_root.join(&slug);

        if let Err(err) = fs::create_dir_all(&goods_root) {
            tracing::error!("failed to create goods directory {}: {}", goods_root.display(), err);
            return Err(fail());
        }

        if let Some(old) = old_path.filter(|old| !old.is_empty() && *old != link) {
            self.delete_folder(old);
        }
        if target.is_dir() {
            remove_tree(&target);
        }
        if let Err(err) = fs::create_dir_all(&target) {
            tracing::error!("failed to create goods folder {}: {}", target.display(), err);
            return Err(fail());
        }

        match (upload, archive.as_mut()) {
            (GoodsUpload::Archive(file), Some(archive)) => {
                if let Err(err) = archive.extract(&target) {
                    tracing::error!("failed to extract {:?}: {}", file.file_name, err);
                    remove_tree(&target);
                    return Err(fail());
                }
            }
            (GoodsUpload::Tree(files), _) => {
                let mut placed = 0usize;
                for file in files {
                    match place_tree_file(&target, file) {
                        Ok(()) => placed += 1,
                        Err(reason) => {
                            tracing::warn!("skipping uploaded file {:?}: {}", file.file_name, reason)
                        }
                    }
                }
                tracing::info!(
                    "directory upload into {}: placed={} skipped={}",
                    link,
                    placed,
                    files.len() - placed
                );
            }
            _ => {}
        }

        Ok(Some(link))
    }

    /// Recursively remove a stored goods folder. Returns whether it is gone.
    pub fn delete_folder(&self, stored: &str) -> bool {
        if stored.is_empty() {
            return false;
        }
        let Some(path) = self
            .config
            .resolve_stored(stored)
            .filter(|path| is_strictly_within(path, &self.config.goods_root()))
        else {
            tracing::warn!("refusing to delete folder outside the goods directory: {:?}", stored);
            return false;
        };
        if !path.is_dir() {
            return false;
        }
        remove_tree(&path) == 0
    }
}

/// True when `path` lies below `root`, never `root` itself.
fn is_strictly_within(path: &Path, root: &Path) -> bool {
    path != root && path.starts_with(root)
}

fn open_archive(file: &UploadedFile) -> Option<zip::ZipArchive<Cursor<&[u8]>>> {
    if let Some(reason) = &file.error {
        tracing::warn!("archive upload {:?} arrived broken: {}", file.file_name, reason);
        return None;
    }
    if !file.has_extension("zip") {
        tracing::warn!("goods archive {:?} is not a .zip file", file.file_name);
        return None;
    }
    match zip::ZipArchive::new(Cursor::new(file.bytes.as_slice())) {
        Ok(archive) => Some(archive),
        Err(err) => {
            tracing::error!("failed to open uploaded ZIP {:?}: {}", file.file_name, err);
            None
        }
    }
}

/// Drop the user-selected root folder from a directory-upload path.
fn strip_upload_root(relative: &str) -> Option<PathBuf> {
    let normalized = relative.replace('\\', "/");
    let rest = match normalized.split_once('/') {
        Some((_, rest)) => rest,
        None => normalized.as_str(),
    };
    safe_relative(rest).filter(|p| !p.as_os_str().is_empty())
}

fn place_tree_file(target: &Path, file: &UploadedFile) -> std::result::Result<(), String> {
    if let Some(reason) = &file.error {
        return Err(reason.clone());
    }
    let relative = strip_upload_root(&file.file_name)
        .ok_or_else(|| "unusable relative path".to_string())?;
    let destination = target.join(relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create subdirectory {}: {}", parent.display(), e))?;
    }
    fs::write(&destination, &file.bytes)
        .map_err(|e| format!("failed to write {}: {}", destination.display(), e))
}

/// Bottom-up removal that keeps going past individual failures. Returns the failure count.
fn remove_tree(dir: &Path) -> usize {
    let mut failures = 0;
    for entry in WalkDir::new(dir).follow_links(false).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("failed to walk {}: {}", dir.display(), err);
                failures += 1;
                continue;
            }
        };
        let path = entry.path();
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        if let Err(err) = removed {
            tracing::warn!("failed to delete {}: {}", path.display(), err);
            failures += 1;
        }
    }
    failures
}
