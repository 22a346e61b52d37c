// AssetLens - app/processors.rs
//
// Category computations run by the workers.
//
//   Info       stat the backing file(s), format the details string, and merge
//              the sidecar row (description, flags, notes).
//   Thumbnail  decode the source image, resize it, and cache a PNG under
//              `<cache_dir>/<location hash>/<path hash>.png`.
//
// A processor never writes to the Record. It returns an `Update` that the
// worker applies after re-checking the handle, so a result computed for a
// Record whose DataSet was reset meanwhile is simply dropped.

use crate::app::sidecar::{sanitize_hashtags, SidecarStore};
use crate::core::model::{
    Category, DataSetKey, InfoFields, ItemFlags, ItemType, Record, ThumbnailState,
};
use crate::platform::fs::{self, FileStat};
use crate::util::constants;
use crate::util::error::ProcessError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// New field values for one category of a Record.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Info(InfoFields),
    Thumbnail(ThumbnailState),
    /// Nothing to write and nothing to publish.
    Unchanged,
}

/// A category-specific computation.
pub trait Processor: Send + Sync {
    fn category(&self) -> Category;

    /// Compute new values for `record`, which belongs to the DataSet `key`.
    fn compute(&self, key: &DataSetKey, record: &Record) -> Result<Update, ProcessError>;

    /// Value applied when `compute` fails.
    fn fallback(&self, _record: &Record) -> Update {
        Update::Unchanged
    }
}

// =============================================================================
// Info
// =============================================================================

/// Stats files and merges sidecar data.
#[derive(Default)]
pub struct InfoProcessor {
    sidecar: Option<Arc<dyn SidecarStore>>,
}

impl InfoProcessor {
    pub fn new(sidecar: Option<Arc<dyn SidecarStore>>) -> Self {
        Self { sidecar }
    }

    fn stat_sequence(&self, record: &Record) -> Result<(FileStat, usize), ProcessError> {
        let Some(seq) = record.base().sequence.as_ref() else {
            return Err(ProcessError::MissingField {
                category: Category::Info,
                field: "sequence",
            });
        };

        let mut total = FileStat {
            size: 0,
            modified: None,
        };
        let mut found = 0usize;
        let mut first_error = None;
        for frame in seq.frame_paths() {
            match fs::stat(&frame) {
                Ok(st) => {
                    found += 1;
                    total.size += st.size;
                    total.modified = total.modified.max(st.modified);
                }
                Err(e) => {
                    tracing::debug!(path = %frame.display(), error = %e, "Frame stat failed");
                    first_error.get_or_insert((frame, e));
                }
            }
        }

        match (found, first_error) {
            (0, Some((path, source))) => Err(ProcessError::Stat { path, source }),
            _ => Ok((total, seq.len())),
        }
    }
}

impl Processor for InfoProcessor {
    fn category(&self) -> Category {
        Category::Info
    }

    fn compute(&self, _key: &DataSetKey, record: &Record) -> Result<Update, ProcessError> {
        let base = record.base();
        let mut fields = InfoFields::default();

        match base.item_type {
            ItemType::File => {
                let st = fs::stat(&base.path).map_err(|source| ProcessError::Stat {
                    path: base.path.clone(),
                    source,
                })?;
                fields.size = st.size;
                fields.modified = st.modified_local();
                fields.details = format!(
                    "{};{}",
                    fs::format_date(fields.modified),
                    fs::format_bytes(st.size)
                );
            }
            ItemType::Sequence => {
                let (st, frames) = self.stat_sequence(record)?;
                fields.size = st.size;
                fields.modified = st.modified_local();
                fields.details = format!(
                    "{frames}f;{};{}",
                    fs::format_date(fields.modified),
                    fs::format_bytes(st.size)
                );
                if let Some(seq) = &base.sequence {
                    fields.sequence_start_path = seq.start_path();
                    fields.sequence_end_path = seq.end_path();
                    fields.range_path = Some(seq.collapsed_path());
                }
            }
        }

        if let Some(sidecar) = &self.sidecar {
            let proxy = base.proxy_path();
            match sidecar.row(&proxy) {
                Ok(Some(row)) => {
                    fields.description = sanitize_hashtags(&row.description);
                    fields.flags = row.flags;
                    fields.notes = row.notes;
                }
                Ok(None) => {}
                Err(e) => {
                    // Keep the stat results; only the sidecar part is blank.
                    tracing::warn!(path = %proxy, error = %e, "Sidecar lookup failed");
                }
            }
        }

        Ok(Update::Info(fields))
    }
}

// =============================================================================
// Thumbnail
// =============================================================================

/// Settings of the thumbnail computation.
#[derive(Debug, Clone)]
pub struct ThumbnailSettings {
    /// Edge of the square bounding box in pixels.
    pub size: u32,
    /// Sources at or above this size are skipped.
    pub max_source_bytes: u64,
    /// Root of the thumbnail cache.
    pub cache_dir: PathBuf,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            size: constants::DEFAULT_THUMBNAIL_SIZE,
            max_source_bytes: constants::DEFAULT_MAX_THUMBNAIL_SOURCE_BYTES,
            cache_dir: std::env::temp_dir()
                .join(constants::APP_ID)
                .join(constants::THUMBNAIL_DIR_NAME),
        }
    }
}

/// Decodes, resizes and caches thumbnail images.
pub struct ThumbnailProcessor {
    settings: ThumbnailSettings,
}

impl ThumbnailProcessor {
    pub fn new(settings: ThumbnailSettings) -> Self {
        Self { settings }
    }

    /// Cache file for `source` in the DataSet `key`.
    pub fn cache_path(&self, key: &DataSetKey, source: &Path) -> PathBuf {
        let location = blake3::hash(key.location.to_string_lossy().as_bytes());
        let item = blake3::hash(source.to_string_lossy().as_bytes());
        self.settings
            .cache_dir
            .join(location.to_hex().as_str())
            .join(format!("{}.{}", item.to_hex(), constants::THUMBNAIL_EXTENSION))
    }

    fn source_of(record: &Record) -> Option<PathBuf> {
        match &record.base().sequence {
            Some(seq) => seq.start_path(),
            None => Some(record.path().to_path_buf()),
        }
    }
}

impl Processor for ThumbnailProcessor {
    fn category(&self) -> Category {
        Category::Thumbnail
    }

    fn compute(&self, key: &DataSetKey, record: &Record) -> Result<Update, ProcessError> {
        if record.flags().contains(ItemFlags::ARCHIVED) {
            return Ok(Update::Unchanged);
        }
        let Some(source) = Self::source_of(record) else {
            return Ok(Update::Unchanged);
        };
        let supported = ImageFormat::from_path(&source).is_ok_and(|f| f.reading_enabled());
        if !supported {
            tracing::trace!(path = %source.display(), "No decoder for extension");
            return Ok(Update::Unchanged);
        }

        let st = fs::stat(&source).map_err(|e| ProcessError::Stat {
            path: source.clone(),
            source: e,
        })?;
        if st.size >= self.settings.max_source_bytes {
            tracing::debug!(
                path = %source.display(),
                size = st.size,
                limit = self.settings.max_source_bytes,
                "Source too large for a thumbnail"
            );
            return Ok(Update::Unchanged);
        }

        let dest = self.cache_path(key, &source);
        if fs::is_up_to_date(&dest, &st) {
            return Ok(Update::Thumbnail(ThumbnailState::Cached(dest)));
        }

        if let Some(dir) = dest.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ProcessError::CacheDir {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let img = image::open(&source).map_err(|e| ProcessError::Decode {
            path: source.clone(),
            source: e,
        })?;
        let thumb = img.thumbnail(self.settings.size, self.settings.size);

        // Write beside the target and rename so readers never see a partial file.
        let partial = dest.with_extension("partial");
        thumb
            .save_with_format(&partial, ImageFormat::Png)
            .map_err(|e| ProcessError::WriteThumbnail {
                path: partial.clone(),
                source: e,
            })?;
        std::fs::rename(&partial, &dest).map_err(|e| ProcessError::WriteThumbnail {
            path: dest.clone(),
            source: image::ImageError::IoError(e),
        })?;

        tracing::trace!(source = %source.display(), thumbnail = %dest.display(), "Thumbnail written");
        Ok(Update::Thumbnail(ThumbnailState::Cached(dest)))
    }

    fn fallback(&self, _record: &Record) -> Update {
        Update::Thumbnail(ThumbnailState::Fallback)
    }
}

// =============================================================================
// Tests
// =============================================================================
