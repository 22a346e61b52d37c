// AssetLens - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation. Invalid values never abort startup: each produces an
// actionable warning and the built-in default is used instead.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows) and
// Library (macOS) locations.

use crate::core::model::{CategoryConfig, OverflowPolicy, QueuePolicy, SortKey, SortSettings};
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for AssetLens configuration and caches.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Directory holding config.toml (e.g. ~/.config/assetlens/).
    pub config_dir: PathBuf,

    pub data_dir: PathBuf,

    /// Root of derived caches; thumbnails live under `thumbnails/`.
    pub cache_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be
    /// determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let paths = Self {
                config_dir: proj_dirs.config_dir().to_path_buf(),
                data_dir: proj_dirs.data_dir().to_path_buf(),
                cache_dir: proj_dirs.cache_dir().to_path_buf(),
            };
            tracing::debug!(
                config = %paths.config_dir.display(),
                data = %paths.data_dir.display(),
                cache = %paths.cache_dir.display(),
                "Platform paths resolved"
            );
            paths
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback.clone(),
                cache_dir: fallback.join(".cache"),
            }
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.cache_dir.join(constants::THUMBNAIL_DIR_NAME)
    }
}

// =============================================================================
// Raw config.toml shape
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so a newer config file still loads in an older
/// binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub pipeline: PipelineSection,
    pub categories: CategoriesSection,
    pub discovery: DiscoverySection,
    pub thumbnails: ThumbnailsSection,
    pub sort: SortSection,
    pub logging: LoggingSection,
}

/// `[pipeline]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Maximum Records discovered per DataSet.
    pub max_items: Option<usize>,
    /// Discovered entries between cooperative yields; 0 disables yielding.
    pub yield_every: Option<usize>,
    /// Idle worker poll interval in milliseconds.
    pub idle_poll_ms: Option<u64>,
}

/// `[categories.info]` and `[categories.thumbnail]` sections.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CategoriesSection {
    pub info: CategorySection,
    pub thumbnail: CategorySection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CategorySection {
    pub capacity: Option<usize>,
    /// "lifo" or "fifo".
    pub policy: Option<String>,
    /// "drop_oldest" or "reject".
    pub overflow: Option<String>,
    pub preload: Option<bool>,
}

/// `[discovery]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub max_depth: Option<usize>,
    pub recursive: Option<bool>,
    pub include_hidden: Option<bool>,
    /// Extension allow-list without dots; empty means every extension.
    pub extensions: Option<Vec<String>>,
    /// Glob patterns matched against file and directory names.
    pub exclude_patterns: Option<Vec<String>>,
}

/// `[thumbnails]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ThumbnailsSection {
    pub size: Option<u32>,
    pub max_source_bytes: Option<u64>,
    pub cache_dir: Option<String>,
}

/// `[sort]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SortSection {
    /// "name", "modified", "size" or "type".
    pub key: Option<String>,
    pub descending: Option<bool>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "error", "warn", "info", "debug" or "trace".
    pub level: Option<String>,
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Validated application configuration derived from config.toml.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // -- Pipeline --
    pub max_items: usize,
    pub yield_every: usize,
    pub idle_poll_ms: u64,
    pub info: CategoryConfig,
    pub thumbnail: CategoryConfig,

    // -- Discovery --
    pub max_depth: usize,
    pub recursive: bool,
    pub include_hidden: bool,
    pub extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,

    // -- Thumbnails --
    pub thumbnail_size: u32,
    pub max_thumbnail_source_bytes: u64,
    pub thumbnail_cache_dir: PathBuf,

    pub sort: SortSettings,

    /// Logging level string, read before tracing is initialised.
    pub log_level: Option<String>,
}

impl AppConfig {
    /// Info queue capacity that holds every Record of one scope.
    pub fn info_capacity_for(max_items: usize) -> usize {
        max_items
            .saturating_mul(2)
            .saturating_add(constants::QUEUE_MARKER_HEADROOM)
    }

    /// Override the item limit, keeping a derived Info capacity in step.
    pub fn set_max_items(&mut self, max_items: usize) {
        let derived = self.info.capacity == Self::info_capacity_for(self.max_items);
        self.max_items = max_items.clamp(constants::MIN_MAX_ITEMS, constants::ABSOLUTE_MAX_ITEMS);
        if derived {
            self.info.capacity = Self::info_capacity_for(self.max_items);
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_items: constants::DEFAULT_MAX_ITEMS,
            yield_every: constants::DEFAULT_YIELD_EVERY,
            idle_poll_ms: constants::DEFAULT_IDLE_POLL_MS,
            info: CategoryConfig {
                capacity: Self::info_capacity_for(constants::DEFAULT_MAX_ITEMS),
                policy: QueuePolicy::Lifo,
                overflow: OverflowPolicy::Reject,
                preload: true,
            },
            thumbnail: CategoryConfig {
                capacity: constants::DEFAULT_THUMBNAIL_QUEUE_CAPACITY,
                policy: QueuePolicy::Lifo,
                overflow: OverflowPolicy::DropOldest,
                preload: false,
            },
            max_depth: constants::DEFAULT_MAX_DEPTH,
            recursive: true,
            include_hidden: false,
            extensions: Vec::new(),
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            thumbnail_size: constants::DEFAULT_THUMBNAIL_SIZE,
            max_thumbnail_source_bytes: constants::DEFAULT_MAX_THUMBNAIL_SOURCE_BYTES,
            thumbnail_cache_dir: std::env::temp_dir()
                .join(constants::APP_ID)
                .join(constants::THUMBNAIL_DIR_NAME),
            sort: SortSettings::default(),
            log_level: None,
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Load and validate config.toml from `paths.config_dir`.
///
/// Returns the validated config and a list of non-fatal warnings. A missing
/// file yields defaults with no warnings (first run). An unreadable or
/// unparseable file yields defaults plus one warning.
pub fn load_config(paths: &PlatformPaths) -> (AppConfig, Vec<String>) {
    let config_path = paths.config_file();
    let mut defaults = AppConfig::default();
    defaults.thumbnail_cache_dir = paths.thumbnail_dir();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (defaults, Vec::new());
    }

    let raw = match read_raw(&config_path) {
        Ok(raw) => raw,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            return (defaults, vec![msg]);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    let (config, warnings) = validate(raw, defaults);
    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }
    (config, warnings)
}

/// Read and parse one config file.
pub fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Validate every field of `raw` on top of `base`, accumulating warnings.
pub fn validate(raw: RawConfig, base: AppConfig) -> (AppConfig, Vec<String>) {
    let mut config = base;
    let mut warnings: Vec<String> = Vec::new();

    // -- Pipeline --
    if let Some(items) = raw.pipeline.max_items {
        if (constants::MIN_MAX_ITEMS..=constants::ABSOLUTE_MAX_ITEMS).contains(&items) {
            config.set_max_items(items);
        } else {
            warnings.push(out_of_range(
                "[pipeline] max_items",
                items,
                constants::MIN_MAX_ITEMS,
                constants::ABSOLUTE_MAX_ITEMS,
                constants::DEFAULT_MAX_ITEMS,
            ));
        }
    }

    if let Some(every) = raw.pipeline.yield_every {
        if every <= constants::ABSOLUTE_MAX_ITEMS {
            config.yield_every = every;
        } else {
            warnings.push(out_of_range(
                "[pipeline] yield_every",
                every,
                0,
                constants::ABSOLUTE_MAX_ITEMS,
                constants::DEFAULT_YIELD_EVERY,
            ));
        }
    }

    if let Some(ms) = raw.pipeline.idle_poll_ms {
        if (constants::MIN_IDLE_POLL_MS..=constants::MAX_IDLE_POLL_MS).contains(&ms) {
            config.idle_poll_ms = ms;
        } else {
            warnings.push(out_of_range(
                "[pipeline] idle_poll_ms",
                ms,
                constants::MIN_IDLE_POLL_MS,
                constants::MAX_IDLE_POLL_MS,
                constants::DEFAULT_IDLE_POLL_MS,
            ));
        }
    }

    // -- Categories --
    apply_category("info", &raw.categories.info, &mut config.info, &mut warnings);
    apply_category(
        "thumbnail",
        &raw.categories.thumbnail,
        &mut config.thumbnail,
        &mut warnings,
    );

    // -- Discovery --
    if let Some(depth) = raw.discovery.max_depth {
        if (1..=constants::ABSOLUTE_MAX_DEPTH).contains(&depth) {
            config.max_depth = depth;
        } else {
            warnings.push(out_of_range(
                "[discovery] max_depth",
                depth,
                1,
                constants::ABSOLUTE_MAX_DEPTH,
                constants::DEFAULT_MAX_DEPTH,
            ));
        }
    }
    if let Some(recursive) = raw.discovery.recursive {
        config.recursive = recursive;
    }
    if let Some(hidden) = raw.discovery.include_hidden {
        config.include_hidden = hidden;
    }
    if let Some(exts) = raw.discovery.extensions {
        config.extensions = exts
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
    }
    if let Some(patterns) = raw.discovery.exclude_patterns {
        let (valid, invalid): (Vec<String>, Vec<String>) = patterns
            .into_iter()
            .partition(|p| glob::Pattern::new(p).is_ok());
        for p in invalid {
            warnings.push(format!(
                "[discovery] exclude_patterns entry \"{p}\" is not a valid glob. Ignoring it."
            ));
        }
        config.exclude_patterns = valid;
    }

    // -- Thumbnails --
    if let Some(size) = raw.thumbnails.size {
        if (constants::MIN_THUMBNAIL_SIZE..=constants::MAX_THUMBNAIL_SIZE).contains(&size) {
            config.thumbnail_size = size;
        } else {
            warnings.push(out_of_range(
                "[thumbnails] size",
                size,
                constants::MIN_THUMBNAIL_SIZE,
                constants::MAX_THUMBNAIL_SIZE,
                constants::DEFAULT_THUMBNAIL_SIZE,
            ));
        }
    }
    if let Some(bytes) = raw.thumbnails.max_source_bytes {
        if bytes > 0 {
            config.max_thumbnail_source_bytes = bytes;
        } else {
            warnings.push(format!(
                "[thumbnails] max_source_bytes must be positive. Using default ({}).",
                constants::DEFAULT_MAX_THUMBNAIL_SOURCE_BYTES
            ));
        }
    }
    if let Some(dir) = raw.thumbnails.cache_dir {
        if !dir.trim().is_empty() {
            config.thumbnail_cache_dir = PathBuf::from(dir);
        }
    }

    // -- Sort --
    if let Some(ref key) = raw.sort.key {
        match SortKey::parse(key) {
            Some(k) => config.sort.key = k,
            None => warnings.push(format!(
                "[sort] key = \"{key}\" is not recognised. \
                 Valid values: name, modified, size, type. Using default (name).",
            )),
        }
    }
    if let Some(descending) = raw.sort.descending {
        config.sort.descending = descending;
    }

    // -- Logging --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default ({}).",
                constants::DEFAULT_LOG_LEVEL,
            ));
        }
    }

    (config, warnings)
}

fn apply_category(
    name: &str,
    section: &CategorySection,
    target: &mut CategoryConfig,
    warnings: &mut Vec<String>,
) {
    let max_capacity = AppConfig::info_capacity_for(constants::ABSOLUTE_MAX_ITEMS);
    if let Some(capacity) = section.capacity {
        if (constants::MIN_QUEUE_CAPACITY..=max_capacity).contains(&capacity) {
            target.capacity = capacity;
        } else {
            warnings.push(out_of_range(
                &format!("[categories.{name}] capacity"),
                capacity,
                constants::MIN_QUEUE_CAPACITY,
                max_capacity,
                target.capacity,
            ));
        }
    }
    if let Some(ref policy) = section.policy {
        match QueuePolicy::parse(policy) {
            Some(p) => target.policy = p,
            None => warnings.push(format!(
                "[categories.{name}] policy = \"{policy}\" is not recognised. \
                 Expected \"lifo\" or \"fifo\". Keeping default.",
            )),
        }
    }
    if let Some(ref overflow) = section.overflow {
        match OverflowPolicy::parse(overflow) {
            Some(o) => target.overflow = o,
            None => warnings.push(format!(
                "[categories.{name}] overflow = \"{overflow}\" is not recognised. \
                 Expected \"drop_oldest\" or \"reject\". Keeping default.",
            )),
        }
    }
    if let Some(preload) = section.preload {
        target.preload = preload;
    }
}

fn out_of_range<T: std::fmt::Display>(field: &str, value: T, min: T, max: T, default: T) -> String {
    format!("{field} = {value} is out of range ({min}-{max}). Using default ({default}).")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &Path) -> PlatformPaths {
        PlatformPaths {
            config_dir: dir.to_path_buf(),
            data_dir: dir.join("data"),
            cache_dir: dir.join("cache"),
        }
    }

    fn parse(toml_text: &str) -> (AppConfig, Vec<String>) {
        let raw: RawConfig = toml::from_str(toml_text).expect("valid toml");
        validate(raw, AppConfig::default())
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (config, warnings) = load_config(&paths_in(dir.path()));
        assert!(warnings.is_empty());
        assert_eq!(config.max_items, constants::DEFAULT_MAX_ITEMS);
        assert_eq!(config.thumbnail_cache_dir, dir.path().join("cache").join("thumbnails"));
    }

    #[test]
    fn test_unparseable_file_warns_and_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("config.toml"), "[pipeline\nmax_items = ")
            .expect("write");
        let (config, warnings) = load_config(&paths_in(dir.path()));
        assert_eq!(warnings.len(), 1, "one parse warning: {warnings:?}");
        assert_eq!(config.max_items, constants::DEFAULT_MAX_ITEMS);
    }

    #[test]
    fn test_valid_sections_apply() {
        let (config, warnings) = parse(
            r#"
            [pipeline]
            max_items = 500
            idle_poll_ms = 20

            [categories.thumbnail]
            capacity = 10
            policy = "fifo"
            overflow = "reject"

            [discovery]
            extensions = [".PNG", "exr"]

            [sort]
            key = "size"
            descending = true

            [logging]
            level = "DEBUG"
            "#,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(config.max_items, 500);
        assert_eq!(config.info.capacity, 2 * 500 + constants::QUEUE_MARKER_HEADROOM);
        assert_eq!(config.idle_poll_ms, 20);
        assert_eq!(config.thumbnail.capacity, 10);
        assert_eq!(config.thumbnail.policy, QueuePolicy::Fifo);
        assert_eq!(config.thumbnail.overflow, OverflowPolicy::Reject);
        assert_eq!(config.extensions, vec!["png".to_string(), "exr".to_string()]);
        assert_eq!(config.sort.key, SortKey::Size);
        assert!(config.sort.descending);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let (config, warnings) = parse(
            r#"
            [pipeline]
            max_items = 0

            [categories.info]
            capacity = 0
            policy = "random"

            [thumbnails]
            size = 4

            [sort]
            key = "colour"
            "#,
        );
        assert_eq!(warnings.len(), 5, "one warning per bad value: {warnings:?}");
        assert_eq!(config.max_items, constants::DEFAULT_MAX_ITEMS);
        assert_eq!(config.info.policy, QueuePolicy::Lifo);
        assert_eq!(config.thumbnail_size, constants::DEFAULT_THUMBNAIL_SIZE);
        assert_eq!(config.sort.key, SortKey::Name);
    }

    #[test]
    fn test_explicit_info_capacity_survives_max_items_override() {
        let (mut config, _) = parse("[categories.info]\ncapacity = 50\n");
        config.set_max_items(10);
        assert_eq!(config.info.capacity, 50);
        assert_eq!(config.max_items, 10);
    }

    #[test]
    fn test_invalid_glob_is_dropped() {
        let (config, warnings) = parse("[discovery]\nexclude_patterns = [\"*.tmp\", \"[\"]\n");
        assert_eq!(config.exclude_patterns, vec!["*.tmp".to_string()]);
        assert_eq!(warnings.len(), 1);
    }
}
