// AssetLens - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every configurable value has a default and a hard bound here so that
// config validation and the pipeline agree on the same numbers.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "AssetLens";

/// Application identifier used for config/data/cache directories.
pub const APP_ID: &str = "AssetLens";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// DataSet limits
// =============================================================================

/// Default maximum number of Records discovered into a single DataSet.
pub const DEFAULT_MAX_ITEMS: usize = 100_000;

/// Minimum sensible value for the max-items limit.
pub const MIN_MAX_ITEMS: usize = 1;

/// Hard upper bound on max items (prevents configuration mistakes).
pub const ABSOLUTE_MAX_ITEMS: usize = 1_000_000;

/// Default directory recursion depth for discovery.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Hard upper bound on max depth (prevents runaway traversal).
pub const ABSOLUTE_MAX_DEPTH: usize = 128;

/// Number of discovered entries between two cooperative-yield callbacks.
/// 0 disables the callback.
pub const DEFAULT_YIELD_EVERY: usize = 987;

/// Maximum number of non-fatal warnings kept per discovery run.
pub const MAX_DISCOVERY_WARNINGS: usize = 1_000;

/// Timeout for the pre-flight metadata check of the discovery root.
/// Network shares can stall `fs::metadata` for tens of seconds.
pub const PREFLIGHT_TIMEOUT_SECS: u64 = 10;

/// File names that are never listed, regardless of the hidden-file setting.
pub const ALWAYS_SKIPPED_FILE_NAMES: &[&str] = &["thumbs.db", ".ds_store", "desktop.ini"];

/// Default exclude glob patterns (matched against file and directory names).
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["*.tmp", "*.bak", ".git", "__pycache__"];

/// Row height hint (px) given to list views for every discovered Record.
pub const DEFAULT_ROW_HEIGHT: u32 = 64;

// =============================================================================
// Queue and worker limits
// =============================================================================

/// Default capacity of the thumbnail queue. Only visible rows plus a small
/// margin are ever requested, so a short queue is enough.
pub const DEFAULT_THUMBNAIL_QUEUE_CAPACITY: usize = 99;

/// Minimum user-configurable queue capacity.
pub const MIN_QUEUE_CAPACITY: usize = 1;

/// Extra queue slots above `2 * max_items` reserved for end-of-dataset markers.
pub const QUEUE_MARKER_HEADROOM: usize = 8;

/// How long an idle worker sleeps before re-checking its queue and the
/// shutdown flag (ms). Enqueues wake the worker immediately.
pub const DEFAULT_IDLE_POLL_MS: u64 = 50;

/// Minimum user-configurable idle poll interval (ms).
pub const MIN_IDLE_POLL_MS: u64 = 1;

/// Maximum user-configurable idle poll interval (ms).
pub const MAX_IDLE_POLL_MS: u64 = 5_000;

/// Default bound of each event subscriber's channel.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 4_096;

/// Number of rows enqueued above and below the visible range.
pub const DEFAULT_VISIBLE_MARGIN: usize = 8;

// =============================================================================
// Thumbnails
// =============================================================================

/// Default thumbnail edge length in pixels (square bounding box).
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Minimum user-configurable thumbnail size (px).
pub const MIN_THUMBNAIL_SIZE: u32 = 16;

/// Maximum user-configurable thumbnail size (px).
pub const MAX_THUMBNAIL_SIZE: u32 = 2_048;

/// Source images at or above this size are never decoded for thumbnails.
pub const DEFAULT_MAX_THUMBNAIL_SOURCE_BYTES: u64 = 2 * 1024 * 1024 * 1024; // 2 GiB

/// Thumbnail cache subdirectory name below the platform cache directory.
pub const THUMBNAIL_DIR_NAME: &str = "thumbnails";

/// File extension of generated thumbnails.
pub const THUMBNAIL_EXTENSION: &str = "png";

// =============================================================================
// Sequences
// =============================================================================

/// Opening delimiter of a collapsed sequence range.
pub const SEQ_START: &str = "<<";

/// Closing delimiter of a collapsed sequence range.
pub const SEQ_END: &str = ">>";

/// Placeholder range used for sequence proxy paths (sidecar lookups).
pub const SEQ_PROXY: &str = "<<?>>";

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default sidecar file name looked up in a location root by the CLI.
pub const SIDECAR_FILE_NAME: &str = ".assetlens.json";
