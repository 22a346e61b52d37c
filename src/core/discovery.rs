// AssetLens - core/discovery.rs
//
// Discovery Stage: enumerates an entry source into a DataSet with cheap,
// immediately available fields (names, sort keys, seeded flags).
//
// Architecture note: discovery is synchronous on the caller's thread. It
// never stats or opens files; size, dates and sidecar data are the Info
// worker's job. An embedding single-threaded UI can stay responsive through
// the `on_yield` callback, which runs every `yield_every` accepted entries.
//
// Error policy:
//   - A source that cannot be enumerated at all (missing root, not a
//     directory, permission denied, pre-flight timeout) aborts the call.
//   - Per-entry errors are non-fatal: logged at debug, collected as bounded
//     warnings, and the entry is skipped.
//   - Reaching `max_items` stops discovery silently; the DataSet is marked
//     truncated and keeps the first `max_items` items in enumeration order.
//   - The interrupt flag is checked before every entry.

use crate::core::dataset::DataSet;
use crate::core::model::{BaseFields, DataKind, ItemFlags, ItemType, Record};
use crate::core::sequence::{GroupedItem, SequenceGrouper, SequenceInfo};
use crate::util::constants;
use crate::util::error::DiscoveryError;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// =============================================================================
// Configuration
// =============================================================================

/// Limits and filters applied while enumerating a source.
#[derive(Debug, Clone)]
pub struct DiscoveryLimits {
    /// Maximum number of Records inserted into the DataSet.
    pub max_items: usize,

    /// Maximum directory recursion depth (ignored when not recursive).
    pub max_depth: usize,

    /// Descend into subdirectories of the task root.
    pub recursive: bool,

    /// List dot-files and descend into dot-directories.
    pub include_hidden: bool,

    /// Lowercase extensions (no dot) to accept. Empty accepts every extension.
    pub extensions: Vec<String>,

    /// Glob patterns matched against file names and literal directory names.
    pub exclude_patterns: Vec<String>,

    /// Accepted entries between two `on_yield` callbacks. 0 disables it.
    pub yield_every: usize,
}

impl Default for DiscoveryLimits {
    fn default() -> Self {
        Self {
            max_items: constants::DEFAULT_MAX_ITEMS,
            max_depth: constants::DEFAULT_MAX_DEPTH,
            recursive: true,
            include_hidden: false,
            extensions: Vec::new(),
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            yield_every: constants::DEFAULT_YIELD_EVERY,
        }
    }
}

/// Already-known predicates used to seed Record flags during discovery.
///
/// Paths are matched by their proxy form so sequences keep their flags as
/// frames come and go.
#[derive(Debug, Clone, Default)]
pub struct FlagSeeds {
    pub favourites: HashSet<String>,
    pub active: HashSet<String>,
}

impl FlagSeeds {
    pub fn flags_for(&self, proxy: &str) -> ItemFlags {
        let mut flags = ItemFlags::DEFAULT;
        if self.favourites.contains(proxy) {
            flags |= ItemFlags::FAVOURITE;
        }
        if self.active.contains(proxy) {
            flags |= ItemFlags::ACTIVE;
        }
        flags
    }
}

/// Summary of one discovery call.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Records inserted into the DataSet.
    pub inserted: usize,
    /// Entries rejected by filters or unreadable.
    pub skipped: usize,
    /// Stopped at `max_items`.
    pub truncated: bool,
    /// Stopped by the interrupt flag; the DataSet is unfinished.
    pub interrupted: bool,
    /// Non-fatal per-entry problems, bounded.
    pub warnings: Vec<String>,
}

// =============================================================================
// Entry sources
// =============================================================================

/// Iterator of raw entry paths produced by a source.
pub type EntryIter<'a> = Box<dyn Iterator<Item = Result<PathBuf, DiscoveryError>> + 'a>;

/// An external enumerable source of items.
pub trait EntrySource: Send + Sync {
    /// Directory display names are made relative to.
    fn root(&self) -> &Path;

    /// Start enumerating. Errors returned here are top-level failures.
    fn entries(&self, limits: &DiscoveryLimits) -> Result<EntryIter<'_>, DiscoveryError>;
}

/// Real filesystem source backed by `walkdir`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl EntrySource for DirectorySource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn entries(&self, limits: &DiscoveryLimits) -> Result<EntryIter<'_>, DiscoveryError> {
        preflight(&self.root)?;

        let max_depth = if limits.recursive {
            limits.max_depth.clamp(1, constants::ABSOLUTE_MAX_DEPTH)
        } else {
            1
        };
        let exclude_pats = compile_patterns(&limits.exclude_patterns);
        let include_hidden = limits.include_hidden;

        let walker = walkdir::WalkDir::new(&self.root)
            .max_depth(max_depth)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| {
                // Prune hidden and excluded directories before descending.
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_str().unwrap_or("");
                if !include_hidden && name.starts_with('.') {
                    return false;
                }
                !is_excluded_component(name, &exclude_pats)
            })
            .filter_map(|entry| match entry {
                Ok(e) if e.file_type().is_dir() => None,
                Ok(e) => Some(Ok(e.into_path())),
                Err(source) => Some(Err(DiscoveryError::Entry {
                    path: source.path().map(Path::to_path_buf),
                    source,
                })),
            });

        Ok(Box::new(walker))
    }
}

/// In-memory source with a fixed list of paths, enumerated in order.
#[derive(Debug, Clone)]
pub struct MemorySource {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl MemorySource {
    pub fn new(root: impl Into<PathBuf>, paths: Vec<PathBuf>) -> Self {
        Self {
            root: root.into(),
            paths,
        }
    }

    /// `count` synthetic files named `item_000000.<ext>` under `root`.
    pub fn synthetic(root: impl Into<PathBuf>, count: usize, ext: &str) -> Self {
        let root = root.into();
        let paths = (0..count)
            .map(|i| root.join(format!("item_{i:06}.{ext}")))
            .collect();
        Self { root, paths }
    }
}

impl EntrySource for MemorySource {
    fn root(&self) -> &Path {
        &self.root
    }

    fn entries(&self, _limits: &DiscoveryLimits) -> Result<EntryIter<'_>, DiscoveryError> {
        Ok(Box::new(self.paths.iter().cloned().map(Ok)))
    }
}

/// Check that `root` exists and is a readable directory.
///
/// The metadata call runs on a helper thread with a deadline: on an
/// unreachable network share `fs::metadata` can block far longer than a
/// browser should wait. `fs::metadata` is used rather than `Path::is_dir`
/// so that permission errors stay distinguishable from missing paths.
fn preflight(root: &Path) -> Result<(), DiscoveryError> {
    enum Preflight {
        IsDirectory,
        IsFile,
        NotFound,
        AccessDenied(std::io::Error),
    }

    let root_buf = root.to_path_buf();
    let (tx, rx) = std::sync::mpsc::channel::<Preflight>();
    std::thread::spawn(move || {
        let result = match std::fs::metadata(&root_buf) {
            Ok(meta) if meta.is_dir() => Preflight::IsDirectory,
            Ok(_) => Preflight::IsFile,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Preflight::AccessDenied(e)
            }
            Err(_) => Preflight::NotFound,
        };
        let _ = tx.send(result);
    });

    match rx.recv_timeout(Duration::from_secs(constants::PREFLIGHT_TIMEOUT_SECS)) {
        Ok(Preflight::IsDirectory) => Ok(()),
        Ok(Preflight::IsFile) => Err(DiscoveryError::NotADirectory {
            path: root.to_path_buf(),
        }),
        Ok(Preflight::NotFound) => Err(DiscoveryError::RootNotFound {
            path: root.to_path_buf(),
        }),
        Ok(Preflight::AccessDenied(source)) => Err(DiscoveryError::PermissionDenied {
            path: root.to_path_buf(),
            source,
        }),
        Err(_) => {
            tracing::warn!(
                root = %root.display(),
                timeout_secs = constants::PREFLIGHT_TIMEOUT_SECS,
                "Pre-flight path check timed out"
            );
            Err(DiscoveryError::Timeout {
                path: root.to_path_buf(),
                timeout_secs: constants::PREFLIGHT_TIMEOUT_SECS,
            })
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Enumerate `source` into `dataset`.
///
/// The DataSet's kind selects the Record layout: one Record per file, or
/// numbered files collapsed into sequences. Records are appended at the
/// next index; the DataSet is never cleared here.
///
/// On a clean finish `refresh_needed` is cleared. An interrupted or failed
/// call leaves the DataSet unfinished.
pub fn discover(
    source: &dyn EntrySource,
    dataset: &DataSet,
    limits: &DiscoveryLimits,
    seeds: &FlagSeeds,
    interrupt: &AtomicBool,
    on_yield: &mut dyn FnMut(usize),
) -> Result<DiscoveryOutcome, DiscoveryError> {
    let root = source.root();
    let kind = dataset.key().kind;
    let max_items = limits
        .max_items
        .clamp(constants::MIN_MAX_ITEMS, constants::ABSOLUTE_MAX_ITEMS);

    tracing::debug!(
        root = %root.display(),
        key = %dataset.key(),
        max_items,
        recursive = limits.recursive,
        extensions = ?limits.extensions,
        exclude = ?limits.exclude_patterns,
        "Discovery starting"
    );

    let entries = source.entries(limits).map_err(|e| {
        tracing::warn!(root = %root.display(), error = %e, "Discovery aborted");
        e
    })?;

    let filter = EntryFilter::new(limits);
    let mut outcome = DiscoveryOutcome::default();
    let mut grouper = SequenceGrouper::new();
    let mut accepted = 0usize;

    for entry in entries {
        if interrupt.load(Ordering::Acquire) {
            tracing::debug!(key = %dataset.key(), accepted, "Discovery interrupted");
            outcome.interrupted = true;
            break;
        }

        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!(error = %e, "Discovery entry skipped");
                outcome.skipped += 1;
                push_warning(&mut outcome.warnings, e.to_string());
                continue;
            }
        };

        if !filter.accepts(root, &path) {
            tracing::trace!(file = %path.display(), "Filtered out");
            outcome.skipped += 1;
            continue;
        }

        match kind {
            DataKind::File => {
                if dataset.len() >= max_items {
                    outcome.truncated = true;
                    break;
                }
                let base = file_fields(root, &path, seeds);
                dataset.insert_with(|id| Record::new(id, base));
                outcome.inserted += 1;
            }
            DataKind::Sequence => {
                if !grouper.push(&path, max_items.saturating_sub(dataset.len())) {
                    outcome.truncated = true;
                    break;
                }
            }
        }

        accepted += 1;
        if limits.yield_every > 0 && accepted % limits.yield_every == 0 {
            on_yield(accepted);
        }
    }

    if kind == DataKind::Sequence && !outcome.interrupted {
        for item in grouper.finish() {
            if interrupt.load(Ordering::Acquire) {
                outcome.interrupted = true;
                break;
            }
            let base = match &item {
                GroupedItem::Single(path) => file_fields(root, path, seeds),
                GroupedItem::Sequence(info) => sequence_fields(root, info, seeds),
            };
            dataset.insert_with(|id| Record::new(id, base));
            outcome.inserted += 1;
        }
    }

    if outcome.truncated {
        tracing::info!(
            key = %dataset.key(),
            limit = max_items,
            "Discovery stopped at the item limit"
        );
    }

    if !outcome.interrupted {
        dataset.set_truncated(outcome.truncated);
        dataset.set_refresh_needed(false);
    }

    tracing::debug!(
        key = %dataset.key(),
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        truncated = outcome.truncated,
        interrupted = outcome.interrupted,
        warnings = outcome.warnings.len(),
        "Discovery complete"
    );

    Ok(outcome)
}

fn push_warning(warnings: &mut Vec<String>, msg: String) {
    if warnings.len() < constants::MAX_DISCOVERY_WARNINGS {
        warnings.push(msg);
    }
}

// =============================================================================
// Record construction
// =============================================================================

/// Path relative to `root` with `/` separators, and its parent segments.
fn relative_parts(root: &Path, path: &Path) -> (String, Vec<String>) {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let parents = parts[..parts.len().saturating_sub(1)].to_vec();
    (parts.join("/"), parents)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_fields(root: &Path, path: &Path, seeds: &FlagSeeds) -> BaseFields {
    let (display_name, parent_segments) = relative_parts(root, path);
    BaseFields {
        path: path.to_path_buf(),
        display_name,
        edit_name: file_name_of(path),
        extension: extension_of(path),
        parent_segments,
        item_type: ItemType::File,
        sequence: None,
        flags: seeds.flags_for(&path.to_string_lossy()),
        row_height: constants::DEFAULT_ROW_HEIGHT,
    }
}

fn sequence_fields(root: &Path, info: &SequenceInfo, seeds: &FlagSeeds) -> BaseFields {
    let path = info.collapsed_path();
    let (display_name, parent_segments) = relative_parts(root, &path);
    BaseFields {
        display_name,
        edit_name: file_name_of(&path),
        extension: info.extension.to_lowercase(),
        parent_segments,
        item_type: ItemType::Sequence,
        flags: seeds.flags_for(&info.proxy_path()),
        sequence: Some(info.clone()),
        path,
        row_height: constants::DEFAULT_ROW_HEIGHT,
    }
}

// =============================================================================
// Entry filtering
// =============================================================================

struct EntryFilter {
    include_hidden: bool,
    extensions: HashSet<String>,
    exclude_pats: Vec<glob::Pattern>,
}

impl EntryFilter {
    fn new(limits: &DiscoveryLimits) -> Self {
        Self {
            include_hidden: limits.include_hidden,
            extensions: limits
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_pats: compile_patterns(&limits.exclude_patterns),
        }
    }

    fn accepts(&self, root: &Path, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        let lower = file_name.to_lowercase();
        if constants::ALWAYS_SKIPPED_FILE_NAMES.contains(&lower.as_str()) {
            return false;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        let mut dirs = rel.parent().into_iter().flat_map(Path::components);
        if !self.include_hidden {
            if file_name.starts_with('.') {
                return false;
            }
            let hidden_dir = dirs.any(|c| match c {
                Component::Normal(s) => s.to_string_lossy().starts_with('.'),
                _ => false,
            });
            if hidden_dir {
                return false;
            }
        }

        let ext = extension_of(path);
        if ext.is_empty() {
            return false;
        }
        if !self.extensions.is_empty() && !self.extensions.contains(&ext) {
            return false;
        }

        if self.exclude_pats.iter().any(|p| p.matches(file_name)) {
            return false;
        }
        let excluded_dir = rel
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .any(|c| match c {
                Component::Normal(s) => {
                    is_excluded_component(&s.to_string_lossy(), &self.exclude_pats)
                }
                _ => false,
            });
        !excluded_dir
    }
}

/// Compile glob patterns, logging and skipping any that fail.
fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(compiled) => Some(compiled),
            Err(e) => {
                tracing::warn!(pattern = p, error = %e, "Invalid exclude pattern, skipping");
                None
            }
        })
        .collect()
}

/// Literal patterns (no wildcards) double as directory-name exclusions.
fn is_excluded_component(dir_name: &str, exclude_pats: &[glob::Pattern]) -> bool {
    exclude_pats.iter().any(|p| {
        let s = p.as_str();
        !s.contains('*') && !s.contains('?') && !s.contains('[') && p.matches(dir_name)
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::GenerationSlot;
    use crate::core::model::DataSetKey;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn dataset(root: &Path, kind: DataKind) -> DataSet {
        DataSet::new(
            DataSetKey::new(root, "", kind),
            Arc::new(GenerationSlot::new()),
        )
    }

    fn run(source: &dyn EntrySource, ds: &DataSet, limits: &DiscoveryLimits) -> DiscoveryOutcome {
        let interrupt = AtomicBool::new(false);
        discover(source, ds, limits, &FlagSeeds::default(), &interrupt, &mut |_| {})
            .expect("discovery should succeed")
    }

    fn names(ds: &DataSet) -> Vec<String> {
        ds.rows()
            .iter()
            .map(|r| r.base().display_name.clone())
            .collect()
    }

    fn make_temp_tree() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::write(root.join("a.png"), b"x").expect("write a.png");
        fs::write(root.join("b.exr"), b"x").expect("write b.exr");
        fs::write(root.join(".hidden.png"), b"x").expect("write hidden");
        fs::write(root.join("Thumbs.db"), b"x").expect("write thumbs");
        fs::write(root.join("README"), b"x").expect("write no-ext");
        fs::write(root.join("scratch.tmp"), b"x").expect("write tmp");

        let sub = root.join("shots");
        fs::create_dir(&sub).expect("mkdir shots");
        for f in ["sh.0001.exr", "sh.0002.exr", "sh.0003.exr"] {
            fs::write(sub.join(f), b"x").expect("write frame");
        }

        let git = root.join(".git");
        fs::create_dir(&git).expect("mkdir .git");
        fs::write(git.join("index.png"), b"x").expect("write git file");
        dir
    }

    #[test]
    fn test_discovers_files_and_skips_hidden_excluded() {
        let dir = make_temp_tree();
        let ds = dataset(dir.path(), DataKind::File);
        let outcome = run(
            &DirectorySource::new(dir.path()),
            &ds,
            &DiscoveryLimits::default(),
        );

        let names = names(&ds);
        assert_eq!(
            names,
            vec![
                "a.png",
                "b.exr",
                "shots/sh.0001.exr",
                "shots/sh.0002.exr",
                "shots/sh.0003.exr"
            ],
            "unexpected listing"
        );
        assert_eq!(outcome.inserted, 5);
        assert!(!outcome.truncated);
        assert!(!ds.refresh_needed(), "clean discovery clears refresh flag");

        let frame = ds.record(2).expect("frame record");
        assert_eq!(frame.base().parent_segments, vec!["shots".to_string()]);
        assert_eq!(frame.base().edit_name, "sh.0001.exr");
        assert_eq!(frame.base().extension, "exr");
        assert_eq!(frame.flags(), ItemFlags::DEFAULT);
    }

    #[test]
    fn test_sequence_kind_collapses_frames() {
        let dir = make_temp_tree();
        let ds = dataset(dir.path(), DataKind::Sequence);
        run(
            &DirectorySource::new(dir.path()),
            &ds,
            &DiscoveryLimits::default(),
        );

        let names = names(&ds);
        assert_eq!(names, vec!["a.png", "b.exr", "shots/sh.<<0001-0003>>.exr"]);
        let seq = ds.record(2).expect("sequence record");
        assert_eq!(seq.base().item_type, ItemType::Sequence);
        assert_eq!(seq.base().sequence.as_ref().map(|s| s.len()), Some(3));
    }

    #[test]
    fn test_extension_allow_list_and_non_recursive() {
        let dir = make_temp_tree();
        let ds = dataset(dir.path(), DataKind::File);
        let limits = DiscoveryLimits {
            extensions: vec![".EXR".to_string()],
            recursive: false,
            ..DiscoveryLimits::default()
        };
        run(&DirectorySource::new(dir.path()), &ds, &limits);
        assert_eq!(names(&ds), vec!["b.exr"]);
    }

    #[test]
    fn test_include_hidden() {
        let dir = make_temp_tree();
        let ds = dataset(dir.path(), DataKind::File);
        let limits = DiscoveryLimits {
            include_hidden: true,
            exclude_patterns: Vec::new(),
            ..DiscoveryLimits::default()
        };
        run(&DirectorySource::new(dir.path()), &ds, &limits);
        let names = names(&ds);
        assert!(names.contains(&".hidden.png".to_string()), "got {names:?}");
        assert!(names.contains(&".git/index.png".to_string()), "got {names:?}");
        assert!(
            !names.iter().any(|n| n.eq_ignore_ascii_case("thumbs.db")),
            "thumbs.db is never listed"
        );
    }

    #[test]
    fn test_cap_keeps_first_entries_in_order() {
        let source = MemorySource::synthetic("/virtual", 100_000, "png");
        let ds = dataset(Path::new("/virtual"), DataKind::File);
        let limits = DiscoveryLimits {
            max_items: 50_000,
            ..DiscoveryLimits::default()
        };
        let outcome = run(&source, &ds, &limits);

        assert_eq!(ds.len(), 50_000);
        assert!(outcome.truncated);
        assert!(ds.is_truncated());
        assert_eq!(
            ds.record(0).expect("first").base().display_name,
            "item_000000.png"
        );
        assert_eq!(
            ds.record(49_999).expect("last").base().display_name,
            "item_049999.png"
        );
    }

    #[test]
    fn test_interrupt_halts_within_one_entry() {
        let source = MemorySource::synthetic("/virtual", 10_000, "png");
        let ds = dataset(Path::new("/virtual"), DataKind::File);
        let limits = DiscoveryLimits {
            yield_every: 1,
            ..DiscoveryLimits::default()
        };
        let interrupt = AtomicBool::new(false);
        let mut on_yield = |accepted: usize| {
            if accepted == 100 {
                interrupt.store(true, Ordering::Release);
            }
        };
        let outcome = discover(
            &source,
            &ds,
            &limits,
            &FlagSeeds::default(),
            &interrupt,
            &mut on_yield,
        )
        .expect("discovery");

        assert!(outcome.interrupted);
        assert!(ds.len() <= 101, "inserted {} records after interrupt", ds.len());
        assert!(ds.refresh_needed(), "interrupted discovery stays unfinished");
    }

    #[test]
    fn test_yield_cadence() {
        let source = MemorySource::synthetic("/virtual", 25, "png");
        let ds = dataset(Path::new("/virtual"), DataKind::File);
        let limits = DiscoveryLimits {
            yield_every: 10,
            ..DiscoveryLimits::default()
        };
        let interrupt = AtomicBool::new(false);
        let mut calls = Vec::new();
        discover(
            &source,
            &ds,
            &limits,
            &FlagSeeds::default(),
            &interrupt,
            &mut |n| calls.push(n),
        )
        .expect("discovery");
        assert_eq!(calls, vec![10, 20]);
    }

    #[test]
    fn test_flags_seeded_from_known_predicates() {
        let source = MemorySource::new(
            "/virtual",
            vec![
                PathBuf::from("/virtual/fav.png"),
                PathBuf::from("/virtual/seq.0001.exr"),
                PathBuf::from("/virtual/seq.0002.exr"),
            ],
        );
        let mut seeds = FlagSeeds::default();
        seeds.favourites.insert("/virtual/fav.png".to_string());
        seeds.active.insert("/virtual/seq.<<?>>.exr".to_string());

        let ds = dataset(Path::new("/virtual"), DataKind::Sequence);
        let interrupt = AtomicBool::new(false);
        discover(
            &source,
            &ds,
            &DiscoveryLimits::default(),
            &seeds,
            &interrupt,
            &mut |_| {},
        )
        .expect("discovery");

        assert!(ds
            .record(0)
            .expect("fav")
            .flags()
            .contains(ItemFlags::FAVOURITE));
        assert!(ds
            .record(1)
            .expect("seq")
            .flags()
            .contains(ItemFlags::ACTIVE));
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let ds = dataset(&missing, DataKind::File);
        let interrupt = AtomicBool::new(false);
        let result = discover(
            &DirectorySource::new(&missing),
            &ds,
            &DiscoveryLimits::default(),
            &FlagSeeds::default(),
            &interrupt,
            &mut |_| {},
        );
        assert!(matches!(result, Err(DiscoveryError::RootNotFound { .. })));
        assert!(ds.refresh_needed());
    }

    #[test]
    fn test_file_root_is_not_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("a.png");
        fs::write(&file, b"x").expect("write");
        let source = DirectorySource::new(&file);
        let result = source.entries(&DiscoveryLimits::default());
        assert!(matches!(result, Err(DiscoveryError::NotADirectory { .. })));
    }
}
