// AssetLens - core/sequence.rs
//
// Frame-sequence detection and collapsed-path notation.
//
// A sequence is any file name carrying a number element; the number closest
// to the extension is the frame number:
//
//   shot_v002.0001.exr   prefix "shot_v002."  frame "0001"  ext "exr"
//   render_0010_beauty.png   prefix "render_"  frame "0010"  suffix "_beauty"
//
// Files that share prefix, suffix and extension collapse into one sequence
// whose path uses the notation `prefix<<1-3,5>>suffix.ext`. Sidecar rows of a
// sequence are keyed by its proxy path `prefix<<?>>suffix.ext`, which stays
// stable as frames are added or removed.

use crate::util::constants::{SEQ_END, SEQ_PROXY, SEQ_START};
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn sequence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.*?)(\d+)([^\d\\/]*)\.([A-Za-z][^.]*)$")
            .expect("sequence_regex: invalid regex")
    })
}

/// The four parts of a file path that carries a frame number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMatch<'a> {
    pub prefix: &'a str,
    pub frame: &'a str,
    pub suffix: &'a str,
    pub extension: &'a str,
}

/// Split `path` into prefix, frame, suffix and extension.
///
/// Returns `None` for paths without a number element and for collapsed
/// paths, which no longer carry a single frame.
pub fn detect(path: &str) -> Option<SequenceMatch<'_>> {
    if is_collapsed(path) {
        return None;
    }
    let caps = sequence_regex().captures(path)?;
    Some(SequenceMatch {
        prefix: caps.get(1)?.as_str(),
        frame: caps.get(2)?.as_str(),
        suffix: caps.get(3)?.as_str(),
        extension: caps.get(4)?.as_str(),
    })
}

/// True if `path` uses the `<<range>>` notation.
pub fn is_collapsed(path: &str) -> bool {
    match path.find(SEQ_START) {
        Some(start) => path[start..].contains(SEQ_END),
        None => false,
    }
}

/// Proxy path used to key per-item data of `path`.
///
/// Plain files map to themselves; frames and collapsed sequences map to
/// `prefix<<?>>suffix.ext`.
pub fn proxy_path(path: &str) -> String {
    if let (Some(start), Some(end)) = (path.find(SEQ_START), path.rfind(SEQ_END)) {
        if start < end {
            return format!("{}{SEQ_PROXY}{}", &path[..start], &path[end + SEQ_END.len()..]);
        }
    }
    match detect(path) {
        Some(m) => format!("{}{SEQ_PROXY}{}.{}", m.prefix, m.suffix, m.extension),
        None => path.to_string(),
    }
}

/// Render a set of frame numbers as a compact range string.
///
/// Consecutive runs collapse to `start-end`; every number is zero-padded to
/// `padding` digits. Duplicates are ignored.
///
/// `[1, 2, 3, 5, 7, 8, 9]` with padding 2 renders `01-03,05,07-09`.
pub fn frame_ranges(frames: &[u64], padding: usize) -> String {
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut blocks: Vec<(u64, u64)> = Vec::new();
    for n in sorted {
        match blocks.last_mut() {
            Some((_, end)) if *end + 1 == n => *end = n,
            _ => blocks.push((n, n)),
        }
    }

    blocks
        .iter()
        .map(|&(start, end)| {
            if start == end {
                format!("{start:0padding$}")
            } else {
                format!("{start:0padding$}-{end:0padding$}")
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Sequence layout
// =============================================================================

/// Frame layout of a collapsed sequence Record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    /// Everything before the frame number, including the directory.
    pub prefix: String,
    /// Everything between the frame number and the extension dot.
    pub suffix: String,
    /// Extension without the dot, as found on disk.
    pub extension: String,
    /// Frame numbers as found on disk (padding preserved), sorted numerically.
    pub frames: Vec<String>,
}

impl SequenceInfo {
    fn sort_frames(&mut self) {
        self.frames
            .sort_by(|a, b| frame_number(a).cmp(&frame_number(b)).then_with(|| a.cmp(b)));
        self.frames.dedup();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Digit count of the widest frame on disk.
    pub fn padding(&self) -> usize {
        self.frames.iter().map(String::len).max().unwrap_or(0)
    }

    /// Range notation of the frames, e.g. `0001-0010,0012`.
    pub fn range_string(&self) -> String {
        let numbers: Vec<u64> = self.frames.iter().filter_map(|f| frame_number(f)).collect();
        frame_ranges(&numbers, self.padding())
    }

    /// `prefix<<range>>suffix.ext`
    pub fn collapsed_path(&self) -> PathBuf {
        PathBuf::from(format!(
            "{}{SEQ_START}{}{SEQ_END}{}.{}",
            self.prefix,
            self.range_string(),
            self.suffix,
            self.extension
        ))
    }

    /// `prefix<<?>>suffix.ext`
    pub fn proxy_path(&self) -> String {
        format!(
            "{}{SEQ_PROXY}{}.{}",
            self.prefix, self.suffix, self.extension
        )
    }

    /// Path of the file holding `frame`.
    pub fn frame_path(&self, frame: &str) -> PathBuf {
        PathBuf::from(format!(
            "{}{frame}{}.{}",
            self.prefix, self.suffix, self.extension
        ))
    }

    pub fn frame_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.frames.iter().map(|f| self.frame_path(f))
    }

    pub fn start_path(&self) -> Option<PathBuf> {
        self.frames.first().map(|f| self.frame_path(f))
    }

    pub fn end_path(&self) -> Option<PathBuf> {
        self.frames.last().map(|f| self.frame_path(f))
    }
}

fn frame_number(frame: &str) -> Option<u64> {
    frame.parse().ok()
}

// =============================================================================
// Grouping
// =============================================================================

/// One item produced by grouping a list of files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupedItem {
    /// A file that is not part of a multi-frame sequence.
    Single(PathBuf),
    /// Two or more frames sharing prefix, suffix and extension.
    Sequence(SequenceInfo),
}

/// Collapses numbered files into sequences while preserving first-seen order.
#[derive(Debug, Default)]
pub struct SequenceGrouper {
    items: Vec<Pending>,
    index: HashMap<(String, String, String), usize>,
}

#[derive(Debug)]
enum Pending {
    Single(PathBuf),
    Sequence { first: PathBuf, info: SequenceInfo },
}

impl SequenceGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items the grouping currently produces.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `path`. When the path would start a new item and `limit` items
    /// already exist, nothing is added and `false` is returned.
    pub fn push(&mut self, path: &Path, limit: usize) -> bool {
        let text = path.to_string_lossy();
        let Some(m) = detect(&text) else {
            if self.items.len() >= limit {
                return false;
            }
            self.items.push(Pending::Single(path.to_path_buf()));
            return true;
        };

        let key = (
            m.prefix.to_string(),
            m.suffix.to_string(),
            m.extension.to_lowercase(),
        );
        if let Some(&idx) = self.index.get(&key) {
            if let Pending::Sequence { info, .. } = &mut self.items[idx] {
                info.frames.push(m.frame.to_string());
            }
            return true;
        }

        if self.items.len() >= limit {
            return false;
        }
        self.index.insert(key, self.items.len());
        self.items.push(Pending::Sequence {
            first: path.to_path_buf(),
            info: SequenceInfo {
                prefix: m.prefix.to_string(),
                suffix: m.suffix.to_string(),
                extension: m.extension.to_string(),
                frames: vec![m.frame.to_string()],
            },
        });
        true
    }

    /// Finish grouping. Single-frame sequences become plain files.
    pub fn finish(self) -> Vec<GroupedItem> {
        self.items
            .into_iter()
            .map(|item| match item {
                Pending::Single(path) => GroupedItem::Single(path),
                Pending::Sequence { first, mut info } => {
                    info.sort_frames();
                    if info.len() <= 1 {
                        GroupedItem::Single(first)
                    } else {
                        GroupedItem::Sequence(info)
                    }
                }
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
