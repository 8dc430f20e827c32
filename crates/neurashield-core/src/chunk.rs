//! Token-bounded chunking of Python source files.
//!
//! Turns a preprocessed [`CodeFile`] into [`Chunk`]s, one per top-level
//! class (methods included) and one per top-level function, plus a single
//! `module` chunk holding the code that sits outside every top-level
//! definition.
//!
//! # Oversized units
//!
//! A unit whose estimated token count exceeds `max_tokens` is handled by
//! [`OversizePolicy`]:
//!
//! | Policy | Result |
//! |--------|--------|
//! | `Split` (default) | consecutive line windows within budget, numbered `part = 1..n` |
//! | `Truncate` | the leading lines within budget, flagged `truncated` |
//! | `Keep` | one chunk over budget |
//!
//! Split windows cover every line of the unit, so the union of chunk line
//! ranges covers every definition found during extraction. A single line
//! longer than the budget becomes its own window.
//!
//! # Identity
//!
//! [`chunk_id`] combines a readable slug with a SHA-256 digest of the path,
//! name and line range. Parts of a split unit differ by line range and so
//! get distinct ids.
//!
//! # Example
//!
//! ```rust
//! use neurashield_core::chunk::{chunk_file, ChunkOptions};
//! use neurashield_core::models::{CodeFile, FunctionInfo};
//!
//! let file = CodeFile {
//!     path: "app.py".into(),
//!     absolute_path: "/repo/app.py".into(),
//!     source: "def f():\n    return 1\n".into(),
//!     cleaned_source: None,
//!     complexity_score: 1,
//!     reduction_percentage: 0.0,
//!     functions: vec![FunctionInfo {
//!         name: "f".into(),
//!         line_start: 1,
//!         line_end: 2,
//!         is_async: false,
//!         args: vec![],
//!         class_name: None,
//!         top_level: true,
//!     }],
//!     classes: vec![],
//!     imports: vec![],
//!     loc: 2,
//!     language: "python".into(),
//! };
//! let chunks: Vec<_> = chunk_file(&file, ChunkOptions::default()).collect();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].name, "f");
//! ```

use std::collections::{BTreeSet, VecDeque};
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, ChunkKind, CodeFile, FileMetadata};

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Name given to the chunk of module-level code.
pub const MODULE_CHUNK_NAME: &str = "<module>";

/// Estimate the token count of `text` as `ceil(chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// What to do with a unit that exceeds the token budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizePolicy {
    #[default]
    Split,
    Truncate,
    Keep,
}

impl FromStr for OversizePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split" => Ok(OversizePolicy::Split),
            "truncate" => Ok(OversizePolicy::Truncate),
            "keep" => Ok(OversizePolicy::Keep),
            other => bail!("unknown oversize policy '{}': expected split, truncate, or keep", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_tokens: usize,
    pub oversize: OversizePolicy,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            oversize: OversizePolicy::Split,
        }
    }
}

/// Derive a chunk id: `<slug>_<first 16 hex chars of sha256>`.
pub fn chunk_id(path: &str, name: &str, line_start: usize, line_end: usize) -> String {
    let normalized_path = path.replace('\\', "/");
    let slug: String = format!("{}_{}", normalized_path, name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(normalized_path.as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    hasher.update([0]);
    hasher.update(format!("{}:{}", line_start, line_end).as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{}_{}", slug, &digest[..16])
}

struct Unit {
    kind: ChunkKind,
    name: String,
    class_name: Option<String>,
    is_async: bool,
    /// 0-based line indices, ascending.
    lines: Vec<usize>,
}

/// Lazy iterator over the chunks of one file. Consumed once.
pub struct Chunks<'a> {
    file: &'a CodeFile,
    lines: Vec<&'a str>,
    units: std::vec::IntoIter<Unit>,
    pending: VecDeque<Chunk>,
    opts: ChunkOptions,
    metadata: FileMetadata,
}

/// Chunk a file. Units are produced in source order, module code first.
pub fn chunk_file(file: &CodeFile, opts: ChunkOptions) -> Chunks<'_> {
    let lines: Vec<&str> = file.chunk_source().lines().collect();
    let units = collect_units(file, &lines);
    Chunks {
        file,
        lines,
        units: units.into_iter(),
        pending: VecDeque::new(),
        opts,
        metadata: FileMetadata::from_file(file),
    }
}

fn collect_units(file: &CodeFile, lines: &[&str]) -> Vec<Unit> {
    let last = lines.len();
    let mut defs = Vec::new();

    for class in file.classes.iter().filter(|c| c.top_level) {
        defs.push(Unit {
            kind: ChunkKind::Class,
            name: class.name.clone(),
            class_name: None,
            is_async: false,
            lines: line_span(class.line_start, class.line_end, last),
        });
    }
    for func in file.functions.iter().filter(|f| f.top_level) {
        defs.push(Unit {
            kind: ChunkKind::Function,
            name: func.name.clone(),
            class_name: func.class_name.clone(),
            is_async: func.is_async,
            lines: line_span(func.line_start, func.line_end, last),
        });
    }
    defs.retain(|u| !u.lines.is_empty());
    defs.sort_by_key(|u| u.lines[0]);

    let covered: BTreeSet<usize> = defs.iter().flat_map(|u| u.lines.iter().copied()).collect();
    let module_lines: Vec<usize> = (0..last)
        .filter(|i| !covered.contains(i) && !lines[*i].trim().is_empty())
        .collect();

    let mut units = Vec::with_capacity(defs.len() + 1);
    if !module_lines.is_empty() {
        units.push(Unit {
            kind: ChunkKind::Module,
            name: MODULE_CHUNK_NAME.to_string(),
            class_name: None,
            is_async: false,
            lines: module_lines,
        });
    }
    units.extend(defs);
    units
}

fn line_span(start: usize, end: usize, last: usize) -> Vec<usize> {
    let from = start.saturating_sub(1);
    let to = end.min(last);
    (from..to).collect()
}

impl<'a> Chunks<'a> {
    fn text_of(&self, lines: &[usize]) -> String {
        lines
            .iter()
            .map(|i| self.lines[*i])
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cut `lines` into consecutive windows within the token budget.
    fn windows(&self, lines: &[usize]) -> Vec<Vec<usize>> {
        let max_chars = self.opts.max_tokens * CHARS_PER_TOKEN;
        let mut windows = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_chars = 0usize;

        for &i in lines {
            let line_chars = self.lines[i].chars().count();
            let would_be = if current.is_empty() {
                line_chars
            } else {
                current_chars + 1 + line_chars
            };
            if would_be > max_chars && !current.is_empty() {
                windows.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            current_chars = if current.is_empty() {
                line_chars
            } else {
                current_chars + 1 + line_chars
            };
            current.push(i);
        }
        if !current.is_empty() {
            windows.push(current);
        }
        windows
    }

    fn make_chunk(&self, unit: &Unit, lines: &[usize], part: Option<usize>, truncated: bool) -> Chunk {
        let text = self.text_of(lines);
        let line_start = lines.first().map(|i| i + 1).unwrap_or(0);
        let line_end = lines.last().map(|i| i + 1).unwrap_or(0);
        Chunk {
            id: chunk_id(&self.file.path, &unit.name, line_start, line_end),
            file_path: self.file.path.clone(),
            kind: unit.kind,
            name: unit.name.clone(),
            class_name: unit.class_name.clone(),
            is_async: unit.is_async,
            part,
            truncated,
            line_start,
            line_end,
            token_count: estimate_tokens(&text),
            text,
            embedding: None,
            file_metadata: Some(self.metadata.clone()),
            language: self.file.language.clone(),
        }
    }

    fn expand(&mut self, unit: Unit) {
        let text = self.text_of(&unit.lines);
        if estimate_tokens(&text) <= self.opts.max_tokens {
            let chunk = self.make_chunk(&unit, &unit.lines, None, false);
            self.pending.push_back(chunk);
            return;
        }

        match self.opts.oversize {
            OversizePolicy::Keep => {
                let chunk = self.make_chunk(&unit, &unit.lines, None, false);
                self.pending.push_back(chunk);
            }
            OversizePolicy::Truncate => {
                let windows = self.windows(&unit.lines);
                if let Some(first) = windows.first() {
                    let truncated = first.len() < unit.lines.len();
                    let chunk = self.make_chunk(&unit, first, None, truncated);
                    self.pending.push_back(chunk);
                }
            }
            OversizePolicy::Split => {
                let windows = self.windows(&unit.lines);
                for (n, window) in windows.iter().enumerate() {
                    let chunk = self.make_chunk(&unit, window, Some(n + 1), false);
                    self.pending.push_back(chunk);
                }
            }
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Some(chunk);
            }
            let unit = self.units.next()?;
            self.expand(unit);
        }
    }
}
