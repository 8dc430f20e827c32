//! Ingestion progress reporting.
//!
//! Reports what `shield ingest` is doing (extracting, chunking, embedding
//! batch n of m, storing) so long runs against a large repository are
//! observable. Progress is emitted on **stderr** so stdout remains
//! parseable for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestEvent {
    /// Walking and parsing the repository. Total unknown.
    Extracting { repo: String },
    /// Files parsed; chunking them.
    Chunking { files: u64 },
    /// Embedding batch `batch` of `total` (1-based).
    Embedding { batch: u64, total: u64 },
    /// Writing embedded chunks to the index.
    Storing { chunks: u64 },
}

/// Reports ingestion progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Human-friendly progress on stderr: "ingest  embedding  batch 3 / 12".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: IngestEvent) {
        let line = match &event {
            IngestEvent::Extracting { repo } => format!("ingest {}  extracting...\n", repo),
            IngestEvent::Chunking { files } => {
                format!("ingest  chunking  {} files\n", format_number(*files))
            }
            IngestEvent::Embedding { batch, total } => format!(
                "ingest  embedding  batch {} / {}\n",
                format_number(*batch),
                format_number(*total)
            ),
            IngestEvent::Storing { chunks } => {
                format!("ingest  storing  {} chunks\n", format_number(*chunks))
            }
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: IngestEvent) {
        let obj = match &event {
            IngestEvent::Extracting { repo } => serde_json::json!({
                "event": "progress",
                "phase": "extracting",
                "repo": repo,
            }),
            IngestEvent::Chunking { files } => serde_json::json!({
                "event": "progress",
                "phase": "chunking",
                "files": files,
            }),
            IngestEvent::Embedding { batch, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": batch,
                "total": total,
            }),
            IngestEvent::Storing { chunks } => serde_json::json!({
                "event": "progress",
                "phase": "storing",
                "chunks": chunks,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: IngestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn off_mode_is_silent() {
        ProgressMode::Off
            .reporter()
            .report(IngestEvent::Storing { chunks: 3 });
    }
}
