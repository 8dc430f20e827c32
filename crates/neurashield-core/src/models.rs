//! Core data models shared by the ingestion and analysis paths.
//!
//! Extraction produces [`CodeFile`]s, the chunker turns them into
//! [`Chunk`]s, and the vector index stores [`IndexedRecord`]s. The analysis
//! path produces one [`AnalysisResult`] per analyzed input.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// A function or method found during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    /// 1-based, inclusive. Includes decorators.
    pub line_start: usize,
    pub line_end: usize,
    pub is_async: bool,
    pub args: Vec<String>,
    /// Enclosing class for methods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// Defined directly at module level.
    pub top_level: bool,
}

/// A class found during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub line_start: usize,
    pub line_end: usize,
    /// Names of methods defined directly in the class body.
    pub methods: Vec<String>,
    pub top_level: bool,
}

/// One extracted source file.
///
/// Created by the extractor; the preprocessor fills in `cleaned_source`,
/// `complexity_score` and `reduction_percentage`. Line ranges in
/// `functions` and `classes` are valid against both the raw and the
/// cleaned text since preprocessing never removes lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFile {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    pub absolute_path: String,
    pub source: String,
    /// Set by the preprocessor; `None` until preprocessing has run.
    #[serde(default)]
    pub cleaned_source: Option<String>,
    #[serde(default)]
    pub complexity_score: u32,
    #[serde(default)]
    pub reduction_percentage: f64,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub imports: Vec<String>,
    /// Number of non-blank lines in `source`.
    pub loc: usize,
    pub language: String,
}

impl CodeFile {
    /// Text the chunker should read: the cleaned source when preprocessing
    /// has run, otherwise the raw source.
    pub fn chunk_source(&self) -> &str {
        self.cleaned_source.as_deref().unwrap_or(&self.source)
    }
}

/// Count of non-blank lines.
pub fn count_loc(source: &str) -> usize {
    source.lines().filter(|l| !l.trim().is_empty()).count()
}

/// Kind of source unit a chunk was cut from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Function,
    Class,
    Module,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Module => "module",
        }
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(ChunkKind::Function),
            "class" => Ok(ChunkKind::Class),
            "module" => Ok(ChunkKind::Module),
            other => bail!("unknown chunk type '{}': expected function, class, or module", other),
        }
    }
}

/// File-level facts copied onto every chunk of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub complexity_score: u32,
    pub loc: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub imports: Vec<String>,
}

impl FileMetadata {
    pub fn from_file(file: &CodeFile) -> Self {
        Self {
            complexity_score: file.complexity_score,
            loc: file.loc,
            function_count: file.functions.len(),
            class_count: file.classes.len(),
            imports: file.imports.clone(),
        }
    }
}

/// An addressable unit of source text prepared for embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_path: String,
    pub kind: ChunkKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub is_async: bool,
    /// 1-based part number when an oversized unit was split.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<usize>,
    pub truncated: bool,
    pub line_start: usize,
    pub line_end: usize,
    pub token_count: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_metadata: Option<FileMetadata>,
    pub language: String,
}

impl Chunk {
    /// Build the persisted record for this chunk.
    ///
    /// Returns `None` when no embedding has been attached.
    pub fn to_record(&self) -> Option<IndexedRecord> {
        let vector = self.embedding.clone()?;
        let mut metadata = BTreeMap::new();
        metadata.insert("file_path".into(), MetadataValue::from(self.file_path.as_str()));
        metadata.insert("type".into(), MetadataValue::from(self.kind.as_str()));
        metadata.insert("name".into(), MetadataValue::from(self.name.as_str()));
        metadata.insert("line_start".into(), MetadataValue::Int(self.line_start as i64));
        metadata.insert("line_end".into(), MetadataValue::Int(self.line_end as i64));
        metadata.insert("token_count".into(), MetadataValue::Int(self.token_count as i64));
        metadata.insert("language".into(), MetadataValue::from(self.language.as_str()));
        metadata.insert("is_async".into(), MetadataValue::from(if self.is_async { "True" } else { "False" }));
        if let Some(class_name) = &self.class_name {
            metadata.insert("class_name".into(), MetadataValue::from(class_name.as_str()));
        }
        if let Some(part) = self.part {
            metadata.insert("part".into(), MetadataValue::Int(part as i64));
        }
        if let Some(meta) = &self.file_metadata {
            metadata.insert("complexity_score".into(), MetadataValue::Int(meta.complexity_score as i64));
            metadata.insert("file_loc".into(), MetadataValue::Int(meta.loc as i64));
        }
        Some(IndexedRecord {
            id: self.id.clone(),
            vector,
            document: self.text.clone(),
            metadata,
        })
    }
}

/// A metadata value stored alongside a vector: either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Int(i64),
    Str(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Str(s) => Some(s),
            MetadataValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            MetadataValue::Int(n) => Some(*n),
            MetadataValue::Str(_) => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::Int(n) => write!(f, "{}", n),
            MetadataValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Str(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Str(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Int(n)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// A persisted `(id, vector, document, metadata)` tuple.
///
/// `id` addresses exactly one record within a collection; upserting the
/// same id replaces the stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    pub metadata: Metadata,
}

/// A stored chunk retrieved as context for an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPattern {
    pub id: String,
    pub similarity_score: f64,
    pub code: String,
    pub metadata: Metadata,
}

/// Which sub-analyses to run for a piece of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Bugs,
    Optimization,
    Security,
    All,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Bugs => "bugs",
            AnalysisType::Optimization => "optimization",
            AnalysisType::Security => "security",
            AnalysisType::All => "all",
        }
    }

    pub fn includes_bugs(&self) -> bool {
        matches!(self, AnalysisType::Bugs | AnalysisType::All)
    }

    pub fn includes_optimization(&self) -> bool {
        matches!(self, AnalysisType::Optimization | AnalysisType::All)
    }

    pub fn includes_security(&self) -> bool {
        matches!(self, AnalysisType::Security | AnalysisType::All)
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bugs" | "bug" => Ok(AnalysisType::Bugs),
            "optimization" | "optimisation" => Ok(AnalysisType::Optimization),
            "security" => Ok(AnalysisType::Security),
            "all" => Ok(AnalysisType::All),
            other => bail!(
                "unknown analysis type '{}': expected bugs, optimization, security, or all",
                other
            ),
        }
    }
}

/// The outcome of analyzing one piece of code.
///
/// Sub-reports are free-form JSON objects as returned by the chat model; a
/// sub-report carrying an `error` key means that analysis failed and its
/// (absent) findings must not be read as "clean". Every field has a serde
/// default so results files written by other tools still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub analysis_type: String,
    #[serde(default)]
    pub retrieved_patterns_count: usize,
    #[serde(default)]
    pub retrieved_patterns: Vec<SimilarPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_analysis: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_analysis: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_analysis: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl AnalysisResult {
    /// Display label: sample name, then file path, then `"unknown"`.
    pub fn label(&self) -> &str {
        self.sample_name
            .as_deref()
            .or(self.file_path.as_deref())
            .unwrap_or("unknown")
    }
}
