//! Python source extraction.
//!
//! Turns a repository (a remote URL that is cloned, or a local directory
//! scanned in place) into [`CodeFile`] records, one per parseable `.py`
//! file outside the excluded directories.
//!
//! Workflow:
//! 1. Clone the remote (shallow if configured) into a temporary directory.
//! 2. Walk files, pruning excluded directory names at any depth.
//! 3. Apply the include globs.
//! 4. Parse each file with tree-sitter and collect functions, classes
//!    and imports.
//!
//! Every file produces an [`ExtractOutcome`]: either the record, or the
//! reason it was skipped. Skips are never errors.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use tree_sitter::{Node, Parser};
use walkdir::{DirEntry, WalkDir};

use neurashield_core::models::{count_loc, ClassInfo, CodeFile, FunctionInfo};

use crate::config::ExtractConfig;

/// Where the source comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoSource {
    Remote(String),
    Local(PathBuf),
}

impl RepoSource {
    /// An existing directory is local; anything else is a clone URL.
    pub fn parse(arg: &str) -> Self {
        let path = Path::new(arg);
        if path.is_dir() {
            RepoSource::Local(path.to_path_buf())
        } else {
            RepoSource::Remote(arg.to_string())
        }
    }
}

impl fmt::Display for RepoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoSource::Remote(url) => write!(f, "{}", url),
            RepoSource::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    SyntaxError,
    Unreadable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Empty => "empty file",
            SkipReason::SyntaxError => "syntax error",
            SkipReason::Unreadable => "unreadable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Extracted(CodeFile),
    Skipped { path: String, reason: SkipReason },
}

impl ExtractOutcome {
    pub fn path(&self) -> &str {
        match self {
            ExtractOutcome::Extracted(file) => &file.path,
            ExtractOutcome::Skipped { path, .. } => path,
        }
    }
}

/// Split outcomes into extracted records and skip notices.
pub fn partition(outcomes: Vec<ExtractOutcome>) -> (Vec<CodeFile>, Vec<(String, SkipReason)>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            ExtractOutcome::Extracted(file) => files.push(file),
            ExtractOutcome::Skipped { path, reason } => skipped.push((path, reason)),
        }
    }
    (files, skipped)
}

pub struct Extractor {
    config: ExtractConfig,
    include: GlobSet,
    checkout: Option<TempDir>,
}

impl Extractor {
    pub fn new(config: &ExtractConfig) -> Result<Self> {
        Ok(Self {
            include: build_globset(&config.include_globs)?,
            config: config.clone(),
            checkout: None,
        })
    }

    /// Resolve the source to a directory on disk, cloning if needed.
    pub fn fetch(&mut self, source: &RepoSource) -> Result<PathBuf> {
        match source {
            RepoSource::Local(path) => {
                if !path.is_dir() {
                    bail!("Repository path is not a directory: {}", path.display());
                }
                Ok(path.clone())
            }
            RepoSource::Remote(url) => {
                self.cleanup()?;
                let checkout = match &self.config.clone_dir {
                    Some(parent) => {
                        std::fs::create_dir_all(parent).with_context(|| {
                            format!("Failed to create clone directory: {}", parent.display())
                        })?;
                        tempfile::Builder::new().prefix("shield-").tempdir_in(parent)?
                    }
                    None => tempfile::Builder::new().prefix("shield-").tempdir()?,
                };
                git_clone(
                    url,
                    self.config.branch.as_deref(),
                    self.config.shallow,
                    checkout.path(),
                )?;
                info!(url = %url, dest = %checkout.path().display(), "cloned repository");
                let path = checkout.path().to_path_buf();
                self.checkout = Some(checkout);
                Ok(path)
            }
        }
    }

    /// Fetch the source and extract every matching file, sorted by path.
    pub fn extract(&mut self, source: &RepoSource) -> Result<Vec<ExtractOutcome>> {
        let root = self.fetch(source)?;
        self.extract_dir(&root)
    }

    pub fn extract_dir(&self, root: &Path) -> Result<Vec<ExtractOutcome>> {
        let mut outcomes = Vec::new();
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded_dir(e));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");
            if !self.include.is_match(&rel_str) {
                continue;
            }
            let outcome = extract_file(path, &rel_str);
            if let ExtractOutcome::Skipped { path, reason } = &outcome {
                debug!(path = %path, reason = %reason, "skipped file");
            }
            outcomes.push(outcome);
        }

        outcomes.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(outcomes)
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir()
            && self
                .config
                .exclude_dirs
                .iter()
                .any(|d| entry.file_name().to_string_lossy() == d.as_str())
    }

    /// Remove the temporary clone, if any. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(checkout) = self.checkout.take() {
            let path = checkout.path().display().to_string();
            checkout
                .close()
                .with_context(|| format!("Failed to remove clone at {}", path))?;
            debug!(path = %path, "removed clone");
        }
        Ok(())
    }
}

impl Drop for Extractor {
    fn drop(&mut self) {
        if let Err(err) = self.cleanup() {
            warn!(error = %err, "clone cleanup failed");
        }
    }
}

/// Read and parse one file.
pub fn extract_file(path: &Path, relative: &str) -> ExtractOutcome {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(err) => {
            warn!(path = %relative, error = %err, "failed to read file");
            return ExtractOutcome::Skipped {
                path: relative.to_string(),
                reason: SkipReason::Unreadable,
            };
        }
    };
    let source = String::from_utf8_lossy(&bytes).into_owned();
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    match parse_source(relative, &absolute.to_string_lossy(), &source) {
        Ok(file) => ExtractOutcome::Extracted(file),
        Err(reason) => ExtractOutcome::Skipped {
            path: relative.to_string(),
            reason,
        },
    }
}

/// Parse Python source into a [`CodeFile`].
pub fn parse_source(path: &str, absolute_path: &str, source: &str) -> Result<CodeFile, SkipReason> {
    if source.trim().is_empty() {
        return Err(SkipReason::Empty);
    }

    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|_| SkipReason::SyntaxError)?;
    let tree = parser.parse(source, None).ok_or(SkipReason::SyntaxError)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(SkipReason::SyntaxError);
    }

    let mut collector = Collector {
        src: source.as_bytes(),
        functions: Vec::new(),
        classes: Vec::new(),
        imports: Vec::new(),
    };
    collector.visit(root, None, true);

    Ok(CodeFile {
        path: path.to_string(),
        absolute_path: absolute_path.to_string(),
        source: source.to_string(),
        cleaned_source: None,
        complexity_score: 0,
        reduction_percentage: 0.0,
        functions: collector.functions,
        classes: collector.classes,
        imports: collector.imports,
        loc: count_loc(source),
        language: "python".to_string(),
    })
}

struct Collector<'s> {
    src: &'s [u8],
    functions: Vec<FunctionInfo>,
    classes: Vec<ClassInfo>,
    imports: Vec<String>,
}

impl<'s> Collector<'s> {
    fn text(&self, node: Node) -> String {
        node.utf8_text(self.src).unwrap_or("").to_string()
    }

    /// `class_name` is set only for nodes directly in a class body.
    fn visit(&mut self, node: Node, class_name: Option<&str>, top_level: bool) {
        match node.kind() {
            "decorated_definition" => {
                if let Some(def) = node.child_by_field_name("definition") {
                    self.definition(def, node.start_position().row + 1, class_name, top_level);
                }
            }
            "function_definition" | "class_definition" => {
                self.definition(node, node.start_position().row + 1, class_name, top_level);
            }
            "import_statement" => self.import(node),
            "import_from_statement" => self.import_from(node),
            _ => {
                let mut cursor = node.walk();
                let children: Vec<Node> = node.named_children(&mut cursor).collect();
                let nested = node.kind() != "module";
                for child in children {
                    // Plain blocks (if/try/with) keep the enclosing scope.
                    self.visit(child, if nested { class_name } else { None }, top_level && !nested);
                }
            }
        }
    }

    fn definition(&mut self, node: Node, line_start: usize, class_name: Option<&str>, top_level: bool) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n))
            .unwrap_or_default();
        let line_end = node.end_position().row + 1;
        let body = node.child_by_field_name("body");

        if node.kind() == "class_definition" {
            let methods = body.map(|b| direct_methods(b, self.src)).unwrap_or_default();
            self.classes.push(ClassInfo {
                name: name.clone(),
                line_start,
                line_end,
                methods,
                top_level,
            });
            if let Some(body) = body {
                self.visit_body(body, Some(&name));
            }
        } else {
            let is_async = node.child(0).is_some_and(|c| c.kind() == "async");
            let args = node
                .child_by_field_name("parameters")
                .map(|p| positional_args(p, self.src))
                .unwrap_or_default();
            self.functions.push(FunctionInfo {
                name,
                line_start,
                line_end,
                is_async,
                args,
                class_name: class_name.map(str::to_string),
                top_level,
            });
            if let Some(body) = body {
                self.visit_body(body, None);
            }
        }
    }

    fn visit_body(&mut self, body: Node, class_name: Option<&str>) {
        let mut cursor = body.walk();
        let children: Vec<Node> = body.named_children(&mut cursor).collect();
        for child in children {
            self.visit(child, class_name, false);
        }
    }

    fn import(&mut self, node: Node) {
        let mut cursor = node.walk();
        let names: Vec<Node> = node.children_by_field_name("name", &mut cursor).collect();
        for name in names {
            let module = match name.kind() {
                "aliased_import" => name
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default(),
                _ => self.text(name),
            };
            self.imports.push(module);
        }
    }

    fn import_from(&mut self, node: Node) {
        let module = match node.child_by_field_name("module_name") {
            Some(m) if m.kind() == "relative_import" => {
                let mut cursor = m.walk();
                let dotted = m
                    .named_children(&mut cursor)
                    .find(|c| c.kind() == "dotted_name");
                dotted.map(|d| self.text(d)).unwrap_or_default()
            }
            Some(m) => self.text(m),
            None => String::new(),
        };
        self.imports.push(module);
    }
}

fn direct_methods(body: Node, src: &[u8]) -> Vec<String> {
    let mut cursor = body.walk();
    body.named_children(&mut cursor)
        .filter_map(|child| match child.kind() {
            "function_definition" => Some(child),
            "decorated_definition" => child
                .child_by_field_name("definition")
                .filter(|d| d.kind() == "function_definition"),
            _ => None,
        })
        .filter_map(|f| f.child_by_field_name("name"))
        .map(|n| n.utf8_text(src).unwrap_or("").to_string())
        .collect()
}

/// Named positional parameters, stopping at `*`, `*args` or `**kwargs`.
fn positional_args(params: Node, src: &[u8]) -> Vec<String> {
    let text = |n: Node| n.utf8_text(src).unwrap_or("").to_string();
    let mut args = Vec::new();
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        match param.kind() {
            "identifier" => args.push(text(param)),
            "default_parameter" | "typed_default_parameter" => {
                if let Some(name) = param.child_by_field_name("name") {
                    args.push(text(name));
                }
            }
            "typed_parameter" => match param.named_child(0) {
                Some(inner) if inner.kind() == "identifier" => args.push(text(inner)),
                _ => break,
            },
            "positional_separator" | "comment" => {}
            _ => break,
        }
    }
    args
}

fn git_clone(url: &str, branch: Option<&str>, shallow: bool, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone");
    if let Some(branch) = branch {
        cmd.args(["--branch", branch, "--single-branch"]);
    }
    if shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(url);
    cmd.arg(dest);

    let output = cmd
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Write extracted records as pretty JSON.
pub fn save_json(files: &[CodeFile], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(files)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write extracted data: {}", path.display()))?;
    info!(path = %path.display(), files = files.len(), "saved extracted data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"import os, sys as system
from collections import defaultdict
from . import sibling
from .pkg import thing

CONSTANT = 1


@decorator
def top(a, b=2, *args, c, **kw):
    def inner(x):
        return x
    return inner(a)


class Service(Base):
    def __init__(self, name: str):
        self.name = name

    @staticmethod
    async def fetch(url, timeout: int = 5):
        return url

if True:
    def conditional():
        pass
"#;

    fn parse(src: &str) -> CodeFile {
        parse_source("pkg/mod.py", "/abs/pkg/mod.py", src).unwrap()
    }

    #[test]
    fn collects_imports_like_an_ast_walk() {
        let file = parse(SAMPLE);
        assert_eq!(
            file.imports,
            vec!["os", "sys", "collections", "", "pkg"]
        );
    }

    #[test]
    fn collects_functions_at_every_depth() {
        let file = parse(SAMPLE);
        let names: Vec<&str> = file.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["top", "inner", "__init__", "fetch", "conditional"]);

        let top = &file.functions[0];
        assert_eq!(top.line_start, 9, "decorated definitions start at the decorator");
        assert_eq!(top.line_end, 13);
        assert_eq!(top.args, vec!["a", "b"]);
        assert!(top.top_level);
        assert!(!file.functions[1].top_level);

        let fetch = &file.functions[3];
        assert!(fetch.is_async);
        assert_eq!(fetch.class_name.as_deref(), Some("Service"));
        assert_eq!(fetch.args, vec!["url", "timeout"]);
        assert_eq!(file.functions[2].args, vec!["self", "name"]);
        assert!(!file.functions[4].top_level);
        assert!(file.functions[4].class_name.is_none());
    }

    #[test]
    fn collects_classes_with_direct_methods() {
        let file = parse(SAMPLE);
        assert_eq!(file.classes.len(), 1);
        let class = &file.classes[0];
        assert_eq!(class.name, "Service");
        assert_eq!(class.line_start, 16);
        assert_eq!(class.line_end, 22);
        assert_eq!(class.methods, vec!["__init__", "fetch"]);
        assert!(class.top_level);
    }

    #[test]
    fn line_count_excludes_blank_lines() {
        let file = parse("x = 1\n\n\ny = 2\n   \n");
        assert_eq!(file.loc, 2);
        assert_eq!(file.language, "python");
    }

    #[test]
    fn skips_empty_and_invalid_sources() {
        assert_eq!(parse_source("a.py", "a.py", "  \n\n").unwrap_err(), SkipReason::Empty);
        assert_eq!(
            parse_source("a.py", "a.py", "def broken(:\n    pass\n").unwrap_err(),
            SkipReason::SyntaxError
        );
    }

    #[test]
    fn walks_local_dirs_with_exclusions() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("pkg")).unwrap();
        std::fs::create_dir_all(root.join("venv/lib")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        std::fs::write(root.join("pkg/b.py"), "def b():\n    return 1\n").unwrap();
        std::fs::write(root.join("a.py"), "import os\n").unwrap();
        std::fs::write(root.join("empty.py"), "\n").unwrap();
        std::fs::write(root.join("bad.py"), "class :\n").unwrap();
        std::fs::write(root.join("notes.txt"), "not python").unwrap();
        std::fs::write(root.join("venv/lib/site.py"), "x = 1\n").unwrap();
        std::fs::write(root.join("tests/test_a.py"), "x = 1\n").unwrap();

        let mut extractor = Extractor::new(&ExtractConfig::default()).unwrap();
        let outcomes = extractor
            .extract(&RepoSource::Local(root.to_path_buf()))
            .unwrap();
        let paths: Vec<&str> = outcomes.iter().map(|o| o.path()).collect();
        assert_eq!(paths, vec!["a.py", "bad.py", "empty.py", "pkg/b.py"]);

        let (files, skipped) = partition(outcomes);
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].functions[0].name, "b");
        assert_eq!(
            skipped,
            vec![
                ("bad.py".to_string(), SkipReason::SyntaxError),
                ("empty.py".to_string(), SkipReason::Empty),
            ]
        );
    }

    #[test]
    fn repo_source_distinguishes_dirs_from_urls() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path().to_string_lossy().to_string();
        assert_eq!(RepoSource::parse(&dir), RepoSource::Local(tmp.path().to_path_buf()));
        assert_eq!(
            RepoSource::parse("https://github.com/org/repo.git"),
            RepoSource::Remote("https://github.com/org/repo.git".to_string())
        );
    }

    #[test]
    fn saved_json_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out/extracted.json");
        save_json(&[parse("def f():\n    pass\n")], &out).unwrap();
        let back: Vec<CodeFile> =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(back[0].functions[0].name, "f");
    }
}
