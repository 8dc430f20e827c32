//! Regex-based pre-commit scanner.
//!
//! Checks staged Python files line by line for three patterns:
//!
//! | Rule | Severity |
//! |------|----------|
//! | Hardcoded secret assigned from a string literal | CRITICAL |
//! | SQL assembled by concatenation or formatting inside `execute(` | HIGH |
//! | `eval(` / `exec(` | HIGH |
//!
//! Comment lines and lines tagged `# nosec` or `# skipcq` are ignored.
//! Only CRITICAL findings block the commit.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Paths never scanned: the scanner's own hook, CI scripts, and tests.
const EXCLUDED: &[&str] = &[".githooks/pre_commit_scan.py", ".github/scripts/", "tests/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanSeverity {
    High,
    Critical,
}

impl fmt::Display for ScanSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanSeverity::High => f.write_str("HIGH"),
            ScanSeverity::Critical => f.write_str("CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    pub line: usize,
    pub severity: ScanSeverity,
    pub kind: &'static str,
}

struct Rule {
    kind: &'static str,
    severity: ScanSeverity,
    pattern: Regex,
}

pub struct Scanner {
    rules: Vec<Rule>,
}

impl Scanner {
    pub fn new() -> Result<Self> {
        let rule = |kind: &'static str, severity: ScanSeverity, pattern: &str| -> Result<Rule> {
            Ok(Rule {
                kind,
                severity,
                pattern: Regex::new(pattern)
                    .with_context(|| format!("failed to compile {} rule", kind))?,
            })
        };
        Ok(Self {
            rules: vec![
                rule(
                    "Hardcoded Secret",
                    ScanSeverity::Critical,
                    r#"(?i)\b\w*(password|passwd|api_key|apikey|secret|token)\w*\s*=\s*[rbuf]?["'][^"']+["']"#,
                )?,
                rule(
                    "SQL Injection",
                    ScanSeverity::High,
                    r#"(?i)execute\(.*\b(select|insert|update|delete|where)\b.*(["']\s*\+|\+\s*\w|["']\s*%\s*[\w(]|\.format\()|execute\(\s*f["'].*\b(select|insert|update|delete|where)\b.*\{"#,
                )?,
                rule("Code Injection", ScanSeverity::High, r"\b(eval|exec)\(")?,
            ],
        })
    }

    /// Scan one file's text. Each rule fires at most once per line.
    pub fn scan_text(&self, text: &str) -> Vec<ScanIssue> {
        let mut issues = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') || line.contains("# nosec") || line.contains("# skipcq") {
                continue;
            }
            for rule in &self.rules {
                if rule.pattern.is_match(line) {
                    issues.push(ScanIssue {
                        line: i + 1,
                        severity: rule.severity,
                        kind: rule.kind,
                    });
                }
            }
        }
        issues
    }

    /// Scan a file on disk. Unreadable files yield no issues.
    pub fn scan_file(&self, path: &Path) -> Vec<ScanIssue> {
        match std::fs::read(path) {
            Ok(bytes) => self.scan_text(&String::from_utf8_lossy(&bytes)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot read file");
                Vec::new()
            }
        }
    }
}

/// Keep `.py` paths outside the excluded locations.
pub fn filter_candidates<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paths
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty() && p.ends_with(".py"))
        .filter(|p| !EXCLUDED.iter().any(|ex| p.contains(ex)))
        .collect()
}

/// Staged files from `git diff --cached --name-only`. Empty outside a repo.
pub fn staged_files() -> Vec<String> {
    let output = Command::new("git")
        .args(["diff", "--cached", "--name-only"])
        .output();
    match output {
        Ok(out) if out.status.success() => {
            filter_candidates(String::from_utf8_lossy(&out.stdout).lines())
        }
        Ok(out) => {
            debug!(stderr = %String::from_utf8_lossy(&out.stderr).trim(), "git diff failed");
            Vec::new()
        }
        Err(err) => {
            debug!(error = %err, "git not available");
            Vec::new()
        }
    }
}

/// Per-file findings for one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<(String, Vec<ScanIssue>)>,
}

impl ScanReport {
    pub fn count(&self, severity: ScanSeverity) -> usize {
        self.files
            .iter()
            .flat_map(|(_, issues)| issues)
            .filter(|i| i.severity == severity)
            .count()
    }

    pub fn total(&self) -> usize {
        self.files.iter().map(|(_, issues)| issues.len()).sum()
    }

    pub fn blocks(&self) -> bool {
        self.count(ScanSeverity::Critical) > 0
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (file, issues) in &self.files {
            out.push_str(&format!("{}\n", file));
            for issue in issues {
                out.push_str(&format!(
                    "  Line {}: {} [{}]\n",
                    issue.line, issue.kind, issue.severity
                ));
            }
        }
        out.push_str(&format!(
            "Total: {} issues | Critical: {} | High: {}\n",
            self.total(),
            self.count(ScanSeverity::Critical),
            self.count(ScanSeverity::High)
        ));
        if self.blocks() {
            out.push_str("BLOCKED: Critical issues found!\n");
        } else {
            out.push_str("Commit allowed\n");
        }
        out
    }
}

pub fn scan_paths(scanner: &Scanner, paths: &[String]) -> ScanReport {
    let mut report = ScanReport::default();
    for path in paths {
        let issues = scanner.scan_file(Path::new(path));
        if !issues.is_empty() {
            report.files.push((path.clone(), issues));
        }
    }
    report
}

/// `shield scan [files..]`. Returns whether the commit may proceed.
pub fn run_scan(files: &[String]) -> Result<bool> {
    let candidates = if files.is_empty() {
        staged_files()
    } else {
        filter_candidates(files)
    };

    println!("NeuraShield Scanner");
    if candidates.is_empty() {
        println!("No Python files to scan");
        return Ok(true);
    }

    let scanner = Scanner::new()?;
    let report = scan_paths(&scanner, &candidates);
    print!("{}", report.render());
    Ok(!report.blocks())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(usize, &'static str)> {
        Scanner::new()
            .unwrap()
            .scan_text(text)
            .into_iter()
            .map(|i| (i.line, i.kind))
            .collect()
    }

    #[test]
    fn flags_hardcoded_secrets_as_critical() {
        let scanner = Scanner::new().unwrap();
        let issues = scanner.scan_text("API_KEY = \"sk-live-123\"\ndb_password='hunter2'\n");
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.severity == ScanSeverity::Critical));
    }

    #[test]
    fn ignores_non_assignments_and_env_lookups() {
        assert!(kinds("if password == \"x\":\n    pass\n").is_empty());
        assert!(kinds("password = os.environ[\"PASSWORD\"]\n").is_empty());
        assert!(kinds("secret = \"\"\n").is_empty());
    }

    #[test]
    fn flags_concatenated_sql() {
        assert_eq!(
            kinds("cur.execute(\"SELECT * FROM users WHERE id=\" + user_id)\n"),
            vec![(1, "SQL Injection")]
        );
        assert_eq!(
            kinds("cur.execute(f\"SELECT * FROM t WHERE id={uid}\")\n"),
            vec![(1, "SQL Injection")]
        );
        assert!(kinds("cur.execute(\"SELECT * FROM t WHERE id=?\", (uid,))\n").is_empty());
        assert!(kinds("cur.execute(\"SELECT * FROM t WHERE id = %s\", (uid,))\n").is_empty());
        assert!(kinds("cur.execute(\"UPDATE t SET a = %(a)s WHERE id = %(id)s\", params)\n").is_empty());
        assert_eq!(
            kinds("cur.execute(\"SELECT * FROM t WHERE id = %s\" % uid)\n"),
            vec![(1, "SQL Injection")]
        );
        assert_eq!(
            kinds("cur.execute(\"DELETE FROM t WHERE id = {}\".format(uid))\n"),
            vec![(1, "SQL Injection")]
        );
    }

    #[test]
    fn flags_dynamic_execution() {
        assert_eq!(kinds("x = eval(data)\n"), vec![(1, "Code Injection")]);
        assert_eq!(kinds("exec(code)\n"), vec![(1, "Code Injection")]);
        assert!(kinds("model.evaluate(x)\n").is_empty());
    }

    #[test]
    fn comments_and_suppressions_are_skipped() {
        assert!(kinds("# eval(data)\n").is_empty());
        assert!(kinds("eval(data)  # nosec\n").is_empty());
        assert!(kinds("token = \"abc\"  # skipcq\n").is_empty());
    }

    #[test]
    fn excluded_paths_and_non_python_are_filtered() {
        let kept = filter_candidates([
            "app/main.py",
            "tests/test_main.py",
            ".github/scripts/pr.py",
            ".githooks/pre_commit_scan.py",
            "README.md",
            "",
        ]);
        assert_eq!(kept, vec!["app/main.py"]);
    }

    #[test]
    fn only_critical_blocks() {
        let scanner = Scanner::new().unwrap();
        let high_only = ScanReport {
            files: vec![("a.py".into(), scanner.scan_text("eval(x)\n"))],
        };
        assert!(!high_only.blocks());
        assert!(high_only.render().contains("Commit allowed"));

        let critical = ScanReport {
            files: vec![("b.py".into(), scanner.scan_text("secret = 'abc'\n"))],
        };
        assert!(critical.blocks());
        assert!(critical.render().contains("Line 1: Hardcoded Secret [CRITICAL]"));
    }
}
