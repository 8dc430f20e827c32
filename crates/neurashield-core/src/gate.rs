//! Merge gate over analysis results.
//!
//! A result set blocks when any entry has:
//!
//! - bug `overall_risk` of `critical`,
//! - a bug of severity `high` or `critical`,
//! - security `overall_severity` of `critical`,
//! - a vulnerability of severity `high` or `critical`.
//!
//! All comparisons are case-insensitive.
//!
//! A sub-report carrying an `error` key is listed as a failed analysis:
//! its findings are unknown, not clean, and the summary says so.

use serde::Serialize;

use crate::findings::Severity;
use crate::models::AnalysisResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalIssue {
    pub file: String,
    pub kind: String,
    /// Security score for critical security findings.
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SevereFinding {
    pub file: String,
    pub kind: String,
    pub severity: String,
    pub line: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedAnalysis {
    pub file: String,
    /// `bug` or `security`.
    pub analysis: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GateReport {
    pub files_checked: usize,
    pub critical_issues: Vec<CriticalIssue>,
    pub severe_bugs: Vec<SevereFinding>,
    pub severe_vulnerabilities: Vec<SevereFinding>,
    pub failed_analyses: Vec<FailedAnalysis>,
}

impl GateReport {
    pub fn blocks(&self) -> bool {
        !(self.critical_issues.is_empty()
            && self.severe_bugs.is_empty()
            && self.severe_vulnerabilities.is_empty())
    }

    /// Console summary.
    pub fn render(&self) -> String {
        let rule = "=".repeat(70);
        if !self.blocks() {
            let summary = format!("No critical issues found in {} file(s).", self.files_checked);
            if self.failed_analyses.is_empty() {
                return format!("{} Merge allowed.\n", summary);
            }
            return format!("{}\n{}\nMerge allowed.\n", summary, self.render_failures());
        }
        let mut out = Vec::new();
        out.push(rule.clone());
        out.push("CRITICAL ISSUES DETECTED - MERGE BLOCKED".to_string());
        out.push(rule.clone());
        if !self.critical_issues.is_empty() {
            out.push(format!("\n{} critical issue(s):", self.critical_issues.len()));
            for issue in &self.critical_issues {
                match issue.score {
                    Some(score) => out.push(format!("  - {}: {} (score {})", issue.file, issue.kind, score)),
                    None => out.push(format!("  - {}: {}", issue.file, issue.kind)),
                }
            }
        }
        for (title, items) in [
            ("high/critical severity bug(s)", &self.severe_bugs),
            ("high/critical severity vulnerability(ies)", &self.severe_vulnerabilities),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push(format!("\n{} {}:", items.len(), title));
            for item in items {
                out.push(format!(
                    "  - {}: {} [{}] (line {})",
                    item.file, item.kind, item.severity, item.line
                ));
                if !item.description.is_empty() {
                    out.push(format!("    {}", item.description));
                }
            }
        }
        if !self.failed_analyses.is_empty() {
            out.push(String::new());
            out.push(self.render_failures());
        }
        out.push(String::new());
        out.push(rule.clone());
        out.push("Fix these issues before merging.".to_string());
        out.push(rule);
        out.join("\n") + "\n"
    }

    fn render_failures(&self) -> String {
        let mut lines = vec![format!(
            "{} analysis(es) failed; findings unknown:",
            self.failed_analyses.len()
        )];
        for failed in &self.failed_analyses {
            lines.push(format!(
                "  - {}: {} analysis ({})",
                failed.file, failed.analysis, failed.error
            ));
        }
        lines.join("\n")
    }
}

/// Evaluate a result set.
pub fn evaluate(results: &[AnalysisResult]) -> GateReport {
    let mut report = GateReport {
        files_checked: results.len(),
        ..Default::default()
    };

    for result in results {
        let file = result
            .file_path
            .as_deref()
            .or(result.sample_name.as_deref())
            .unwrap_or("unknown")
            .to_string();

        if let Some(error) = result.bug_report().and_then(|r| r.error()) {
            report.failed_analyses.push(failed(&file, "bug", error));
        } else if let Some(bugs) = result.bug_report() {
            if bugs.risk() == Severity::Critical {
                report.critical_issues.push(CriticalIssue {
                    file: file.clone(),
                    kind: "Critical Bug Risk".to_string(),
                    score: None,
                });
            }
            for bug in bugs.bugs() {
                if bug.severity().is_high_or_critical() {
                    report.severe_bugs.push(severe(&file, &bug));
                }
            }
        }

        if let Some(error) = result.security_report().and_then(|r| r.error()) {
            report.failed_analyses.push(failed(&file, "security", error));
        } else if let Some(security) = result.security_report() {
            if security.severity() == Severity::Critical {
                report.critical_issues.push(CriticalIssue {
                    file: file.clone(),
                    kind: "Critical Security Vulnerability".to_string(),
                    score: Some(security.score()),
                });
            }
            for vuln in security.vulnerabilities() {
                if vuln.severity().is_high_or_critical() {
                    report.severe_vulnerabilities.push(severe(&file, &vuln));
                }
            }
        }
    }

    report
}

fn failed(file: &str, analysis: &str, error: &str) -> FailedAnalysis {
    FailedAnalysis {
        file: file.to_string(),
        analysis: analysis.to_string(),
        error: error.to_string(),
    }
}

fn severe(file: &str, finding: &crate::findings::Finding<'_>) -> SevereFinding {
    SevereFinding {
        file: file.to_string(),
        kind: finding.kind(),
        severity: finding.text_or("severity", "unknown"),
        line: finding.text_or("line", "N/A"),
        description: finding.text_or("description", ""),
    }
}
