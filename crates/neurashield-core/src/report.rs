//! Report rendering: per-analysis text reports, the pull-request Markdown
//! summary, and the static HTML dashboard.
//!
//! All renderers read findings through [`crate::findings`] so missing keys
//! fall back to placeholders instead of failing.

use serde::Serialize;

use crate::findings::Severity;
use crate::models::AnalysisResult;

const RULE_WIDTH: usize = 70;

/// Truncate to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Plain-text report for one analysis.
pub fn text_report(result: &AnalysisResult) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let thin = "-".repeat(RULE_WIDTH);
    let mut lines = vec![
        rule.clone(),
        "NEURASHIELD CODE ANALYSIS REPORT".to_string(),
        rule.clone(),
    ];
    if let Some(name) = result.sample_name.as_deref().or(result.file_path.as_deref()) {
        lines.push(format!("Source: {}", name));
    }
    lines.push(format!("Timestamp: {}", result.timestamp));
    lines.push(format!("Analysis Type: {}", result.analysis_type));
    lines.push(format!("Retrieved Patterns: {}", result.retrieved_patterns_count));
    lines.push(format!("Code Length: {} characters", result.code.chars().count()));
    if let Some(err) = &result.context_error {
        lines.push(format!("Context Error: {}", err));
    }
    lines.push(String::new());
    lines.push(thin.clone());

    if let Some(bugs) = result.bug_report() {
        lines.push(String::new());
        lines.push("## BUG DETECTION".to_string());
        lines.push(thin.clone());
        if let Some(err) = bugs.error() {
            lines.push(format!("Error: {}", err));
        } else if bugs.has_bugs() {
            let found = bugs.bugs();
            lines.push(format!("BUGS FOUND: {}", found.len()));
            lines.push(format!(
                "Overall Risk: {}",
                bugs.overall_risk().unwrap_or("unknown").to_uppercase()
            ));
            for (i, bug) in found.iter().enumerate() {
                lines.push(String::new());
                lines.push(format!(
                    "{}. {} (Severity: {})",
                    i + 1,
                    bug.kind(),
                    bug.text_or("severity", "unknown").to_uppercase()
                ));
                lines.push(format!("   Line: {}", bug.text_or("line", "N/A")));
                lines.push(format!("   Description: {}", bug.text_or("description", "")));
                lines.push(format!(
                    "   Exploit Difficulty: {}",
                    bug.text_or("exploit_difficulty", "N/A")
                ));
                let impact = |k: &str| {
                    bug.get("impact")
                        .and_then(|i| i.get(k))
                        .and_then(crate::findings::scalar_text)
                        .unwrap_or_else(|| "N/A".to_string())
                };
                lines.push(format!(
                    "   Impact: C:{} I:{} A:{}",
                    impact("confidentiality"),
                    impact("integrity"),
                    impact("availability")
                ));
                lines.push(format!(
                    "   Fix: {}",
                    truncate_chars(&bug.text_or("fix", "No fix provided"), 200)
                ));
                if let Some(cwe) = bug.text("cwe_id") {
                    lines.push(format!("   CWE: {}", cwe));
                }
            }
        } else {
            lines.push("No bugs detected".to_string());
        }
    }

    if let Some(opt) = result.optimization_report() {
        lines.push(String::new());
        lines.push("## CODE OPTIMIZATION".to_string());
        lines.push(thin.clone());
        if let Some(err) = opt.error() {
            lines.push(format!("Error: {}", err));
        } else {
            lines.push("Current Complexity:".to_string());
            lines.push(format!("  Time: {}", opt.time_complexity().unwrap_or("unknown")));
            lines.push(format!("  Space: {}", opt.space_complexity().unwrap_or("unknown")));
            let bottlenecks = opt.bottlenecks();
            if !bottlenecks.is_empty() {
                lines.push(format!("  Bottlenecks: {}", bottlenecks.join(", ")));
            }
            let optimizations = opt.optimizations();
            if optimizations.is_empty() {
                lines.push(String::new());
                lines.push("Code is well-optimized".to_string());
            } else {
                lines.push(String::new());
                lines.push(format!("OPTIMIZATIONS FOUND: {}", optimizations.len()));
                lines.push(format!(
                    "Estimated Speedup: {}",
                    opt.estimated_speedup().unwrap_or_else(|| "N/A".to_string())
                ));
                for (i, o) in optimizations.iter().enumerate() {
                    lines.push(String::new());
                    lines.push(format!(
                        "{}. {}: {}",
                        i + 1,
                        o.text_or("type", "general").to_uppercase(),
                        o.text_or("description", "")
                    ));
                    lines.push(format!("   Improvement: {}", o.text_or("improvement", "N/A")));
                    if let Some(t) = o.text("trade_offs") {
                        lines.push(format!("   Trade-offs: {}", t));
                    }
                }
            }
        }
    }

    if let Some(sec) = result.security_report() {
        lines.push(String::new());
        lines.push("## SECURITY SCORING (CVSS v3.1)".to_string());
        lines.push(thin.clone());
        if let Some(err) = sec.error() {
            lines.push(format!("Error: {}", err));
        } else {
            lines.push(format!("Overall Security Score: {}/10", sec.score()));
            lines.push(format!(
                "Severity: {}",
                sec.overall_severity().unwrap_or("unknown").to_uppercase()
            ));
            lines.push(String::new());
            lines.push("Risk Summary:".to_string());
            lines.push(format!(
                "  {}",
                sec.risk_summary().unwrap_or("No summary available")
            ));
            let vulns = sec.vulnerabilities();
            if !vulns.is_empty() {
                lines.push(String::new());
                lines.push(format!("VULNERABILITIES: {}", vulns.len()));
                for (i, v) in vulns.iter().enumerate() {
                    lines.push(String::new());
                    lines.push(format!("{}. {}", i + 1, v.kind()));
                    lines.push(format!("   CVSS Score: {}", v.text_or("cvss_score", "N/A")));
                    lines.push(format!("   CVSS Vector: {}", v.text_or("cvss_vector", "N/A")));
                    lines.push(format!("   CWE: {}", v.text_or("cwe_id", "N/A")));
                    lines.push(format!(
                        "   Remediation: {}",
                        truncate_chars(&v.text_or("remediation", "N/A"), 150)
                    ));
                }
            }
            let actions = sec.immediate_actions();
            if !actions.is_empty() {
                lines.push(String::new());
                lines.push("Immediate Actions Required:".to_string());
                for action in actions {
                    lines.push(format!("  - {}", action));
                }
            }
        }
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("END OF REPORT".to_string());
    lines.push(rule);
    lines.join("\n")
}

/// Concatenated text reports for a batch, separated by rules.
pub fn batch_text_report(results: &[AnalysisResult]) -> String {
    let sep = format!("\n\n{}\n\n", "-".repeat(RULE_WIDTH));
    results
        .iter()
        .map(text_report)
        .collect::<Vec<_>>()
        .join(&sep)
}

/// Markdown summary for a pull-request comment.
pub fn pr_markdown(results: &[AnalysisResult]) -> String {
    let critical = results
        .iter()
        .filter(|r| r.bug_report().is_some_and(|b| b.risk() == Severity::Critical))
        .count();
    let mut lines = vec![
        "# NeuraShield Security Analysis Report".to_string(),
        String::new(),
        format!("**Analyzed Files:** {}", results.len()),
        String::new(),
        "## Summary".to_string(),
        String::new(),
        format!("- **Total Bugs:** {}", results.iter().map(|r| r.bug_count()).sum::<usize>()),
        format!(
            "- **Security Vulnerabilities:** {}",
            results.iter().map(|r| r.vulnerability_count()).sum::<usize>()
        ),
        format!("- **Critical Issues:** {}", critical),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for result in results {
        lines.push(format!("## `{}`", result.file_path.as_deref().unwrap_or(result.label())));
        lines.push(String::new());

        match result.bug_report() {
            Some(bugs) if bugs.error().is_some() => {
                lines.push(format!(
                    "### Bug analysis failed: {}",
                    bugs.error().unwrap_or_default()
                ));
                lines.push(String::new());
            }
            Some(bugs) if bugs.has_bugs() => {
                let found = bugs.bugs();
                lines.push(format!(
                    "### Bugs Found: {} (Risk: {})",
                    found.len(),
                    bugs.overall_risk().unwrap_or("unknown").to_uppercase()
                ));
                lines.push(String::new());
                for (i, bug) in found.iter().enumerate() {
                    lines.push(format!(
                        "**{}. {}** (Severity: `{}`)",
                        i + 1,
                        bug.kind(),
                        bug.text_or("severity", "unknown")
                    ));
                    lines.push(format!("- **Line:** {}", bug.text_or("line", "N/A")));
                    lines.push(format!("- **Description:** {}", bug.text_or("description", "")));
                    lines.push(format!(
                        "- **Fix:** {}",
                        truncate_chars(&bug.text_or("fix", "No fix provided"), 200)
                    ));
                    if let Some(cwe) = bug.text("cwe_id") {
                        lines.push(format!("- **CWE:** {}", cwe));
                    }
                    lines.push(String::new());
                }
            }
            _ => {
                lines.push("### No Bugs Detected".to_string());
                lines.push(String::new());
            }
        }

        if let Some(sec) = result.security_report().filter(|s| s.error().is_none()) {
            lines.push(format!(
                "### Security Score: {}/10 (Severity: {})",
                sec.score(),
                sec.overall_severity().unwrap_or("unknown").to_uppercase()
            ));
            lines.push(String::new());
            for (i, v) in sec.vulnerabilities().iter().enumerate() {
                lines.push(format!("**{}. {}**", i + 1, v.kind()));
                lines.push(format!("- **CVSS Score:** {}", v.text_or("cvss_score", "N/A")));
                lines.push(format!("- **CWE:** {}", v.text_or("cwe_id", "N/A")));
                lines.push(format!(
                    "- **Remediation:** {}",
                    truncate_chars(&v.text_or("remediation", "N/A"), 150)
                ));
                lines.push(String::new());
            }
        }

        if let Some(opt) = result.optimization_report().filter(|o| o.error().is_none()) {
            let optimizations = opt.optimizations();
            if !optimizations.is_empty() {
                lines.push(format!("### Optimizations Available: {}", optimizations.len()));
                lines.push(String::new());
                lines.push(format!(
                    "**Estimated Speedup:** {}",
                    opt.estimated_speedup().unwrap_or_else(|| "N/A".to_string())
                ));
                lines.push(String::new());
            }
        }

        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.push("*Generated by NeuraShield*".to_string());
    lines.join("\n")
}

/// Aggregate figures shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_files: usize,
    pub total_bugs: usize,
    pub total_vulnerabilities: usize,
    pub critical_files: usize,
    pub high_risk_files: usize,
    pub avg_security_score: f64,
}

impl DashboardStats {
    pub fn from_results(results: &[AnalysisResult]) -> Self {
        let risk = |r: &AnalysisResult| r.bug_report().map(|b| b.risk()).unwrap_or(Severity::Unknown);
        let score_sum: f64 = results
            .iter()
            .filter_map(|r| r.security_report())
            .map(|s| s.score())
            .sum();
        Self {
            total_files: results.len(),
            total_bugs: results.iter().map(|r| r.bug_count()).sum(),
            total_vulnerabilities: results.iter().map(|r| r.vulnerability_count()).sum(),
            critical_files: results.iter().filter(|r| risk(r) == Severity::Critical).count(),
            high_risk_files: results.iter().filter(|r| risk(r) == Severity::High).count(),
            avg_security_score: score_sum / results.len().max(1) as f64,
        }
    }
}

const DASHBOARD_STYLE: &str = r#"
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 20px; }
        .container { max-width: 1200px; margin: 0 auto; background: white; border-radius: 10px; box-shadow: 0 10px 40px rgba(0,0,0,0.3); overflow: hidden; }
        .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; padding: 30px; text-align: center; }
        .header h1 { font-size: 2.5em; margin-bottom: 10px; }
        .stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(250px, 1fr)); gap: 20px; padding: 30px; background: #f8f9fa; }
        .stat-card { background: white; padding: 25px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); text-align: center; }
        .stat-value { font-size: 2.5em; font-weight: bold; margin: 10px 0; }
        .stat-label { color: #666; font-size: 0.9em; text-transform: uppercase; letter-spacing: 1px; }
        .critical { color: #dc3545; }
        .warning { color: #ffc107; }
        .success { color: #28a745; }
        .info { color: #17a2b8; }
        .file-list { padding: 30px; }
        .file-item { background: white; border-left: 4px solid #667eea; padding: 20px; margin-bottom: 15px; border-radius: 5px; box-shadow: 0 2px 5px rgba(0,0,0,0.05); }
        .file-item.critical { border-left-color: #dc3545; }
        .file-item.high { border-left-color: #ffc107; }
        .file-name { font-weight: bold; font-size: 1.1em; margin-bottom: 10px; color: #333; }
        .file-stats { display: flex; gap: 20px; flex-wrap: wrap; margin-top: 10px; }
        .file-stat { background: #f8f9fa; padding: 8px 15px; border-radius: 4px; font-size: 0.9em; }
        .footer { text-align: center; padding: 20px; background: #f8f9fa; color: #666; }
"#;

fn stat_card(label: &str, value: &str, class: &str) -> String {
    format!(
        "            <div class=\"stat-card\">\n                <div class=\"stat-label\">{}</div>\n                <div class=\"stat-value {}\">{}</div>\n            </div>\n",
        label, class, value
    )
}

/// Static HTML dashboard with aggregate figures and a per-file listing.
pub fn dashboard_html(results: &[AnalysisResult], generated_at: &str) -> String {
    let stats = DashboardStats::from_results(results);
    let score_class = if stats.avg_security_score < 3.0 {
        "success"
    } else if stats.avg_security_score < 7.0 {
        "warning"
    } else {
        "critical"
    };

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("    <meta charset=\"UTF-8\">\n");
    html.push_str("    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str("    <title>NeuraShield Security Dashboard</title>\n");
    html.push_str("    <style>");
    html.push_str(DASHBOARD_STYLE);
    html.push_str("    </style>\n</head>\n<body>\n    <div class=\"container\">\n");
    html.push_str("        <div class=\"header\">\n            <h1>NeuraShield Security Dashboard</h1>\n");
    html.push_str(&format!(
        "            <p>Generated: {}</p>\n        </div>\n",
        escape_html(generated_at)
    ));

    html.push_str("        <div class=\"stats-grid\">\n");
    html.push_str(&stat_card("Total Files Analyzed", &stats.total_files.to_string(), "info"));
    html.push_str(&stat_card("Total Bugs Found", &stats.total_bugs.to_string(), "warning"));
    html.push_str(&stat_card(
        "Security Vulnerabilities",
        &stats.total_vulnerabilities.to_string(),
        "critical",
    ));
    html.push_str(&stat_card("Critical Files", &stats.critical_files.to_string(), "critical"));
    html.push_str(&stat_card("High Risk Files", &stats.high_risk_files.to_string(), "warning"));
    html.push_str(&stat_card(
        "Avg Security Score",
        &format!("{:.1}/10", stats.avg_security_score),
        score_class,
    ));
    html.push_str("        </div>\n");

    html.push_str("        <div class=\"file-list\">\n            <h2 style=\"margin-bottom: 20px;\">File Analysis Details</h2>\n");
    for result in results {
        let risk = result
            .bug_report()
            .and_then(|b| b.overall_risk())
            .unwrap_or("low");
        let item_class = match Severity::parse(risk) {
            Severity::Critical => " critical",
            Severity::High => " high",
            _ => "",
        };
        let score = result.security_report().map(|s| s.score()).unwrap_or(0.0);
        html.push_str(&format!(
            "            <div class=\"file-item{}\">\n                <div class=\"file-name\">{}</div>\n                <div class=\"file-stats\">\n",
            item_class,
            escape_html(result.label())
        ));
        for (label, value) in [
            ("Risk Level", risk.to_uppercase()),
            ("Bugs", result.bug_count().to_string()),
            ("Vulnerabilities", result.vulnerability_count().to_string()),
            ("Security Score", format!("{}/10", score)),
        ] {
            html.push_str(&format!(
                "                    <div class=\"file-stat\">{}: <strong>{}</strong></div>\n",
                label,
                escape_html(&value)
            ));
        }
        html.push_str("                </div>\n            </div>\n");
    }
    html.push_str("        </div>\n");
    html.push_str("        <div class=\"footer\">\n            <p>Generated by NeuraShield - automated security analysis</p>\n        </div>\n");
    html.push_str("    </div>\n</body>\n</html>\n");
    html
}
