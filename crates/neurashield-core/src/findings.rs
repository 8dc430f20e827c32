//! Defensive read access to model-produced findings.
//!
//! Sub-reports are unvalidated JSON. These views read the expected keys
//! with defaults and never panic on missing or mistyped fields. A report
//! with an `error` key is a failed analysis, not a clean one: check
//! [`error`](BugReport::error) before trusting an empty finding list.

use serde_json::Value;

use crate::models::AnalysisResult;

/// Severity scale shared by bugs and vulnerabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Case-insensitive parse; anything unrecognized is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "none" => Severity::Low,
            "medium" | "moderate" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Unknown,
        }
    }

    pub fn is_high_or_critical(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Render a JSON scalar for display (`"x"` → `x`, `3` → `3`).
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn error_of(report: &Value) -> Option<&str> {
    match report.get("error") {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(_) => Some("analysis failed"),
    }
}

fn array_of<'a>(report: &'a Value, key: &str) -> Vec<Finding<'a>> {
    report
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|v| v.is_object()).map(Finding).collect())
        .unwrap_or_default()
}

/// One bug, vulnerability, or optimization entry.
#[derive(Debug, Clone, Copy)]
pub struct Finding<'a>(pub &'a Value);

impl<'a> Finding<'a> {
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).and_then(scalar_text)
    }

    pub fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }

    pub fn kind(&self) -> String {
        self.text_or("type", "Unknown")
    }

    pub fn severity(&self) -> Severity {
        self.text("severity")
            .map(|s| Severity::parse(&s))
            .unwrap_or(Severity::Unknown)
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BugReport<'a>(pub &'a Value);

impl<'a> BugReport<'a> {
    pub fn error(&self) -> Option<&'a str> {
        error_of(self.0)
    }

    pub fn has_bugs(&self) -> bool {
        self.0.get("has_bugs").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn bugs(&self) -> Vec<Finding<'a>> {
        array_of(self.0, "bugs_found")
    }

    pub fn overall_risk(&self) -> Option<&'a str> {
        self.0.get("overall_risk").and_then(Value::as_str)
    }

    pub fn risk(&self) -> Severity {
        self.overall_risk().map(Severity::parse).unwrap_or(Severity::Unknown)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SecurityReport<'a>(pub &'a Value);

impl<'a> SecurityReport<'a> {
    pub fn error(&self) -> Option<&'a str> {
        error_of(self.0)
    }

    pub fn vulnerabilities(&self) -> Vec<Finding<'a>> {
        array_of(self.0, "vulnerabilities")
    }

    /// `overall_security_score`, accepting numbers or numeric strings; 0 otherwise.
    pub fn score(&self) -> f64 {
        match self.0.get("overall_security_score") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn overall_severity(&self) -> Option<&'a str> {
        self.0.get("overall_severity").and_then(Value::as_str)
    }

    pub fn severity(&self) -> Severity {
        self.overall_severity().map(Severity::parse).unwrap_or(Severity::Unknown)
    }

    pub fn risk_summary(&self) -> Option<&'a str> {
        self.0.get("risk_summary").and_then(Value::as_str)
    }

    pub fn immediate_actions(&self) -> Vec<String> {
        string_list(self.0.get("immediate_actions"))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizationReport<'a>(pub &'a Value);

impl<'a> OptimizationReport<'a> {
    pub fn error(&self) -> Option<&'a str> {
        error_of(self.0)
    }

    pub fn optimizations(&self) -> Vec<Finding<'a>> {
        array_of(self.0, "optimizations")
    }

    pub fn time_complexity(&self) -> Option<&'a str> {
        self.0.pointer("/current_complexity/time").and_then(Value::as_str)
    }

    pub fn space_complexity(&self) -> Option<&'a str> {
        self.0.pointer("/current_complexity/space").and_then(Value::as_str)
    }

    pub fn bottlenecks(&self) -> Vec<String> {
        string_list(self.0.pointer("/current_complexity/bottlenecks"))
    }

    pub fn estimated_speedup(&self) -> Option<String> {
        self.0.get("estimated_speedup").and_then(scalar_text)
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(scalar_text).collect())
        .unwrap_or_default()
}

impl AnalysisResult {
    pub fn bug_report(&self) -> Option<BugReport<'_>> {
        self.bug_analysis.as_ref().map(BugReport)
    }

    pub fn security_report(&self) -> Option<SecurityReport<'_>> {
        self.security_analysis.as_ref().map(SecurityReport)
    }

    pub fn optimization_report(&self) -> Option<OptimizationReport<'_>> {
        self.optimization_analysis.as_ref().map(OptimizationReport)
    }

    /// Bugs reported (0 when the analysis is missing or failed).
    pub fn bug_count(&self) -> usize {
        self.bug_report().map(|r| r.bugs().len()).unwrap_or(0)
    }

    pub fn vulnerability_count(&self) -> usize {
        self.security_report().map(|r| r.vulnerabilities().len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse("CRITICAL"), Severity::Critical);
        assert_eq!(Severity::parse(" High "), Severity::High);
        assert_eq!(Severity::parse("severe"), Severity::Unknown);
        assert!(Severity::Critical > Severity::Medium);
    }

    #[test]
    fn bug_report_reads_defensively() {
        let v = json!({
            "has_bugs": true,
            "bugs_found": [{"type": "SQL Injection", "severity": "high", "line": 2}, "junk"],
            "overall_risk": "Critical"
        });
        let report = BugReport(&v);
        assert!(report.error().is_none());
        let bugs = report.bugs();
        assert_eq!(bugs.len(), 1);
        assert_eq!(bugs[0].text("line").as_deref(), Some("2"));
        assert_eq!(bugs[0].text_or("fix", "No fix provided"), "No fix provided");
        assert_eq!(report.risk(), Severity::Critical);
    }

    #[test]
    fn error_report_is_not_clean() {
        let v = json!({"error": "timeout"});
        let report = BugReport(&v);
        assert_eq!(report.error(), Some("timeout"));
        assert!(!report.has_bugs());
        assert!(report.bugs().is_empty());
    }

    #[test]
    fn security_score_accepts_strings() {
        let v = json!({"overall_security_score": "7.5", "vulnerabilities": []});
        assert_eq!(SecurityReport(&v).score(), 7.5);
        let v = json!({"overall_security_score": null});
        assert_eq!(SecurityReport(&v).score(), 0.0);
    }

    #[test]
    fn optimization_complexity_paths() {
        let v = json!({"current_complexity": {"time": "O(n^2)", "bottlenecks": ["nested loop"]}, "estimated_speedup": 2});
        let report = OptimizationReport(&v);
        assert_eq!(report.time_complexity(), Some("O(n^2)"));
        assert_eq!(report.space_complexity(), None);
        assert_eq!(report.bottlenecks(), vec!["nested loop".to_string()]);
        assert_eq!(report.estimated_speedup().as_deref(), Some("2"));
    }
}
