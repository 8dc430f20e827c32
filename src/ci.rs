//! CI commands over a saved results file: the merge gate and the HTML
//! dashboard.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use neurashield_core::gate::evaluate;
use neurashield_core::models::AnalysisResult;
use neurashield_core::report::dashboard_html;

use crate::analyze::write_text;

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultsFile {
    Many(Vec<AnalysisResult>),
    One(Box<AnalysisResult>),
}

/// Read a results file: a JSON array of results, or a single result.
pub fn load_results(path: &Path) -> Result<Vec<AnalysisResult>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("{} not found or unreadable", path.display()))?;
    let parsed: ResultsFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    Ok(match parsed {
        ResultsFile::Many(results) => results,
        ResultsFile::One(result) => vec![*result],
    })
}

/// `shield gate <results.json>`. Returns whether the merge may proceed.
pub fn run_gate(results_path: &Path) -> Result<bool> {
    let results = load_results(results_path)?;
    let report = evaluate(&results);
    print!("{}", report.render());
    Ok(!report.blocks())
}

/// `shield dashboard`.
pub fn run_dashboard(results_path: &Path, out: &Path) -> Result<()> {
    let results = load_results(results_path)?;
    let generated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    write_text(out, &dashboard_html(&results, &generated_at))?;
    println!(
        "dashboard: {} file(s) from {} written to {}",
        results.len(),
        results_path.display(),
        out.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn accepts_arrays_and_single_objects() {
        let tmp = TempDir::new().unwrap();
        let many = write(&tmp, "many.json", r#"[{"file_path": "a.py"}, {"file_path": "b.py"}]"#);
        let one = write(&tmp, "one.json", r#"{"file_path": "a.py", "bug_analysis": {}}"#);
        assert_eq!(load_results(&many).unwrap().len(), 2);
        assert_eq!(load_results(&one).unwrap()[0].file_path.as_deref(), Some("a.py"));
    }

    #[test]
    fn missing_or_invalid_files_are_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(load_results(&tmp.path().join("absent.json")).is_err());
        let bad = write(&tmp, "bad.json", "{not json");
        assert!(load_results(&bad).is_err());
        assert!(run_gate(&bad).is_err());
    }

    #[test]
    fn gate_blocks_on_critical_risk() {
        let tmp = TempDir::new().unwrap();
        let critical = write(
            &tmp,
            "critical.json",
            r#"[{"file_path": "a.py", "bug_analysis": {"has_bugs": true, "overall_risk": "critical", "bugs_found": []}}]"#,
        );
        let clean = write(
            &tmp,
            "clean.json",
            r#"[{"file_path": "a.py", "bug_analysis": {"has_bugs": false, "overall_risk": "low", "bugs_found": []}}]"#,
        );
        assert!(!run_gate(&critical).unwrap());
        assert!(run_gate(&clean).unwrap());
    }

    #[test]
    fn dashboard_is_written() {
        let tmp = TempDir::new().unwrap();
        let results = write(&tmp, "r.json", r#"[{"file_path": "<evil>.py"}]"#);
        let out = tmp.path().join("site/dashboard.html");
        run_dashboard(&results, &out).unwrap();
        let html = std::fs::read_to_string(out).unwrap();
        assert!(html.contains("&lt;evil&gt;.py"));
    }
}
