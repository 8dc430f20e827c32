//! Instruction templates for the three analyses.
//!
//! Each template pairs a fixed system message with a user message that has
//! two placeholders, `{query_code}` and `{retrieved_context}`. Rendering is
//! a single left-to-right pass, so placeholder text that appears inside the
//! inserted code is left alone.

use serde::Serialize;

/// A system + user message pair ready for a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

/// The three analyses a template exists for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    BugDetection,
    Optimization,
    SecurityScoring,
}

impl PromptKind {
    fn system(&self) -> &'static str {
        match self {
            PromptKind::BugDetection => BUG_DETECTION_SYSTEM,
            PromptKind::Optimization => OPTIMIZATION_SYSTEM,
            PromptKind::SecurityScoring => SECURITY_SCORING_SYSTEM,
        }
    }

    fn template(&self) -> &'static str {
        match self {
            PromptKind::BugDetection => BUG_DETECTION_TEMPLATE,
            PromptKind::Optimization => OPTIMIZATION_TEMPLATE,
            PromptKind::SecurityScoring => SECURITY_SCORING_TEMPLATE,
        }
    }
}

/// Render the prompt for `kind`.
pub fn render(kind: PromptKind, query_code: &str, context: &str) -> RenderedPrompt {
    RenderedPrompt {
        system: kind.system().to_string(),
        user: interpolate(kind.template(), query_code, context),
    }
}

const CODE_SLOT: &str = "{query_code}";
const CONTEXT_SLOT: &str = "{retrieved_context}";

fn interpolate(template: &str, query_code: &str, context: &str) -> String {
    let mut out = String::with_capacity(template.len() + query_code.len() + context.len());
    let mut rest = template;
    loop {
        let next_code = rest.find(CODE_SLOT);
        let next_ctx = rest.find(CONTEXT_SLOT);
        let (pos, slot, value) = match (next_code, next_ctx) {
            (Some(a), Some(b)) if a < b => (a, CODE_SLOT, query_code),
            (Some(_), Some(b)) => (b, CONTEXT_SLOT, context),
            (Some(a), None) => (a, CODE_SLOT, query_code),
            (None, Some(b)) => (b, CONTEXT_SLOT, context),
            (None, None) => break,
        };
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + slot.len()..];
    }
    out.push_str(rest);
    out
}

const BUG_DETECTION_SYSTEM: &str = "You are an expert software security analyst specializing in vulnerability detection and bug identification. You have deep knowledge of:
- OWASP Top 10 vulnerabilities
- Common coding mistakes and anti-patterns
- Secure coding practice
- Exploitability assessment

Reason step by step and analyze the code thoroughly.";

const BUG_DETECTION_TEMPLATE: &str = r#"Analyze the following code for bugs and vulnerabilities, reasoning step by step.

# CODE TO ANALYZE
{query_code}

# SIMILAR BUG PATTERNS FROM KNOWLEDGE BASE
{retrieved_context}

# ANALYSIS STEPS

**Step 1: Identify vulnerability types**
- Look for: SQL injection, XSS, null dereference, race conditions, resource leaks
- Check for: input validation gaps, unsafe deserialization, weak cryptography
- Examine: authentication and authorization flaws, information disclosure

**Step 2: Assess exploitability**
- How hard is it to exploit? (easy/moderate/hard)
- What preconditions are needed?
- Is it remotely exploitable or does it need local access?

**Step 3: Determine impact**
- Confidentiality: can an attacker read sensitive data? (none/partial/complete)
- Integrity: can an attacker change data or behavior? (none/partial/complete)
- Availability: can an attacker disrupt service? (none/partial/complete)

**Step 4: Provide a specific fix**
- Give a concrete code example of the fix
- Explain why it works
- Suggest additional hardening

# OUTPUT FORMAT

Respond with a single JSON object:
{
  "has_bugs": true/false,
  "bugs_found": [
    {
      "type": "vulnerability type (e.g., SQL Injection)",
      "line": line_number or "general",
      "description": "detailed description of the bug",
      "severity": "low/medium/high/critical",
      "exploit_difficulty": "easy/moderate/hard",
      "impact": {
        "confidentiality": "none/partial/complete",
        "integrity": "none/partial/complete",
        "availability": "none/partial/complete"
      },
      "cwe_id": "CWE-XXX if applicable",
      "fix": "specific code fix with example",
      "additional_recommendations": ["extra hardening measures"]
    }
  ],
  "reasoning": "step-by-step explanation of the analysis",
  "overall_risk": "low/medium/high/critical"
}

Be thorough and precise."#;

const OPTIMIZATION_SYSTEM: &str = "You are a performance optimization expert with deep knowledge of:
- Algorithmic complexity (Big O notation)
- Python performance practice
- Memory efficiency and profiling
- Pythonic idioms

Reason step by step to find optimization opportunities.";

const OPTIMIZATION_TEMPLATE: &str = r#"Analyze the following code for optimization opportunities, reasoning step by step.

# CODE TO ANALYZE
{query_code}

# OPTIMIZATION EXAMPLES FROM KNOWLEDGE BASE
{retrieved_context}

# ANALYSIS STEPS

**Step 1: Complexity**
- Current time complexity (Big O)
- Current space complexity (Big O)
- Bottlenecks

**Step 2: Algorithmic improvements**
- Is there a better algorithm?
- Are there redundant operations?
- Can results be cached or memoized?

**Step 3: Idiomatic Python**
- Are the right built-ins used? (comprehensions, map, filter)
- Can standard library functions replace hand-written code?
- Is there a more readable alternative?

**Step 4: Memory**
- Are there unnecessary copies?
- Could generators replace lists?
- Is anything accumulating without bound?

# OUTPUT FORMAT

Respond with a single JSON object:
{
  "current_complexity": {
    "time": "O(n) or other notation",
    "space": "O(n) or other notation",
    "bottlenecks": ["performance issues"]
  },
  "optimizations": [
    {
      "type": "algorithmic/syntactic/memory/library",
      "description": "what to improve",
      "current_code_snippet": "problematic code",
      "optimized_code": "improved version",
      "improvement": "expected gain (e.g., O(n^2) -> O(n log n))",
      "trade_offs": "trade-offs or caveats"
    }
  ],
  "pythonic_improvements": [
    {
      "suggestion": "use a list comprehension instead of a for loop",
      "code_example": "optimized code"
    }
  ],
  "reasoning": "step-by-step explanation",
  "estimated_speedup": "percentage or factor (e.g., 2x faster)"
}

Weigh readability alongside performance."#;

const SECURITY_SCORING_SYSTEM: &str = "You are a cybersecurity expert specializing in CVSS (Common Vulnerability Scoring System) assessments. You understand:
- CVSS v3.1 scoring methodology
- NVD (National Vulnerability Database) conventions
- Industry-standard severity ratings
- Risk assessment frameworks

Give accurate CVSS scores that follow the official specification.";

const SECURITY_SCORING_TEMPLATE: &str = r#"Assess the security vulnerabilities in this code using CVSS v3.1.

# CODE TO ANALYZE
{query_code}

# KNOWN VULNERABILITY PATTERNS
{retrieved_context}

# CVSS BASE METRICS

**Attack Vector (AV)**
- Network (N): 0.85
- Adjacent (A): 0.62
- Local (L): 0.55
- Physical (P): 0.20

**Attack Complexity (AC)**
- Low (L): 0.77
- High (H): 0.44

**Privileges Required (PR)**
- None (N): 0.85
- Low (L): 0.62
- High (H): 0.27

**User Interaction (UI)**
- None (N): 0.85
- Required (R): 0.62

**Impact (C/I/A)**
- None (N): 0
- Low (L): 0.22
- High (H): 0.56

# OUTPUT FORMAT

Respond with a single JSON object:
{
  "vulnerabilities": [
    {
      "type": "vulnerability type",
      "description": "detailed description",
      "cvss_vector": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:N",
      "cvss_score": 9.1,
      "severity": "Critical",
      "metrics": {
        "attack_vector": "Network",
        "attack_complexity": "Low",
        "privileges_required": "None",
        "user_interaction": "None",
        "scope": "Unchanged",
        "confidentiality_impact": "High",
        "integrity_impact": "High",
        "availability_impact": "None"
      },
      "cwe_id": "CWE-XXX",
      "remediation": "how to fix",
      "references": ["CWE and OWASP links"]
    }
  ],
  "overall_security_score": 9.1,
  "overall_severity": "Critical",
  "risk_summary": "summary of the security posture",
  "immediate_actions": ["fixes in priority order"]
}

Compute scores with the official CVSS v3.1 equations."#;
