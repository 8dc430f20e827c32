//! Analysis orchestration.
//!
//! [`Analyzer`] runs the context builder once per input, then asks a
//! [`ChatModel`] for each requested sub-analysis and assembles one
//! [`AnalysisResult`]. Execution is sequential.
//!
//! Failures never abort a run:
//!
//! - a context retrieval failure is recorded in
//!   [`AnalysisResult::context_error`] and the analysis proceeds with an
//!   empty context;
//! - a chat failure or an unparsable reply becomes a sub-report of the form
//!   `{"error": "...", "raw_response": "..."}`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::{ContextBuilder, RagContext};
use crate::models::{AnalysisResult, AnalysisType};
use crate::prompts::{self, PromptKind, RenderedPrompt};

/// A hosted chat model that answers with JSON text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String>;
}

/// Extract the JSON object from a model reply.
///
/// Accepts bare JSON, JSON wrapped in a Markdown code fence, or JSON
/// surrounded by prose (the outermost `{ ... }` is used). Anything else
/// yields an `error` object carrying the raw reply.
pub fn parse_json_response(text: &str) -> Value {
    let trimmed = strip_code_fence(text.trim());
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => json!({
            "error": "Model reply was JSON but not an object",
            "raw_response": text,
        }),
        Err(e) => json!({
            "error": format!("Failed to parse model reply as JSON: {}", e),
            "raw_response": text,
        }),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Sends rendered prompts to a chat model and parses the replies.
pub struct LlmAnalyzer<'a> {
    chat: &'a dyn ChatModel,
}

impl<'a> LlmAnalyzer<'a> {
    pub fn new(chat: &'a dyn ChatModel) -> Self {
        Self { chat }
    }

    pub fn model_name(&self) -> &str {
        self.chat.model_name()
    }

    /// Run one sub-analysis. Always returns a JSON object.
    pub async fn run(&self, kind: PromptKind, query_code: &str, context: &str) -> Value {
        let prompt = prompts::render(kind, query_code, context);
        match self.chat.complete(&prompt).await {
            Ok(reply) => parse_json_response(&reply),
            Err(e) => json!({ "error": format!("{:#}", e) }),
        }
    }

    pub async fn analyze_for_bugs(&self, query_code: &str, context: &str) -> Value {
        self.run(PromptKind::BugDetection, query_code, context).await
    }

    pub async fn analyze_for_optimization(&self, query_code: &str, context: &str) -> Value {
        self.run(PromptKind::Optimization, query_code, context).await
    }

    pub async fn calculate_security_score(&self, query_code: &str, context: &str) -> Value {
        self.run(PromptKind::SecurityScoring, query_code, context).await
    }
}

/// One named input for batch analysis.
#[derive(Debug, Clone)]
pub struct CodeSample {
    pub name: Option<String>,
    pub code: String,
}

pub struct Analyzer<'a> {
    context: ContextBuilder<'a>,
    llm: LlmAnalyzer<'a>,
}

impl<'a> Analyzer<'a> {
    pub fn new(context: ContextBuilder<'a>, chat: &'a dyn ChatModel) -> Self {
        Self {
            context,
            llm: LlmAnalyzer::new(chat),
        }
    }

    /// Analyze one piece of code.
    pub async fn analyze_code(
        &self,
        code: &str,
        analysis_type: AnalysisType,
        top_k: Option<usize>,
    ) -> AnalysisResult {
        let timestamp = chrono::Utc::now().to_rfc3339();

        let (rag, context_error) = match self
            .context
            .build(code, analysis_type.as_str(), top_k, None)
            .await
        {
            Ok(rag) => (rag, None),
            Err(e) => (
                RagContext::empty(code, analysis_type.as_str()),
                Some(format!("{:#}", e)),
            ),
        };

        let mut result = AnalysisResult {
            timestamp,
            code: code.to_string(),
            analysis_type: analysis_type.as_str().to_string(),
            retrieved_patterns_count: rag.num_patterns,
            retrieved_patterns: rag.retrieved_patterns,
            context_error,
            ..Default::default()
        };

        let context = rag.formatted_context.as_str();
        if analysis_type.includes_bugs() {
            result.bug_analysis = Some(self.llm.analyze_for_bugs(code, context).await);
        }
        if analysis_type.includes_optimization() {
            result.optimization_analysis = Some(self.llm.analyze_for_optimization(code, context).await);
        }
        if analysis_type.includes_security() {
            result.security_analysis = Some(self.llm.calculate_security_score(code, context).await);
        }
        result
    }

    /// Analyze each sample in turn, tagging results with the sample name
    /// (`sample_<n>` when unnamed, 1-based).
    pub async fn batch_analyze(
        &self,
        samples: &[CodeSample],
        analysis_type: AnalysisType,
    ) -> Vec<AnalysisResult> {
        let mut results = Vec::with_capacity(samples.len());
        for (i, sample) in samples.iter().enumerate() {
            let mut result = self.analyze_code(&sample.code, analysis_type, None).await;
            result.sample_name = Some(
                sample
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("sample_{}", i + 1)),
            );
            results.push(result);
        }
        results
    }
}
