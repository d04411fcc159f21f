//! End-to-end orchestration of a single compliance check.
//!
//! `run_check` is the one entry point: load the page, extract the candidate
//! elements, judge them one by one, aggregate. The browser session stays open
//! for the whole run and is torn down on every exit path. Load and extraction
//! failures abort the run; classification failures do not.

use std::sync::Arc;

use thiserror::Error;

use crate::classify::{ClassificationError, Classifier, JudgmentProvider, Verdict};
use crate::config::CheckerConfig;
use crate::extract::{ExtractionError, extract_elements};
use crate::loader::{LoadError, PageLoader};
use crate::logging::{CheckerLogger, LogConfig};
use crate::report::ComplianceReport;

/// Fatal errors for a checker run. Per-element classification failures are
/// not represented here; they are absorbed into conservative verdicts.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("failed to set up the model client: {0}")]
    Provider(#[from] ClassificationError),
}

/// Run a full compliance check against one URL using configuration-driven
/// browser and model clients.
pub async fn run_check(config: CheckerConfig, url: &str) -> Result<ComplianceReport, CheckError> {
    let logger = build_logger(&config);
    let classifier = Classifier::from_config(&config, Arc::clone(&logger))?;
    run_check_with(config, &classifier, logger, url).await
}

/// Same as [`run_check`] but with a caller-supplied classifier, so the
/// judgment backend can be swapped out.
pub async fn run_check_with<P: JudgmentProvider>(
    config: CheckerConfig,
    classifier: &Classifier<P>,
    logger: Arc<CheckerLogger>,
    url: &str,
) -> Result<ComplianceReport, CheckError> {
    let loader = PageLoader::new(config, Arc::clone(&logger));
    let page = loader.load(url).await?;

    let html = match page.html().await {
        Ok(html) => html,
        Err(err) => {
            page.close().await;
            return Err(err.into());
        }
    };

    let report = match judge_document(url, &html, classifier, &logger).await {
        Ok(report) => report,
        Err(err) => {
            page.close().await;
            return Err(err);
        }
    };

    page.close().await;
    Ok(report)
}

/// Extract and judge every heading and label in an already-rendered document.
/// Elements are processed strictly in document order, one model call each.
pub async fn judge_document<P: JudgmentProvider>(
    url: &str,
    html: &str,
    classifier: &Classifier<P>,
    logger: &CheckerLogger,
) -> Result<ComplianceReport, CheckError> {
    let elements = extract_elements(html)?;
    logger.info(
        format!("Extracted {} elements to evaluate", elements.len()),
        Some("pipeline"),
        None,
    );

    let mut details: Vec<Verdict> = Vec::with_capacity(elements.len());
    for element in &elements {
        details.push(classifier.judge(url, element).await);
    }

    Ok(ComplianceReport::from_verdicts(url, details))
}

/// Bridge the optional plain-string logging callback from the configuration
/// into the structured logger used by the pipeline components.
pub fn build_logger(config: &CheckerConfig) -> Arc<CheckerLogger> {
    let mut log_config = LogConfig::new(config.verbose);
    if let Some(sink) = config.logger.clone() {
        log_config.external_logger = Some(Arc::new(move |record| {
            sink(&format!("{:<5} {}", record.level.label(), record.message));
        }));
    }
    Arc::new(CheckerLogger::with_config(log_config))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;

    use async_openai::error::{ApiError, OpenAIError};
    use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use crate::config::Verbosity;

    /// Replays canned judgments in order, one per call.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            }
        }
    }

    #[async_trait]
    impl JudgmentProvider for ScriptedProvider {
        async fn create_chat_completion(
            &self,
            _request: CreateChatCompletionRequest,
        ) -> Result<CreateChatCompletionResponse, OpenAIError> {
            match self.replies.lock().await.pop_front() {
                Some(content) => Ok(response_with_content(&content)),
                None => Err(OpenAIError::ApiError(ApiError {
                    message: "no reply scripted".into(),
                    r#type: None,
                    param: None,
                    code: None,
                })),
            }
        }
    }

    fn response_with_content(content: &str) -> CreateChatCompletionResponse {
        serde_json::from_value(json!({
            "id": "cmpl-test",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": { "role": "assistant", "content": content },
                "logprobs": null
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            },
            "system_fingerprint": null
        }))
        .unwrap()
    }

    fn test_logger() -> Arc<CheckerLogger> {
        Arc::new(CheckerLogger::new(Verbosity::Minimal))
    }

    fn classifier(provider: ScriptedProvider) -> Classifier<ScriptedProvider> {
        Classifier::new("gpt-4o", 5_000, provider, test_logger())
    }

    #[tokio::test]
    async fn judges_headings_and_labels_in_document_order() {
        let html = r#"
            <html><body>
              <h1>Introduction</h1>
              <h2>Click Here</h2>
              <form>
                <label for="name">Name</label>
                <input id="name" type="text">
              </form>
            </body></html>
        "#;
        let classifier = classifier(ScriptedProvider::new(&[
            r#"{"descriptive": true, "evaluation": "Clear opening topic."}"#,
            r#"{"descriptive": false, "evaluation": "Vague.", "recommendations": ["Name the destination"]}"#,
            r#"{"descriptive": true, "evaluation": "Clear field purpose."}"#,
        ]));

        let report = judge_document("https://example.com", html, &classifier, &test_logger())
            .await
            .expect("report");

        assert_eq!(report.total_elements, 3);
        assert_eq!(report.heading_count, 2);
        assert_eq!(report.label_count, 1);
        assert_eq!(report.descriptive_count, 2);
        assert_eq!(report.non_descriptive_count, 1);
        assert!(!report.overall_compliant);

        assert_eq!(report.details[0].element.text, "Introduction");
        assert_eq!(report.details[1].element.text, "Click Here");
        assert!(!report.details[1].is_descriptive);
        assert_eq!(report.details[2].element.text, "Name");
    }

    #[tokio::test]
    async fn page_without_candidates_is_compliant_without_model_calls() {
        let html = "<html><body><p>Plain prose only.</p></body></html>";
        let classifier = classifier(ScriptedProvider::new(&[]));

        let report = judge_document("https://example.com", html, &classifier, &test_logger())
            .await
            .expect("report");

        assert_eq!(report.total_elements, 0);
        assert!(report.overall_compliant);
    }

    #[tokio::test]
    async fn classification_failure_does_not_abort_the_run() {
        let html = r#"
            <html><body>
              <h1>Overview</h1>
              <h2>Details</h2>
            </body></html>
        "#;
        // Only one reply scripted; the second call fails at the provider.
        let classifier = classifier(ScriptedProvider::new(&[
            r#"{"descriptive": true, "evaluation": "ok"}"#,
        ]));

        let report = judge_document("https://example.com", html, &classifier, &test_logger())
            .await
            .expect("report");

        assert_eq!(report.total_elements, 2);
        assert_eq!(report.descriptive_count, 1);
        assert_eq!(report.non_descriptive_count, 1);
        assert!(report.details[1].rationale.contains("classification failed"));
    }

    #[tokio::test]
    async fn empty_document_is_a_fatal_extraction_error() {
        let classifier = classifier(ScriptedProvider::new(&[]));

        let err = judge_document("https://example.com", "", &classifier, &test_logger())
            .await
            .expect_err("should fail");

        assert!(matches!(err, CheckError::Extraction(_)));
    }
}
