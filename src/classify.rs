//! Descriptiveness classification of extracted elements.
//!
//! The provider seam mirrors a single-method capability interface so the
//! pipeline can be tested with a deterministic double. The production
//! implementation talks to any OpenAI-compatible endpoint through the
//! `async-openai` crate. One call per element, strictly sequential; a failed
//! or unparseable call never aborts the run and instead yields a conservative
//! non-descriptive verdict.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ResponseFormat,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::CheckerConfig;
use crate::extract::PageElement;
use crate::logging::CheckerLogger;
use crate::prompts;

/// Errors surfaced by the classification layer. These never abort the run;
/// [`Classifier::judge`] absorbs them into a conservative verdict.
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("missing model API key; set WCAG_CHECKER_API_KEY or a provider key")]
    MissingApiKey,
    #[error("invalid classification request: {0}")]
    InvalidRequest(String),
    #[error("classification call exceeded {0}ms")]
    Timeout(u64),
    #[error("model response did not contain a parseable judgment")]
    UnparseableResponse,
    #[error(transparent)]
    Provider(#[from] OpenAIError),
}

/// Per-element judgment plus rationale, one per [`PageElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub element: PageElement,
    pub is_descriptive: bool,
    pub rationale: String,
    pub recommendations: Vec<String>,
}

/// Shape the model is asked to reply with.
#[derive(Debug, Deserialize)]
struct Judgment {
    descriptive: bool,
    #[serde(default)]
    evaluation: String,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// Abstraction over the chat completion backend so the classifier can be
/// tested without performing real HTTP requests.
#[async_trait]
pub trait JudgmentProvider: Send + Sync {
    async fn create_chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError>;
}

/// Implementation of [`JudgmentProvider`] backed by OpenAI-compatible APIs.
#[derive(Clone, Debug)]
pub struct OpenAiJudgmentProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiJudgmentProvider {
    /// Wrap an existing `async-openai` client instance.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    /// Construct a provider using checker configuration values.
    pub fn from_config(config: &CheckerConfig) -> Result<Self, ClassificationError> {
        let api_key = config
            .model_api_key
            .clone()
            .or_else(|| env::var("MODEL_API_KEY").ok())
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or(ClassificationError::MissingApiKey)?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);

        if let Some(options) = config.model_client_options.as_ref() {
            if let Some(api_base) =
                extract_string(options, &["api_base", "apiBase", "base_url", "baseURL"])
            {
                openai_config = openai_config.with_api_base(api_base);
            }

            if let Some(org_id) = extract_string(options, &["organization", "org_id", "orgId"]) {
                openai_config = openai_config.with_org_id(org_id);
            }

            if let Some(project_id) =
                extract_string(options, &["project", "project_id", "projectId"])
            {
                openai_config = openai_config.with_project_id(project_id);
            }
        }

        Ok(Self::new(Client::with_config(openai_config)))
    }
}

#[async_trait]
impl JudgmentProvider for OpenAiJudgmentProvider {
    async fn create_chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError> {
        self.client.chat().create(request).await
    }
}

fn extract_string(options: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| options.get(*key).and_then(Value::as_str))
        .map(|value| value.to_string())
}

/// Judges one element at a time against WCAG 2.4.6.
pub struct Classifier<P: JudgmentProvider> {
    provider: P,
    model: String,
    timeout_ms: u64,
    logger: Arc<CheckerLogger>,
}

impl<P: JudgmentProvider> Classifier<P> {
    pub fn new(
        model: impl Into<String>,
        timeout_ms: u64,
        provider: P,
        logger: Arc<CheckerLogger>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            timeout_ms,
            logger,
        }
    }

    /// Access the underlying provider (primarily for testing).
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Judge one element, absorbing every failure into a conservative
    /// non-descriptive verdict so the run always continues.
    pub async fn judge(&self, url: &str, element: &PageElement) -> Verdict {
        match self.try_judge(url, element).await {
            Ok(verdict) => verdict,
            Err(err) => {
                self.logger.error(
                    format!(
                        "Classification failed for {} '{}': {err}",
                        element.kind.label(),
                        element.text
                    ),
                    Some("classify"),
                    None,
                );
                Verdict {
                    element: element.clone(),
                    is_descriptive: false,
                    rationale: format!("classification failed: {err}"),
                    recommendations: vec!["re-run the check for this element".to_string()],
                }
            }
        }
    }

    async fn try_judge(
        &self,
        url: &str,
        element: &PageElement,
    ) -> Result<Verdict, ClassificationError> {
        let request = self.build_request(url, element)?;

        self.logger.debug(
            format!(
                "Requesting judgment for {} '{}'",
                element.kind.label(),
                element.text
            ),
            Some("classify"),
            None,
        );

        let response = tokio::time::timeout(
            Duration::from_millis(self.timeout_ms),
            self.provider.create_chat_completion(request),
        )
        .await
        .map_err(|_| ClassificationError::Timeout(self.timeout_ms))??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        self.logger.debug(
            "Model judgment received",
            Some("classify"),
            Some(json!({ "content": content })),
        );

        let judgment =
            parse_judgment(&content).ok_or(ClassificationError::UnparseableResponse)?;

        Ok(Verdict {
            element: element.clone(),
            is_descriptive: judgment.descriptive,
            rationale: judgment.evaluation,
            recommendations: judgment.recommendations,
        })
    }

    fn build_request(
        &self,
        url: &str,
        element: &PageElement,
    ) -> Result<CreateChatCompletionRequest, ClassificationError> {
        let system = ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(ChatCompletionRequestSystemMessageContent::Text(
                    prompts::build_classifier_system_prompt(),
                ))
                .build()
                .map_err(|err| ClassificationError::InvalidRequest(err.to_string()))?,
        );

        let user = ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Text(
                    prompts::build_element_prompt(url, element),
                ))
                .build()
                .map_err(|err| ClassificationError::InvalidRequest(err.to_string()))?,
        );

        CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(vec![system, user])
            .max_tokens(1_000u32)
            .response_format(ResponseFormat::JsonObject)
            .build()
            .map_err(|err| ClassificationError::InvalidRequest(err.to_string()))
    }
}

impl Classifier<OpenAiJudgmentProvider> {
    /// Convenience constructor that wires the OpenAI provider from the
    /// checker configuration.
    pub fn from_config(
        config: &CheckerConfig,
        logger: Arc<CheckerLogger>,
    ) -> Result<Self, ClassificationError> {
        let provider = OpenAiJudgmentProvider::from_config(config)?;
        Ok(Classifier::new(
            config.model_name.clone(),
            config.classify_timeout_ms,
            provider,
            logger,
        ))
    }
}

/// Extract the judgment object from a free-form model reply. The reply is
/// expected to be JSON but may be wrapped in prose; the first `{` to the last
/// `}` is taken as the candidate document.
fn parse_judgment(content: &str) -> Option<Judgment> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}
