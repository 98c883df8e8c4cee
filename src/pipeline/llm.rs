//! The generative-model port and its edgequake-llm adapter.
//!
//! Both model calls (document structuring and image selection) go through
//! [`GenerativeModel`]. The production implementation, [`LlmModel`], wraps any
//! `edgequake_llm` provider; tests plug in scripted models.
//!
//! ## Error classification
//!
//! Provider errors arrive as opaque error values. [`LlmModel`] turns them into
//! a [`PortError`] with an [`ErrorClass`] right here, so the retry loop and
//! the callers only ever look at the class.
//!
//! ## Retry Strategy
//!
//! Quota errors are frequent when a long listing fans out into one selection
//! call per record. [`generate`] retries `RateLimited` replies with the
//! configured exponential backoff and jitter; other failures return at once.

use crate::config::PipelineConfig;
use crate::error::{ErrorClass, PipelineError, PortError};
use crate::retry::{with_retry, RetryPolicy};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Which of the two prompt shapes a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Whole-document structuring.
    Structure,
    /// Per-record image ranking.
    SelectImage,
}

/// One multimodal request: optional system text, user text and images.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub kind: RequestKind,
    pub system: Option<String>,
    pub text: String,
    pub images: Vec<ImageData>,
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, PortError>;
}

/// Call `model` with backoff on rate limits, logging token usage.
pub async fn generate(
    model: &dyn GenerativeModel,
    request: &ModelRequest,
    policy: &RetryPolicy,
) -> Result<ModelReply, PortError> {
    let start = Instant::now();
    let what = match request.kind {
        RequestKind::Structure => "document structuring",
        RequestKind::SelectImage => "image selection",
    };
    let reply = with_retry(policy, what, || model.generate(request)).await?;
    debug!(
        "{what}: {} input tokens, {} output tokens, {:?}",
        reply.prompt_tokens,
        reply.completion_tokens,
        start.elapsed()
    );
    Ok(reply)
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// [`GenerativeModel`] over an `edgequake_llm` provider.
pub struct LlmModel {
    provider: Arc<dyn LLMProvider>,
    name: String,
}

impl LlmModel {
    pub fn new(provider: Arc<dyn LLMProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }
}

#[async_trait]
impl GenerativeModel for LlmModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, PortError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user_with_images(
            request.text.as_str(),
            request.images.clone(),
        ));

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        match self.provider.chat(&messages, Some(&options)).await {
            Ok(response) => Ok(ModelReply {
                content: response.content,
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
            }),
            Err(e) => {
                let message = e.to_string();
                Err(PortError::new(classify_provider_error(&message), &self.name, message))
            }
        }
    }
}

/// Classify a provider error from its rendered message.
///
/// edgequake-llm folds the HTTP status and the provider's error body into the
/// message, so the status code and the quota reasons are reliably present.
pub fn classify_provider_error(message: &str) -> ErrorClass {
    let m = message.to_ascii_lowercase();
    let rate_limited = ["429", "rate limit", "rate_limit", "ratelimit", "quota", "resource_exhausted", "too many requests"];
    let transient = ["timeout", "timed out", "500", "502", "503", "504", "overloaded", "unavailable", "connection"];
    if rate_limited.iter().any(|p| m.contains(p)) {
        ErrorClass::RateLimited
    } else if transient.iter().any(|p| m.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn default_model_for(provider: &str) -> &'static str {
    match provider {
        "gemini" => "gemini-2.0-flash",
        "anthropic" => "claude-sonnet-4-20250514",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_model(provider_name: &str, model: &str) -> Result<Arc<dyn GenerativeModel>, PipelineError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    info!("Using {provider_name}/{model}");
    Ok(Arc::new(LlmModel::new(provider, format!("{provider_name}/{model}"))))
}

/// Resolve the model port, from most-specific to least-specific.
///
/// 1. **Pre-built port** (`config.generative_model`) - used as-is.
/// 2. **Pre-built provider** (`config.provider`) - wrapped in [`LlmModel`].
/// 3. **Named provider** (`config.provider_name`) + optional model.
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`).
/// 5. **Gemini key** (`GEMINI_API_KEY`) - the listings workflow was tuned on
///    Gemini, so it wins when several keys are present.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_model(config: &PipelineConfig) -> Result<Arc<dyn GenerativeModel>, PipelineError> {
    if let Some(model) = &config.generative_model {
        return Ok(Arc::clone(model));
    }

    if let Some(provider) = &config.provider {
        let name = config.model.clone().unwrap_or_else(|| "custom".to_string());
        return Ok(Arc::new(LlmModel::new(Arc::clone(provider), name)));
    }

    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or(default_model_for(name));
        return create_vision_model(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_model(&prov, &model);
        }
    }

    if std::env::var("GEMINI_API_KEY").map(|k| !k.is_empty()).unwrap_or(false) {
        let model = config.model.as_deref().unwrap_or(default_model_for("gemini"));
        return create_vision_model("gemini", model);
    }

    let (provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {e}"
            ),
        })?;
    Ok(Arc::new(LlmModel::new(provider, "auto")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classify_messages() {
        assert_eq!(
            classify_provider_error("HTTP 429: RESOURCE_EXHAUSTED"),
            ErrorClass::RateLimited
        );
        assert_eq!(
            classify_provider_error("You exceeded your current quota"),
            ErrorClass::RateLimited
        );
        assert_eq!(classify_provider_error("503 Service Unavailable"), ErrorClass::Transient);
        assert_eq!(classify_provider_error("invalid api key"), ErrorClass::Permanent);
    }

    struct Throttled {
        calls: AtomicU32,
    }

    #[async_trait]
    impl GenerativeModel for Throttled {
        fn name(&self) -> &str {
            "throttled"
        }

        async fn generate(&self, _request: &ModelRequest) -> Result<ModelReply, PortError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(PortError::rate_limited("throttled", "429"))
            } else {
                Ok(ModelReply {
                    content: "[]".into(),
                    ..Default::default()
                })
            }
        }
    }

    #[tokio::test]
    async fn generate_retries_rate_limits() {
        let model = Throttled {
            calls: AtomicU32::new(0),
        };
        let request = ModelRequest {
            kind: RequestKind::Structure,
            system: None,
            text: "x".into(),
            images: vec![],
            temperature: 0.1,
            max_tokens: 10,
        };
        let reply = generate(&model, &request, &RetryPolicy::immediate(3)).await.unwrap();
        assert_eq!(reply.content, "[]");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prebuilt_port_wins() {
        let port: Arc<dyn GenerativeModel> = Arc::new(Throttled {
            calls: AtomicU32::new(0),
        });
        let config = PipelineConfig::builder()
            .generative_model(port)
            .provider_name("nonexistent")
            .build()
            .unwrap();
        assert_eq!(resolve_model(&config).unwrap().name(), "throttled");
    }
}
