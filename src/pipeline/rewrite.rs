//! Provider resolution, pacing, and retry for the rewrite stage.
//!
//! [`RewriteProvider`] is the seam between the pipeline and the model
//! backend: one async call, text in, text out. [`LlmProvider`] adapts any
//! `edgequake-llm` provider to it; tests substitute scripted stubs.
//!
//! [`RewriteClient`] wraps a provider with the two policies every call
//! shares: a pacing sleep before each request (rate-limit hygiene, applied
//! even to the first call after a resume) and exponential-backoff retry on
//! transient failures. With 2 s base and 3 attempts the wait sequence is
//! 2 s → 4 s; fatal errors are never retried.

use std::sync::Arc;

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::config::PolishConfig;
use crate::error::{PolishError, ProviderError};

/// Text-to-text model backend for the rewrite stage.
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    /// Short provider name for logs and the checkpoint identity.
    fn name(&self) -> &str;

    /// One completion call. Errors must already be classified as transient
    /// or fatal; the caller decides whether to retry from that alone.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ProviderError>;
}

/// [`RewriteProvider`] backed by an `edgequake-llm` chat provider.
pub struct LlmProvider {
    inner: Arc<dyn LLMProvider>,
    name: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmProvider {
    /// Resolve a provider from the config, most-specific first:
    ///
    /// 1. Pre-built provider (`config.provider`) — used as-is.
    /// 2. Named provider (`config.provider_name`) — instantiated via
    ///    [`ProviderFactory::create_llm_provider`], which reads the matching
    ///    API key (`OPENAI_API_KEY`, `GEMINI_API_KEY`, ...) from the
    ///    environment.
    /// 3. Auto-detection ([`ProviderFactory::from_env`]) — the factory scans
    ///    known API key variables and picks the first available provider.
    pub fn resolve(config: &PolishConfig) -> Result<Arc<dyn RewriteProvider>, PolishError> {
        if let Some(ref provider) = config.provider {
            return Ok(Arc::clone(provider));
        }

        let inner: Arc<dyn LLMProvider>;
        let name: String;
        if let Some(ref provider_name) = config.provider_name {
            inner = ProviderFactory::create_llm_provider(provider_name, config.model_name())
                .map_err(|e| PolishError::Validation {
                    message: format!(
                        "provider '{provider_name}' is not configured: {e}\n\
                         Check that the matching API key environment variable is set."
                    ),
                })?;
            name = provider_name.clone();
        } else {
            let (llm, _embedding) =
                ProviderFactory::from_env().map_err(|e| PolishError::Validation {
                    message: format!(
                        "no LLM provider could be auto-detected from the environment: {e}\n\
                         Set OPENAI_API_KEY, GEMINI_API_KEY, or pass an explicit provider."
                    ),
                })?;
            inner = llm;
            name = "auto".to_string();
        }

        Ok(Arc::new(LlmProvider {
            inner,
            name,
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
        }))
    }
}

#[async_trait]
impl RewriteProvider for LlmProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let options = CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        };

        match self.inner.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "{}: {} input tokens, {} output tokens",
                    self.name, response.prompt_tokens, response.completion_tokens
                );
                Ok(response.content)
            }
            // Provider SDK errors carry no retryability flag; classify from
            // the message text.
            Err(e) => Err(ProviderError::classify(format!("{e}"))),
        }
    }
}

/// A provider plus the pacing and retry policy applied to every call.
pub struct RewriteClient {
    provider: Arc<dyn RewriteProvider>,
    system_prompt: &'static str,
    pace: Duration,
    max_retries: u32,
    backoff_ms: u64,
}

impl RewriteClient {
    pub fn new(provider: Arc<dyn RewriteProvider>, config: &PolishConfig) -> Self {
        Self {
            provider,
            system_prompt: crate::prompts::system_prompt(config.mode),
            pace: Duration::from_millis(config.sleep_ms),
            max_retries: config.max_retries.max(1),
            backoff_ms: config.retry_backoff_ms,
        }
    }

    /// One paced, retried rewrite call.
    ///
    /// Sleeps the pacing interval first, then tries up to `max_retries`
    /// times. Transient failures back off `backoff_ms * 2^attempt` before
    /// the next try; fatal failures return immediately.
    pub async fn rewrite(&self, user_prompt: &str) -> Result<String, ProviderError> {
        if !self.pace.is_zero() {
            sleep(self.pace).await;
        }

        let mut last_message = String::new();
        for attempt in 0..self.max_retries {
            match self.provider.generate(self.system_prompt, user_prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() => {
                    last_message = e.message;
                    if attempt + 1 < self.max_retries {
                        // Saturate: the caller may configure enough attempts
                        // to overflow a plain shift.
                        let backoff = self
                            .backoff_ms
                            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
                        warn!(
                            "Transient provider error (attempt {}/{}), retrying in {backoff}ms: {last_message}",
                            attempt + 1,
                            self.max_retries
                        );
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::fatal(format!(
            "retries exhausted after {} attempts: {last_message}",
            self.max_retries
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls with the given error, then succeeds.
    struct FlakyProvider {
        failures: u32,
        transient: bool,
        calls: AtomicU32,
    }

    impl FlakyProvider {
        fn new(failures: u32, transient: bool) -> Self {
            Self {
                failures,
                transient,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RewriteProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    Err(ProviderError::transient("429 rate limited"))
                } else {
                    Err(ProviderError::fatal("invalid api key"))
                }
            } else {
                Ok("polished".to_string())
            }
        }
    }

    fn client(provider: Arc<dyn RewriteProvider>, max_retries: u32) -> RewriteClient {
        let config = PolishConfig::builder()
            .sleep_ms(0)
            .retry_backoff_ms(1)
            .max_retries(max_retries)
            .build()
            .unwrap();
        RewriteClient::new(provider, &config)
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let provider = Arc::new(FlakyProvider::new(0, true));
        let c = client(provider.clone(), 3);
        assert_eq!(c.rewrite("text").await.unwrap(), "polished");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = Arc::new(FlakyProvider::new(2, true));
        let c = client(provider.clone(), 3);
        assert_eq!(c.rewrite("text").await.unwrap(), "polished");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_transient_errors() {
        let provider = Arc::new(FlakyProvider::new(3, true));
        let c = client(provider.clone(), 3);
        let err = c.rewrite("text").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message.contains("retries exhausted after 3 attempts"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deep_retry_counts_do_not_overflow_the_backoff() {
        // More than 64 attempts would overflow a plain `1 << attempt`.
        let provider = Arc::new(FlakyProvider::new(70, true));
        let config = PolishConfig::builder()
            .sleep_ms(0)
            .retry_backoff_ms(0)
            .max_retries(71)
            .build()
            .unwrap();
        let c = RewriteClient::new(provider.clone(), &config);
        assert_eq!(c.rewrite("text").await.unwrap(), "polished");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 71);
    }

    #[tokio::test(start_paused = true)]
    async fn pacing_applies_before_the_first_call() {
        let provider = Arc::new(FlakyProvider::new(0, true));
        let config = PolishConfig::builder()
            .sleep_ms(250)
            .retry_backoff_ms(1)
            .build()
            .unwrap();
        let c = RewriteClient::new(provider, &config);

        let before = tokio::time::Instant::now();
        c.rewrite("text").await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let provider = Arc::new(FlakyProvider::new(1, false));
        let c = client(provider.clone(), 3);
        let err = c.rewrite("text").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message.contains("invalid api key"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
