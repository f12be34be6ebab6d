//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! Backend credentials are optional at build time; they are checked when a
//! backend adapter is constructed, so fake backends need no keys.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Default Bocha web-search endpoint.
pub const DEFAULT_SEARCH_URL: &str = "https://api.bochaai.com/v1/web-search";
/// Default model for planning and reflection.
const DEFAULT_PLANNER_MODEL: &str = "qwen-max";
/// Default model for the streamed report.
const DEFAULT_SYNTHESIS_MODEL: &str = "deepseek-r1";
/// Results requested per sub-query.
const DEFAULT_SEARCH_RESULTS: usize = 5;
/// Search call deadline in seconds.
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 45;
/// Non-streaming inference deadline in seconds.
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 120;
/// Longest silence tolerated between report fragments, in seconds.
const DEFAULT_STREAM_IDLE_SECS: u64 = 60;
/// Evidence budget for the reflection prompt, in characters.
const DEFAULT_REFLECTION_BUDGET: usize = 20_000;
/// Evidence budget for the synthesis prompt, in characters.
const DEFAULT_SYNTHESIS_BUDGET: usize = 60_000;
const DEFAULT_PLANNER_MAX_TOKENS: u32 = 1024;
const DEFAULT_REFLECTION_MAX_TOKENS: u32 = 1024;
const DEFAULT_SYNTHESIS_MAX_TOKENS: u32 = 8192;
const DEFAULT_PLANNING_TEMPERATURE: f32 = 0.2;
const DEFAULT_SYNTHESIS_TEMPERATURE: f32 = 0.5;
/// Pause between dispatching consecutive searches.
const DEFAULT_REQUEST_DELAY_MS: u64 = 0;

/// Iteration budget of a research session, always within `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MaxIterations(u32);

impl MaxIterations {
    /// Smallest accepted budget.
    pub const MIN: u32 = 1;
    /// Largest accepted budget.
    pub const MAX: u32 = 5;
    /// Budget used when none is given.
    pub const DEFAULT: Self = Self(3);

    /// Validates a budget.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when `n` is outside `1..=5`.
    pub fn new(n: u32) -> Result<Self, ConfigError> {
        if (Self::MIN..=Self::MAX).contains(&n) {
            Ok(Self(n))
        } else {
            Err(ConfigError::InvalidValue {
                key: "max_iterations",
                message: format!("{n} is outside {}..={}", Self::MIN, Self::MAX),
            })
        }
    }

    /// Clamps an arbitrary request into the accepted range.
    #[must_use]
    pub const fn clamped(n: u32) -> Self {
        if n < Self::MIN {
            Self(Self::MIN)
        } else if n > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(n)
        }
    }

    /// The budget as a plain number.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for MaxIterations {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Configuration for the research engine and its backends.
#[derive(Clone)]
pub struct ResearchConfig {
    /// Inference provider name (e.g., "openai").
    pub provider: String,
    /// API key for the inference backend.
    pub llm_api_key: Option<String>,
    /// Optional base URL for an OpenAI-compatible endpoint.
    pub llm_base_url: Option<String>,
    /// API key for the search backend.
    pub search_api_key: Option<String>,
    /// Search endpoint URL.
    pub search_url: String,
    /// Model used for query decomposition.
    pub planner_model: String,
    /// Model used for the sufficiency check.
    pub reflection_model: String,
    /// Model used for the streamed report.
    pub synthesis_model: String,
    /// Maximum tokens for planner responses.
    pub planner_max_tokens: u32,
    /// Maximum tokens for reflection responses.
    pub reflection_max_tokens: u32,
    /// Maximum tokens for the report.
    pub synthesis_max_tokens: u32,
    /// Sampling temperature for planning and reflection.
    pub planning_temperature: f32,
    /// Sampling temperature for the report.
    pub synthesis_temperature: f32,
    /// Default iteration budget for sessions that do not ask for one.
    pub max_iterations: MaxIterations,
    /// Results requested per sub-query.
    pub search_results: usize,
    /// Deadline for a single search call.
    pub search_timeout: Duration,
    /// Deadline for a non-streaming inference call, and for opening a stream.
    pub inference_timeout: Duration,
    /// Longest silence tolerated between report fragments.
    pub stream_idle_timeout: Duration,
    /// Evidence budget for the reflection prompt, in characters.
    pub reflection_budget_chars: usize,
    /// Evidence budget for the synthesis prompt, in characters.
    pub synthesis_budget_chars: usize,
    /// Pause applied by each search task after it acquires its permit.
    pub request_delay: Duration,
    /// Directory with profile overrides.
    pub profile_dir: Option<PathBuf>,
    /// Directory where saved reports are written.
    pub reports_dir: PathBuf,
}

impl std::fmt::Debug for ResearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchConfig")
            .field("provider", &self.provider)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_base_url", &self.llm_base_url)
            .field(
                "search_api_key",
                &self.search_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("search_url", &self.search_url)
            .field("planner_model", &self.planner_model)
            .field("reflection_model", &self.reflection_model)
            .field("synthesis_model", &self.synthesis_model)
            .field("max_iterations", &self.max_iterations)
            .field("search_results", &self.search_results)
            .finish_non_exhaustive()
    }
}

impl ResearchConfig {
    /// Creates a new builder for `ResearchConfig`.
    #[must_use]
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable holds an
    /// unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            llm_api_key: None,
            llm_base_url: None,
            search_api_key: None,
            search_url: DEFAULT_SEARCH_URL.to_string(),
            planner_model: DEFAULT_PLANNER_MODEL.to_string(),
            reflection_model: DEFAULT_PLANNER_MODEL.to_string(),
            synthesis_model: DEFAULT_SYNTHESIS_MODEL.to_string(),
            planner_max_tokens: DEFAULT_PLANNER_MAX_TOKENS,
            reflection_max_tokens: DEFAULT_REFLECTION_MAX_TOKENS,
            synthesis_max_tokens: DEFAULT_SYNTHESIS_MAX_TOKENS,
            planning_temperature: DEFAULT_PLANNING_TEMPERATURE,
            synthesis_temperature: DEFAULT_SYNTHESIS_TEMPERATURE,
            max_iterations: MaxIterations::DEFAULT,
            search_results: DEFAULT_SEARCH_RESULTS,
            search_timeout: Duration::from_secs(DEFAULT_SEARCH_TIMEOUT_SECS),
            inference_timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
            stream_idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_SECS),
            reflection_budget_chars: DEFAULT_REFLECTION_BUDGET,
            synthesis_budget_chars: DEFAULT_SYNTHESIS_BUDGET,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            profile_dir: None,
            reports_dir: PathBuf::from("reports"),
        }
    }
}

/// Builder for [`ResearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct ResearchConfigBuilder {
    provider: Option<String>,
    llm_api_key: Option<String>,
    llm_base_url: Option<String>,
    search_api_key: Option<String>,
    search_url: Option<String>,
    planner_model: Option<String>,
    reflection_model: Option<String>,
    synthesis_model: Option<String>,
    synthesis_max_tokens: Option<u32>,
    max_iterations: Option<u32>,
    search_results: Option<usize>,
    search_timeout: Option<Duration>,
    inference_timeout: Option<Duration>,
    stream_idle_timeout: Option<Duration>,
    reflection_budget_chars: Option<usize>,
    synthesis_budget_chars: Option<usize>,
    request_delay: Option<Duration>,
    profile_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
}

fn env_var(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .or_else(|_| std::env::var(fallback))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ResearchConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("DELVE_PROVIDER").ok();
        }
        if self.llm_api_key.is_none() {
            self.llm_api_key = env_var("DASHSCOPE_API_KEY", "DELVE_LLM_API_KEY");
        }
        if self.llm_base_url.is_none() {
            self.llm_base_url = env_var("DASHSCOPE_BASE_URL", "DELVE_LLM_BASE_URL");
        }
        if self.search_api_key.is_none() {
            self.search_api_key = env_var("BOCHAAI_API_KEY", "DELVE_SEARCH_API_KEY");
        }
        if self.search_url.is_none() {
            self.search_url = std::env::var("DELVE_SEARCH_URL").ok();
        }
        if self.planner_model.is_none() {
            self.planner_model = std::env::var("DELVE_PLANNER_MODEL").ok();
        }
        if self.reflection_model.is_none() {
            self.reflection_model = std::env::var("DELVE_REFLECTION_MODEL").ok();
        }
        if self.synthesis_model.is_none() {
            self.synthesis_model = std::env::var("DELVE_SYNTHESIS_MODEL").ok();
        }
        if self.max_iterations.is_none() {
            self.max_iterations = env_parse("DELVE_MAX_ITERATIONS");
        }
        if self.search_results.is_none() {
            self.search_results = env_parse("DELVE_SEARCH_RESULTS");
        }
        if self.profile_dir.is_none() {
            self.profile_dir = std::env::var("DELVE_PROFILE_DIR").ok().map(PathBuf::from);
        }
        if self.reports_dir.is_none() {
            self.reports_dir = std::env::var("DELVE_REPORTS_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the inference provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the inference API key.
    #[must_use]
    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.llm_api_key = Some(key.into());
        self
    }

    /// Sets the inference base URL override.
    #[must_use]
    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        self.llm_base_url = Some(url.into());
        self
    }

    /// Sets the search API key.
    #[must_use]
    pub fn search_api_key(mut self, key: impl Into<String>) -> Self {
        self.search_api_key = Some(key.into());
        self
    }

    /// Sets the search endpoint.
    #[must_use]
    pub fn search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = Some(url.into());
        self
    }

    /// Sets the planner model.
    #[must_use]
    pub fn planner_model(mut self, model: impl Into<String>) -> Self {
        self.planner_model = Some(model.into());
        self
    }

    /// Sets the reflection model.
    #[must_use]
    pub fn reflection_model(mut self, model: impl Into<String>) -> Self {
        self.reflection_model = Some(model.into());
        self
    }

    /// Sets the synthesis model.
    #[must_use]
    pub fn synthesis_model(mut self, model: impl Into<String>) -> Self {
        self.synthesis_model = Some(model.into());
        self
    }

    /// Sets the synthesis max tokens.
    #[must_use]
    pub const fn synthesis_max_tokens(mut self, n: u32) -> Self {
        self.synthesis_max_tokens = Some(n);
        self
    }

    /// Sets the default iteration budget.
    #[must_use]
    pub const fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the results requested per sub-query.
    #[must_use]
    pub const fn search_results(mut self, n: usize) -> Self {
        self.search_results = Some(n);
        self
    }

    /// Sets the search call deadline.
    #[must_use]
    pub const fn search_timeout(mut self, duration: Duration) -> Self {
        self.search_timeout = Some(duration);
        self
    }

    /// Sets the inference call deadline.
    #[must_use]
    pub const fn inference_timeout(mut self, duration: Duration) -> Self {
        self.inference_timeout = Some(duration);
        self
    }

    /// Sets the idle deadline between report fragments.
    #[must_use]
    pub const fn stream_idle_timeout(mut self, duration: Duration) -> Self {
        self.stream_idle_timeout = Some(duration);
        self
    }

    /// Sets the reflection evidence budget.
    #[must_use]
    pub const fn reflection_budget_chars(mut self, n: usize) -> Self {
        self.reflection_budget_chars = Some(n);
        self
    }

    /// Sets the synthesis evidence budget.
    #[must_use]
    pub const fn synthesis_budget_chars(mut self, n: usize) -> Self {
        self.synthesis_budget_chars = Some(n);
        self
    }

    /// Sets the pause between search dispatches.
    #[must_use]
    pub const fn request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = Some(delay);
        self
    }

    /// Sets the profile override directory.
    #[must_use]
    pub fn profile_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.profile_dir = Some(dir.into());
        self
    }

    /// Sets the report output directory.
    #[must_use]
    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    /// Builds the [`ResearchConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if the iteration budget is
    /// outside `1..=5`, or if a count or budget is zero.
    pub fn build(self) -> Result<ResearchConfig, ConfigError> {
        let defaults = ResearchConfig::default();

        let max_iterations = self
            .max_iterations
            .map(MaxIterations::new)
            .transpose()?
            .unwrap_or(defaults.max_iterations);

        let search_results = self.search_results.unwrap_or(defaults.search_results);
        if search_results == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search_results",
                message: "must be at least 1".to_string(),
            });
        }

        let reflection_budget_chars = self
            .reflection_budget_chars
            .unwrap_or(defaults.reflection_budget_chars);
        let synthesis_budget_chars = self
            .synthesis_budget_chars
            .unwrap_or(defaults.synthesis_budget_chars);
        if reflection_budget_chars == 0 || synthesis_budget_chars == 0 {
            return Err(ConfigError::InvalidValue {
                key: "budget_chars",
                message: "evidence budgets must be positive".to_string(),
            });
        }

        let planner_model = self.planner_model.unwrap_or(defaults.planner_model);
        // Reflection shares the planner's model unless told otherwise.
        let reflection_model = self
            .reflection_model
            .unwrap_or_else(|| planner_model.clone());

        Ok(ResearchConfig {
            provider: self.provider.unwrap_or(defaults.provider),
            llm_api_key: self.llm_api_key,
            llm_base_url: self.llm_base_url,
            search_api_key: self.search_api_key,
            search_url: self.search_url.unwrap_or(defaults.search_url),
            planner_model,
            reflection_model,
            synthesis_model: self.synthesis_model.unwrap_or(defaults.synthesis_model),
            planner_max_tokens: defaults.planner_max_tokens,
            reflection_max_tokens: defaults.reflection_max_tokens,
            planning_temperature: defaults.planning_temperature,
            synthesis_temperature: defaults.synthesis_temperature,
            synthesis_max_tokens: self
                .synthesis_max_tokens
                .unwrap_or(defaults.synthesis_max_tokens),
            max_iterations,
            search_results,
            search_timeout: self.search_timeout.unwrap_or(defaults.search_timeout),
            inference_timeout: self.inference_timeout.unwrap_or(defaults.inference_timeout),
            stream_idle_timeout: self
                .stream_idle_timeout
                .unwrap_or(defaults.stream_idle_timeout),
            reflection_budget_chars,
            synthesis_budget_chars,
            request_delay: self.request_delay.unwrap_or(defaults.request_delay),
            profile_dir: self.profile_dir,
            reports_dir: self.reports_dir.unwrap_or(defaults.reports_dir),
        })
    }
}
