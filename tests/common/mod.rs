//! Scripted backends shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use delve_rs::config::ResearchConfig;
use delve_rs::error::{InferenceError, SearchError};
use delve_rs::inference::{ChatRequest, ChatResponse, DeltaStream, LlmProvider, StreamDelta};
use delve_rs::profile::ProfileRegistry;
use delve_rs::research::Orchestrator;
use delve_rs::search::{SearchClient, SearchHit};
use futures_util::{StreamExt, stream};

pub const PLANNER_MODEL: &str = "planner";
pub const REFLECTION_MODEL: &str = "reflector";
pub const SYNTHESIS_MODEL: &str = "writer";

/// How a scripted report stream ends.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// Completion marker.
    Done,
    /// Transport error after the fragments.
    Error,
    /// No further data, ever.
    Hang,
}

/// Inference backend answering by model name.
pub struct ScriptedProvider {
    plan: Mutex<Result<String, InferenceError>>,
    reflections: Mutex<VecDeque<Result<String, InferenceError>>>,
    default_reflection: String,
    fragments: Vec<String>,
    end: StreamEnd,
    open_error: Option<InferenceError>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(plan: &str) -> Self {
        Self {
            plan: Mutex::new(Ok(plan.to_string())),
            reflections: Mutex::new(VecDeque::new()),
            default_reflection: r#"{"can_answer": true}"#.to_string(),
            fragments: vec!["报告[1]".to_string(), "完成".to_string()],
            end: StreamEnd::Done,
            open_error: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_plan(self, error: InferenceError) -> Self {
        *lock(&self.plan) = Err(error);
        self
    }

    pub fn reflection(self, reply: &str) -> Self {
        lock(&self.reflections).push_back(Ok(reply.to_string()));
        self
    }

    pub fn default_reflection(mut self, reply: &str) -> Self {
        self.default_reflection = reply.to_string();
        self
    }

    pub fn report(mut self, fragments: &[&str], end: StreamEnd) -> Self {
        self.fragments = fragments.iter().map(|f| (*f).to_string()).collect();
        self.end = end;
        self
    }

    pub fn stream_open_error(mut self, error: InferenceError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        lock(&self.requests).clone()
    }

    pub fn calls_to(&self, model: &str) -> usize {
        lock(&self.requests).iter().filter(|r| r.model == model).count()
    }

    pub fn last_prompt_to(&self, model: &str) -> Option<String> {
        lock(&self.requests)
            .iter()
            .rev()
            .find(|r| r.model == model)
            .and_then(|r| r.user_content().map(str::to_string))
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        lock(&self.requests).push(request.clone());
        let content = match request.model.as_str() {
            PLANNER_MODEL => lock(&self.plan).clone()?,
            REFLECTION_MODEL => lock(&self.reflections)
                .pop_front()
                .unwrap_or_else(|| Ok(self.default_reflection.clone()))?,
            other => {
                return Err(InferenceError::Unavailable {
                    message: format!("unexpected model {other}"),
                    status: None,
                });
            }
        };
        Ok(ChatResponse {
            content,
            ..ChatResponse::default()
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, InferenceError> {
        lock(&self.requests).push(request.clone());
        if let Some(e) = &self.open_error {
            return Err(e.clone());
        }

        let items: Vec<Result<StreamDelta, InferenceError>> = self
            .fragments
            .iter()
            .map(|f| Ok(StreamDelta::Text(f.clone())))
            .collect();
        let body = stream::iter(items);
        Ok(match self.end {
            StreamEnd::Done => body
                .chain(stream::iter([Ok(StreamDelta::Done {
                    finish_reason: Some("stop".to_string()),
                })]))
                .boxed(),
            StreamEnd::Error => body
                .chain(stream::iter([Err(InferenceError::StreamInterrupted {
                    message: "connection reset".to_string(),
                })]))
                .boxed(),
            StreamEnd::Hang => body.chain(stream::pending()).boxed(),
        })
    }
}

/// Search backend answering from a table.
#[derive(Default)]
pub struct FakeSearch {
    answers: HashMap<String, Result<Vec<SearchHit>, SearchError>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(mut self, query: &str, hits: Vec<SearchHit>) -> Self {
        self.answers.insert(query.to_string(), Ok(hits));
        self
    }

    pub fn fails(mut self, query: &str) -> Self {
        self.answers.insert(
            query.to_string(),
            Err(SearchError::Unavailable {
                message: "HTTP 503".to_string(),
                status: Some(503),
            }),
        );
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

/// A hit whose body is unique to `query`.
pub fn hit_for(query: &str) -> SearchHit {
    SearchHit::new(
        format!("关于 {query}"),
        format!("https://example.com/{}", query.replace(' ', "-")),
        format!("{query} 的相关资料，2024 年同比增长 12%"),
    )
}

#[async_trait]
impl SearchClient for FakeSearch {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn query(&self, text: &str) -> Result<Vec<SearchHit>, SearchError> {
        lock(&self.calls).push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .get(text)
            .cloned()
            .unwrap_or_else(|| Ok(vec![hit_for(text)]))
    }
}

pub fn test_config() -> ResearchConfig {
    config_with_idle(Duration::from_millis(200))
}

/// Like [`test_config`] with a custom report-stream idle timeout.
pub fn config_with_idle(idle: Duration) -> ResearchConfig {
    ResearchConfig::builder()
        .planner_model(PLANNER_MODEL)
        .reflection_model(REFLECTION_MODEL)
        .synthesis_model(SYNTHESIS_MODEL)
        .inference_timeout(Duration::from_secs(2))
        .search_timeout(Duration::from_secs(2))
        .stream_idle_timeout(idle)
        .build()
        .unwrap_or_else(|_| unreachable!())
}

pub fn orchestrator(provider: &Arc<ScriptedProvider>, search: &Arc<FakeSearch>) -> Orchestrator {
    orchestrator_with(provider, search, test_config())
}

pub fn orchestrator_with(
    provider: &Arc<ScriptedProvider>,
    search: &Arc<FakeSearch>,
    config: ResearchConfig,
) -> Orchestrator {
    Orchestrator::new(
        Arc::clone(provider) as Arc<dyn LlmProvider>,
        Arc::clone(search) as Arc<dyn SearchClient>,
        config,
        ProfileRegistry::builtin(),
    )
}
