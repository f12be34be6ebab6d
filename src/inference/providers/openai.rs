//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! Works against any OpenAI-compatible endpoint (`DashScope` compatible
//! mode, `OpenAI`, local proxies) via the base URL override in
//! [`ResearchConfig`].

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    CreateChatCompletionStreamResponse, ResponseFormat,
};
use async_trait::async_trait;
use futures_util::{StreamExt, stream};

use crate::config::ResearchConfig;
use crate::error::{ConfigError, InferenceError};
use crate::inference::message::{
    ChatMessage, ChatRequest, ChatResponse, Role, StreamDelta, TokenUsage,
};
use crate::inference::provider::{DeltaStream, LlmProvider};

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// Creates a new provider from research configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiKey`] if no inference key is set.
    pub fn new(config: &ResearchConfig) -> Result<Self, ConfigError> {
        let api_key = config
            .llm_api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey {
                backend: "inference",
                vars: "DASHSCOPE_API_KEY or DELVE_LLM_API_KEY",
            })?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(ref base_url) = config.llm_base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
        })
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature.filter(|&t| t != 0.0),
            max_completion_tokens: request.max_tokens,
            stream: if request.stream { Some(true) } else { None },
            response_format,
            ..Default::default()
        }
    }

    /// Maps one SSE event to zero, one or two deltas.
    fn convert_event(event: &CreateChatCompletionStreamResponse) -> Vec<StreamDelta> {
        let Some(choice) = event.choices.first() else {
            return Vec::new();
        };

        let mut deltas = Vec::with_capacity(2);
        if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
            deltas.push(StreamDelta::Text(text.clone()));
        }
        if let Some(reason) = choice.finish_reason.as_ref() {
            deltas.push(StreamDelta::Done {
                finish_reason: Some(format!("{reason:?}").to_lowercase()),
            });
        }
        deltas
    }
}

fn unavailable(err: &OpenAIError) -> InferenceError {
    let status = match err {
        OpenAIError::Reqwest(e) => e.status().map(|s| s.as_u16()),
        _ => None,
    };
    InferenceError::Unavailable {
        message: err.to_string(),
        status,
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, InferenceError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| unavailable(&e))?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<DeltaStream, InferenceError> {
        let mut stream_request = request.clone();
        stream_request.stream = true;
        let openai_request = Self::build_request(&stream_request);

        let events = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(|e| unavailable(&e))?;

        let deltas = events.flat_map(
            |result: Result<CreateChatCompletionStreamResponse, OpenAIError>| {
                let items: Vec<Result<StreamDelta, InferenceError>> = match result {
                    Ok(event) => Self::convert_event(&event).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(InferenceError::StreamInterrupted {
                        message: e.to_string(),
                    })],
                };
                stream::iter(items)
            },
        );

        Ok(Box::pin(deltas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::message;

    fn request(json_mode: bool, stream: bool) -> ChatRequest {
        ChatRequest {
            model: "qwen-max".to_string(),
            messages: vec![message::system_message("sys"), message::user_message("test")],
            temperature: Some(0.2),
            max_tokens: Some(100),
            json_mode,
            stream,
        }
    }

    #[test]
    fn test_convert_messages() {
        let converted = OpenAiProvider::convert_message(&message::system_message("s"));
        assert!(matches!(converted, ChatCompletionRequestMessage::System(_)));
        let converted = OpenAiProvider::convert_message(&message::user_message("u"));
        assert!(matches!(converted, ChatCompletionRequestMessage::User(_)));
    }

    #[test]
    fn test_build_request_json_mode() {
        let built = OpenAiProvider::build_request(&request(true, false));
        assert!(built.response_format.is_some());
        assert_eq!(built.max_completion_tokens, Some(100));
        assert_eq!(built.stream, None);
        assert_eq!(built.messages.len(), 2);
    }

    #[test]
    fn test_build_request_streaming() {
        let built = OpenAiProvider::build_request(&request(false, true));
        assert_eq!(built.stream, Some(true));
        assert!(built.response_format.is_none());
    }

    #[test]
    fn test_zero_temperature_is_omitted() {
        let mut req = request(false, false);
        req.temperature = Some(0.0);
        assert!(OpenAiProvider::build_request(&req).temperature.is_none());
    }

    #[test]
    fn test_convert_event() {
        let event: CreateChatCompletionStreamResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "deepseek-r1",
            "choices": [{"index": 0, "delta": {"content": "半导体"}, "finish_reason": null}]
        }))
        .unwrap_or_else(|_| unreachable!());
        assert_eq!(
            OpenAiProvider::convert_event(&event),
            vec![StreamDelta::Text("半导体".to_string())]
        );

        let last: CreateChatCompletionStreamResponse = serde_json::from_value(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "deepseek-r1",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            OpenAiProvider::convert_event(&last).as_slice(),
            [StreamDelta::Done { .. }]
        ));
    }

    #[test]
    fn test_new_requires_key() {
        let config = ResearchConfig::default();
        assert!(matches!(
            OpenAiProvider::new(&config),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }
}
