use crate::config::CompletionConfig;
use crate::error::ApiError;
use crate::search::SearchHit;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Produces an answer for a prompt. Failures never reach the store.
#[allow(async_fn_in_trait)]
pub trait CompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

/// Chat-completions client. The key is handed in through the config at
/// construction; nothing is read from the process environment here.
pub struct OpenAiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: &CompletionConfig) -> Result<Self, ApiError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ApiError::MissingCredential)?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(OpenAiClient {
            http: builder.build()?,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

impl CompletionProvider for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        if prompt.trim().is_empty() {
            return Err(ApiError::EmptyPrompt);
        }

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        debug!(model = %self.model, "requesting completion");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ApiError::EmptyResponse)
    }
}

/// Prompt with earlier exchanges prepended as context.
pub fn construct_prompt(query: &str, context: &[SearchHit]) -> String {
    if context.is_empty() {
        return query.to_string();
    }

    let context_str = context
        .iter()
        .map(|hit| match &hit.response {
            Some(response) => format!("Q: {}\nA: {}", hit.user_input, response),
            None => format!("Q: {}", hit.user_input),
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Using the following earlier conversation as context:\n\n{context_str}\n\nQuestion: {query}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_rejected() {
        let config = CompletionConfig::default();
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(ApiError::MissingCredential)
        ));

        let config = CompletionConfig {
            api_key: Some("  ".into()),
            ..CompletionConfig::default()
        };
        assert!(matches!(
            OpenAiClient::new(&config),
            Err(ApiError::MissingCredential)
        ));
    }

    #[test]
    fn test_endpoint_built_from_base_url() -> Result<(), ApiError> {
        let config = CompletionConfig {
            base_url: "http://localhost:8080/v1/".into(),
            api_key: Some("sk-test".into()),
            timeout_secs: Some(5),
            ..CompletionConfig::default()
        };
        let client = OpenAiClient::new(&config)?;
        assert_eq!(client.endpoint, "http://localhost:8080/v1/chat/completions");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_before_request() -> Result<(), ApiError> {
        let config = CompletionConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: Some("sk-test".into()),
            ..CompletionConfig::default()
        };
        let client = OpenAiClient::new(&config)?;
        assert!(matches!(
            client.complete("   ").await,
            Err(ApiError::EmptyPrompt)
        ));
        Ok(())
    }

    #[test]
    fn test_construct_prompt() {
        assert_eq!(construct_prompt("plain", &[]), "plain");

        let hits = vec![SearchHit {
            user_input: "what is rust".into(),
            response: Some("a language".into()),
        }];
        let prompt = construct_prompt("tell me more", &hits);
        assert!(prompt.contains("Q: what is rust\nA: a language"));
        assert!(prompt.ends_with("Question: tell me more"));
    }
}
