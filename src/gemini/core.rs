use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::chat::{ChatModel, Transcript};
use crate::core::ChatError;

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Model,
}

// A single part of a turn. The API also returns non-text parts
// (function calls, grounding data) which decode with `text: None`.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Role, text: &str) -> Self {
        Content {
            role: Some(role),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    /// System instructions carry no role.
    pub fn instruction(text: &str) -> Self {
        Content {
            role: None,
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }

    /// All text parts joined together, if there are any.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}

#[derive(Serialize, Debug)]
pub struct Tool {
    #[serde(rename = "googleSearchRetrieval")]
    pub google_search_retrieval: Value,
}

impl Tool {
    pub fn google_search() -> Self {
        Self {
            google_search_retrieval: serde_json::json!({}),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    pub system_instruction: Content,
    pub contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<i64>,
    pub candidates_token_count: Option<i64>,
}

/// The text extracted from a response envelope.
#[derive(Debug, PartialEq)]
pub enum Reply {
    /// Every text part of the first candidate.
    Text(String),
    /// The first candidate didn't have text but a later one did.
    FirstPart(String),
    /// Nothing to show the user, e.g. the prompt or reply was blocked.
    NoText {
        finish_reason: Option<String>,
        block_reason: Option<String>,
    },
}

impl GenerateContentResponse {
    pub fn reply(&self) -> Reply {
        let primary = self
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(Content::text)
            .filter(|t| !t.trim().is_empty());
        if let Some(text) = primary {
            return Reply::Text(text);
        }

        let fallback = self
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .filter_map(|c| c.parts.first())
            .filter_map(|p| p.text.clone())
            .find(|t| !t.trim().is_empty());
        if let Some(text) = fallback {
            return Reply::FirstPart(text);
        }

        Reply::NoText {
            finish_reason: self
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone()),
            block_reason: self
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.clone()),
        }
    }
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiModel {
    client: reqwest::Client,
    api_hostname: String,
    api_key: String,
    model: String,
    search_grounding: bool,
}

impl GeminiModel {
    pub fn new(
        api_hostname: &str,
        api_key: &str,
        model: &str,
        search_grounding: bool,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            search_grounding,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_hostname, self.model
        )
    }

    pub async fn generate_content(
        &self,
        system_instruction: &str,
        contents: &[Content],
    ) -> Result<GenerateContentResponse, ChatError> {
        let request = GenerateContentRequest {
            system_instruction: Content::instruction(system_instruction),
            contents,
            tools: self.search_grounding.then(|| vec![Tool::google_search()]),
        };

        tracing::debug!(
            model = %self.model,
            turns = contents.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ChatError::Upstream(format!(
                "Gemini API error {}: {}",
                status, message
            )));
        }

        let resp: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Upstream(format!("Failed to parse response: {}", e)))?;

        if let Some(usage) = &resp.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count.unwrap_or(0),
                reply_tokens = usage.candidates_token_count.unwrap_or(0),
                "Gemini usage"
            );
        }

        Ok(resp)
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn generate(
        &self,
        transcript: &Transcript,
        user_turn: &Content,
    ) -> Result<GenerateContentResponse, ChatError> {
        let mut contents = transcript.messages();
        contents.push(user_turn.clone());
        self.generate_content(transcript.system_instruction(), &contents)
            .await
    }

    fn name(&self) -> &str {
        &self.model
    }
}
