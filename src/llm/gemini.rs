//! Google Gemini provider implementation

use super::types::{LlmRequest, LlmResponse, MessageRole, Usage};
use super::{EmbeddingService, LlmError, LlmService};
use crate::config::GenAiConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the API key, kept out of the URL so it never lands in logs
const API_KEY_HEADER: &str = "x-goog-api-key";

fn build_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))
}

/// Send a JSON body and decode the response, classifying failures
async fn post_json<Req, Resp>(
    client: &Client,
    url: &str,
    api_key: &str,
    body: &Req,
) -> Result<Resp, LlmError>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned,
{
    let response = client
        .post(url)
        .header("Content-Type", "application/json")
        .header(API_KEY_HEADER, api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::from_send(&e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        if let Ok(error_resp) = serde_json::from_str::<GeminiErrorResponse>(&body) {
            return Err(LlmError::from_status(status.as_u16(), &error_resp.error.message));
        }
        return Err(LlmError::from_status(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| {
        LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
    })
}

/// Strip the optional `models/` prefix so both spellings of a model name work
fn bare_model_name(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

// ============================================================================
// Text generation
// ============================================================================

/// Gemini `generateContent` client
pub struct GeminiService {
    client: Client,
    api_key: String,
    url: String,
    model_id: String,
}

impl GeminiService {
    pub fn new(config: &GenAiConfig, timeout: Duration) -> Result<Self, LlmError> {
        let model = bare_model_name(&config.model);
        Ok(Self {
            client: build_client(timeout)?,
            api_key: config.api_key.clone(),
            url: format!(
                "{}/models/{model}:generateContent",
                config.base_url.trim_end_matches('/')
            ),
            model_id: model.to_string(),
        })
    }

    fn translate_request(request: &LlmRequest) -> GeminiRequest {
        let system_instruction = if request.system.is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: request
                        .system
                        .iter()
                        .map(|s| s.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n"),
                }],
            })
        };

        let contents = request
            .messages
            .iter()
            .map(|msg| GeminiContent {
                role: Some(
                    match msg.role {
                        MessageRole::User => "user",
                        MessageRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![GeminiPart {
                    text: msg.text.clone(),
                }],
            })
            .collect();

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GeminiGenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            }),
        }
    }

    fn normalize_response(resp: GeminiResponse) -> Result<LlmResponse, LlmError> {
        let candidate = resp
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::unknown("No candidates in response"))?;

        let text = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::unknown(format!(
                "Empty response (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let end_turn = candidate.finish_reason.as_deref() == Some("STOP");
        let usage = resp.usage_metadata.unwrap_or_default();

        Ok(LlmResponse {
            text,
            end_turn,
            usage: Usage {
                input_tokens: u64::from(usage.prompt_token_count),
                output_tokens: u64::from(usage.candidates_token_count),
            },
        })
    }
}

#[async_trait]
impl LlmService for GeminiService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let gemini_request = Self::translate_request(request);
        let response: GeminiResponse =
            post_json(&self.client, &self.url, &self.api_key, &gemini_request).await?;
        Self::normalize_response(response)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Embeddings
// ============================================================================

/// Gemini `embedContent` client
pub struct GeminiEmbeddingService {
    client: Client,
    api_key: String,
    url: String,
    /// Fully qualified name, echoed in the request body
    model: String,
}

impl GeminiEmbeddingService {
    pub fn new(config: &GenAiConfig, timeout: Duration) -> Result<Self, LlmError> {
        let model = bare_model_name(&config.embedding_model);
        Ok(Self {
            client: build_client(timeout)?,
            api_key: config.api_key.clone(),
            url: format!(
                "{}/models/{model}:embedContent",
                config.base_url.trim_end_matches('/')
            ),
            model: format!("models/{model}"),
        })
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbedRequest {
            model: self.model.clone(),
            content: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: text.to_string(),
                }],
            },
        };
        let response: EmbedResponse =
            post_json(&self.client, &self.url, &self.api_key, &request).await?;

        if response.embedding.values.is_empty() {
            return Err(LlmError::unknown("Empty embedding returned"));
        }
        tracing::debug!(
            model = %self.model,
            dimension = response.embedding.values.len(),
            "Embedding generated"
        );
        Ok(response.embedding.values)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbedValues,
}

#[derive(Debug, Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmErrorKind, LlmMessage, SystemContent};

    fn test_config() -> GenAiConfig {
        GenAiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash-lite".to_string(),
            embedding_model: "models/embedding-001".to_string(),
            base_url: "https://example.test/v1beta/".to_string(),
        }
    }

    #[test]
    fn test_urls_are_built_from_config() {
        let chat = GeminiService::new(&test_config(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            chat.url,
            "https://example.test/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
        assert_eq!(chat.model_id(), "gemini-2.5-flash-lite");

        let embed = GeminiEmbeddingService::new(&test_config(), Duration::from_secs(5)).unwrap();
        assert_eq!(
            embed.url,
            "https://example.test/v1beta/models/embedding-001:embedContent"
        );
        assert_eq!(embed.model(), "models/embedding-001");
    }

    #[test]
    fn test_translate_request_maps_roles_and_system() {
        let request = LlmRequest {
            system: vec![SystemContent::new("be helpful")],
            messages: vec![
                LlmMessage {
                    role: MessageRole::User,
                    text: "rye loaf".to_string(),
                },
                LlmMessage {
                    role: MessageRole::Assistant,
                    text: "Here's a sourdough recipe:".to_string(),
                },
            ],
            max_tokens: None,
            temperature: Some(0.7),
        };

        let json = serde_json::to_value(GeminiService::translate_request(&request)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be helpful");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "Here's a sourdough recipe:");
        assert!(json["generationConfig"].get("maxOutputTokens").is_none());
        assert!(json["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_normalize_response_joins_parts() {
        let resp: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Here's "}, {"text": "a loaf"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 30, "totalTokenCount": 42}
        }))
        .unwrap();

        let normalized = GeminiService::normalize_response(resp).unwrap();
        assert_eq!(normalized.text, "Here's a loaf");
        assert!(normalized.end_turn);
        assert_eq!(normalized.usage.input_tokens, 12);
        assert_eq!(normalized.usage.output_tokens, 30);
    }

    #[test]
    fn test_normalize_response_rejects_empty() {
        let resp: GeminiResponse =
            serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert_eq!(
            GeminiService::normalize_response(resp).unwrap_err().kind,
            LlmErrorKind::Unknown
        );

        let blocked: GeminiResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        let err = GeminiService::normalize_response(blocked).unwrap_err();
        assert!(err.message.contains("SAFETY"));
    }

    #[test]
    fn test_embed_response_parses() {
        let resp: EmbedResponse = serde_json::from_value(serde_json::json!({
            "embedding": { "values": [0.25, -0.5, 1.0] }
        }))
        .unwrap();
        assert_eq!(resp.embedding.values.len(), 3);
    }
}
