//! Ad copy generation through an OpenAI-compatible chat completion API

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{error::ApiError, models::GenerateRequest};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Upper bound on completion length, also charged to the rate limiter
pub const MAX_COMPLETION_TOKENS: u64 = 600;

const SYSTEM_PROMPT: &str = "You are an advertising copywriter. Write concise, persuasive ad copy. \
     Return three variants, each with a headline and body text.";

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Generated copy with its token usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCopy {
    pub text: String,
    pub tokens_used: u64,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

/// Rough token count, four characters per token
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4).max(1)
}

/// Validate a generation request and turn it into the user prompt
pub fn build_prompt(request: &GenerateRequest) -> Result<String, ApiError> {
    let product = request.product.trim();
    if product.is_empty() {
        return Err(ApiError::Validation("product is required".to_string()));
    }
    if product.chars().count() > 2_000 {
        return Err(ApiError::Validation(
            "product description is too long".to_string(),
        ));
    }

    let mut prompt = format!("Product: {}", product);
    let optional = [
        ("Target audience", &request.audience),
        ("Tone", &request.tone),
        ("Platform", &request.platform),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            prompt.push_str(&format!("\n{}: {}", label, value));
        }
    }
    Ok(prompt)
}

/// Tokens charged to the rate limiter before calling the backend
pub fn estimated_cost(prompt: &str) -> u64 {
    estimate_tokens(SYSTEM_PROMPT) + estimate_tokens(prompt) + MAX_COMPLETION_TOKENS
}

#[derive(Clone)]
pub struct CopyGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl CopyGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<GeneratedCopy, ApiError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.model,
            "max_tokens": MAX_COMPLETION_TOKENS,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        });

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Provider(format!("Generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Generation API returned error status {}: {}", status, body);
            return Err(ApiError::Provider(format!("Generation API error: {}", status)));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ApiError::Provider(format!("Failed to parse generation response: {}", e)))?;

        let text = completion
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ApiError::Provider("Generation returned no content".to_string()))?;
        let tokens_used = completion
            .usage
            .map(|usage| usage.total_tokens)
            .unwrap_or_else(|| estimate_tokens(prompt) + estimate_tokens(&text));

        info!("Generated {} characters using {} tokens", text.len(), tokens_used);
        Ok(GeneratedCopy { text, tokens_used })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn request(product: &str) -> GenerateRequest {
        GenerateRequest {
            product: product.to_string(),
            audience: Some("runners".to_string()),
            tone: Some("  ".to_string()),
            platform: None,
        }
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(&request("Trail shoes")).unwrap();
        assert_eq!(prompt, "Product: Trail shoes\nTarget audience: runners");
        assert!(matches!(
            build_prompt(&request("   ")),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert!(estimated_cost("Product: x") > MAX_COMPLETION_TOKENS);
    }

    #[tokio::test]
    async fn test_generate_reads_first_choice_and_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({ "model": "test-model" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{"message": {"role": "assistant", "content": "  Run further.  "}}],
                    "usage": {"prompt_tokens": 40, "completion_tokens": 12, "total_tokens": 52}
                }"#,
            )
            .create_async()
            .await;

        let generator = CopyGenerator::new(GeneratorConfig {
            api_key: "sk-test".to_string(),
            base_url: server.url(),
            model: "test-model".to_string(),
        });
        let copy = generator.generate("Product: Trail shoes").await.unwrap();

        mock.assert_async().await;
        assert_eq!(copy.text, "Run further.");
        assert_eq!(copy.tokens_used, 52);
    }

    #[tokio::test]
    async fn test_generate_surfaces_backend_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let generator = CopyGenerator::new(GeneratorConfig {
            api_key: "sk-test".to_string(),
            base_url: server.url(),
            model: "test-model".to_string(),
        });
        assert!(matches!(
            generator.generate("Product: x").await,
            Err(ApiError::Provider(_))
        ));
    }
}
