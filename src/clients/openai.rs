use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{QueryTranslator, TranslatorError};

const OPENAI_API: &str = "https://api.openai.com/v1/chat/completions";

const GENERATE_SYSTEM_PROMPT: &str = "You are an expert at creating optimized search queries for finding professionals on LinkedIn via web search.

Your task is to convert natural language descriptions into precise search queries that:
1. Target LinkedIn profiles using site:linkedin.com/in
2. Use Boolean operators (AND, OR) effectively
3. Include relevant job titles, skills, and variations
4. Include location variations (e.g., Bengaluru/Bangalore, Hyderabad/Hyd)
5. Optionally include phrases like \"open to work\" or \"seeking opportunities\" when relevant

Guidelines:
- Always start with site:linkedin.com/in
- Group related terms with parentheses
- Use OR for synonyms and variations
- Use quotes for exact phrases
- Include common title variations for the role
- Include location name variations

Output ONLY the search query string, nothing else. No explanations, no markdown formatting.";

const REFINE_SYSTEM_PROMPT: &str = "You are an expert at refining web search queries for finding professionals on LinkedIn.

You will be given an existing search query and instructions on how to modify it. Apply the modifications while maintaining proper search query syntax.

Output ONLY the refined search query string, nothing else.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    #[must_use]
    pub fn with_shared_client(client: Client, api_key: String, model: String) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, TranslatorError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.3,
            max_tokens: 500,
        };

        let response = self
            .client
            .post(OPENAI_API)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslatorError::Timeout
                } else {
                    TranslatorError::Api(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslatorError::Api(format!("{status} - {body}")));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslatorError::Decode(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TranslatorError::Decode("empty choices".to_string()))?;

        Ok(strip_code_fences(content.trim()))
    }
}

/// Models occasionally wrap the query in a markdown code block despite the
/// prompt; keep only the non-fence lines.
fn strip_code_fences(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }

    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[async_trait]
impl QueryTranslator for OpenAiClient {
    async fn translate(&self, text: &str) -> Result<String, TranslatorError> {
        let user_prompt = format!(
            "Convert this into a LinkedIn search query:\n\n\"{text}\"\n\nGenerate an optimized search query for finding these professionals on LinkedIn."
        );

        self.complete(GENERATE_SYSTEM_PROMPT, user_prompt).await
    }

    async fn refine(
        &self,
        original_query: &str,
        instructions: &str,
    ) -> Result<String, TranslatorError> {
        let user_prompt = format!(
            "Original query:\n{original_query}\n\nRefinement instructions:\n{instructions}\n\nGenerate the refined search query."
        );

        self.complete(REFINE_SYSTEM_PROMPT, user_prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn passes_plain_queries_through() {
        let q = "site:linkedin.com/in (\"python developer\") (Bangalore OR Bengaluru)";
        assert_eq!(strip_code_fences(q), q);
    }

    #[test]
    fn strips_markdown_fences() {
        let wrapped = "```\nsite:linkedin.com/in rust\n```";
        assert_eq!(strip_code_fences(wrapped), "site:linkedin.com/in rust");

        let tagged = "```text\nsite:linkedin.com/in rust\n```";
        assert_eq!(strip_code_fences(tagged), "site:linkedin.com/in rust");
    }
}
