use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ProviderError, ResultItem, SearchPage, SearchProvider};

const SERPER_API: &str = "https://google.serper.dev/search";

const PAGE_SIZE: u32 = 10;
const RESULT_CEILING: u32 = 1000;

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    page: u32,
}

#[derive(Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<OrganicItem>,
}

#[derive(Deserialize)]
struct OrganicItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Serper.dev backend, a drop-in Google alternative selected via
/// `[search].backend = "serper"`.
#[derive(Clone)]
pub struct SerperClient {
    client: Client,
    api_key: String,
}

impl SerperClient {
    #[must_use]
    pub fn with_shared_client(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

/// Serper items carry no display domain; derive it from the link.
fn domain_of(link: &str) -> String {
    url::Url::parse(link)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for SerperClient {
    fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    fn result_ceiling(&self) -> u32 {
        RESULT_CEILING
    }

    async fn fetch_page(&self, query: &str, offset: u32) -> Result<SearchPage, ProviderError> {
        // Serper paginates with a 1-based page number.
        let page = offset / PAGE_SIZE + 1;

        let response = self
            .client
            .post(SERPER_API)
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest { q: query, page })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Api {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let response: SerperResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let items: Vec<ResultItem> = response
            .organic
            .into_iter()
            .map(|item| ResultItem {
                display_domain: domain_of(&item.link),
                title: item.title,
                link: item.link,
                snippet: item.snippet,
            })
            .collect();

        let has_more = items.len() == PAGE_SIZE as usize;

        Ok(SearchPage { items, has_more })
    }
}

#[cfg(test)]
mod tests {
    use super::domain_of;

    #[test]
    fn extracts_host_from_profile_links() {
        assert_eq!(
            domain_of("https://in.linkedin.com/in/someone"),
            "in.linkedin.com"
        );
        assert_eq!(domain_of("not a url"), "");
    }
}
