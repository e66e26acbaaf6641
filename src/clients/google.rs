use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ProviderError, ResultItem, SearchPage, SearchProvider};

const GOOGLE_CSE_API: &str = "https://www.googleapis.com/customsearch/v1";

/// Custom Search caps pages at 10 items and a query at 100 results total.
const PAGE_SIZE: u32 = 10;
const RESULT_CEILING: u32 = 100;

#[derive(Deserialize)]
struct CseResponse {
    #[serde(default)]
    items: Vec<CseItem>,
}

#[derive(Deserialize)]
struct CseItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default, rename = "displayLink")]
    display_link: String,
}

#[derive(Clone)]
pub struct GoogleSearchClient {
    client: Client,
    api_key: String,
    cse_id: String,
}

impl GoogleSearchClient {
    #[must_use]
    pub fn with_shared_client(client: Client, api_key: String, cse_id: String) -> Self {
        Self {
            client,
            api_key,
            cse_id,
        }
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchClient {
    fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    fn result_ceiling(&self) -> u32 {
        RESULT_CEILING
    }

    async fn fetch_page(&self, query: &str, offset: u32) -> Result<SearchPage, ProviderError> {
        // CSE's `start` is 1-based.
        let start = offset + 1;

        let response = self
            .client
            .get(GOOGLE_CSE_API)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", query),
                ("num", &PAGE_SIZE.to_string()),
                ("start", &start.to_string()),
            ])
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

        let response: CseResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let items: Vec<ResultItem> = response
            .items
            .into_iter()
            .map(|item| ResultItem {
                title: item.title,
                link: item.link,
                snippet: item.snippet,
                display_domain: item.display_link,
            })
            .collect();

        // A short page means the backend ran out of results.
        let has_more =
            items.len() == PAGE_SIZE as usize && offset + PAGE_SIZE < RESULT_CEILING;

        Ok(SearchPage { items, has_more })
    }
}
