//! Profile URL discovery through a web search API.

use async_trait::async_trait;
use cpdb_pipeline::{CollaboratorError, DiscoveryQuery, UrlDiscoverer, UrlNormalizer};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;
use crate::{build_client, check_status, endpoint, parse_base_url, read_json, HttpOptions};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com/";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'static str,
    max_results: u32,
    include_raw_content: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    url: String,
}

/// Finds a candidate's profile URL by searching the profile host.
pub struct SearchDiscoverer {
    client: Client,
    api_key: String,
    base_url: Url,
    normalizer: UrlNormalizer,
    max_results: u32,
}

impl SearchDiscoverer {
    /// # Errors
    ///
    /// Returns [`CollectorError::Http`] if the HTTP client cannot be built.
    pub fn new(
        api_key: &str,
        profile_host: &str,
        max_results: u32,
        options: &HttpOptions,
    ) -> Result<Self, CollectorError> {
        Self::with_base_url(api_key, profile_host, max_results, options, DEFAULT_BASE_URL)
    }

    /// Same as [`new`](Self::new) against another server (for wiremock).
    ///
    /// # Errors
    ///
    /// Also returns [`CollectorError::InvalidBaseUrl`] for an unparsable URL.
    pub fn with_base_url(
        api_key: &str,
        profile_host: &str,
        max_results: u32,
        options: &HttpOptions,
        base_url: &str,
    ) -> Result<Self, CollectorError> {
        Ok(Self {
            client: build_client(options)?,
            api_key: api_key.to_owned(),
            base_url: parse_base_url(base_url)?,
            normalizer: UrlNormalizer::new(profile_host),
            max_results: max_results.max(1),
        })
    }

    async fn search(&self, query: &DiscoveryQuery) -> Result<Option<String>, CollectorError> {
        let search_query = build_query(query, self.normalizer.profile_host());
        tracing::debug!(query = %search_query, "searching for profile");

        let request = SearchRequest {
            query: &search_query,
            search_depth: "basic",
            max_results: self.max_results,
            include_raw_content: false,
        };
        let response = self
            .client
            .post(endpoint(&self.base_url, "search")?)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = check_status(response, "search")?;
        let body = read_json(response, "search results").await?;
        let parsed: SearchResponse =
            serde_json::from_value(body).map_err(|source| CollectorError::Deserialize {
                context: "search results".to_owned(),
                source,
            })?;

        let found = first_profile_url(&parsed.results, &self.normalizer);
        match &found {
            Some(url) => tracing::info!(name = %query.name, %url, "profile URL found"),
            None => tracing::info!(name = %query.name, "no profile URL in search results"),
        }
        Ok(found)
    }
}

#[async_trait]
impl UrlDiscoverer for SearchDiscoverer {
    async fn discover(&self, query: &DiscoveryQuery) -> Result<Option<String>, CollaboratorError> {
        self.search(query).await.map_err(CollaboratorError::from)
    }
}

/// `"name" site:host/in/` followed by each known hint in quotes.
fn build_query(query: &DiscoveryQuery, profile_host: &str) -> String {
    let mut parts = vec![format!("\"{}\"", query.name), format!("site:{profile_host}/in/")];
    parts.extend(
        [
            query.company.as_deref(),
            query.email_domain.as_deref(),
            query.additional_info.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(|hint| format!("\"{}\"", hint.replace('"', ""))),
    );
    parts.join(" ")
}

/// First result that normalises to a profile URL, returned as found.
fn first_profile_url(results: &[SearchResult], normalizer: &UrlNormalizer) -> Option<String> {
    results
        .iter()
        .map(|r| r.url.trim())
        .find(|url| normalizer.normalize(url).is_ok())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> DiscoveryQuery {
        DiscoveryQuery {
            name: "A. Liang".to_string(),
            company: None,
            email_domain: Some("example-labs.com".to_string()),
            additional_info: Some("staff \"rust\" engineer".to_string()),
        }
    }

    #[test]
    fn query_quotes_name_and_hints() {
        assert_eq!(
            build_query(&query(), "linkedin.com"),
            "\"A. Liang\" site:linkedin.com/in/ \"example-labs.com\" \"staff rust engineer\""
        );
    }

    #[test]
    fn query_without_hints_is_name_and_site() {
        let bare = DiscoveryQuery {
            name: "B. Osei".to_string(),
            company: None,
            email_domain: None,
            additional_info: None,
        };
        assert_eq!(build_query(&bare, "linkedin.com"), "\"B. Osei\" site:linkedin.com/in/");
    }

    #[test]
    fn first_profile_shaped_result_wins() {
        let results = vec![
            SearchResult {
                url: "https://www.linkedin.com/company/example-labs".to_string(),
            },
            SearchResult {
                url: "https://nl.LinkedIn.com/in/andyliang".to_string(),
            },
            SearchResult {
                url: "https://www.linkedin.com/in/someone-else".to_string(),
            },
        ];
        assert_eq!(
            first_profile_url(&results, &UrlNormalizer::new("linkedin.com")).as_deref(),
            Some("https://nl.LinkedIn.com/in/andyliang")
        );
    }

    #[test]
    fn results_that_only_mention_a_profile_path_are_skipped() {
        let results = vec![
            SearchResult {
                url: "https://evil.example/?r=linkedin.com/in/andyliang".to_string(),
            },
            SearchResult {
                url: "https://www.linkedin.com/in/andyliang/details/experience/".to_string(),
            },
            SearchResult {
                url: "https://www.linkedin.com/in/andyliang/".to_string(),
            },
        ];
        assert_eq!(
            first_profile_url(&results, &UrlNormalizer::new("linkedin.com")).as_deref(),
            Some("https://www.linkedin.com/in/andyliang/")
        );
    }

    #[test]
    fn no_profile_shaped_result_is_none() {
        let results = vec![SearchResult {
            url: "https://example.org/in/andyliang".to_string(),
        }];
        assert_eq!(first_profile_url(&results, &UrlNormalizer::new("linkedin.com")), None);
    }
}
