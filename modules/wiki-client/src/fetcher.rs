use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, WikiError};

/// How strictly a title is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// The title as given (redirects are still followed).
    Exact,
    /// Resolve the title through full-text search first.
    Fuzzy,
}

/// A page as the backend returns it, before section parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPage {
    pub title: String,
    pub url: String,
    pub content: String,
    pub links: Vec<String>,
}

/// Raw access to the encyclopedia backend. Implementations report
/// disambiguation pages as `WikiError::Disambiguation` and missing pages as
/// `WikiError::NotFound`; resolving those is the client's job.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, title: &str, lookup: Lookup) -> Result<RawPage>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>>;

    async fn random_title(&self) -> Result<String>;
}

// =============================================================================
// MediaWiki Action API
// =============================================================================

pub struct MediaWikiFetcher {
    client: reqwest::Client,
    api_url: String,
}

impl MediaWikiFetcher {
    pub fn new(api_url: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
        })
    }

    async fn query<T: for<'de> Deserialize<'de>>(&self, params: &[(&str, &str)]) -> Result<T> {
        let resp = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(WikiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_exact(&self, title: &str) -> Result<RawPage> {
        debug!(title, "MediaWiki page request");

        let response: QueryResponse = self
            .query(&[
                ("prop", "extracts|info|links|pageprops"),
                ("titles", title),
                ("explaintext", "1"),
                ("exsectionformat", "wikitext"),
                ("inprop", "url"),
                ("plnamespace", "0"),
                ("pllimit", "max"),
                ("ppprop", "disambiguation"),
                ("redirects", "1"),
            ])
            .await?;

        let page = response
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| WikiError::NotFound(title.to_string()))?;

        if page.missing || page.invalid {
            return Err(WikiError::NotFound(title.to_string()));
        }

        let links: Vec<String> = page.links.into_iter().map(|l| l.title).collect();

        if page
            .pageprops
            .as_ref()
            .is_some_and(|props| props.disambiguation.is_some())
        {
            return Err(WikiError::Disambiguation {
                title: page.title,
                candidates: links,
            });
        }

        Ok(RawPage {
            url: page.fullurl.unwrap_or_default(),
            content: page.extract.unwrap_or_default(),
            title: page.title,
            links,
        })
    }
}

#[async_trait]
impl PageFetcher for MediaWikiFetcher {
    async fn fetch(&self, title: &str, lookup: Lookup) -> Result<RawPage> {
        match lookup {
            Lookup::Exact => self.fetch_exact(title).await,
            Lookup::Fuzzy => {
                let best = self
                    .search(title, 1)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| WikiError::NotFound(title.to_string()))?;
                self.fetch_exact(&best).await
            }
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let limit = limit.to_string();
        let response: QueryResponse = self
            .query(&[
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("srprop", ""),
            ])
            .await?;

        Ok(response
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn random_title(&self) -> Result<String> {
        let response: QueryResponse = self
            .query(&[("list", "random"), ("rnnamespace", "0"), ("rnlimit", "1")])
            .await?;

        response
            .query
            .and_then(|q| q.random.into_iter().next())
            .map(|hit| hit.title)
            .ok_or_else(|| WikiError::Parse("random query returned no page".into()))
    }
}

// =============================================================================
// Wire types (formatversion=2)
// =============================================================================

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<QueryBody>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<WirePage>,
    #[serde(default)]
    search: Vec<TitleHit>,
    #[serde(default)]
    random: Vec<TitleHit>,
}

#[derive(Debug, Deserialize)]
struct WirePage {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    extract: Option<String>,
    fullurl: Option<String>,
    #[serde(default)]
    links: Vec<TitleHit>,
    pageprops: Option<PageProps>,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    disambiguation: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TitleHit {
    title: String,
}
