use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::PageCache;
use crate::error::{Result, WikiError};
use crate::fetcher::{Lookup, PageFetcher, RawPage};
use crate::sections::{parse_sections, summary};

pub const MAX_LINKS: usize = 50;

/// A fetched page with its sections parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiPage {
    pub title: String,
    pub url: String,
    pub content: String,
    pub summary: String,
    /// Outbound article links, at most `MAX_LINKS`.
    pub links: Vec<String>,
    /// Section title → section text.
    pub sections: BTreeMap<String, String>,
}

impl From<RawPage> for WikiPage {
    fn from(raw: RawPage) -> Self {
        let sections = parse_sections(&raw.content);
        let summary = summary(&raw.content);
        let mut links = raw.links;
        links.truncate(MAX_LINKS);
        Self {
            title: raw.title,
            url: raw.url,
            content: raw.content,
            summary,
            links,
            sections,
        }
    }
}

/// Title → page, with disambiguation, fuzzy retry and an owned cache.
pub struct WikiClient<F> {
    fetcher: F,
    cache: PageCache,
}

impl<F: PageFetcher> WikiClient<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: PageCache::new(),
        }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Fetch a page by title. Repeat calls with the same title are served
    /// from the cache.
    ///
    /// A disambiguation page resolves to its first candidate (once); a
    /// missing page is retried once with a fuzzy lookup.
    pub async fn page(&self, title: &str) -> Result<Arc<WikiPage>> {
        if let Some(page) = self.cache.get(title) {
            info!(title, "Cache hit for page");
            return Ok(page);
        }

        info!(title, "Fetching page");
        let raw = self.resolve(title).await?;
        info!(requested = title, resolved = %raw.title, "Fetched page");

        Ok(self
            .cache
            .insert_if_absent(title, Arc::new(WikiPage::from(raw))))
    }

    async fn resolve(&self, title: &str) -> Result<RawPage> {
        let mut target = title.to_string();
        let mut lookup = Lookup::Exact;
        let mut followed_disambiguation = false;
        let mut tried_fuzzy = false;

        loop {
            match self.fetcher.fetch(&target, lookup).await {
                Ok(raw) => return Ok(raw),
                Err(WikiError::Disambiguation { candidates, .. }) if !followed_disambiguation => {
                    let Some(first) = candidates.into_iter().next() else {
                        return Err(WikiError::NotFound(title.to_string()));
                    };
                    warn!(title = %target, candidate = %first, "Disambiguation page, using first candidate");
                    followed_disambiguation = true;
                    target = first;
                    lookup = Lookup::Exact;
                }
                Err(WikiError::NotFound(_)) if !tried_fuzzy => {
                    info!(title = %target, "Page not found, retrying with fuzzy lookup");
                    tried_fuzzy = true;
                    lookup = Lookup::Fuzzy;
                }
                Err(e) => {
                    warn!(title, error = %e, "Page fetch failed");
                    return Err(e);
                }
            }
        }
    }

    /// Titles matching `query`. Blank queries return nothing without a request.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let results = self.fetcher.search(query, limit).await?;
        info!(query, count = results.len(), "Search complete");
        Ok(results)
    }

    pub async fn random_page(&self) -> Result<Arc<WikiPage>> {
        let title = self.fetcher.random_title().await?;
        self.page(&title).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted fetcher: responses keyed by (title, lookup); records calls.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: HashMap<(String, Lookup), std::result::Result<RawPage, WikiError>>,
        calls: Mutex<Vec<(String, Lookup)>>,
    }

    impl ScriptedFetcher {
        fn on(mut self, title: &str, lookup: Lookup, r: std::result::Result<RawPage, WikiError>) -> Self {
            self.responses.insert((title.to_string(), lookup), r);
            self
        }

        fn calls(&self) -> Vec<(String, Lookup)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, title: &str, lookup: Lookup) -> Result<RawPage> {
            self.calls.lock().unwrap().push((title.to_string(), lookup));
            self.responses
                .get(&(title.to_string(), lookup))
                .cloned()
                .unwrap_or_else(|| Err(WikiError::NotFound(title.to_string())))
        }

        async fn search(&self, query: &str, _limit: usize) -> Result<Vec<String>> {
            Ok(vec![format!("{query} (result)")])
        }

        async fn random_title(&self) -> Result<String> {
            Ok("Peace of Westphalia".into())
        }
    }

    fn raw(title: &str) -> RawPage {
        RawPage {
            title: title.into(),
            url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
            content: format!("{title} is a topic.\n== History ==\nIt has a history."),
            links: (0..60).map(|i| format!("Link {i}")).collect(),
        }
    }

    #[tokio::test]
    async fn repeat_lookups_are_served_from_cache() {
        let client = WikiClient::new(
            ScriptedFetcher::default().on("Peace of Westphalia", Lookup::Exact, Ok(raw("Peace of Westphalia"))),
        );

        let first = client.page("Peace of Westphalia").await.unwrap();
        let second = client.page("Peace of Westphalia").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(client.fetcher.calls().len(), 1);
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test]
    async fn page_is_parsed_and_links_are_capped() {
        let client = WikiClient::new(
            ScriptedFetcher::default().on("Mercury (planet)", Lookup::Exact, Ok(raw("Mercury (planet)"))),
        );

        let page = client.page("Mercury (planet)").await.unwrap();
        assert_eq!(page.links.len(), MAX_LINKS);
        assert_eq!(page.summary, "Mercury (planet) is a topic.");
        assert_eq!(page.sections["History"], "It has a history.");
    }

    #[tokio::test]
    async fn disambiguation_follows_first_candidate_once() {
        let fetcher = ScriptedFetcher::default()
            .on(
                "Mercury",
                Lookup::Exact,
                Err(WikiError::Disambiguation {
                    title: "Mercury".into(),
                    candidates: vec!["Mercury (planet)".into(), "Mercury (element)".into()],
                }),
            )
            .on("Mercury (planet)", Lookup::Exact, Ok(raw("Mercury (planet)")));
        let client = WikiClient::new(fetcher);

        let page = client.page("Mercury").await.unwrap();
        assert_eq!(page.title, "Mercury (planet)");
        assert_eq!(
            client.fetcher.calls(),
            vec![
                ("Mercury".to_string(), Lookup::Exact),
                ("Mercury (planet)".to_string(), Lookup::Exact),
            ]
        );
        // cached under the requested title
        assert!(client.cache().get("Mercury").is_some());
    }

    #[tokio::test]
    async fn nested_disambiguation_is_not_followed() {
        let disambig = |title: &str, next: &str| {
            Err(WikiError::Disambiguation {
                title: title.into(),
                candidates: vec![next.into()],
            })
        };
        let fetcher = ScriptedFetcher::default()
            .on("A", Lookup::Exact, disambig("A", "B"))
            .on("B", Lookup::Exact, disambig("B", "C"));
        let client = WikiClient::new(fetcher);

        let err = client.page("A").await.unwrap_err();
        assert!(matches!(err, WikiError::Disambiguation { .. }));
        assert_eq!(client.fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn not_found_retries_once_with_fuzzy_lookup() {
        let fetcher = ScriptedFetcher::default()
            .on("quantum physic", Lookup::Fuzzy, Ok(raw("Quantum mechanics")));
        let client = WikiClient::new(fetcher);

        let page = client.page("quantum physic").await.unwrap();
        assert_eq!(page.title, "Quantum mechanics");
        assert_eq!(
            client.fetcher.calls(),
            vec![
                ("quantum physic".to_string(), Lookup::Exact),
                ("quantum physic".to_string(), Lookup::Fuzzy),
            ]
        );
    }

    #[tokio::test]
    async fn gives_up_after_fuzzy_retry() {
        let client = WikiClient::new(ScriptedFetcher::default());

        let err = client.page("Xyzzy").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.fetcher.calls().len(), 2);
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn network_errors_are_not_retried() {
        let fetcher = ScriptedFetcher::default().on(
            "Mercury",
            Lookup::Exact,
            Err(WikiError::Network("connection reset".into())),
        );
        let client = WikiClient::new(fetcher);

        let err = client.page("Mercury").await.unwrap_err();
        assert!(matches!(err, WikiError::Network(_)));
        assert_eq!(client.fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn search_returns_titles_without_caching_pages() {
        let client = WikiClient::new(ScriptedFetcher::default());

        let titles = client.search("  westphalia ", 5).await.unwrap();
        assert_eq!(titles, vec!["westphalia (result)"]);
        assert!(client.cache().is_empty());

        assert!(client.search("   ", 5).await.unwrap().is_empty());
        assert!(client.search("westphalia", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn random_page_goes_through_the_cache() {
        let client = WikiClient::new(
            ScriptedFetcher::default().on("Peace of Westphalia", Lookup::Exact, Ok(raw("Peace of Westphalia"))),
        );
        let page = client.random_page().await.unwrap();
        assert_eq!(page.title, "Peace of Westphalia");
        assert!(client.cache().get("Peace of Westphalia").is_some());
    }
}
