//! Process-lifetime page cache owned by a `WikiClient`.
//!
//! Entries are immutable once inserted. Two rounds fetching the same uncached
//! title at once may both hit the backend; the first insert wins and both
//! callers get the stored page.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::WikiPage;

#[derive(Default)]
pub struct PageCache {
    entries: RwLock<HashMap<String, Arc<WikiPage>>>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up by the exact title string the caller asked for.
    pub fn get(&self, title: &str) -> Option<Arc<WikiPage>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(title)
            .cloned()
    }

    /// Insert unless an entry exists; returns whichever page is now cached.
    pub fn insert_if_absent(&self, title: &str, page: Arc<WikiPage>) -> Arc<WikiPage> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(title.to_string())
            .or_insert(page)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page(title: &str, content: &str) -> Arc<WikiPage> {
        Arc::new(WikiPage {
            title: title.into(),
            url: format!("https://en.wikipedia.org/wiki/{title}"),
            content: content.into(),
            summary: content.into(),
            links: vec![],
            sections: BTreeMap::new(),
        })
    }

    #[test]
    fn first_insert_wins() {
        let cache = PageCache::new();
        let first = cache.insert_if_absent("Mercury", page("Mercury", "first"));
        let second = cache.insert_if_absent("Mercury", page("Mercury", "second"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.content, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn keys_are_exact_strings() {
        let cache = PageCache::new();
        cache.insert_if_absent("Mercury", page("Mercury", "x"));
        assert!(cache.get("Mercury").is_some());
        assert!(cache.get("mercury").is_none());
    }
}
