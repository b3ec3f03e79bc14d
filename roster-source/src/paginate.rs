//! "Fetch every page until exhausted."
//!
//! Stop conditions, checked in order after each page:
//! 1. the envelope status is not 200 → error, nothing is returned;
//! 2. the page has no rows → done;
//! 3. the rows gathered so far reach the `total` reported by the first page → done.
//!
//! `max_pages` bounds the loop for servers that never send an empty page.

use serde_json::Value;

use crate::cache::PageCache;
use crate::error::SourceError;
use crate::fetch::PageFetcher;

/// Rows gathered by [`fetch_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRows {
    pub rows: Vec<Value>,
    /// Pages requested, including a final empty page.
    pub pages: u32,
    /// `total` as reported by the first page, if it reported one.
    pub reported_total: Option<u64>,
}

/// Paginate through the listing, caching each page when `cache` is given.
///
/// The cache is cleared before the first request and its manifest is only
/// written once the listing is complete, so an interrupted fetch never looks
/// like a finished one.
pub fn fetch_all<F: PageFetcher>(
    fetcher: &F,
    cache: Option<&PageCache>,
    max_pages: u32,
) -> Result<FetchedRows, SourceError> {
    let mut session = cache.map(PageCache::begin).transpose()?;
    let mut rows: Vec<Value> = Vec::new();
    let mut reported_total: Option<u64> = None;
    let mut index: u32 = 0;

    loop {
        if index >= max_pages {
            return Err(SourceError::PageLimit { max_pages });
        }

        tracing::info!(page = index + 1, "fetching directory page");
        let page = fetcher.fetch_page(index)?;
        page.check_status()?;

        if let Some(session) = session.as_mut() {
            session.record(index, &page)?;
        }
        if index == 0 {
            reported_total = page.total();
            match reported_total {
                Some(total) => tracing::info!(total, "directory reports total employees"),
                None => tracing::warn!("first page reports no total; paging until an empty page"),
            }
        }
        index += 1;

        if page.rows().is_empty() {
            tracing::info!(rows = rows.len(), "directory listing exhausted");
            break;
        }

        rows.extend(page.into_rows());
        if reported_total.is_some_and(|total| rows.len() as u64 >= total) {
            tracing::info!(rows = rows.len(), "fetched every reported employee");
            break;
        }
    }

    if let Some(session) = session {
        session.finish()?;
    }

    Ok(FetchedRows {
        rows,
        pages: index,
        reported_total,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::envelope::PageEnvelope;

    /// Serves canned pages and records which indices were requested.
    struct Scripted {
        pages: Vec<PageEnvelope>,
        requested: RefCell<Vec<u32>>,
    }

    impl Scripted {
        fn new(pages: Vec<PageEnvelope>) -> Self {
            Self {
                pages,
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    impl PageFetcher for Scripted {
        fn fetch_page(&self, index: u32) -> Result<PageEnvelope, SourceError> {
            self.requested.borrow_mut().push(index);
            Ok(self
                .pages
                .get(index as usize)
                .cloned()
                .unwrap_or_else(|| PageEnvelope::ok(vec![], 0)))
        }
    }

    fn rows(ids: &[&str]) -> Vec<Value> {
        ids.iter().map(|id| json!({ "empId": id })).collect()
    }

    #[test]
    fn stops_when_total_is_reached() {
        let fetcher = Scripted::new(vec![
            PageEnvelope::ok(rows(&["1", "2"]), 3),
            PageEnvelope::ok(rows(&["3"]), 3),
            PageEnvelope::ok(rows(&["never"]), 3),
        ]);
        let fetched = fetch_all(&fetcher, None, 100).expect("fetch");
        assert_eq!(fetched.rows.len(), 3);
        assert_eq!(fetched.pages, 2);
        assert_eq!(fetched.reported_total, Some(3));
        assert_eq!(*fetcher.requested.borrow(), vec![0, 1]);
    }

    #[test]
    fn stops_on_empty_page() {
        let fetcher = Scripted::new(vec![
            PageEnvelope::ok(rows(&["1", "2"]), 10),
            PageEnvelope::ok(vec![], 10),
        ]);
        let fetched = fetch_all(&fetcher, None, 100).expect("fetch");
        assert_eq!(fetched.rows.len(), 2);
        assert_eq!(fetched.pages, 2);
    }

    #[test]
    fn total_is_read_from_first_page_only() {
        let fetcher = Scripted::new(vec![
            PageEnvelope::ok(rows(&["1"]), 2),
            PageEnvelope::ok(rows(&["2"]), 999),
            PageEnvelope::ok(rows(&["3"]), 999),
        ]);
        let fetched = fetch_all(&fetcher, None, 100).expect("fetch");
        assert_eq!(fetched.rows.len(), 2);
    }

    #[test]
    fn api_error_mid_listing_is_fatal() {
        let fetcher = Scripted::new(vec![
            PageEnvelope::ok(rows(&["1"]), 5),
            PageEnvelope::new(json!({ "status": 500, "message": "backend down" })),
        ]);
        let err = fetch_all(&fetcher, None, 100).unwrap_err();
        assert!(matches!(err, SourceError::Api { .. }), "got: {err}");
    }

    #[test]
    fn page_limit_guards_endless_listings() {
        let pages = (0..10)
            .map(|i| PageEnvelope::ok(rows(&[i.to_string().as_str()]), 1_000))
            .collect();
        let fetcher = Scripted::new(pages);
        let err = fetch_all(&fetcher, None, 3).unwrap_err();
        assert!(matches!(err, SourceError::PageLimit { max_pages: 3 }));
    }

    #[test]
    fn empty_first_page_yields_no_rows() {
        let fetcher = Scripted::new(vec![PageEnvelope::ok(vec![], 0)]);
        let fetched = fetch_all(&fetcher, None, 10).expect("fetch");
        assert!(fetched.rows.is_empty());
        assert_eq!(fetched.reported_total, Some(0));
    }

    #[test]
    fn missing_total_pages_until_empty() {
        let untotalled = |ids: &[&str]| {
            PageEnvelope::new(json!({ "status": 200, "data": { "rows": rows(ids) } }))
        };
        let fetcher = Scripted::new(vec![
            untotalled(&["1"]),
            untotalled(&["2"]),
            untotalled(&[]),
        ]);
        let fetched = fetch_all(&fetcher, None, 100).expect("fetch");
        assert_eq!(fetched.rows.len(), 2);
        assert_eq!(fetched.pages, 3);
        assert_eq!(fetched.reported_total, None);
        assert_eq!(*fetcher.requested.borrow(), vec![0, 1, 2]);
    }
}
