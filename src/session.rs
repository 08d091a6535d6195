//! Incremental search session: paging, deduplication and load guards
//!
//! A fetch is split in two halves so that its completion can arrive later
//! than the call that started it: [`SearchSession::begin_fetch`] hands out a
//! [`PageRequest`] ticket and [`SearchSession::complete_fetch`] folds the
//! response back in. Tickets from an older search, or for a page the session
//! is no longer waiting on, are discarded on arrival.
use crate::error::{PixsearchError, Result};
use crate::fetcher::{ImageResult, ResultFetcher};
use crate::query::{self, SearchFilters, SearchQuery};
use log::{debug, info, warn};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Loading,
    Displaying,
    Exhausted,
    Error,
}

/// Ticket identifying one outstanding page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: u64,
    pub query: SearchQuery,
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.query.page
    }
}

/// Result of folding a page response into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// New results, in arrival order, starting at `first_index` of the
    /// accumulated list. `duplicates` counts entries that were dropped.
    Appended {
        new: Vec<ImageResult>,
        first_index: usize,
        duplicates: usize,
    },
    /// A later page came back empty; nothing more will be requested.
    Exhausted,
    /// The response belonged to a superseded request and was ignored.
    Stale,
    /// The load guard refused to start a fetch.
    Skipped,
}

#[derive(Debug)]
pub struct SearchSession {
    filters: SearchFilters,
    query: Option<String>,
    accumulated: Vec<ImageResult>,
    seen: HashSet<String>,
    page: u32,
    is_loading: bool,
    no_more_results: bool,
    generation: u64,
    in_flight: Option<(u64, u32)>,
    phase: SessionPhase,
}

impl SearchSession {
    pub fn new(filters: SearchFilters) -> Self {
        Self {
            filters,
            query: None,
            accumulated: Vec::new(),
            seen: HashSet::new(),
            page: 1,
            is_loading: false,
            no_more_results: false,
            generation: 0,
            in_flight: None,
            phase: SessionPhase::Idle,
        }
    }

    /// Filters used by the next `start_search`.
    pub fn set_filters(&mut self, filters: SearchFilters) {
        self.filters = filters;
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    /// Resets the session for `text` and returns the ticket for page 1.
    ///
    /// Any fetch still in flight for the previous query becomes stale.
    pub fn start_search(&mut self, text: &str) -> Result<PageRequest> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PixsearchError::Validation);
        }

        info!("Starting search for '{text}'");
        self.generation += 1;
        self.query = Some(text.to_string());
        self.accumulated.clear();
        self.seen.clear();
        self.page = 1;
        self.no_more_results = false;
        self.is_loading = false;
        self.in_flight = None;
        self.phase = SessionPhase::Loading;

        self.begin_fetch()
            .ok_or_else(|| PixsearchError::Other("fresh session refused to fetch".to_string()))
    }

    /// Admits a fetch for the current page unless one is already running or
    /// the query is exhausted.
    pub fn begin_fetch(&mut self) -> Option<PageRequest> {
        let text = self.query.as_ref()?;
        if self.is_loading || self.no_more_results {
            debug!(
                "Fetch refused (loading={}, exhausted={})",
                self.is_loading, self.no_more_results
            );
            return None;
        }

        self.is_loading = true;
        self.phase = SessionPhase::Loading;
        self.in_flight = Some((self.generation, self.page));
        Some(PageRequest {
            generation: self.generation,
            query: SearchQuery::new(text.clone(), &self.filters, self.page),
        })
    }

    /// Folds the response for `request` into the session.
    ///
    /// Clears the loading flag on every path except a stale ticket, which
    /// does not own it.
    pub fn complete_fetch(
        &mut self,
        request: &PageRequest,
        response: Result<Vec<ImageResult>>,
    ) -> Result<FetchOutcome> {
        if self.in_flight != Some((request.generation, request.page())) {
            debug!(
                "Discarding stale response for '{}' page {}",
                request.query.text,
                request.page()
            );
            return Ok(FetchOutcome::Stale);
        }
        self.in_flight = None;
        self.is_loading = false;

        let images = match response {
            Ok(images) => images,
            Err(e) => {
                warn!("Fetching page {} failed: {e}", request.page());
                self.phase = SessionPhase::Error;
                return Err(match e {
                    PixsearchError::Network(_) => e,
                    other => PixsearchError::Network(other.to_string()),
                });
            }
        };

        if images.is_empty() {
            self.no_more_results = true;
            self.phase = SessionPhase::Exhausted;
            if self.page == 1 {
                return Err(PixsearchError::NoResults {
                    query: request.query.text.clone(),
                });
            }
            info!("No more results after page {}", self.page - 1);
            return Ok(FetchOutcome::Exhausted);
        }

        let first_index = self.accumulated.len();
        let received = images.len();
        let new = self.merge(images);
        let duplicates = received - new.len();

        if new.is_empty() {
            // Re-requesting the same page would return the same duplicates.
            info!(
                "Page {} repeated {} known results; treating query as exhausted",
                self.page, duplicates
            );
            self.no_more_results = true;
            self.phase = SessionPhase::Exhausted;
            return Ok(FetchOutcome::Exhausted);
        }

        self.page += 1;
        self.phase = SessionPhase::Displaying;
        debug!(
            "Appended {} results ({} duplicates), next page {}",
            new.len(),
            duplicates,
            self.page
        );
        Ok(FetchOutcome::Appended {
            new,
            first_index,
            duplicates,
        })
    }

    /// Runs one guarded fetch to completion on the calling thread.
    pub fn fetch_next_page(&mut self, fetcher: &dyn ResultFetcher) -> Result<FetchOutcome> {
        let request = match self.begin_fetch() {
            Some(request) => request,
            None => return Ok(FetchOutcome::Skipped),
        };
        let response = fetcher.fetch(&request.query);
        self.complete_fetch(&request, response)
    }

    /// `start_search` followed by the first page fetch on the calling thread.
    pub fn start_search_with(
        &mut self,
        fetcher: &dyn ResultFetcher,
        text: &str,
    ) -> Result<FetchOutcome> {
        let request = self.start_search(text)?;
        let response = fetcher.fetch(&request.query);
        self.complete_fetch(&request, response)
    }

    fn merge(&mut self, images: Vec<ImageResult>) -> Vec<ImageResult> {
        let mut new = Vec::with_capacity(images.len());
        for image in images {
            if self.seen.insert(image.identifier.clone()) {
                new.push(image);
            }
        }
        self.accumulated.extend(new.iter().cloned());
        new
    }

    /// Switches the entry at `index` to its identifier URL.
    ///
    /// Returns `false` if there is no such entry or its fallback was already used.
    pub fn apply_fallback(&mut self, index: usize) -> bool {
        match self.accumulated.get_mut(index) {
            Some(image) if image.has_untried_fallback() => {
                debug!(
                    "Falling back from {} to {}",
                    image.display_url, image.identifier
                );
                image.display_url = image.identifier.clone();
                true
            }
            _ => false,
        }
    }

    /// Removes the entry at `index`. Its identifier stays known, so a later
    /// page cannot bring it back.
    pub fn drop_result(&mut self, index: usize) -> Option<ImageResult> {
        if index >= self.accumulated.len() {
            return None;
        }
        let removed = self.accumulated.remove(index);
        info!("Dropped unloadable image {}", removed.identifier);
        Some(removed)
    }

    pub fn results(&self) -> &[ImageResult] {
        &self.accumulated
    }

    pub fn get(&self, index: usize) -> Option<&ImageResult> {
        self.accumulated.get(index)
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn no_more_results(&self) -> bool {
        self.no_more_results
    }

    /// True once `start_search` has succeeded.
    pub fn is_active(&self) -> bool {
        self.query.is_some()
    }

    /// Whether a "load more" affordance should be offered.
    pub fn can_load_more(&self) -> bool {
        self.is_active() && !self.no_more_results
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bookmarkable URL reproducing the current query.
    pub fn share_url(&self, base: &str) -> Option<String> {
        self.query.as_deref().map(|text| query::share_url(base, text))
    }
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new(SearchFilters::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(ids: &[&str]) -> Vec<ImageResult> {
        ids.iter().map(|id| ImageResult::new(*id)).collect()
    }

    #[test]
    fn blank_query_is_rejected_without_state_change() {
        let mut session = SearchSession::default();
        assert!(matches!(
            session.start_search("   "),
            Err(PixsearchError::Validation)
        ));
        assert!(!session.is_active());
        assert!(!session.is_loading());
        assert_eq!(session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn start_search_trims_and_issues_page_one() {
        let mut session = SearchSession::default();
        let request = session.start_search("  cats ").unwrap();
        assert_eq!(request.query.text, "cats");
        assert_eq!(request.page(), 1);
        assert!(session.is_loading());
        assert_eq!(session.phase(), SessionPhase::Loading);
    }

    #[test]
    fn second_begin_while_loading_is_dropped() {
        let mut session = SearchSession::default();
        let _request = session.start_search("cats").unwrap();
        assert!(session.begin_fetch().is_none());
    }

    #[test]
    fn appends_only_new_results_and_advances_page() {
        let mut session = SearchSession::default();
        let first = session.start_search("cats").unwrap();
        session
            .complete_fetch(&first, Ok(images(&["a", "b"])))
            .unwrap();

        let second = session.begin_fetch().unwrap();
        assert_eq!(second.page(), 2);
        let outcome = session
            .complete_fetch(&second, Ok(images(&["b", "c", "c"])))
            .unwrap();

        assert_eq!(
            outcome,
            FetchOutcome::Appended {
                new: images(&["c"]),
                first_index: 2,
                duplicates: 2,
            }
        );
        assert_eq!(session.len(), 3);
        assert_eq!(session.page(), 3);
    }

    #[test]
    fn empty_first_page_is_no_results_and_terminal() {
        let mut session = SearchSession::default();
        let request = session.start_search("zzzz").unwrap();
        let err = session.complete_fetch(&request, Ok(Vec::new())).unwrap_err();
        assert!(matches!(err, PixsearchError::NoResults { query } if query == "zzzz"));
        assert!(session.no_more_results());
        assert!(!session.is_loading());
        assert!(session.begin_fetch().is_none());
    }

    #[test]
    fn empty_later_page_is_quiet_exhaustion() {
        let mut session = SearchSession::default();
        let first = session.start_search("cats").unwrap();
        session.complete_fetch(&first, Ok(images(&["a"]))).unwrap();
        let second = session.begin_fetch().unwrap();
        let outcome = session.complete_fetch(&second, Ok(Vec::new())).unwrap();
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(session.phase(), SessionPhase::Exhausted);
        assert_eq!(session.page(), 2);
        assert!(!session.can_load_more());
    }

    #[test]
    fn all_duplicate_page_exhausts_without_advancing() {
        let mut session = SearchSession::default();
        let first = session.start_search("cats").unwrap();
        session
            .complete_fetch(&first, Ok(images(&["a", "b"])))
            .unwrap();
        let second = session.begin_fetch().unwrap();
        let outcome = session
            .complete_fetch(&second, Ok(images(&["a", "b"])))
            .unwrap();
        assert_eq!(outcome, FetchOutcome::Exhausted);
        assert_eq!(session.page(), 2);
        assert!(session.no_more_results());
    }

    #[test]
    fn network_failure_is_retryable() {
        let mut session = SearchSession::default();
        let request = session.start_search("cats").unwrap();
        let err = session
            .complete_fetch(&request, Err(PixsearchError::Network("timeout".into())))
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(!session.is_loading());
        assert!(!session.no_more_results());
        assert_eq!(session.phase(), SessionPhase::Error);

        let retry = session.begin_fetch().unwrap();
        assert_eq!(retry.page(), 1);
    }

    #[test]
    fn response_for_superseded_search_is_discarded() {
        let mut session = SearchSession::default();
        let old = session.start_search("cats").unwrap();
        let current = session.start_search("dogs").unwrap();

        let outcome = session.complete_fetch(&old, Ok(images(&["cat1"]))).unwrap();
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(session.is_empty());
        assert!(session.is_loading());

        session
            .complete_fetch(&current, Ok(images(&["dog1"])))
            .unwrap();
        assert_eq!(session.results()[0].identifier, "dog1");
    }

    #[test]
    fn duplicate_completion_is_stale() {
        let mut session = SearchSession::default();
        let request = session.start_search("cats").unwrap();
        session
            .complete_fetch(&request, Ok(images(&["a"])))
            .unwrap();
        let again = session.complete_fetch(&request, Ok(images(&["b"]))).unwrap();
        assert_eq!(again, FetchOutcome::Stale);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn fallback_applies_once() {
        let mut session = SearchSession::default();
        let request = session.start_search("cats").unwrap();
        let proxied = ImageResult::new("http://src/a.jpg").with_display_url("http://proxy/a.jpg");
        session.complete_fetch(&request, Ok(vec![proxied])).unwrap();

        assert!(session.apply_fallback(0));
        assert_eq!(session.results()[0].display_url, "http://src/a.jpg");
        assert!(!session.apply_fallback(0));
        assert!(!session.apply_fallback(5));
    }

    #[test]
    fn dropped_identifier_does_not_return() {
        let mut session = SearchSession::default();
        let first = session.start_search("cats").unwrap();
        session
            .complete_fetch(&first, Ok(images(&["a", "b"])))
            .unwrap();
        assert_eq!(session.drop_result(0).unwrap().identifier, "a");
        assert!(session.drop_result(9).is_none());

        let second = session.begin_fetch().unwrap();
        session
            .complete_fetch(&second, Ok(images(&["a", "c"])))
            .unwrap();
        let ids: Vec<_> = session.results().iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn share_url_reflects_current_query() {
        let mut session = SearchSession::default();
        assert!(session.share_url("http://host").is_none());
        session.start_search("sea otters").unwrap();
        assert_eq!(
            session.share_url("http://host").as_deref(),
            Some("http://host/search?query=sea%20otters")
        );
    }
}
