use crossbeam_channel::{bounded, Receiver, Sender};
use mockall::mock;
use pixsearch::browse::{Browser, BrowserOptions};
use pixsearch::media::MediaProbe;
use pixsearch::query::query_from_url;
use pixsearch::{
    ImageResult, MemoryPreferenceStore, PixsearchError, Preferences, ResultFetcher, SearchQuery,
};
use std::sync::Arc;

/// Answers "cats" only once released; every other query immediately.
struct GatedFetcher {
    release: Receiver<()>,
}

impl GatedFetcher {
    fn new() -> (Self, Sender<()>) {
        let (tx, rx) = bounded(1);
        (Self { release: rx }, tx)
    }
}

impl ResultFetcher for GatedFetcher {
    fn fetch(&self, query: &SearchQuery) -> pixsearch::Result<Vec<ImageResult>> {
        if query.text == "cats" {
            self.release
                .recv()
                .map_err(|e| PixsearchError::Network(e.to_string()))?;
        }
        Ok((0..3)
            .map(|i| {
                ImageResult::new(format!("http://img/{}/{}/{i}.jpg", query.text, query.page))
            })
            .collect())
    }
}

/// Fixed pages keyed by page number; empty past the end.
struct PagedFetcher {
    pages: Vec<Vec<ImageResult>>,
}

impl ResultFetcher for PagedFetcher {
    fn fetch(&self, query: &SearchQuery) -> pixsearch::Result<Vec<ImageResult>> {
        Ok(self
            .pages
            .get(query.page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }
}

mock! {
    pub Fetcher {}
    impl ResultFetcher for Fetcher {
        fn fetch(&self, query: &SearchQuery) -> pixsearch::Result<Vec<ImageResult>>;
    }
}

/// Fails the first page by panicking, serves later requests normally.
struct PanickingFetcher;

impl ResultFetcher for PanickingFetcher {
    fn fetch(&self, query: &SearchQuery) -> pixsearch::Result<Vec<ImageResult>> {
        if query.text == "explode" {
            panic!("backend client crashed");
        }
        Ok(vec![ImageResult::new("http://img/fine.jpg")])
    }
}

/// Rejects any URL containing "broken".
struct PatternProbe;

impl MediaProbe for PatternProbe {
    fn probe(&self, url: &str) -> pixsearch::Result<()> {
        if url.contains("broken") {
            Err(PixsearchError::ImageLoad {
                url: url.to_string(),
                reason: "404".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn options() -> BrowserOptions {
    BrowserOptions {
        base_url: "http://localhost:5000".to_string(),
        scroll_threshold: 500,
        page_rows: 5,
        show_progress: false,
    }
}

fn browser(fetcher: Arc<dyn ResultFetcher>) -> Browser<MemoryPreferenceStore, Vec<u8>> {
    Browser::new(
        Preferences::new(MemoryPreferenceStore::new()),
        fetcher,
        options(),
        Vec::new(),
    )
}

fn text(browser: &Browser<MemoryPreferenceStore, Vec<u8>>) -> String {
    String::from_utf8_lossy(browser.output()).to_string()
}

fn numbered(prefix: &str, range: std::ops::Range<usize>) -> Vec<ImageResult> {
    range
        .map(|i| ImageResult::new(format!("http://img/{prefix}/{i}.jpg")))
        .collect()
}

#[test]
fn late_response_for_replaced_query_is_dropped() {
    let (fetcher, release) = GatedFetcher::new();
    let mut browser = browser(Arc::new(fetcher));

    browser.handle_line("cats").unwrap();
    browser.handle_line("dogs").unwrap();
    browser.pump().unwrap();
    assert_eq!(browser.session().len(), 3);

    release.send(()).unwrap();
    browser.pump().unwrap();

    assert_eq!(browser.session().query_text(), Some("dogs"));
    assert_eq!(browser.session().len(), 3);
    assert!(browser
        .session()
        .results()
        .iter()
        .all(|r| r.identifier.contains("/dogs/")));
    assert!(!browser.session().is_loading());
}

#[test]
fn searches_are_recorded_most_recent_first() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..2)],
    };
    let mut browser = browser(Arc::new(fetcher));
    for query in ["cats", "dogs", "CATS"] {
        browser.handle_line(query).unwrap();
        browser.pump().unwrap();
    }
    assert_eq!(browser.preferences().history(), vec!["CATS", "dogs"]);
}

#[test]
fn scrolling_to_the_end_loads_the_next_page_once() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..10), numbered("b", 0..10)],
    };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("cats").unwrap();
    browser.pump().unwrap();
    assert_eq!(browser.session().page(), 2);

    browser.handle_line("scroll").unwrap();
    assert!(browser.session().is_loading());
    browser.handle_line("scroll").unwrap();
    browser.pump().unwrap();

    assert_eq!(browser.session().len(), 20);
    assert_eq!(browser.session().page(), 3);
}

#[test]
fn exhausted_query_reports_no_more() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..2)],
    };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("cats").unwrap();
    browser.pump().unwrap();
    browser.handle_line("more").unwrap();
    browser.pump().unwrap();
    assert!(browser.session().no_more_results());

    browser.handle_line("more").unwrap();
    assert!(!browser.session().is_loading());
    assert!(text(&browser).contains("No more images for this query."));
}

#[test]
fn scroll_is_ignored_while_lightbox_is_open() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..6), numbered("b", 0..6)],
    };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("cats").unwrap();
    browser.pump().unwrap();

    browser.handle_line("open 1").unwrap();
    browser.handle_line("scroll").unwrap();
    assert!(!browser.session().is_loading());

    browser.handle_line("esc").unwrap();
    assert!(!browser.lightbox().is_open());
    browser.handle_line("scroll").unwrap();
    assert!(browser.session().is_loading());
    browser.pump().unwrap();
}

#[test]
fn lightbox_wraps_and_closes_on_backdrop() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..3)],
    };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("cats").unwrap();
    browser.pump().unwrap();

    browser.handle_line("open 3").unwrap();
    browser.handle_line("next").unwrap();
    assert_eq!(browser.lightbox().current_index(), Some(0));
    browser.handle_line("prev").unwrap();
    assert_eq!(browser.lightbox().current_index(), Some(2));

    browser.handle_line("outside").unwrap();
    assert!(!browser.lightbox().is_open());
}

#[test]
fn probe_failure_falls_back_then_drops() {
    let fetcher = PagedFetcher {
        pages: vec![vec![
            ImageResult::new("http://img/ok/0.jpg"),
            ImageResult::new("http://img/ok/1.jpg").with_display_url("http://proxy/broken/1.jpg"),
            ImageResult::new("http://img/broken/2.jpg"),
        ]],
    };
    let mut browser = browser(Arc::new(fetcher)).with_probe(Box::new(PatternProbe));
    browser.handle_line("cats").unwrap();
    browser.pump().unwrap();

    browser.handle_line("open 2").unwrap();
    assert_eq!(browser.lightbox().source(), Some("http://img/ok/1.jpg"));
    assert_eq!(browser.session().len(), 3);

    browser.handle_line("open 3").unwrap();
    assert_eq!(browser.session().len(), 2);
    assert_eq!(browser.lightbox().current_index(), Some(1));
    assert_eq!(browser.lightbox().source(), Some("http://img/ok/1.jpg"));
}

#[test]
fn share_prints_query_url() {
    let fetcher = PagedFetcher {
        pages: vec![numbered("a", 0..1)],
    };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("search sea otters").unwrap();
    browser.pump().unwrap();
    browser.handle_line("share").unwrap();
    assert!(text(&browser).contains("http://localhost:5000/search?query=sea%20otters"));
}

#[test]
fn blank_search_shows_validation_message() {
    let fetcher = PagedFetcher { pages: Vec::new() };
    let mut browser = browser(Arc::new(fetcher));
    browser.handle_line("search").unwrap();
    assert!(!browser.session().is_active());
    assert!(text(&browser).contains("Please enter a search query."));
}

#[test]
fn quit_stops_the_loop() {
    let fetcher = PagedFetcher { pages: Vec::new() };
    let mut browser = browser(Arc::new(fetcher));
    assert!(!browser.handle_line("quit").unwrap());
}

#[test]
fn shared_link_starts_search_with_decoded_query() {
    let mut fetcher = MockFetcher::new();
    fetcher
        .expect_fetch()
        .withf(|q| q.text == "sea otters" && q.page == 1)
        .times(1)
        .returning(|_| Ok(vec![ImageResult::new("http://img/otter.jpg")]));
    let mut browser = browser(Arc::new(fetcher));

    let text = query_from_url("http://localhost:5000/search?query=sea%20otters")
        .unwrap()
        .unwrap();
    browser.start_search(&text).unwrap();
    browser.pump().unwrap();

    assert_eq!(browser.session().query_text(), Some("sea otters"));
    assert_eq!(browser.session().len(), 1);
    assert_eq!(browser.preferences().history(), vec!["sea otters"]);
}

#[test]
fn fetch_worker_panic_settles_as_network_error() {
    let mut browser = browser(Arc::new(PanickingFetcher));
    browser.handle_line("explode").unwrap();
    browser.pump().unwrap();

    assert!(!browser.session().is_loading());
    assert!(!browser.session().no_more_results());
    assert!(text(&browser).contains("backend client crashed"));

    browser.handle_line("kittens").unwrap();
    browser.pump().unwrap();
    assert_eq!(browser.session().len(), 1);
}
