//! Infinite scroll trigger
use crate::session::{PageRequest, SearchSession};
use log::trace;
use std::cell::Cell;
use std::rc::Rc;

pub const DEFAULT_THRESHOLD: u32 = 500;

/// Scroll geometry, in whatever unit the host renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub offset: u32,
    pub height: u32,
    pub content_height: u32,
}

impl Viewport {
    pub fn distance_to_bottom(&self) -> u32 {
        self.content_height
            .saturating_sub(self.offset.saturating_add(self.height))
    }
}

/// Shared flag freezing background scrolling while a modal is open.
#[derive(Debug, Clone, Default)]
pub struct ScrollLock(Rc<Cell<bool>>);

impl ScrollLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suspend(&self) {
        self.0.set(true);
    }

    pub fn restore(&self) {
        self.0.set(false);
    }

    pub fn is_suspended(&self) -> bool {
        self.0.get()
    }
}

/// Requests the next page when the viewport nears the end of the content.
///
/// There is no debounce; the session's loading guard alone decides whether
/// a fetch is admitted.
#[derive(Debug, Clone)]
pub struct InfiniteScrollController {
    threshold: u32,
    lock: ScrollLock,
}

impl InfiniteScrollController {
    pub fn new(threshold: u32) -> Self {
        Self::with_lock(threshold, ScrollLock::new())
    }

    pub fn with_lock(threshold: u32, lock: ScrollLock) -> Self {
        Self { threshold, lock }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn lock(&self) -> &ScrollLock {
        &self.lock
    }

    pub fn should_load(&self, viewport: &Viewport, session: &SearchSession) -> bool {
        !self.lock.is_suspended()
            && session.is_active()
            && !session.is_loading()
            && !session.no_more_results()
            && viewport.distance_to_bottom() < self.threshold
    }

    /// Handles one scroll event, returning the ticket of an admitted fetch.
    pub fn on_scroll(
        &self,
        viewport: &Viewport,
        session: &mut SearchSession,
    ) -> Option<PageRequest> {
        if !self.should_load(viewport, session) {
            trace!(
                "scroll ignored at distance {}",
                viewport.distance_to_bottom()
            );
            return None;
        }
        session.begin_fetch()
    }
}

impl Default for InfiniteScrollController {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}
