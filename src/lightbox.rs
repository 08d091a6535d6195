//! Full-size viewer over the accumulated results
//!
//! The controller never caches the result count: every transition reads the
//! session's current length, since pages keep arriving and broken images
//! get dropped while the viewer is open.
use crate::error::{PixsearchError, Result};
use crate::fetcher::ImageResult;
use crate::scroll::ScrollLock;
use crate::session::SearchSession;
use log::{debug, info};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightboxState {
    Closed,
    Open { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    ArrowLeft,
    ArrowRight,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    /// The dimmed area around the image.
    Backdrop,
    Content,
}

/// What the host should render while the viewer is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightboxView {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub source: String,
    pub identifier: String,
}

impl fmt::Display for LightboxView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] ", self.index + 1, self.total)?;
        if !self.title.is_empty() {
            write!(f, "{} ", self.title)?;
        }
        write!(f, "{}", self.source)
    }
}

/// How a media load failure was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailureOutcome {
    /// The entry now points at its identifier URL; load it again.
    Fallback { index: usize, source: String },
    /// The entry was removed. `displayed` is the viewer's index afterwards,
    /// or `None` if the viewer is (or became) closed.
    Dropped {
        removed: ImageResult,
        displayed: Option<usize>,
    },
}

#[derive(Debug)]
pub struct LightboxController {
    state: LightboxState,
    source: Option<String>,
    lock: ScrollLock,
}

impl LightboxController {
    pub fn new(lock: ScrollLock) -> Self {
        Self {
            state: LightboxState::Closed,
            source: None,
            lock,
        }
    }

    pub fn state(&self) -> LightboxState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, LightboxState::Open { .. })
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.state {
            LightboxState::Open { index } => Some(index),
            LightboxState::Closed => None,
        }
    }

    /// Media source being displayed; cleared on close.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn open(&mut self, index: usize, session: &SearchSession) -> Result<LightboxView> {
        let len = session.len();
        if index >= len {
            return Err(PixsearchError::Index { index, len });
        }
        if !self.is_open() {
            self.lock.suspend();
        }
        self.show(index, session)
            .ok_or(PixsearchError::Index { index, len })
    }

    pub fn close(&mut self) {
        if self.is_open() {
            debug!("Closing lightbox");
        }
        self.state = LightboxState::Closed;
        self.source = None;
        self.lock.restore();
    }

    pub fn next(&mut self, session: &SearchSession) -> Option<LightboxView> {
        self.step(session, 1)
    }

    pub fn prev(&mut self, session: &SearchSession) -> Option<LightboxView> {
        self.step(session, -1)
    }

    fn step(&mut self, session: &SearchSession, delta: isize) -> Option<LightboxView> {
        let index = self.current_index()?;
        let len = session.len();
        if len == 0 {
            self.close();
            return None;
        }
        let len = len as isize;
        let current = (index as isize).min(len - 1);
        let target = ((current + delta) % len + len) % len;
        self.show(target as usize, session)
    }

    /// Keyboard bindings; ignored while closed. Returns whether the key was used.
    pub fn handle_key(&mut self, key: Key, session: &SearchSession) -> bool {
        if !self.is_open() {
            return false;
        }
        match key {
            Key::Escape => self.close(),
            Key::ArrowLeft => {
                self.prev(session);
            }
            Key::ArrowRight => {
                self.next(session);
            }
            Key::Other => return false,
        }
        true
    }

    pub fn handle_click(&mut self, target: ClickTarget) -> bool {
        if self.is_open() && target == ClickTarget::Backdrop {
            self.close();
            return true;
        }
        false
    }

    pub fn view(&self, session: &SearchSession) -> Option<LightboxView> {
        let index = self.current_index()?;
        let image = session.get(index)?;
        Some(LightboxView {
            index,
            total: session.len(),
            title: image.title.clone(),
            source: self
                .source
                .clone()
                .unwrap_or_else(|| image.display_url.clone()),
            identifier: image.identifier.clone(),
        })
    }

    /// The displayed image failed to load.
    pub fn on_media_error(&mut self, session: &mut SearchSession) -> Result<LoadFailureOutcome> {
        let index = self.current_index().ok_or(PixsearchError::Index {
            index: 0,
            len: session.len(),
        })?;
        self.on_load_failure(index, session)
    }

    /// The image at `failed` (displayed or not) failed to load.
    ///
    /// Retries once with the identifier URL, then drops the entry and keeps
    /// the viewer pointing at a valid slot.
    pub fn on_load_failure(
        &mut self,
        failed: usize,
        session: &mut SearchSession,
    ) -> Result<LoadFailureOutcome> {
        if session.apply_fallback(failed) {
            let source = session
                .get(failed)
                .map(|image| image.display_url.clone())
                .unwrap_or_default();
            if self.current_index() == Some(failed) {
                self.source = Some(source.clone());
            }
            return Ok(LoadFailureOutcome::Fallback {
                index: failed,
                source,
            });
        }

        let removed = session.drop_result(failed).ok_or(PixsearchError::Index {
            index: failed,
            len: session.len(),
        })?;

        let displayed = match self.current_index() {
            None => None,
            Some(index) => {
                let len = session.len();
                if len == 0 {
                    info!("Last result removed, closing lightbox");
                    self.close();
                    None
                } else {
                    let shifted = if failed < index { index - 1 } else { index };
                    let target = shifted.min(len - 1);
                    self.show(target, session).map(|view| view.index)
                }
            }
        };

        Ok(LoadFailureOutcome::Dropped { removed, displayed })
    }

    fn show(&mut self, index: usize, session: &SearchSession) -> Option<LightboxView> {
        let image = session.get(index)?;
        self.state = LightboxState::Open { index };
        self.source = Some(image.display_url.clone());
        debug!("Lightbox showing {} ({})", index, image.display_url);
        self.view(session)
    }
}
