//! Interactive result browser
//!
//! A single-threaded event loop. User lines and fetch completions arrive on
//! two channels and are applied to the session, scroll and lightbox state
//! machines one at a time. Each fetch runs on its own worker thread and
//! reports back with the ticket it was issued for.
use crate::error::{PixsearchError, Result};
use crate::fetcher::{ImageResult, ResultFetcher};
use crate::lightbox::{ClickTarget, Key, LightboxController, LightboxView, LoadFailureOutcome};
use crate::media::MediaProbe;
use crate::preferences::{PreferenceStore, Preferences, Theme};
use crate::progress::{ProgressIndicator, ProgressPhase};
use crate::query::{ImageSize, SearchFilters, TimeRange};
use crate::scroll::{InfiniteScrollController, ScrollLock, Viewport};
use crate::session::{FetchOutcome, PageRequest, SearchSession};
use colored::*;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Height of one result row in scroll units.
pub const ROW_HEIGHT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseCommand {
    Search(String),
    More,
    Scroll(u32),
    Top,
    List,
    Open(usize),
    Key(Key),
    ClickOutside,
    Broken(Option<usize>),
    Copy,
    Share,
    History,
    Theme,
    Size(ImageSize),
    Time(TimeRange),
    Safe(bool),
    Proxy(bool),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_position(value: &str) -> Option<usize> {
    value.parse::<usize>().ok()
}

/// Parses one input line. Anything unrecognised is taken as a new query.
///
/// A command word only counts as a command when the rest of the line fits
/// it: bare words take no trailing text, and argument commands need an
/// argument that parses. "more cats" or "open water" are searches.
pub fn parse_command(line: &str) -> BrowseCommand {
    let line = line.trim();
    let mut parts = line.splitn(2, char::is_whitespace);
    let head = match parts.next() {
        Some(head) if !head.is_empty() => head,
        _ => return BrowseCommand::Empty,
    };
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());
    let search = || BrowseCommand::Search(line.to_string());

    let Some(arg) = rest else {
        return match head {
            "s" | "search" => BrowseCommand::Search(String::new()),
            "m" | "more" => BrowseCommand::More,
            "j" | "scroll" => BrowseCommand::Scroll(0),
            "top" => BrowseCommand::Top,
            "ls" | "list" => BrowseCommand::List,
            "o" | "open" => BrowseCommand::Invalid("usage: open <number>".to_string()),
            "n" | "next" | "right" | "l" => BrowseCommand::Key(Key::ArrowRight),
            "p" | "prev" | "left" | "h" => BrowseCommand::Key(Key::ArrowLeft),
            "x" | "esc" | "close" => BrowseCommand::Key(Key::Escape),
            "outside" => BrowseCommand::ClickOutside,
            "broken" => BrowseCommand::Broken(None),
            "c" | "copy" => BrowseCommand::Copy,
            "share" => BrowseCommand::Share,
            "history" => BrowseCommand::History,
            "theme" => BrowseCommand::Theme,
            "size" => {
                BrowseCommand::Invalid("usage: size any|small|medium|large|wallpaper".to_string())
            }
            "time" => BrowseCommand::Invalid("usage: time any|day|week|month|year".to_string()),
            "safe" => BrowseCommand::Invalid("usage: safe on|off".to_string()),
            "proxy" => BrowseCommand::Invalid("usage: proxy on|off".to_string()),
            "?" | "help" => BrowseCommand::Help,
            "q" | "quit" | "exit" => BrowseCommand::Quit,
            _ => search(),
        };
    };

    match head {
        "s" | "search" => BrowseCommand::Search(arg.to_string()),
        "j" | "scroll" => arg
            .parse::<u32>()
            .map(BrowseCommand::Scroll)
            .unwrap_or_else(|_| search()),
        "o" | "open" => match parse_position(arg) {
            Some(0) => BrowseCommand::Invalid("images are numbered from 1".to_string()),
            Some(n) => BrowseCommand::Open(n - 1),
            None => search(),
        },
        "broken" => match parse_position(arg) {
            Some(0) => BrowseCommand::Invalid("images are numbered from 1".to_string()),
            Some(n) => BrowseCommand::Broken(Some(n - 1)),
            None => search(),
        },
        "size" => arg
            .parse::<ImageSize>()
            .map(BrowseCommand::Size)
            .unwrap_or_else(|_| search()),
        "time" => arg
            .parse::<TimeRange>()
            .map(BrowseCommand::Time)
            .unwrap_or_else(|_| search()),
        "safe" => parse_switch(arg).map(BrowseCommand::Safe).unwrap_or_else(search),
        "proxy" => parse_switch(arg).map(BrowseCommand::Proxy).unwrap_or_else(search),
        _ => search(),
    }
}

/// Completion of one fetch, tagged with the request it answers.
pub struct Completion {
    pub request: PageRequest,
    pub response: Result<Vec<ImageResult>>,
}

pub struct BrowserOptions {
    pub base_url: String,
    pub scroll_threshold: u32,
    pub page_rows: u32,
    pub show_progress: bool,
}

pub struct Browser<S: PreferenceStore, W: Write> {
    session: SearchSession,
    scroll: InfiniteScrollController,
    lightbox: LightboxController,
    prefs: Preferences<S>,
    fetcher: Arc<dyn ResultFetcher>,
    probe: Option<Box<dyn MediaProbe>>,
    progress: Option<ProgressIndicator>,
    show_progress: bool,
    base_url: String,
    offset: u32,
    page_rows: u32,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    out: W,
}

impl<S: PreferenceStore, W: Write> Browser<S, W> {
    pub fn new(
        prefs: Preferences<S>,
        fetcher: Arc<dyn ResultFetcher>,
        options: BrowserOptions,
        out: W,
    ) -> Self {
        let lock = ScrollLock::new();
        let (completions_tx, completions_rx) = unbounded();
        Self {
            session: SearchSession::new(prefs.filters()),
            scroll: InfiniteScrollController::with_lock(options.scroll_threshold, lock.clone()),
            lightbox: LightboxController::new(lock),
            prefs,
            fetcher,
            probe: None,
            progress: None,
            show_progress: options.show_progress,
            base_url: options.base_url,
            offset: 0,
            page_rows: options.page_rows.max(1),
            completions_tx,
            completions_rx,
            out,
        }
    }

    pub fn with_probe(mut self, probe: Box<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Filters for the next search, without touching saved preferences.
    pub fn set_filters(&mut self, filters: SearchFilters) {
        self.session.set_filters(filters);
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn lightbox(&self) -> &LightboxController {
        &self.lightbox
    }

    pub fn preferences(&self) -> &Preferences<S> {
        &self.prefs
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn viewport(&self) -> Viewport {
        Viewport {
            offset: self.offset * ROW_HEIGHT,
            height: self.page_rows * ROW_HEIGHT,
            content_height: self.session.len() as u32 * ROW_HEIGHT,
        }
    }

    fn accent(&self, text: &str) -> ColoredString {
        match self.prefs.theme() {
            Theme::Dark => text.cyan(),
            Theme::Light => text.blue(),
        }
    }

    /// Runs until the user quits or `input` closes.
    pub fn run(&mut self, input: Receiver<String>) -> Result<()> {
        self.print_banner()?;
        let completions = self.completions_rx.clone();
        loop {
            select! {
                recv(input) -> line => match line {
                    Ok(line) => match self.handle_line(&line) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => writeln!(self.out, "{}", e.to_string().red())?,
                    },
                    Err(_) => {
                        debug!("Input closed");
                        while self.session.is_loading() {
                            self.pump()?;
                        }
                        break;
                    }
                },
                recv(completions) -> completion => {
                    if let Ok(completion) = completion {
                        self.on_completion(completion)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Blocks for the next fetch completion and applies it.
    pub fn pump(&mut self) -> Result<()> {
        let completion = self
            .completions_rx
            .recv()
            .map_err(|e| PixsearchError::Other(e.to_string()))?;
        self.on_completion(completion)
    }

    /// Applies one input line. Returns `false` when the user asked to quit.
    pub fn handle_line(&mut self, line: &str) -> Result<bool> {
        let command = parse_command(line);
        debug!("command: {command:?}");
        match command {
            BrowseCommand::Quit => return Ok(false),
            BrowseCommand::Empty => {}
            BrowseCommand::Search(text) => self.start_search(&text)?,
            BrowseCommand::More => {
                if self.session.can_load_more() {
                    match self.session.begin_fetch() {
                        Some(request) => self.dispatch(request),
                        None => writeln!(self.out, "{}", "Already loading...".dimmed())?,
                    }
                } else if self.session.is_active() {
                    writeln!(self.out, "{}", "No more images for this query.".dimmed())?;
                } else {
                    writeln!(self.out, "{}", "Search for something first.".yellow())?;
                }
            }
            BrowseCommand::Scroll(rows) => {
                let rows = if rows == 0 { self.page_rows } else { rows };
                self.scroll_by(rows)?;
            }
            BrowseCommand::Top => self.offset = 0,
            BrowseCommand::List => self.print_results()?,
            BrowseCommand::Open(index) => match self.lightbox.open(index, &self.session) {
                Ok(_) => self.show_current()?,
                Err(e) => writeln!(self.out, "{}", e.to_string().red())?,
            },
            BrowseCommand::Key(key) => {
                if self.lightbox.handle_key(key, &self.session) {
                    if self.lightbox.is_open() {
                        self.show_current()?;
                    } else {
                        writeln!(self.out, "{}", "Lightbox closed".dimmed())?;
                    }
                } else {
                    writeln!(self.out, "{}", "Open an image first (open <number>).".yellow())?;
                }
            }
            BrowseCommand::ClickOutside => {
                if self.lightbox.handle_click(ClickTarget::Backdrop) {
                    writeln!(self.out, "{}", "Lightbox closed".dimmed())?;
                }
            }
            BrowseCommand::Broken(index) => {
                let target = index.or(self.lightbox.current_index());
                match target {
                    Some(index) => self.load_failed(index)?,
                    None => writeln!(self.out, "{}", "usage: broken [number]".yellow())?,
                }
            }
            BrowseCommand::Copy => self.copy_current()?,
            BrowseCommand::Share => match self.session.share_url(&self.base_url) {
                Some(url) => writeln!(self.out, "{url}")?,
                None => writeln!(self.out, "{}", "Search for something first.".yellow())?,
            },
            BrowseCommand::History => {
                let history = self.prefs.history();
                if history.is_empty() {
                    writeln!(self.out, "{}", "No searches yet".dimmed())?;
                }
                for (i, query) in history.iter().enumerate() {
                    writeln!(self.out, "  {}: {}", i + 1, query)?;
                }
            }
            BrowseCommand::Theme => {
                let theme = self.prefs.toggle_theme()?;
                let label = self.accent(&theme.to_string());
                writeln!(self.out, "Theme: {label}")?;
            }
            BrowseCommand::Size(size) => {
                self.prefs.set_image_size(size)?;
                self.refresh_filters()?;
            }
            BrowseCommand::Time(range) => {
                self.prefs.set_time_range(range)?;
                self.refresh_filters()?;
            }
            BrowseCommand::Safe(enabled) => {
                self.prefs.set_safe_search(enabled)?;
                self.refresh_filters()?;
            }
            BrowseCommand::Proxy(enabled) => {
                self.prefs.set_proxy_mode(enabled)?;
                self.refresh_filters()?;
            }
            BrowseCommand::Help => self.print_help()?,
            BrowseCommand::Invalid(msg) => writeln!(self.out, "{}", msg.red())?,
        }
        Ok(true)
    }

    pub fn start_search(&mut self, text: &str) -> Result<()> {
        let request = match self.session.start_search(text) {
            Ok(request) => request,
            Err(e @ PixsearchError::Validation) => {
                writeln!(self.out, "{}", e.to_string().red())?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.lightbox.close();
        self.offset = 0;
        if let Err(e) = self.prefs.record_search(&request.query.text) {
            warn!("Could not save search history: {e}");
        }

        if let Some(previous) = self.progress.take() {
            previous.finish();
        }
        if self.show_progress {
            let progress = ProgressIndicator::new();
            progress.update(ProgressPhase::Init);
            self.progress = Some(progress);
        }
        let label = self.accent(&request.query.text).bold();
        writeln!(self.out, "Searching for {label}")?;
        self.dispatch(request);
        Ok(())
    }

    fn dispatch(&mut self, request: PageRequest) {
        if let Some(progress) = &self.progress {
            progress.update(ProgressPhase::Searching);
        }
        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.completions_tx.clone();
        thread::spawn(move || {
            let response = panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch(&request.query)))
                .unwrap_or_else(|payload| {
                    let reason = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "fetch worker panicked".to_string());
                    Err(PixsearchError::Network(reason))
                });
            // The browser may already be gone; nothing left to notify.
            let _ = tx.send(Completion { request, response });
        });
    }

    fn on_completion(&mut self, completion: Completion) -> Result<()> {
        let outcome = self
            .session
            .complete_fetch(&completion.request, completion.response);

        if !matches!(outcome, Ok(FetchOutcome::Stale)) {
            if let Some(progress) = self.progress.take() {
                if matches!(outcome, Ok(FetchOutcome::Appended { .. })) {
                    progress.update(ProgressPhase::Displaying);
                }
                progress.finish();
            }
        }

        match outcome {
            Ok(FetchOutcome::Appended {
                new, first_index, ..
            }) => {
                for (offset, image) in new.iter().enumerate() {
                    self.print_row(first_index + offset, image)?;
                }
                if self.session.can_load_more() {
                    writeln!(
                        self.out,
                        "{}",
                        format!("{} images - 'more' to load more", self.session.len()).dimmed()
                    )?;
                }
            }
            Ok(FetchOutcome::Exhausted) => {
                info!("Query exhausted at {} images", self.session.len());
            }
            Ok(FetchOutcome::Stale) | Ok(FetchOutcome::Skipped) => {}
            Err(e @ PixsearchError::NoResults { .. }) => {
                writeln!(self.out, "{}", e.to_string().yellow())?;
            }
            Err(e) => {
                writeln!(self.out, "{}", e.to_string().red())?;
                if e.is_retryable() {
                    writeln!(self.out, "{}", "Type 'more' to retry.".dimmed())?;
                }
            }
        }
        Ok(())
    }

    fn scroll_by(&mut self, rows: u32) -> Result<()> {
        if self.lightbox.is_open() {
            writeln!(self.out, "{}", "Close the lightbox to scroll.".dimmed())?;
            return Ok(());
        }
        let max_offset = (self.session.len() as u32).saturating_sub(self.page_rows);
        self.offset = self.offset.saturating_add(rows).min(max_offset);
        let viewport = self.viewport();
        if let Some(request) = self.scroll.on_scroll(&viewport, &mut self.session) {
            debug!("Scroll near bottom, loading page {}", request.page());
            self.dispatch(request);
        }
        let start = self.offset as usize;
        let end = (start + self.page_rows as usize).min(self.session.len());
        for index in start..end {
            if let Some(image) = self.session.get(index).cloned() {
                self.print_row(index, &image)?;
            }
        }
        Ok(())
    }

    fn load_failed(&mut self, index: usize) -> Result<()> {
        match self.lightbox.on_load_failure(index, &mut self.session)? {
            LoadFailureOutcome::Fallback { index, source } => {
                writeln!(
                    self.out,
                    "{}",
                    format!("Image {} retrying from {}", index + 1, source).dimmed()
                )?;
            }
            LoadFailureOutcome::Dropped { removed, .. } => {
                writeln!(
                    self.out,
                    "{}",
                    format!("Removed unloadable image {}", removed.identifier).dimmed()
                )?;
            }
        }
        if self.lightbox.is_open() {
            self.show_current()?;
        }
        Ok(())
    }

    /// Renders the displayed image, resolving load failures first.
    fn show_current(&mut self) -> Result<()> {
        if let Some(probe) = &self.probe {
            while let Some(source) = self.lightbox.source().map(str::to_string) {
                match probe.probe(&source) {
                    Ok(()) => break,
                    Err(e) => {
                        debug!("{e}");
                        self.lightbox.on_media_error(&mut self.session)?;
                    }
                }
            }
        }

        match self.lightbox.view(&self.session) {
            Some(view) => self.print_view(&view),
            None => {
                writeln!(self.out, "{}", "No images left to show.".yellow())?;
                Ok(())
            }
        }
    }

    fn copy_current(&mut self) -> Result<()> {
        let url = match self.lightbox.view(&self.session) {
            Some(view) => view.identifier,
            None => {
                writeln!(self.out, "{}", "Open an image to copy its URL.".yellow())?;
                return Ok(());
            }
        };
        let mut clipboard = arboard::Clipboard::new()?;
        clipboard.set_text(url.clone())?;
        writeln!(self.out, "{} {}", "Copied".green(), url)?;
        Ok(())
    }

    fn refresh_filters(&mut self) -> Result<()> {
        let filters = self.prefs.filters();
        writeln!(
            self.out,
            "Filters: size={} time={} safe={} proxy={} (applies to the next search)",
            filters.size, filters.time_range, filters.safe_search, filters.proxy_mode
        )?;
        self.session.set_filters(filters);
        Ok(())
    }

    fn print_row(&mut self, index: usize, image: &ImageResult) -> Result<()> {
        let number = self.accent(&format!("{:>4}.", index + 1));
        if image.title.is_empty() {
            writeln!(self.out, "{} {}", number, image.display_url)?;
        } else {
            writeln!(
                self.out,
                "{} {} {}",
                number,
                image.title,
                image.display_url.dimmed()
            )?;
        }
        Ok(())
    }

    fn print_view(&mut self, view: &LightboxView) -> Result<()> {
        writeln!(self.out, "{}", view.to_string().bold())?;
        Ok(())
    }

    fn print_results(&mut self) -> Result<()> {
        let images = self.session.results().to_vec();
        if images.is_empty() {
            writeln!(self.out, "{}", "No results".dimmed())?;
        }
        for (index, image) in images.iter().enumerate() {
            self.print_row(index, image)?;
        }
        Ok(())
    }

    fn print_banner(&mut self) -> Result<()> {
        let title = self.accent("pixsearch interactive browser").bold();
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "{}", "Type a query to search, 'help' for commands".dimmed())?;
        Ok(())
    }

    fn print_help(&mut self) -> Result<()> {
        writeln!(self.out, "\n{}", "Available commands:".green().bold())?;
        let entries = [
            ("search <query>", "Start a new search (or just type the query)"),
            ("more", "Load the next page"),
            ("scroll [rows]", "Scroll down; loads more near the end"),
            ("top", "Scroll back to the first result"),
            ("list", "Show all results"),
            ("open <number>", "View an image in the lightbox"),
            ("next / prev", "Step through images (wraps around)"),
            ("close", "Close the lightbox"),
            ("outside", "Click outside the image (closes the lightbox)"),
            ("broken [number]", "Report an image that failed to load"),
            ("copy", "Copy the displayed image URL"),
            ("share", "Print a shareable URL for this search"),
            ("history", "Show recent searches"),
            ("theme", "Toggle light/dark theme"),
            ("size|time <value>", "Change image size or time range filter"),
            ("safe|proxy on|off", "Toggle safe search or proxy mode"),
            ("quit", "Quit"),
        ];
        for (command, description) in entries {
            writeln!(self.out, "  {} - {}", command.yellow(), description)?;
        }
        Ok(())
    }
}

/// Spawns a thread forwarding stdin lines into a channel.
pub fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.trim_end().to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}
