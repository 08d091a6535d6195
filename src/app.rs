//! Main application structure and command handling
use crate::browse::{stdin_lines, Browser, BrowserOptions};
use crate::cli::{Cli, Commands, FilterArgs, PrefsAction};
use crate::config::Config;
use crate::error::{PixsearchError, Result};
use crate::fetcher::{HttpFetcher, ImageResult, ResultFetcher};
use crate::media::HttpMediaProbe;
use crate::preferences::{FilePreferenceStore, PreferenceStore, Preferences};
use crate::progress::{ProgressIndicator, ProgressPhase};
use crate::query::{self, SearchFilters};
use crate::session::{FetchOutcome, SearchSession};
use clap::CommandFactory;
use colored::*;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Runs a search to completion, loading up to `pages` pages.
///
/// Stops early once the query is exhausted. Returns the number of results.
pub fn run_search(
    session: &mut SearchSession,
    fetcher: &dyn ResultFetcher,
    text: &str,
    pages: u32,
    progress: &ProgressIndicator,
) -> Result<usize> {
    progress.update(ProgressPhase::Init);
    let request = session.start_search(text)?;
    progress.update(ProgressPhase::Searching);
    let response = fetcher.fetch(&request.query);
    session.complete_fetch(&request, response)?;
    progress.update(ProgressPhase::Displaying);

    for _ in 1..pages {
        match session.fetch_next_page(fetcher)? {
            FetchOutcome::Appended { .. } => {}
            FetchOutcome::Exhausted | FetchOutcome::Skipped | FetchOutcome::Stale => break,
        }
    }
    Ok(session.len())
}

#[derive(Serialize)]
struct JsonImage<'a> {
    identifier: &'a str,
    display_url: &'a str,
    title: &'a str,
}

pub struct PixsearchApp {
    config: Config,
    prefs_path: PathBuf,
}

impl PixsearchApp {
    pub fn new(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::load_from(path)
                .map_err(|e| PixsearchError::Config(format!("{e:#}")))?,
            None => Config::load().unwrap_or_else(|e| {
                warn!("Ignoring unreadable config: {e:#}");
                Config::default()
            }),
        };
        if let Some(endpoint) = &cli.endpoint {
            config.endpoint.base_url = endpoint.clone();
        }

        let prefs_path = cli
            .prefs
            .clone()
            .or_else(|| config.preferences.path.clone())
            .unwrap_or_else(FilePreferenceStore::default_path);

        Ok(Self { config, prefs_path })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn preferences(&self) -> Result<Preferences<FilePreferenceStore>> {
        Ok(Preferences::new(FilePreferenceStore::open(&self.prefs_path)?))
    }

    /// Run the application with the given command
    pub fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Search {
                query,
                pages,
                json,
                filters,
            } => self.handle_search(&query.join(" "), pages, json, &filters),
            Commands::Browse {
                url,
                query,
                no_probe,
                filters,
            } => self.handle_browse(url, query, no_probe, &filters),
            Commands::OpenUrl { url, pages, json } => {
                let text = query::query_from_url(&url)?.ok_or_else(|| {
                    PixsearchError::ShareUrl(format!(
                        "{url} has no '{}' parameter",
                        query::QUERY_PARAM
                    ))
                })?;
                self.handle_search(&text, pages, json, &FilterArgs::default())
            }
            Commands::Share { query } => {
                let text = query.join(" ");
                let text = text.trim();
                if text.is_empty() {
                    return Err(PixsearchError::Validation);
                }
                println!("{}", query::share_url(&self.config.endpoint.base_url, text));
                Ok(())
            }
            Commands::Prefs { action } => self.handle_prefs(action),
            Commands::History { clear } => self.handle_history(clear),
            Commands::ConfigInit { path, force } => self.handle_config_init(path, force),
            Commands::Completions { shell } => {
                let mut cmd = Cli::command();
                clap_complete::generate(shell, &mut cmd, "pixsearch", &mut std::io::stdout());
                Ok(())
            }
        }
    }

    fn resolve_filters<S: PreferenceStore>(
        prefs: &mut Preferences<S>,
        args: &FilterArgs,
    ) -> Result<SearchFilters> {
        let saved = prefs.filters();
        let filters = SearchFilters {
            size: args.size.unwrap_or(saved.size),
            time_range: args.time_range.unwrap_or(saved.time_range),
            safe_search: args.safe_search.unwrap_or(saved.safe_search),
            proxy_mode: args.proxy.unwrap_or(saved.proxy_mode),
        };
        if args.save {
            prefs.save_filters(&filters)?;
        }
        Ok(filters)
    }

    fn handle_search(&self, text: &str, pages: u32, json: bool, args: &FilterArgs) -> Result<()> {
        let mut prefs = self.preferences()?;
        let filters = Self::resolve_filters(&mut prefs, args)?;
        let fetcher = HttpFetcher::new(&self.config.endpoint)?;
        let mut session = SearchSession::new(filters);

        let progress = if json {
            ProgressIndicator::hidden()
        } else {
            ProgressIndicator::new()
        };
        let result = run_search(&mut session, &fetcher, text, pages.max(1), &progress);
        progress.finish();

        if session.is_active() {
            if let Err(e) = prefs.record_search(text) {
                warn!("Could not save search history: {e}");
            }
        }

        let count = result?;
        info!("Search '{}' produced {count} results", text.trim());
        print_results(session.results(), json)?;
        if !json {
            if let Some(url) = session.share_url(&self.config.endpoint.base_url) {
                println!("\n{} {}", "Share:".dimmed(), url.dimmed());
            }
        }
        Ok(())
    }

    fn handle_browse(
        &self,
        url: Option<String>,
        query: Option<String>,
        no_probe: bool,
        args: &FilterArgs,
    ) -> Result<()> {
        let mut prefs = self.preferences()?;
        let filters = Self::resolve_filters(&mut prefs, args)?;
        let fetcher: Arc<dyn ResultFetcher> = Arc::new(HttpFetcher::new(&self.config.endpoint)?);

        let options = BrowserOptions {
            base_url: self.config.endpoint.base_url.clone(),
            scroll_threshold: self.config.browse.scroll_threshold,
            page_rows: self.config.browse.page_rows,
            show_progress: true,
        };
        let mut browser = Browser::new(prefs, fetcher, options, std::io::stdout());
        browser.set_filters(filters);
        if !no_probe {
            let probe = HttpMediaProbe::new(&self.config.endpoint, &self.config.media)?;
            browser = browser.with_probe(Box::new(probe));
        }

        let initial = match url {
            Some(url) => query::query_from_url(&url)?,
            None => query,
        };
        if let Some(text) = initial {
            browser.start_search(&text)?;
        }

        browser.run(stdin_lines())
    }

    fn handle_prefs(&self, action: PrefsAction) -> Result<()> {
        let mut prefs = self.preferences()?;
        match action {
            PrefsAction::Get { key } => match prefs.get(&key) {
                Some(value) => println!("{value}"),
                None => println!("{}", "(unset)".dimmed()),
            },
            PrefsAction::Set { key, value } => {
                prefs.set(&key, &value)?;
                println!("{} {} = {}", "Saved".green(), key.cyan(), value);
            }
            PrefsAction::List => {
                for (key, value) in prefs.store().entries() {
                    println!("{} = {}", key.cyan(), value);
                }
            }
        }
        Ok(())
    }

    fn handle_config_init(&self, path: Option<PathBuf>, force: bool) -> Result<()> {
        let path = path.unwrap_or_else(Config::default_path);
        if path.exists() && !force {
            return Err(PixsearchError::Config(format!(
                "{} already exists (use --force to replace it)",
                path.display()
            )));
        }
        self.config
            .save(&path)
            .map_err(|e| PixsearchError::Config(format!("{e:#}")))?;
        info!("Wrote configuration to {}", path.display());
        println!("{} {}", "Wrote".green(), path.display());
        Ok(())
    }

    fn handle_history(&self, clear: bool) -> Result<()> {
        let mut prefs = self.preferences()?;
        if clear {
            prefs.clear_history()?;
            println!("{}", "History cleared".green());
            return Ok(());
        }
        let history = prefs.history();
        if history.is_empty() {
            println!("{}", "No searches yet".dimmed());
        }
        for (i, query) in history.iter().enumerate() {
            println!("  {}: {}", i + 1, query);
        }
        Ok(())
    }
}

fn print_results(images: &[ImageResult], json: bool) -> Result<()> {
    if json {
        let rows: Vec<_> = images
            .iter()
            .map(|image| JsonImage {
                identifier: &image.identifier,
                display_url: &image.display_url,
                title: &image.title,
            })
            .collect();
        let out = serde_json::to_string_pretty(&rows)
            .map_err(|e| PixsearchError::Other(e.to_string()))?;
        println!("{out}");
        return Ok(());
    }

    println!("{} {} {}", "Found".green(), images.len(), "images:".green());
    for (index, image) in images.iter().enumerate() {
        let number = format!("{:>4}.", index + 1).cyan();
        if image.title.is_empty() {
            println!("{} {}", number, image.display_url);
        } else {
            println!("{} {} {}", number, image.title, image.display_url.dimmed());
        }
    }
    Ok(())
}
