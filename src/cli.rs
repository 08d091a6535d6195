use crate::query::{ImageSize, TimeRange};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the search backend (overrides the config file)
    #[clap(long, value_parser, global = true)]
    pub endpoint: Option<String>,

    /// Config file to use instead of the default search locations
    #[clap(long, value_parser, global = true)]
    pub config: Option<PathBuf>,

    /// Preference file (defaults to the user config directory)
    #[clap(long, value_parser, global = true)]
    pub prefs: Option<PathBuf>,

    #[clap(long, value_parser, default_value_t = false, global = true)]
    pub verbose: bool,

    #[clap(long, value_parser, global = true)]
    pub log: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Filter overrides; unset flags fall back to saved preferences.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[clap(long, value_enum)]
    pub size: Option<ImageSize>,

    #[clap(long = "time", value_enum)]
    pub time_range: Option<TimeRange>,

    #[clap(long)]
    pub safe_search: Option<bool>,

    #[clap(long)]
    pub proxy: Option<bool>,

    /// Also store the given filters as the new defaults
    #[clap(long, default_value_t = false)]
    pub save: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a search and print the results
    Search {
        #[clap(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of pages to load
        #[clap(long, default_value_t = 1)]
        pages: u32,

        #[clap(long, default_value_t = false)]
        json: bool,

        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Browse results interactively with infinite scroll and a lightbox
    Browse {
        /// Shareable URL whose query starts the session
        #[clap(long)]
        url: Option<String>,

        /// Initial query
        #[clap(long)]
        query: Option<String>,

        /// Skip checking that images load before showing them
        #[clap(long, default_value_t = false)]
        no_probe: bool,

        #[clap(flatten)]
        filters: FilterArgs,
    },
    /// Re-run the search encoded in a shareable URL
    OpenUrl {
        url: String,

        #[clap(long, default_value_t = 1)]
        pages: u32,

        #[clap(long, default_value_t = false)]
        json: bool,
    },
    /// Print the shareable URL for a query
    Share {
        #[clap(required = true, num_args = 1..)]
        query: Vec<String>,
    },
    /// Read or write preferences
    Prefs {
        #[clap(subcommand)]
        action: PrefsAction,
    },
    /// Show recent searches
    History {
        #[clap(long, default_value_t = false)]
        clear: bool,
    },
    /// Write the effective configuration (defaults plus overrides) to a file
    ConfigInit {
        /// Target file (defaults to the user config directory)
        #[clap(long)]
        path: Option<PathBuf>,

        /// Replace an existing file
        #[clap(long, default_value_t = false)]
        force: bool,
    },
    Completions {
        #[clap(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsAction {
    Get { key: String },
    Set { key: String, value: String },
    List,
}
