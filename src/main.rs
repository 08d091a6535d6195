use colored::*;
use env_logger::{Builder, Env, Target};
use log::info;
use pixsearch::{Cli, Parser, PixsearchApp, PixsearchError, Result as PixsearchResult};
use std::fs;
use std::process::ExitCode;
use std::time::Instant;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = setup_logging(&cli) {
        eprintln!("{}", format!("Failed to set up logging: {e}").red());
        return ExitCode::FAILURE;
    }

    let start_time = Instant::now();
    info!("Application started with command: {:?}", cli.command);

    let result = PixsearchApp::new(&cli).and_then(|app| app.run(cli.command));

    info!(
        "Application finished. Total elapsed time: {:.2?}",
        start_time.elapsed()
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ PixsearchError::NoResults { .. }) => {
            eprintln!("{}", e.to_string().yellow());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            if e.is_retryable() {
                eprintln!("{}", "Please try again.".dimmed());
            }
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(cli: &Cli) -> PixsearchResult<()> {
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_filter));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir)?;
            }
        }
        let log_file = fs::File::create(log_path)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| PixsearchError::Other(e.to_string()))?;
    Ok(())
}
