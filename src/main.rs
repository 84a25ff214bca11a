mod dates;
mod db;
mod error;
mod logging;
mod parser;
mod scraper;
mod session;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use indicatif::{ProgressBar, ProgressStyle};

use scraper::SearchFilters;
use session::{Credentials, Session};
use settings::Settings;

#[derive(Parser)]
#[command(name = "mal_scraper", about = "Scrape myanimelist.net user profiles into SQLite")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, walk the user search pages and store every profile found
    Scrape {
        /// Found users' names must contain this
        #[arg(short, long, default_value = "")]
        name: String,
        /// Found users must be older than this (in years)
        #[arg(short, long, default_value_t = 0)]
        older: u32,
        /// Found users must be younger than this (in years)
        #[arg(short, long, default_value_t = 0)]
        younger: u32,
        /// Found users must live here
        #[arg(short, long, default_value = "")]
        location: String,
        /// Gender id (0=irrelevant, 1=male, 2=female, 3=non-binary)
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
        gender: u8,
        /// First search page to scrape (inclusive)
        #[arg(short, long = "from", default_value_t = 1)]
        from: u32,
        /// Last search page to scrape (inclusive)
        #[arg(short, long = "to", default_value_t = 1)]
        to: u32,
        /// SQLite database file
        #[arg(short, long = "database", default_value = "users.db")]
        database: PathBuf,
        /// Account name (prompted if omitted)
        #[arg(short, long)]
        username: Option<String>,
        /// Print every scraped user
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show what the database holds
    Stats {
        /// SQLite database file
        #[arg(short, long = "database", default_value = "users.db")]
        database: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command {
        Commands::Scrape {
            name,
            older,
            younger,
            location,
            gender,
            from,
            to,
            database,
            username,
            verbose,
        } => {
            logging::init(&logging::LogConfig::new(verbose, settings.log_path()))?;
            if from > to {
                bail!("--from ({}) must not be greater than --to ({})", from, to);
            }

            let creds = prompt_credentials(username)?;
            let session = Session::login(&settings, &creds).await?;
            let conn = db::connect(&database)?;
            db::init_schema(&conn)?;

            let filters = SearchFilters {
                name,
                location,
                min_age: older,
                max_age: younger,
                gender,
            };

            let pb = ProgressBar::new(u64::from(to - from + 1));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40} {pos}/{len} pages")?
                    .progress_chars("=> "),
            );

            let stats = scraper::scrape_pages(
                Arc::new(session),
                &filters,
                from..=to,
                &conn,
                verbose,
                |p| {
                    pb.println(format!(
                        "### Done with page {}/{} ({} saved) ###",
                        p.page, p.last_page, p.saved
                    ));
                    pb.inc(1);
                },
            )
            .await?;
            pb.finish_and_clear();

            println!(
                "Done: {} pages, {} profiles found, {} saved ({} fetch errors, {} parse errors).",
                stats.pages, stats.discovered, stats.saved, stats.fetch_errors, stats.extraction_errors
            );
        }
        Commands::Stats { database } => {
            logging::init(&logging::LogConfig::new(false, None))?;
            let conn = db::connect(&database)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Users:          {}", s.users);
            println!("With affinity:  {}", s.with_affinity);
            for (kind, n) in &s.favorites {
                println!("Fav {:<11} {}", format!("{}:", kind.as_str()), n);
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}

fn prompt_credentials(username: Option<String>) -> anyhow::Result<Credentials> {
    let username = match username {
        Some(u) => u,
        None => Input::<String>::new()
            .with_prompt("Your myanimelist.net username")
            .interact_text()
            .context("Failed to read username")?,
    };
    let password = Password::new()
        .with_prompt("Your myanimelist.net password")
        .interact()
        .context("Failed to read password")?;
    Ok(Credentials { username, password })
}
