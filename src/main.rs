use std::path::PathBuf;
use std::time::Duration;

use aspc_reviews::config::{Credentials, FetchConfig, RetryPolicy};
use aspc_reviews::process::{analyze_file, preprocess_file, process_site, AnalyzeOptions};
use aspc_reviews::record::{CsvFormat, FormatChoice};
use aspc_reviews::sentiment::{AccuracyDenominator, CorpusLabel, VaderScorer};
use aspc_reviews::{
    info_time, Result, ANALYSIS_FILE, BACKOFF_MS, BASE_URL, FIRST_PAGE, LAST_PAGE, LOGIN_URL,
    MAX_ATTEMPTS, PAGES_PER_BLOCK, REQUEST_TIMEOUT_SECS, REVIEWS_FILE,
};
use chrono::Local;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aspc-reviews")]
#[command(about = "Scrapes ASPC course reviews and scores their sentiment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and scrape every course page into a review file
    Fetch {
        #[arg(long, default_value = REVIEWS_FILE)]
        out: PathBuf,
        #[arg(long, default_value = "tab")]
        format: CsvFormat,
        #[arg(long, default_value_t = FIRST_PAGE)]
        first_page: usize,
        #[arg(long, default_value_t = LAST_PAGE)]
        last_page: usize,
        #[arg(long, default_value_t = PAGES_PER_BLOCK)]
        pages_per_block: usize,
        #[arg(long, default_value_t = MAX_ATTEMPTS)]
        max_attempts: u32,
        #[arg(long, default_value_t = BACKOFF_MS)]
        backoff_ms: u64,
        #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
        timeout_secs: u64,
        #[arg(long, default_value = BASE_URL)]
        base_url: String,
        #[arg(long, default_value = LOGIN_URL)]
        login_url: String,
    },
    /// Score the comments of a review file against their ratings
    Analyze {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = ANALYSIS_FILE)]
        out: PathBuf,
        /// auto, tab or comma. auto guesses from the header line
        #[arg(long, default_value = "auto")]
        format: FormatChoice,
        #[arg(long, default_value_t = 1)]
        start_index: usize,
        /// Divide matches by the final review number, like the old reports did
        #[arg(long)]
        legacy_accuracy: bool,
        /// Also write every word's own score here
        #[arg(long)]
        words: Option<PathBuf>,
    },
    /// Write a label<TAB>comment training corpus from a review file
    Preprocess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// auto, tab or comma
        #[arg(long, default_value = "auto")]
        format: FormatChoice,
        /// Label lines with the star rating instead of -1/0/1
        #[arg(long)]
        raw_rating: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            out,
            format,
            first_page,
            last_page,
            pages_per_block,
            max_attempts,
            backoff_ms,
            timeout_secs,
            base_url,
            login_url,
        } => {
            let credentials = Credentials::from_env()?;
            let config = FetchConfig {
                base_url,
                login_url,
                first_page,
                last_page,
                pages_per_block,
                retry: RetryPolicy {
                    max_attempts,
                    backoff: Duration::from_millis(backoff_ms),
                },
                timeout: Duration::from_secs(timeout_secs),
            };
            let summary = process_site(config, &credentials, &out, format).await?;
            print!("{summary}");
        }
        Commands::Analyze {
            input,
            out,
            format,
            start_index,
            legacy_accuracy,
            words,
        } => {
            let denominator = if legacy_accuracy {
                AccuracyDenominator::LegacyCounter { start_index }
            } else {
                AccuracyDenominator::RowsProcessed
            };
            let options = AnalyzeOptions {
                format: format.fixed(),
                start_index,
                denominator,
            };
            analyze_file(&input, &out, words.as_deref(), &options, &VaderScorer)?;
        }
        Commands::Preprocess {
            input,
            out,
            format,
            raw_rating,
        } => {
            let label = if raw_rating {
                CorpusLabel::RawRating
            } else {
                CorpusLabel::Class
            };
            preprocess_file(&input, &out, format.fixed(), label)?;
        }
    }

    info_time!(start_time, "Full program time:");
    Ok(())
}
