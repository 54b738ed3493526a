use std::fs::File;
use std::io::BufWriter;
use std::ops::RangeInclusive;
use std::path::Path;

use chrono::Local;
use tokio::task::JoinSet;

use crate::config::{Credentials, FetchConfig};
use crate::model::{CourseReviewIndex, FetchSummary};
use crate::parse::{parse_page, ParsedCourse};
use crate::record::{self, CsvFormat};
use crate::request::{request_block, ReviewSession};
use crate::sentiment::{self, AccuracyDenominator, AnalysisSummary, CorpusLabel, SentimentScorer};
use crate::{info_time, warn_time, Result};

/// Logs in, scrapes every course page in the configured range and writes the reviews to `out`.
pub async fn process_site(
    config: FetchConfig,
    credentials: &Credentials,
    out: &Path,
    format: CsvFormat,
) -> Result<FetchSummary> {
    let start_time = Local::now();
    info_time!(
        "Started scraping pages {}..={}",
        config.first_page,
        config.last_page
    );

    let session = ReviewSession::login(config, credentials).await?;
    let (index, summary) = fetch_reviews(&session).await?;
    info_time!(start_time, "Finished PROCESSING ALL blocks.");

    let local_now = Local::now();
    record::write_index_to_path(out, &index, format)?;
    info_time!(local_now, "Wrote {} courses to file: {}", index.len(), out.display());

    Ok(summary)
}

/// Requests pages a block at a time. While a block is parsed the next one is already being fetched.
pub async fn fetch_reviews(session: &ReviewSession) -> Result<(CourseReviewIndex, FetchSummary)> {
    let config = session.config();
    let mut index = CourseReviewIndex::new();
    let mut summary = FetchSummary::default();

    let mut blocks = page_blocks(config.first_page, config.last_page, config.pages_per_block);
    let mut block_to_process = blocks.next().map(|pages| request_block(session, pages));

    while let Some(current) = block_to_process.take() {
        let start_block_time = Local::now();
        // Spawn the requests for the next block before parsing this one.
        block_to_process = blocks.next().map(|pages| request_block(session, pages));

        let pages = collect_block(current).await?;
        let (first, last) = match (pages.first(), pages.last()) {
            (Some((first, _)), Some((last, _))) => (*first, *last),
            _ => continue,
        };

        for (page_num, html) in pages {
            let parsed = match html {
                Ok(html) => parse_page(html).await,
                Err(err) => Err(err),
            };
            match parsed {
                Ok(parsed) => apply_page(&mut index, &mut summary, parsed),
                Err(err) if err.is_skippable() => {
                    warn_time!("skipping page {}: {}", page_num, err);
                    summary.failed_pages.push((page_num, err));
                }
                Err(err) => return Err(err),
            }
        }
        info_time!(start_block_time, "Processed pages {}..={}", first, last);
    }

    summary.placeholders = index.placeholder_count();
    summary.reviews = index.reviews().filter(|r| !r.is_placeholder()).count();
    Ok((index, summary))
}

fn apply_page(index: &mut CourseReviewIndex, summary: &mut FetchSummary, parsed: ParsedCourse) {
    summary.pages_fetched += 1;
    summary.skipped_reviews.extend(parsed.skipped);
    index.insert(parsed.course_id, parsed.reviews);
}

/// Awaits every request of a block and orders the pages by number.
async fn collect_block(
    mut block: JoinSet<(usize, Result<String>)>,
) -> Result<Vec<(usize, Result<String>)>> {
    let mut pages = Vec::with_capacity(block.len());
    while let Some(task) = block.join_next().await {
        pages.push(task?);
    }
    pages.sort_unstable_by_key(|(page_num, _)| *page_num);
    Ok(pages)
}

/// Splits `first..=last` into consecutive ranges of at most `per_block` pages.
fn page_blocks(
    first: usize,
    last: usize,
    per_block: usize,
) -> impl Iterator<Item = RangeInclusive<usize>> {
    let per_block = per_block.max(1);
    (first..=last)
        .step_by(per_block)
        .map(move |start| start..=last.min(start + per_block - 1))
}

/// Options of an analyzer run.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub format: Option<CsvFormat>,
    pub start_index: usize,
    pub denominator: AccuracyDenominator,
}

/// Scores a review file, writes the analysis file and optionally the per-word scores.
pub fn analyze_file(
    input: &Path,
    out: &Path,
    words_out: Option<&Path>,
    options: &AnalyzeOptions,
    scorer: &dyn SentimentScorer,
) -> Result<()> {
    let start_time = Local::now();
    let set = record::read_rows_from_path(input, options.format)?;
    info_time!("Read {} rows from {}", set.rows.len(), input.display());

    let eval = sentiment::evaluate(&set.rows, scorer);
    sentiment::write_analysis(BufWriter::new(File::create(out)?), &eval, options.start_index)?;
    if let Some(words_out) = words_out {
        sentiment::write_word_scores(BufWriter::new(File::create(words_out)?), &eval)?;
        info_time!("Wrote {} word scores to {}", eval.word_scores.len(), words_out.display());
    }
    info_time!(start_time, "Finished analyzing. Wrote to file: {}", out.display());

    print!(
        "{}",
        AnalysisSummary {
            eval: &eval,
            denominator: options.denominator,
            dropped_rows: set.dropped.len(),
        }
    );
    Ok(())
}

/// Writes the `label\tcomment` training corpus. Returns the number of lines written.
pub fn preprocess_file(
    input: &Path,
    out: &Path,
    format: Option<CsvFormat>,
    label: CorpusLabel,
) -> Result<usize> {
    let set = record::read_rows_from_path(input, format)?;
    let written = sentiment::write_corpus(BufWriter::new(File::create(out)?), &set.rows, label)?;
    info_time!(
        "Wrote {} corpus lines to {} ({} malformed rows dropped)",
        written,
        out.display(),
        set.dropped.len()
    );
    Ok(written)
}
