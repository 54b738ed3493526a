use scraper::{ElementRef, Html, Selector};
use tokio::task::spawn_blocking;

use crate::model::{ReviewDetails, StudentReview};
use crate::{warn_time, Error, Result};

/// `div.column` blocks before the first review: course header, description etc.
const LEADING_BLOCKS: usize = 6;
/// `div.column` blocks after the last review: footer and the review form.
const TRAILING_BLOCKS: usize = 4;
/// Every review is 4 columns wide, the last one is the "review written <date>" stamp.
const BLOCKS_PER_REVIEW: usize = 4;
const MAX_STARS: usize = 5;

/// Everything scraped from one course page.
#[derive(Debug)]
pub struct ParsedCourse {
    pub course_id: String,
    pub reviews: Vec<StudentReview>,
    /// `MalformedReviewBlock` errors for the reviews that had to be dropped.
    pub skipped: Vec<Error>,
}

/// Parses a course page on the blocking pool, `Html` isn't `Send`.
pub async fn parse_page(html: String) -> Result<ParsedCourse> {
    spawn_blocking(move || parse_course_page(&html)).await?
}

struct Selectors {
    course_header: Selector,
    column: Selector,
    comment: Selector,
    misc_field: Selector,
    misc_span: Selector,
    span: Selector,
    any_star: Selector,
    filled_star: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            course_header: create_selector(r#"h2.subtitle"#)?,
            column: create_selector(r#"div.column"#)?,
            comment: create_selector(r#"p.subtitle"#)?,
            misc_field: create_selector(r#"p"#)?,
            misc_span: create_selector(r#"p span"#)?,
            span: create_selector(r#"span"#)?,
            any_star: create_selector(r#"i[class*="fa-star"]"#)?,
            filled_star: create_selector(r#"i[class="fa fa-star"]"#)?,
        })
    }
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::InvalidSelector(sel_str.into()))
}

/// Parses a whole course page: the course id from the header and one review per review group.
pub fn parse_course_page(html: &str) -> Result<ParsedCourse> {
    let doc = Html::parse_document(html);
    let sel = Selectors::new()?;

    let header = doc
        .select(&sel.course_header)
        .next()
        .ok_or_else(|| Error::MissingElement("h2.subtitle (course header)".into()))?;
    let course_id = course_id_from_header(&header.text().collect::<String>());

    let blocks = trim_review_blocks(doc.select(&sel.column).collect());
    if blocks.is_empty() {
        return Ok(ParsedCourse {
            reviews: vec![StudentReview::placeholder(course_id.clone())],
            course_id,
            skipped: Vec::new(),
        });
    }

    let mut reviews = Vec::with_capacity(blocks.len() / 3);
    let mut skipped = Vec::new();
    for (index, group) in group_blocks(&sel, &course_id, blocks).into_iter().enumerate() {
        match build_review(&sel, &course_id, index, group) {
            Ok(review) => reviews.push(review),
            Err(err) => {
                warn_time!("skipping review: {}", err);
                skipped.push(err);
            }
        }
    }

    Ok(ParsedCourse {
        course_id,
        reviews,
        skipped,
    })
}

/// "Course reviews CSCI051 PO" -> "CSCI051 PO". The first two words are page chrome.
pub fn course_id_from_header(header: &str) -> String {
    header
        .split_whitespace()
        .skip(2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops the page chrome around the reviews and the date stamp closing every review.
pub fn trim_review_blocks<T>(blocks: Vec<T>) -> Vec<T> {
    if blocks.len() <= LEADING_BLOCKS + TRAILING_BLOCKS {
        return Vec::new();
    }
    let end = blocks.len() - TRAILING_BLOCKS;
    blocks
        .into_iter()
        .take(end)
        .skip(LEADING_BLOCKS)
        .enumerate()
        .filter(|(i, _)| i % BLOCKS_PER_REVIEW != BLOCKS_PER_REVIEW - 1)
        .map(|(_, block)| block)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Rating,
    Comment,
    Misc,
    Unknown,
}

fn classify(sel: &Selectors, block: &ElementRef) -> BlockKind {
    if block.select(&sel.comment).next().is_some() {
        BlockKind::Comment
    } else if block.select(&sel.misc_span).next().is_some() {
        BlockKind::Misc
    } else if block.select(&sel.any_star).next().is_some() {
        BlockKind::Rating
    } else {
        BlockKind::Unknown
    }
}

/// The blocks making up a single review. Any slot may be missing on a broken page.
#[derive(Default)]
struct ReviewGroup<'a> {
    rating: Option<ElementRef<'a>>,
    comment: Option<ElementRef<'a>>,
    misc: Option<ElementRef<'a>>,
}

impl ReviewGroup<'_> {
    fn is_empty(&self) -> bool {
        self.rating.is_none() && self.comment.is_none() && self.misc.is_none()
    }
}

/// Groups classified blocks by proximity. Reviews are laid out rating, comment, misc;
/// a block that can't go into the current group starts the next one.
fn group_blocks<'a>(
    sel: &Selectors,
    course_id: &str,
    blocks: Vec<ElementRef<'a>>,
) -> Vec<ReviewGroup<'a>> {
    let mut groups = Vec::with_capacity(blocks.len() / 3);
    let mut current = ReviewGroup::default();

    for (pos, block) in blocks.into_iter().enumerate() {
        let kind = classify(sel, &block);
        let starts_new = match kind {
            BlockKind::Rating => !current.is_empty(),
            BlockKind::Comment => current.comment.is_some() || current.misc.is_some(),
            BlockKind::Misc => current.misc.is_some(),
            BlockKind::Unknown => {
                warn_time!("{}: ignoring unrecognised block at position {}", course_id, pos);
                continue;
            }
        };
        if starts_new {
            groups.push(std::mem::take(&mut current));
        }
        match kind {
            BlockKind::Rating => current.rating = Some(block),
            BlockKind::Comment => current.comment = Some(block),
            BlockKind::Misc => current.misc = Some(block),
            BlockKind::Unknown => {}
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn build_review(
    sel: &Selectors,
    course_id: &str,
    index: usize,
    group: ReviewGroup,
) -> Result<StudentReview> {
    let malformed = |reason: &str| Error::MalformedReviewBlock {
        course: course_id.to_string(),
        index,
        reason: reason.to_string(),
    };

    let rating_block = group
        .rating
        .ok_or_else(|| malformed("rating block has no star markers"))?;
    let comment_block = group.comment.ok_or_else(|| malformed("missing comment block"))?;
    let misc_block = group.misc.ok_or_else(|| malformed("missing hours/challenge/inclusivity block"))?;

    let comment = comment_block
        .select(&sel.comment)
        .next()
        .map(|p| collapse_whitespace(&p.text().collect::<String>()))
        .ok_or_else(|| malformed("missing comment text"))?;

    let fields: Vec<ElementRef> = misc_block.select(&sel.misc_field).collect();
    let [hours_field, challenge_field, inclusivity_field, ..] = fields.as_slice() else {
        return Err(malformed(&format!(
            "expected 3 misc sub-fields, found {}",
            fields.len()
        )));
    };

    let hours_text = hours_field
        .select(&sel.span)
        .next()
        .map(|span| span.text().collect::<String>())
        .unwrap_or_else(|| hours_field.text().collect());
    let hours_per_week = parse_hours(&hours_text)
        .ok_or_else(|| malformed(&format!("hours '{}' is not a number", hours_text.trim())))?;

    Ok(StudentReview::new(
        course_id,
        ReviewDetails {
            rating: count_stars(sel, &rating_block),
            comment,
            hours_per_week,
            challenge: count_stars(sel, challenge_field),
            inclusivity: count_stars(sel, inclusivity_field),
        },
    ))
}

/// Number of filled stars inside an element, at most 5.
fn count_stars(sel: &Selectors, element: &ElementRef) -> u8 {
    element.select(&sel.filled_star).take(MAX_STARS).count() as u8
}

/// "3.5 hours/week" -> 3.5
fn parse_hours(text: &str) -> Option<f64> {
    let hours: f64 = text.split_whitespace().next()?.parse().ok()?;
    (hours.is_finite() && hours >= 0.0).then_some(hours)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stars(filled: usize) -> String {
        let mut s = r#"<i class="fa fa-star"></i>"#.repeat(filled);
        s.push_str(&r#"<i class="fa fa-star-o"></i>"#.repeat(MAX_STARS - filled));
        s
    }

    fn review_blocks(rating: usize, comment: &str, hours: &str, chl: usize, inc: usize) -> String {
        format!(
            r#"<div class="column">{}</div>
            <div class="column"><p class="subtitle">{comment}</p></div>
            <div class="column">
                <p>Hours: <span>{hours} hours/week</span></p>
                <p>Challenge: {}</p>
                <p>Inclusivity: {}</p>
            </div>
            <div class="column"><p>Review written 2019-04-02</p></div>"#,
            stars(rating),
            stars(chl),
            stars(inc)
        )
    }

    fn page(reviews: &str) -> String {
        let chrome = r#"<div class="column">chrome</div>"#;
        format!(
            r#"<html><body>
            <h2 class="subtitle">Course reviews CSCI051 PO</h2>
            {lead}
            {reviews}
            {trail}
            </body></html>"#,
            lead = chrome.repeat(LEADING_BLOCKS),
            trail = chrome.repeat(TRAILING_BLOCKS),
        )
    }

    #[test]
    fn page_without_reviews_yields_placeholder() {
        let parsed = parse_course_page(&page("")).unwrap();
        assert_eq!(parsed.course_id, "CSCI051 PO");
        assert_eq!(parsed.reviews.len(), 1);
        assert!(parsed.reviews[0].is_placeholder());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn parses_every_review_field() {
        let body = review_blocks(4, "  Great\n   class,   hard\tpsets ", "3.5", 5, 2)
            + &review_blocks(0, "meh", "10", 1, 0);
        let parsed = parse_course_page(&page(&body)).unwrap();

        assert_eq!(parsed.reviews.len(), 2);
        let first = parsed.reviews[0].details.as_ref().unwrap();
        assert_eq!(first.rating, 4);
        assert_eq!(first.comment, "Great class, hard psets");
        assert_eq!(first.hours_per_week, 3.5);
        assert_eq!(first.challenge, 5);
        assert_eq!(first.inclusivity, 2);

        let second = parsed.reviews[1].details.as_ref().unwrap();
        assert_eq!(second.rating, 0);
        assert_eq!(second.hours_per_week, 10.0);
    }

    #[test]
    fn review_count_is_a_third_of_trimmed_blocks() {
        let body: String = (0..5).map(|i| review_blocks(i, "ok", "2", 1, 1)).collect();
        let parsed = parse_course_page(&page(&body)).unwrap();
        // 5 reviews * 4 columns, minus the 5 date stamps
        assert_eq!(parsed.reviews.len(), 15 / 3);
        for review in &parsed.reviews {
            assert!(review.rating().unwrap() <= 5);
        }
    }

    #[test]
    fn short_misc_block_skips_only_that_review() {
        let broken = format!(
            r#"<div class="column">{}</div>
            <div class="column"><p class="subtitle">broken</p></div>
            <div class="column"><p>Hours: <span>2 hours</span></p><p>{}</p></div>
            <div class="column"><p>Review written</p></div>"#,
            stars(3),
            stars(3)
        );
        let body = review_blocks(5, "first", "1", 1, 1) + &broken + &review_blocks(2, "third", "4", 2, 2);
        let parsed = parse_course_page(&page(&body)).unwrap();

        assert_eq!(parsed.reviews.len(), 2);
        assert_eq!(parsed.reviews[1].comment(), Some("third"));
        assert_eq!(parsed.skipped.len(), 1);
        assert!(matches!(
            &parsed.skipped[0],
            Error::MalformedReviewBlock { course, index: 1, .. } if course == "CSCI051 PO"
        ));
    }

    #[test]
    fn rating_without_stars_is_malformed() {
        let body = r#"<div class="column">no stars here</div>
            <div class="column"><p class="subtitle">lonely</p></div>
            <div class="column"><p><span>1</span></p><p></p><p></p></div>
            <div class="column">date</div>"#;
        let parsed = parse_course_page(&page(body)).unwrap();
        assert!(parsed.reviews.is_empty());
        assert!(matches!(
            &parsed.skipped[0],
            Error::MalformedReviewBlock { reason, .. } if reason.contains("star")
        ));
    }

    #[test]
    fn missing_header_is_an_error() {
        let err = parse_course_page("<html><body></body></html>").unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)));
    }

    #[test]
    fn trimming_drops_chrome_and_every_fourth() {
        let blocks: Vec<usize> = (0..(6 + 8 + 4)).collect();
        assert_eq!(trim_review_blocks(blocks), vec![6, 7, 8, 10, 11, 12]);
        assert!(trim_review_blocks((0..10).collect::<Vec<_>>()).is_empty());
    }

    #[test]
    fn header_drops_first_two_words() {
        assert_eq!(course_id_from_header("  Course reviews  MATH 060 PO "), "MATH 060 PO");
        assert_eq!(course_id_from_header("\n  Course reviews\n   PHYS070 PO\n"), "PHYS070 PO");
    }

    #[test]
    fn hours_must_be_non_negative_numbers() {
        assert_eq!(parse_hours("3.5 hours"), Some(3.5));
        assert_eq!(parse_hours("lots"), None);
        assert_eq!(parse_hours("-2"), None);
    }

    #[tokio::test]
    async fn parses_on_blocking_pool() {
        let parsed = parse_page(page(&review_blocks(3, "x", "1", 1, 1))).await.unwrap();
        assert_eq!(parsed.reviews.len(), 1);
    }
}
