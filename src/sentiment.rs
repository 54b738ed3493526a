//! Scores review comments and checks how well the sentiment predicts the star rating.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::OnceLock;

use regex::Regex;

use crate::record::ReviewRow;
use crate::Result;

/// Compound scores at or above this are positive.
const POSITIVE_THRESHOLD: f64 = 0.05;
/// Compound scores below this are negative.
const NEGATIVE_THRESHOLD: f64 = -0.05;
/// Ratings below this are negative, above it positive.
const NEUTRAL_RATING: u8 = 3;

/// Anything that turns text into a compound polarity score in [-1, 1].
pub trait SentimentScorer {
    fn compound(&self, text: &str) -> f64;
}

/// The VADER lexicon scorer.
#[derive(Debug, Default, Clone, Copy)]
pub struct VaderScorer;

impl SentimentScorer for VaderScorer {
    fn compound(&self, text: &str) -> f64 {
        let analyzer = vader_sentiment::SentimentIntensityAnalyzer::new();
        let scores = analyzer.polarity_scores(text);
        scores.get("compound").copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SentimentClass {
    Negative,
    Neutral,
    Positive,
}

impl SentimentClass {
    pub fn from_compound(compound: f64) -> Self {
        if compound >= POSITIVE_THRESHOLD {
            SentimentClass::Positive
        } else if compound >= NEGATIVE_THRESHOLD {
            SentimentClass::Neutral
        } else {
            SentimentClass::Negative
        }
    }

    pub fn from_rating(rating: u8) -> Self {
        match rating.cmp(&NEUTRAL_RATING) {
            std::cmp::Ordering::Less => SentimentClass::Negative,
            std::cmp::Ordering::Equal => SentimentClass::Neutral,
            std::cmp::Ordering::Greater => SentimentClass::Positive,
        }
    }

    pub fn as_i8(self) -> i8 {
        match self {
            SentimentClass::Negative => -1,
            SentimentClass::Neutral => 0,
            SentimentClass::Positive => 1,
        }
    }

    fn slot(self) -> usize {
        (self.as_i8() + 1) as usize
    }
}

impl fmt::Display for SentimentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// A comment tagged with the class of the rating that came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledComment {
    pub rating_class: SentimentClass,
    pub comment: String,
    /// The star rating the class was derived from.
    pub rating: u8,
}

/// Removes apostrophes and replaces every run of non-word characters with a single space.
/// `"don't-stop"` becomes `"dont stop"`.
pub fn add_space(text: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"\W+").expect("valid non-word regex"));

    let stripped = text.replace(['\'', '\u{2019}'], "");
    non_word
        .split(&stripped)
        .filter(|token| !token.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rows that carry both a comment and a rating.
fn scorable(row: &ReviewRow) -> Option<(&str, u8)> {
    Some((row.comment.as_deref()?, row.rating?))
}

pub fn labeled_comments(rows: &[ReviewRow]) -> Vec<LabeledComment> {
    rows.iter()
        .filter_map(scorable)
        .map(|(comment, rating)| LabeledComment {
            rating_class: SentimentClass::from_rating(rating),
            comment: comment.to_string(),
            rating,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredReview {
    pub course_id: String,
    pub rating: u8,
    pub compound: f64,
    pub label: SentimentClass,
    pub prediction: SentimentClass,
}

/// Which count the number of matches is divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyDenominator {
    RowsProcessed,
    /// The review-number counter after the last row, `start_index + rows processed`.
    /// Only for comparing against reports made that way.
    LegacyCounter { start_index: usize },
}

#[derive(Debug, Default)]
pub struct Evaluation {
    pub scored: Vec<ScoredReview>,
    /// Rows without a comment or rating.
    pub filtered: usize,
    pub matches: usize,
    /// `confusion[label][prediction]`, negative, neutral, positive.
    pub confusion: [[usize; 3]; 3],
    /// Every word seen in a scored comment, scored on its own.
    pub word_scores: BTreeMap<String, f64>,
}

impl Evaluation {
    pub fn rows_processed(&self) -> usize {
        self.scored.len()
    }

    pub fn accuracy(&self, denominator: AccuracyDenominator) -> Option<f64> {
        let total = match denominator {
            AccuracyDenominator::RowsProcessed => self.rows_processed(),
            AccuracyDenominator::LegacyCounter { start_index } => start_index + self.rows_processed(),
        };
        (total > 0).then(|| self.matches as f64 / total as f64)
    }

    /// Pearson correlation between compound score and star rating.
    pub fn correlation(&self) -> Option<f64> {
        let n = self.scored.len();
        if n < 2 {
            return None;
        }
        let n_f = n as f64;
        let mean_x = self.scored.iter().map(|s| s.compound).sum::<f64>() / n_f;
        let mean_y = self.scored.iter().map(|s| f64::from(s.rating)).sum::<f64>() / n_f;

        let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
        for s in &self.scored {
            let dx = s.compound - mean_x;
            let dy = f64::from(s.rating) - mean_y;
            cov += dx * dy;
            var_x += dx * dx;
            var_y += dy * dy;
        }
        if var_x == 0.0 || var_y == 0.0 {
            return None;
        }
        Some(cov / (var_x.sqrt() * var_y.sqrt()))
    }
}

/// Scores every row with a comment and a rating and compares the sentiment class to the rating class.
pub fn evaluate<S: SentimentScorer + ?Sized>(rows: &[ReviewRow], scorer: &S) -> Evaluation {
    let mut eval = Evaluation::default();

    for row in rows {
        let Some((comment, rating)) = scorable(row) else {
            eval.filtered += 1;
            continue;
        };

        let compound = scorer.compound(comment);
        let label = SentimentClass::from_rating(rating);
        let prediction = SentimentClass::from_compound(compound);
        if label == prediction {
            eval.matches += 1;
        }
        eval.confusion[label.slot()][prediction.slot()] += 1;

        for word in add_space(comment).split(' ').filter(|w| !w.is_empty()) {
            let word = word.to_lowercase();
            if !eval.word_scores.contains_key(&word) {
                let score = scorer.compound(&word);
                eval.word_scores.insert(word, score);
            }
        }

        eval.scored.push(ScoredReview {
            course_id: row.course_id.clone(),
            rating,
            compound,
            label,
            prediction,
        });
    }
    eval
}

/// `Review Number, Class ID, Comment Sentiment Score, Rating`, numbering from `start_index`.
pub fn write_analysis<W: Write>(mut out: W, eval: &Evaluation, start_index: usize) -> Result<()> {
    writeln!(out, "Review Number, Class ID, Comment Sentiment Score, Rating")?;
    for (n, scored) in (start_index..).zip(&eval.scored) {
        writeln!(out, "{n}, {}, {}, {}", scored.course_id, scored.compound, scored.rating)?;
    }
    out.flush()?;
    Ok(())
}

/// One `word\tscore` line per word, alphabetical.
pub fn write_word_scores<W: Write>(mut out: W, eval: &Evaluation) -> Result<()> {
    for (word, score) in &eval.word_scores {
        writeln!(out, "{word}\t{score}")?;
    }
    out.flush()?;
    Ok(())
}

/// What goes in the first column of a training corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusLabel {
    /// -1, 0 or 1.
    Class,
    /// The star rating as is.
    RawRating,
}

/// Writes `label\tnormalized comment` for every row with a comment and a rating.
/// Returns how many lines were written.
pub fn write_corpus<W: Write>(mut out: W, rows: &[ReviewRow], label: CorpusLabel) -> Result<usize> {
    let mut written = 0;
    for labeled in labeled_comments(rows) {
        let text = add_space(&labeled.comment);
        if text.is_empty() {
            continue;
        }
        match label {
            CorpusLabel::Class => writeln!(out, "{}\t{text}", labeled.rating_class)?,
            CorpusLabel::RawRating => writeln!(out, "{}\t{text}", labeled.rating)?,
        }
        written += 1;
    }
    out.flush()?;
    Ok(written)
}

/// End of run numbers for the analyzer.
pub struct AnalysisSummary<'a> {
    pub eval: &'a Evaluation,
    pub denominator: AccuracyDenominator,
    pub dropped_rows: usize,
}

impl fmt::Display for AnalysisSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eval = self.eval;
        writeln!(f, "Rows scored:          {}", eval.rows_processed())?;
        writeln!(f, "Rows without review:  {}", eval.filtered)?;
        writeln!(f, "Malformed rows:       {}", self.dropped_rows)?;
        writeln!(f, "Matches:              {}", eval.matches)?;
        match eval.accuracy(self.denominator) {
            Some(acc) => writeln!(f, "Accuracy:             {acc:.4}")?,
            None => writeln!(f, "Accuracy:             n/a")?,
        }
        match eval.correlation() {
            Some(r) => writeln!(f, "Score/rating corr.:   {r:.4}")?,
            None => writeln!(f, "Score/rating corr.:   n/a")?,
        }
        writeln!(f, "Confusion (rows: rating class -1/0/1, cols: predicted -1/0/1):")?;
        for row in &eval.confusion {
            writeln!(f, "  {:>6} {:>6} {:>6}", row[0], row[1], row[2])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts a few hand picked words instead of a real lexicon.
    struct StubScorer;

    impl SentimentScorer for StubScorer {
        fn compound(&self, text: &str) -> f64 {
            let text = text.to_lowercase();
            let mut score: f64 = 0.0;
            for word in ["excellent", "best", "great"] {
                if text.contains(word) {
                    score += 0.5;
                }
            }
            for word in ["terrible", "avoid", "boring"] {
                if text.contains(word) {
                    score -= 0.5;
                }
            }
            score.clamp(-1.0, 1.0)
        }
    }

    fn row(course: &str, comment: Option<&str>, rating: Option<u8>) -> ReviewRow {
        ReviewRow {
            line: 0,
            course_id: course.into(),
            comment: comment.map(str::to_string),
            challenge: rating.map(|_| 3),
            inclusivity: rating.map(|_| 3),
            hours: rating.map(|_| 5.0),
            rating,
        }
    }

    fn rows() -> Vec<ReviewRow> {
        vec![
            row("A", Some("excellent, best class ever"), Some(5)),
            row("A", Some("terrible, avoid"), Some(1)),
            row("B", Some("it was a class"), Some(3)),
            row("B", Some("great and boring"), Some(4)),
            row("C", None, None),
            row("C", Some("unrated but excellent"), None),
        ]
    }

    #[test]
    fn rating_classes() {
        assert_eq!(SentimentClass::from_rating(5).as_i8(), 1);
        assert_eq!(SentimentClass::from_rating(1).as_i8(), -1);
        assert_eq!(SentimentClass::from_rating(0).as_i8(), -1);
        assert_eq!(SentimentClass::from_rating(3).as_i8(), 0);
    }

    #[test]
    fn compound_thresholds() {
        assert_eq!(SentimentClass::from_compound(0.05), SentimentClass::Positive);
        assert_eq!(SentimentClass::from_compound(0.049), SentimentClass::Neutral);
        assert_eq!(SentimentClass::from_compound(-0.05), SentimentClass::Neutral);
        assert_eq!(SentimentClass::from_compound(-0.051), SentimentClass::Negative);
    }

    #[test]
    fn labels_follow_rating_regardless_of_comment() {
        let labeled = labeled_comments(&[
            row("A", Some("excellent, best class ever"), Some(5)),
            row("A", Some("terrible, avoid"), Some(1)),
            row("A", Some("excellent, best class ever"), Some(3)),
            row("A", Some("terrible, avoid"), Some(3)),
        ]);
        let classes: Vec<_> = labeled.iter().map(|l| l.rating_class.as_i8()).collect();
        assert_eq!(classes, [1, -1, 0, 0]);
    }

    #[test]
    fn add_space_strips_apostrophes_and_punctuation() {
        assert_eq!(add_space("don't-stop"), "dont stop");
        assert_eq!(add_space("  Great!!  class, isn’t it? "), "Great class isnt it");
        assert_eq!(add_space("?!"), "");
    }

    #[test]
    fn evaluation_skips_unreviewed_rows() {
        let eval = evaluate(&rows(), &StubScorer);
        assert_eq!(eval.rows_processed(), 4);
        assert_eq!(eval.filtered, 2);
        assert!(!eval.word_scores.contains_key("unrated"));
        assert!(eval.word_scores.contains_key("excellent"));
        assert_eq!(eval.word_scores["terrible"], -0.5);
    }

    #[test]
    fn matches_and_accuracy() {
        let eval = evaluate(&rows(), &StubScorer);
        // 5 -> +1 ok, 1 -> -1 ok, 3 -> neutral ok, 4 with a 0.0 score -> neutral, miss
        assert_eq!(eval.matches, 3);
        assert_eq!(eval.accuracy(AccuracyDenominator::RowsProcessed), Some(0.75));
        assert_eq!(
            eval.accuracy(AccuracyDenominator::LegacyCounter { start_index: 1 }),
            Some(0.6)
        );
        assert_eq!(eval.confusion[2][1], 1);
    }

    #[test]
    fn accuracy_ignores_row_order() {
        let forward = evaluate(&rows(), &StubScorer);
        let mut reversed_rows = rows();
        reversed_rows.reverse();
        let reversed = evaluate(&reversed_rows, &StubScorer);

        assert_eq!(forward.matches, reversed.matches);
        assert_eq!(forward.confusion, reversed.confusion);
        assert_eq!(forward.word_scores, reversed.word_scores);
    }

    #[test]
    fn empty_input_has_no_accuracy() {
        let eval = evaluate(&[], &StubScorer);
        assert_eq!(eval.accuracy(AccuracyDenominator::RowsProcessed), None);
        assert_eq!(eval.correlation(), None);
    }

    #[test]
    fn correlation_tracks_agreement() {
        let eval = evaluate(
            &[
                row("A", Some("excellent"), Some(5)),
                row("A", Some("terrible"), Some(1)),
                row("A", Some("meh"), Some(3)),
            ],
            &StubScorer,
        );
        let r = eval.correlation().unwrap();
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn analysis_file_layout() {
        let eval = evaluate(&rows()[..2], &StubScorer);
        let mut out = Vec::new();
        write_analysis(&mut out, &eval, 7).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Review Number, Class ID, Comment Sentiment Score, Rating");
        assert_eq!(lines[1], "7, A, 1, 5");
        assert_eq!(lines[2], "8, A, -1, 1");
    }

    #[test]
    fn corpus_lines() {
        let mut out = Vec::new();
        let written = write_corpus(&mut out, &rows(), CorpusLabel::Class).unwrap();
        assert_eq!(written, 4);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().next(), Some("1\texcellent best class ever"));

        let mut raw = Vec::new();
        write_corpus(&mut raw, &rows(), CorpusLabel::RawRating).unwrap();
        assert!(String::from_utf8(raw).unwrap().contains("1\tterrible avoid"));
    }

    #[test]
    fn corpus_labels_differ_only_in_first_column() {
        let rows = [row("A", Some("solid, fair class"), Some(4))];
        let mut class = Vec::new();
        let mut raw = Vec::new();
        write_corpus(&mut class, &rows, CorpusLabel::Class).unwrap();
        write_corpus(&mut raw, &rows, CorpusLabel::RawRating).unwrap();
        assert_eq!(String::from_utf8(class).unwrap(), "1\tsolid fair class\n");
        assert_eq!(String::from_utf8(raw).unwrap(), "4\tsolid fair class\n");
    }

    #[test]
    fn vader_scores_clear_cases() {
        let vader = VaderScorer;
        assert!(vader.compound("excellent, best class ever") >= POSITIVE_THRESHOLD);
        assert!(vader.compound("terrible, avoid") < NEGATIVE_THRESHOLD);
    }
}
