//! CSV files of reviews, in both the tab/`|` and the comma/`"` flavours.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};

use crate::model::{
    CourseReviewIndex, ReviewDetails, StudentReview, ABSENT_COMMENT, ABSENT_NUMBER,
};
use crate::{warn_time, Error, Result};

pub const HEADER: [&str; 6] = ["number", "comment", "challenge", "inclusivity", "hours", "rating"];

/// Separator and quote character of a review file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvFormat {
    /// Tab separated, `|` quoted. What the fetcher writes.
    Tab,
    /// Comma separated, `"` quoted.
    Comma,
}

impl CsvFormat {
    pub fn delimiter(self) -> u8 {
        match self {
            CsvFormat::Tab => b'\t',
            CsvFormat::Comma => b',',
        }
    }

    pub fn quote(self) -> u8 {
        match self {
            CsvFormat::Tab => b'|',
            CsvFormat::Comma => b'"',
        }
    }

    /// Guesses the format from a header line.
    pub fn detect(header_line: &str) -> Self {
        if header_line.contains('\t') {
            CsvFormat::Tab
        } else {
            CsvFormat::Comma
        }
    }
}

impl FromStr for CsvFormat {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tab" | "tsv" => Ok(CsvFormat::Tab),
            "comma" | "csv" => Ok(CsvFormat::Comma),
            other => Err(format!("unknown csv format '{other}', expected tab or comma")),
        }
    }
}

/// A `--format` value: a fixed format, or `auto` to go by the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatChoice {
    Auto,
    Fixed(CsvFormat),
}

impl FormatChoice {
    pub fn fixed(self) -> Option<CsvFormat> {
        match self {
            FormatChoice::Auto => None,
            FormatChoice::Fixed(format) => Some(format),
        }
    }
}

impl FromStr for FormatChoice {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(FormatChoice::Auto)
        } else {
            s.parse()
                .map(FormatChoice::Fixed)
                .map_err(|e| format!("{e} or auto"))
        }
    }
}

/// One review as read back from a file. Sentinels come back as `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    /// 1 based line of the row in its file, header included.
    pub line: u64,
    pub course_id: String,
    pub comment: Option<String>,
    pub challenge: Option<u8>,
    pub inclusivity: Option<u8>,
    pub hours: Option<f64>,
    pub rating: Option<u8>,
}

impl ReviewRow {
    pub fn into_review(self) -> StudentReview {
        match (self.rating, self.comment, self.hours, self.challenge, self.inclusivity) {
            (Some(rating), Some(comment), Some(hours_per_week), Some(challenge), Some(inclusivity)) => {
                StudentReview::new(
                    self.course_id,
                    ReviewDetails {
                        rating,
                        comment,
                        hours_per_week,
                        challenge,
                        inclusivity,
                    },
                )
            }
            _ => StudentReview::placeholder(self.course_id),
        }
    }
}

/// Rows read from a file plus the rows that had to be thrown away.
#[derive(Debug, Default)]
pub struct RowSet {
    pub rows: Vec<ReviewRow>,
    pub dropped: Vec<Error>,
}

pub fn write_index_to_path(path: impl AsRef<Path>, index: &CourseReviewIndex, format: CsvFormat) -> Result<()> {
    let file = File::create(path)?;
    write_index(io::BufWriter::new(file), index, format)
}

/// Writes one row per review, courses in index order.
pub fn write_index<W: Write>(writer: W, index: &CourseReviewIndex, format: CsvFormat) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(format.delimiter())
        .quote(format.quote())
        .from_writer(writer);

    wtr.write_record(HEADER)?;
    for course in index.courses() {
        for review in &course.reviews {
            wtr.write_record(review_record(&course.course_id, review))?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn review_record(course_id: &str, review: &StudentReview) -> [String; 6] {
    let number = |n: Option<u8>| n.map_or(ABSENT_NUMBER, i32::from).to_string();
    [
        course_id.to_string(),
        review.comment().unwrap_or(ABSENT_COMMENT).to_string(),
        number(review.challenge()),
        number(review.inclusivity()),
        review
            .hours_per_week()
            .map_or_else(|| ABSENT_NUMBER.to_string(), |h| h.to_string()),
        number(review.rating()),
    ]
}

pub fn read_rows_from_path(path: impl AsRef<Path>, format: Option<CsvFormat>) -> Result<RowSet> {
    read_rows(io::BufReader::new(File::open(path)?), format)
}

/// Reads a review file. With `format == None` the format is taken from the header line.
pub fn read_rows<R: Read>(mut reader: R, format: Option<CsvFormat>) -> Result<RowSet> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    let format = format.unwrap_or_else(|| CsvFormat::detect(text.lines().next().unwrap_or_default()));

    let mut rdr = ReaderBuilder::new()
        .delimiter(format.delimiter())
        .quote(format.quote())
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let mut set = RowSet::default();
    for record in rdr.records() {
        let parsed = record
            .map_err(Error::from)
            .and_then(|record| parse_row(&record));
        match parsed {
            Ok(row) => set.rows.push(row),
            Err(err) => {
                warn_time!("dropping row: {}", err);
                set.dropped.push(err);
            }
        }
    }
    Ok(set)
}

fn parse_row(record: &StringRecord) -> Result<ReviewRow> {
    let line = record.position().map_or(0, |p| p.line());
    let malformed = |reason: String| Error::MalformedRow { line, reason };

    if record.len() < HEADER.len() {
        return Err(malformed(format!(
            "expected {} columns, found {}",
            HEADER.len(),
            record.len()
        )));
    }

    let stars = |col: usize| -> Result<Option<u8>> {
        let raw = &record[col];
        let value: i64 = raw
            .parse()
            .map_err(|_| malformed(format!("{} '{raw}' is not an integer", HEADER[col])))?;
        match value {
            v if v == i64::from(ABSENT_NUMBER) => Ok(None),
            0..=5 => Ok(Some(value as u8)),
            _ => Err(malformed(format!("{} {value} is out of range", HEADER[col]))),
        }
    };

    let raw_hours = &record[4];
    let hours: f64 = raw_hours
        .parse()
        .map_err(|_| malformed(format!("hours '{raw_hours}' is not a number")))?;
    let hours = if hours == f64::from(ABSENT_NUMBER) {
        None
    } else if hours.is_finite() && hours >= 0.0 {
        Some(hours)
    } else {
        return Err(malformed(format!("hours {hours} is out of range")));
    };

    Ok(ReviewRow {
        line,
        course_id: record[0].to_string(),
        comment: (&record[1] != ABSENT_COMMENT).then(|| record[1].to_string()),
        challenge: stars(2)?,
        inclusivity: stars(3)?,
        hours,
        rating: stars(5)?,
    })
}

/// Rebuilds the index a file was written from.
pub fn rows_to_index(rows: impl IntoIterator<Item = ReviewRow>) -> CourseReviewIndex {
    let mut index = CourseReviewIndex::new();
    for row in rows {
        index.push(row.into_review());
    }
    index
}
