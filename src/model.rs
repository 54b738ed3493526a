//! Review records and the per-course index the fetcher builds.

use std::collections::HashMap;
use std::fmt;

use crate::Error;

/// Comment value written for a review that doesn't exist.
pub const ABSENT_COMMENT: &str = "n/a";
/// Numeric value written for a rating, hours or star count that doesn't exist.
pub const ABSENT_NUMBER: i32 = -1;

/// Everything a student fills in when submitting a review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDetails {
    pub rating: u8,
    pub comment: String,
    pub hours_per_week: f64,
    pub challenge: u8,
    pub inclusivity: u8,
}

/// One student's review of one course.
/// `details` is `None` for the placeholder that stands in for a course without reviews.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentReview {
    pub course_id: String,
    pub details: Option<ReviewDetails>,
}

impl StudentReview {
    pub fn new(course_id: impl Into<String>, details: ReviewDetails) -> Self {
        Self {
            course_id: course_id.into(),
            details: Some(details),
        }
    }

    pub fn placeholder(course_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            details: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.details.is_none()
    }

    pub fn rating(&self) -> Option<u8> {
        self.details.as_ref().map(|d| d.rating)
    }

    pub fn comment(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.comment.as_str())
    }

    pub fn hours_per_week(&self) -> Option<f64> {
        self.details.as_ref().map(|d| d.hours_per_week)
    }

    pub fn challenge(&self) -> Option<u8> {
        self.details.as_ref().map(|d| d.challenge)
    }

    pub fn inclusivity(&self) -> Option<u8> {
        self.details.as_ref().map(|d| d.inclusivity)
    }
}

impl fmt::Display for StudentReview {
    /// Short human readable form; the comment is cut to its first 10 words.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Course code: {}", self.course_id)?;
        match &self.details {
            None => writeln!(f, "No reviews submitted"),
            Some(d) => {
                let preview = d.comment.split(' ').take(10).collect::<Vec<_>>().join(" ");
                writeln!(f, "Course rating: {}/5.0", d.rating)?;
                writeln!(f, "Course comment: {preview}...")?;
                writeln!(f, "Hours per week: {}", d.hours_per_week)?;
                writeln!(f, "Challenge Rating: {}/5.0", d.challenge)?;
                writeln!(f, "Inclusivity Rating: {}/5.0", d.inclusivity)
            }
        }
    }
}

/// All reviews of one course, in page order.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseReviews {
    pub course_id: String,
    pub reviews: Vec<StudentReview>,
}

/// Course id -> reviews, iterated in the order courses were first inserted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseReviewIndex {
    courses: Vec<CourseReviews>,
    positions: HashMap<String, usize>,
}

impl CourseReviewIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reviews of a course. A course without reviews gets a single placeholder.
    /// Inserting a course that is already present replaces its reviews in place.
    pub fn insert(&mut self, course_id: impl Into<String>, mut reviews: Vec<StudentReview>) {
        let course_id = course_id.into();
        if reviews.is_empty() {
            reviews.push(StudentReview::placeholder(course_id.clone()));
        }

        match self.positions.get(&course_id) {
            Some(&pos) => self.courses[pos].reviews = reviews,
            None => {
                self.positions.insert(course_id.clone(), self.courses.len());
                self.courses.push(CourseReviews { course_id, reviews });
            }
        }
    }

    /// Appends a review to a course, replacing the course's placeholder if it had one.
    pub fn push(&mut self, review: StudentReview) {
        match self.positions.get(&review.course_id) {
            Some(&pos) => {
                let reviews = &mut self.courses[pos].reviews;
                if review.is_placeholder() {
                    return;
                }
                reviews.retain(|r| !r.is_placeholder());
                reviews.push(review);
            }
            None => {
                let course_id = review.course_id.clone();
                self.insert(course_id, vec![review]);
            }
        }
    }

    pub fn get(&self, course_id: &str) -> Option<&[StudentReview]> {
        self.positions
            .get(course_id)
            .map(|&pos| self.courses[pos].reviews.as_slice())
    }

    pub fn courses(&self) -> impl Iterator<Item = &CourseReviews> {
        self.courses.iter()
    }

    /// Every review, courses in index order and reviews in sequence order.
    pub fn reviews(&self) -> impl Iterator<Item = &StudentReview> {
        self.courses.iter().flat_map(|c| c.reviews.iter())
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }

    pub fn placeholder_count(&self) -> usize {
        self.reviews().filter(|r| r.is_placeholder()).count()
    }
}

/// What a fetch run did besides filling the index.
#[derive(Debug, Default)]
pub struct FetchSummary {
    pub pages_fetched: usize,
    pub placeholders: usize,
    pub reviews: usize,
    pub skipped_reviews: Vec<Error>,
    pub failed_pages: Vec<(usize, Error)>,
}

impl fmt::Display for FetchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages fetched:        {}", self.pages_fetched)?;
        writeln!(f, "Reviews collected:    {}", self.reviews)?;
        writeln!(f, "Courses w/o reviews:  {}", self.placeholders)?;
        writeln!(f, "Skipped reviews:      {}", self.skipped_reviews.len())?;
        for err in &self.skipped_reviews {
            writeln!(f, "  - {err}")?;
        }
        writeln!(f, "Failed pages:         {}", self.failed_pages.len())?;
        for (page, err) in &self.failed_pages {
            writeln!(f, "  - page {page}: {err}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(rating: u8) -> ReviewDetails {
        ReviewDetails {
            rating,
            comment: "fine".into(),
            hours_per_week: 4.0,
            challenge: 3,
            inclusivity: 5,
        }
    }

    #[test]
    fn placeholder_has_every_field_absent() {
        let review = StudentReview::placeholder("MATH060 PO");
        assert!(review.is_placeholder());
        assert_eq!(review.rating(), None);
        assert_eq!(review.comment(), None);
        assert_eq!(review.hours_per_week(), None);
        assert_eq!(review.challenge(), None);
        assert_eq!(review.inclusivity(), None);
    }

    #[test]
    fn empty_course_maps_to_single_placeholder() {
        let mut index = CourseReviewIndex::new();
        index.insert("PHYS070 PO", Vec::new());

        let reviews = index.get("PHYS070 PO").unwrap();
        assert_eq!(reviews.len(), 1);
        assert!(reviews[0].is_placeholder());
        assert_eq!(index.placeholder_count(), 1);
    }

    #[test]
    fn reinsert_keeps_first_position() {
        let mut index = CourseReviewIndex::new();
        index.insert("A", vec![StudentReview::new("A", details(1))]);
        index.insert("B", vec![StudentReview::new("B", details(2))]);
        index.insert("A", vec![StudentReview::new("A", details(5))]);

        let order: Vec<_> = index.courses().map(|c| c.course_id.as_str()).collect();
        assert_eq!(order, ["A", "B"]);
        assert_eq!(index.get("A").unwrap()[0].rating(), Some(5));
    }

    #[test]
    fn push_replaces_placeholder() {
        let mut index = CourseReviewIndex::new();
        index.push(StudentReview::placeholder("A"));
        index.push(StudentReview::new("A", details(4)));
        index.push(StudentReview::placeholder("A"));

        let reviews = index.get("A").unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].rating(), Some(4));
    }

    #[test]
    fn display_cuts_comment() {
        let mut d = details(4);
        d.comment = "one two three four five six seven eight nine ten eleven".into();
        let shown = StudentReview::new("A", d).to_string();
        assert!(shown.contains("Course comment: one two three four five six seven eight nine ten..."));
        assert!(!shown.contains("eleven"));
    }
}
