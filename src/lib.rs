//! ASPC COURSE REVIEW SCRAPER
//! Fetches every course review page behind CAS login, writes the reviews to CSV
//! and checks how well comment sentiment lines up with the star rating.

pub mod config;
mod error;
mod macros;
pub mod model;
pub mod parse;
pub mod process;
pub mod record;
pub mod request;
pub mod sentiment;

pub use error::{Error, Result};

pub const BASE_URL: &str = "https://pomonastudents.org";
pub const LOGIN_URL: &str = "https://webauth.claremont.edu/cas/login?service=https%3A%2F%2Fssocas.campus.pomona.edu%2Fcas%2Flogin%3Fclient_name%3DCasClient";
pub const FIRST_PAGE: usize = 1;
/// Highest course page id seen on the site.
pub const LAST_PAGE: usize = 7766;
pub const PAGES_PER_BLOCK: usize = 8;
pub const MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_MS: u64 = 500;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const REVIEWS_FILE: &str = "course_reviews.csv";
pub const ANALYSIS_FILE: &str = "analyzedFile.txt";
