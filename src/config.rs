use std::fmt;
use std::time::Duration;

use crate::{
    Error, Result, BACKOFF_MS, BASE_URL, FIRST_PAGE, LAST_PAGE, LOGIN_URL, MAX_ATTEMPTS,
    PAGES_PER_BLOCK, REQUEST_TIMEOUT_SECS,
};

/// CAS login secrets. Read from the environment, never printed.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub dispname: String,
    pub password: String,
    pub execution: String,
}

impl Credentials {
    /// Loads a `.env` file if there is one, then reads
    /// `USERNAME`, `DISPNAME`, `PASSWORD` and `EXECUTION`.
    pub fn from_env() -> Result<Self> {
        // A missing .env is fine, the variables may already be exported.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).ok_or_else(|| Error::MissingEnv(key.to_string()));
        Ok(Self {
            username: get("USERNAME")?,
            dispname: get("DISPNAME")?,
            password: get("PASSWORD")?,
            execution: get("EXECUTION")?,
        })
    }

    /// Body of the CAS login form.
    pub fn form(&self) -> [(&'static str, &str); 5] {
        [
            ("username", self.username.as_str()),
            ("dispname", self.dispname.as_str()),
            ("password", self.password.as_str()),
            ("execution", self.execution.as_str()),
            ("_eventId", "submit"),
        ]
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &"<redacted>")
            .field("dispname", &"<redacted>")
            .field("password", &"<redacted>")
            .field("execution", &"<redacted>")
            .finish()
    }
}

/// How many times a page is requested and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Never fewer than one request.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait before retry number `attempt` (1 based): backoff, 2 * backoff, 4 * backoff...
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.checked_mul(factor).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: Duration::from_millis(BACKOFF_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub login_url: String,
    pub first_page: usize,
    pub last_page: usize,
    pub pages_per_block: usize,
    pub retry: RetryPolicy,
    /// Per request, connecting through reading the body.
    pub timeout: Duration,
}

impl FetchConfig {
    pub fn page_url(&self, page: usize) -> String {
        format!("{}/courses/{page}", self.base_url.trim_end_matches('/'))
    }

    pub fn session_url(&self) -> String {
        format!("{}/login/cas", self.base_url.trim_end_matches('/'))
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            login_url: LOGIN_URL.to_string(),
            first_page: FIRST_PAGE,
            last_page: LAST_PAGE,
            pages_per_block: PAGES_PER_BLOCK,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "USERNAME" => Some("student".into()),
            "DISPNAME" => Some("Pomona".into()),
            "PASSWORD" => Some("hunter2".into()),
            "EXECUTION" => Some("e1s1-token".into()),
            _ => None,
        }
    }

    #[test]
    fn debug_hides_secrets() {
        let creds = Credentials::from_lookup(|key| Some(format!("secret-{key}"))).unwrap();
        let shown = format!("{creds:?}");
        for key in ["USERNAME", "DISPNAME", "PASSWORD", "EXECUTION"] {
            assert!(!shown.contains(&format!("secret-{key}")), "{key} leaked: {shown}");
        }
    }

    #[test]
    fn missing_variable_is_named() {
        let err = Credentials::from_lookup(|k| (k != "EXECUTION").then(|| "x".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::MissingEnv(ref k) if k == "EXECUTION"));
    }

    #[test]
    fn form_submits_event() {
        let creds = Credentials::from_lookup(lookup).unwrap();
        assert!(creds.form().contains(&("_eventId", "submit")));
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(3), Duration::from_millis(400));
    }

    #[test]
    fn huge_backoff_saturates() {
        let retry = RetryPolicy {
            max_attempts: 40,
            backoff: Duration::from_millis(u64::MAX),
        };
        assert_eq!(retry.delay(30), Duration::MAX);
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let config = FetchConfig {
            base_url: "https://example.org/".into(),
            ..FetchConfig::default()
        };
        assert_eq!(config.page_url(12), "https://example.org/courses/12");
        assert_eq!(config.session_url(), "https://example.org/login/cas");
    }
}
