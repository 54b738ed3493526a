use reqwest::{Client, StatusCode, Url};
use tokio::task::JoinSet;

use crate::config::{Credentials, FetchConfig};
use crate::{info_time, warn_time, Error, Result};

/// A logged in session. Cookies set during CAS login ride along on every request.
#[derive(Clone)]
pub struct ReviewSession {
    client: Client,
    config: FetchConfig,
}

impl ReviewSession {
    /// Posts the login form to CAS and lets the review site pick up the ticket.
    pub async fn login(config: FetchConfig, credentials: &Credentials) -> Result<Self> {
        let Self { client, config } = Self::unauthenticated(config)?;
        info_time!("Logging in");

        let res = client
            .post(&config.login_url)
            .form(&credentials.form())
            .send()
            .await
            .map_err(|e| Error::AuthenticationFailure(format!("login request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::AuthenticationFailure(format!(
                "login form rejected with status {}",
                res.status()
            )));
        }

        let res = client
            .get(config.session_url())
            .send()
            .await
            .map_err(|e| Error::AuthenticationFailure(format!("session request failed: {e}")))?;
        let login_url = Url::parse(&config.login_url)
            .map_err(|e| Error::AuthenticationFailure(format!("bad login url: {e}")))?;
        if !session_established(res.status(), res.url(), &login_url) {
            return Err(Error::AuthenticationFailure(format!(
                "no session after login (status {}, ended at {})",
                res.status(),
                res.url()
            )));
        }

        info_time!("Logged in");
        Ok(Self { client, config })
    }

    /// A session with an empty cookie jar. Every request gives up after `config.timeout`.
    pub(crate) fn unauthenticated(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Requests a page and returns its HTML, retrying transient failures.
    pub async fn request_page_html(&self, page_num: usize) -> Result<String> {
        let retry = self.config.retry;
        let url = self.config.page_url(page_num);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let reason = match self.client.get(&url).send().await {
                Ok(res) if res.status().is_success() => match res.text().await {
                    Ok(html) => return Ok(html),
                    Err(e) => e.to_string(),
                },
                Ok(res) if !is_transient_status(res.status()) => {
                    return Err(Error::NetworkFailure {
                        page: page_num,
                        attempts: attempt,
                        reason: format!("status {}", res.status()),
                    });
                }
                Ok(res) => format!("status {}", res.status()),
                Err(e) => e.to_string(),
            };

            if attempt >= retry.attempts() {
                return Err(Error::NetworkFailure {
                    page: page_num,
                    attempts: attempt,
                    reason,
                });
            }
            warn_time!("page {} attempt {} failed: {}", page_num, attempt, reason);
            tokio::time::sleep(retry.delay(attempt)).await;
        }
    }
}

/// Returns a `JoinSet` of all the page requests in a block, so that they can be awaited.
/// Each task hands back its page number with the result.
pub(crate) fn request_block(
    session: &ReviewSession,
    pages: impl IntoIterator<Item = usize>,
) -> JoinSet<(usize, Result<String>)> {
    let mut task_set = JoinSet::new();
    for page_num in pages {
        task_set.spawn({
            // Client uses Arc so we can clone cheaply
            let session = session.clone();
            async move { (page_num, session.request_page_html(page_num).await) }
        });
    }
    task_set
}

/// 5xx and 429 are worth another try, anything else is the page's final answer.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// After login the review site should answer without bouncing us back to CAS.
fn session_established(status: StatusCode, final_url: &Url, login_url: &Url) -> bool {
    status.is_success()
        && !(final_url.host_str() == login_url.host_str() && final_url.path() == login_url.path())
}
