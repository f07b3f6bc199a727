//! Upstream page source
//!
//! The ingestion pipeline only needs "give me the raw body of page N".
//! [`HttpPageSource`] does that over HTTP with a request timeout and a
//! bounded exponential backoff; tests plug in their own [`PageSource`].

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use crate::{Error, Result};

#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch the raw response body of one page (1-based).
    ///
    /// An `Err` is a transport fault. Decoding is the caller's job.
    async fn fetch_page(&self, page: u32) -> Result<String>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        (**self).fetch_page(page).await
    }
}

/// Settings for [`HttpPageSource`]
#[derive(Debug, Clone)]
pub struct HttpSourceOptions {
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for HttpSourceOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

pub struct HttpPageSource {
    client: reqwest::Client,
    base_url: String,
    options: HttpSourceOptions,
}

impl HttpPageSource {
    pub fn new(base_url: impl Into<String>, options: HttpSourceOptions) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(options.timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            options,
        })
    }

    async fn fetch_once(&self, page: u32) -> Result<String> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("page", page)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Upstream {
                page,
                message: format!("upstream returned {status}"),
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, page: u32) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(page).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.options.retries => {
                    let delay = backoff_delay(self.options.backoff, attempt);
                    tracing::warn!(page, attempt, error = %e, "upstream fetch failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(Error::Upstream {
                        page,
                        message: format!("giving up after {} attempts: {e}", attempt + 1),
                    });
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    /// Answers 500 for the first `failures` requests, then echoes the page.
    struct Flaky {
        hits: AtomicUsize,
        failures: usize,
    }

    async fn flaky_posts(
        State(flaky): State<Arc<Flaky>>,
        Query(params): Query<HashMap<String, String>>,
    ) -> (StatusCode, String) {
        let hit = flaky.hits.fetch_add(1, Ordering::SeqCst);
        if hit < flaky.failures {
            return (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string());
        }
        let page = params.get("page").cloned().unwrap_or_default();
        (StatusCode::OK, format!(r#"{{"page": {page}}}"#))
    }

    /// Serve [`Flaky`] on an ephemeral local port.
    async fn serve_flaky(failures: usize) -> (String, Arc<Flaky>) {
        let flaky = Arc::new(Flaky {
            hits: AtomicUsize::new(0),
            failures,
        });
        let app = Router::new()
            .route("/posts", get(flaky_posts))
            .with_state(flaky.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        (format!("http://{addr}/posts"), flaky)
    }

    fn quick_retries(retries: u32) -> HttpSourceOptions {
        HttpSourceOptions {
            timeout: Duration::from_secs(2),
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transport_fault() {
        let options = HttpSourceOptions {
            timeout: Duration::from_millis(500),
            retries: 1,
            backoff: Duration::from_millis(1),
        };
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let source = HttpPageSource::new("http://127.0.0.1:9/posts", options).unwrap();

        match source.fetch_page(3).await {
            Err(Error::Upstream { page, message }) => {
                assert_eq!(page, 3);
                assert!(message.contains("2 attempts"));
            }
            other => panic!("expected upstream fault, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let (url, flaky) = serve_flaky(1).await;
        let source = HttpPageSource::new(url, quick_retries(2)).unwrap();

        let body = source.fetch_page(4).await.unwrap();
        assert_eq!(body, r#"{"page": 4}"#);
        assert_eq!(flaky.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_persistent_server_error_exhausts_retries() {
        let (url, flaky) = serve_flaky(usize::MAX).await;
        let source = HttpPageSource::new(url, quick_retries(2)).unwrap();

        match source.fetch_page(5).await {
            Err(Error::Upstream { page, message }) => {
                assert_eq!(page, 5);
                assert!(message.contains("3 attempts"), "{message}");
                assert!(message.contains("500"), "{message}");
            }
            other => panic!("expected upstream fault, got {:?}", other.map(|_| ())),
        }
        assert_eq!(flaky.hits.load(Ordering::SeqCst), 3);
    }
}
