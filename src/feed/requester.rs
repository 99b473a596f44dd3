//! HTTP client for the calendar feed.
//!
//! This module provides the [`HttpFeedRequester`] struct performing a single
//! round trip to the feed endpoint and classifying failures as transient or
//! permanent. Retries are the job of the [`FetchClient`](crate::feed::FetchClient).

use std::{error::Error as StdError, io};

use async_trait::async_trait;
use log::{debug, info};
use mockall::automock;
use reqwest::{Client, Error};

use crate::feed::{NetworkError, RawPayload};

/// HTTP client requesting the calendar feed.
///
/// # Examples
///
/// ```no_run
/// # use fxnews::feed::{FeedRequester, HttpFeedRequester, NetworkError};
/// # async fn example() -> Result<(), NetworkError> {
/// let requester = HttpFeedRequester::new("https://nfs.faireconomy.media/ff_calendar_thisweek.json");
/// let payload = requester.get_calendar().await?;
/// println!("Payload: {}", payload);
/// # Ok(())
/// # }
/// ```
pub struct HttpFeedRequester {
    /// Feed endpoint url
    url: String,
    /// HTTP client
    client: Client,
}

/// Trait for performing one request to the feed server.
///
/// This trait abstracts the HTTP round trip for easier testing with mocks.
#[automock]
#[async_trait]
pub trait FeedRequester: Send + Sync {
    /// Downloads the raw calendar payload once.
    async fn get_calendar(&self) -> Result<RawPayload, NetworkError>;
    /// Url of the feed, recorded in snapshots.
    fn source_url(&self) -> String;
}

impl HttpFeedRequester {
    /// Create a new [HttpFeedRequester].
    ///
    /// # Arguments
    ///
    /// * `url` - The feed endpoint.
    pub fn new(url: &str) -> Self {
        let client = reqwest::Client::new();
        HttpFeedRequester {
            url: url.to_string(),
            client,
        }
    }
}

/// Whether an I/O error sits somewhere in the source chain of `e`.
///
/// Connections reset or closed early surface as I/O errors, while protocol
/// violations (a response that is not HTTP) carry none.
fn caused_by_io(e: &Error) -> bool {
    let mut source = e.source();
    while let Some(cause) = source {
        if cause.downcast_ref::<io::Error>().is_some() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Maps a transport error to a [`NetworkError`].
///
/// Timeouts and connection failures are transient, protocol errors are permanent.
fn classify_error(e: Error) -> NetworkError {
    if e.is_timeout() || e.is_connect() || caused_by_io(&e) {
        NetworkError::Transient(e.to_string())
    } else {
        NetworkError::Permanent(e.to_string())
    }
}

#[async_trait]
impl FeedRequester for HttpFeedRequester {
    /// Request the feed url and return the response body.
    ///
    /// 5xx responses and connections dropped while reading the body are
    /// reported as [`NetworkError::Transient`], every other non-success status
    /// and malformed responses as [`NetworkError::Permanent`].
    async fn get_calendar(&self) -> Result<RawPayload, NetworkError> {
        info!("request calendar feed");
        debug!("request {}", &self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(NetworkError::Transient(format!(
                "server responded with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(NetworkError::Permanent(format!(
                "server responded with {}",
                status
            )));
        }

        let payload = response.text().await.map_err(|e| match classify_error(e) {
            NetworkError::Transient(e) => {
                NetworkError::Transient(format!("failed to read response body: {}", e))
            }
            NetworkError::Permanent(e) => {
                NetworkError::Permanent(format!("failed to read response body: {}", e))
            }
            NetworkError::Cancelled => NetworkError::Cancelled,
        })?;

        debug!("response from {} -> {} bytes", &self.url, payload.len());

        Ok(payload)
    }

    fn source_url(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    /// Serves one connection with `reply` written verbatim, then closes it.
    fn serve_raw_once(reply: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buffer[..read]),
                }
            }
            stream.write_all(reply).unwrap();
            stream.flush().unwrap();
        });

        format!("http://{}/calendar.json", address)
    }

    #[tokio::test]
    async fn test_get_calendar() {
        let mut server = mockito::Server::new_async().await;
        let body = r#"[{"title": "GDP", "country": "USD", "date": "2025-10-01T12:30:00Z", "impact": "High"}]"#;

        server
            .mock("GET", "/ff_calendar_thisweek.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let url = format!("{}/ff_calendar_thisweek.json", server.url());
        let requester = HttpFeedRequester::new(&url);
        let payload = requester.get_calendar().await.unwrap();
        assert_eq!(payload, body);
    }

    #[tokio::test]
    async fn test_get_calendar_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/calendar.json")
            .with_status(503)
            .create_async()
            .await;

        let requester = HttpFeedRequester::new(&format!("{}/calendar.json", server.url()));
        let error = requester.get_calendar().await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn test_get_calendar_client_error_is_permanent() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/calendar.json")
            .with_status(404)
            .create_async()
            .await;

        let requester = HttpFeedRequester::new(&format!("{}/calendar.json", server.url()));
        let error = requester.get_calendar().await.unwrap_err();
        assert!(matches!(error, NetworkError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_get_calendar_connection_refused_is_transient() {
        let requester = HttpFeedRequester::new("http://127.0.0.1:1/calendar.json");
        let error = requester.get_calendar().await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn test_get_calendar_non_http_response_is_permanent() {
        let url = serve_raw_once(b"THIS IS NOT HTTP\r\n\r\n");

        let requester = HttpFeedRequester::new(&url);
        let error = requester.get_calendar().await.unwrap_err();
        assert!(matches!(error, NetworkError::Permanent(_)), "{:?}", error);
    }

    #[tokio::test]
    async fn test_get_calendar_truncated_body_is_transient() {
        let url = serve_raw_once(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n[{\"title\"",
        );

        let requester = HttpFeedRequester::new(&url);
        let error = requester.get_calendar().await.unwrap_err();
        assert!(error.is_transient(), "{:?}", error);
    }

    #[test]
    fn test_source_url() {
        let requester = HttpFeedRequester::new("http://calendar.server/feed.json");
        assert_eq!(requester.source_url(), "http://calendar.server/feed.json");
    }
}
