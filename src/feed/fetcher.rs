use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// End-to-end budget for one feed request (connect + read).
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 10;

/// Transport errors raised while retrieving a feed.
///
/// Any of these leaves the previously stored snapshots untouched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Request exceeded [`FETCH_TIMEOUT`]
    #[error("Request timed out")]
    Timeout,
    /// Response with a status other than 200
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The body could not be read completely after a 200 response
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),
}

impl FetchError {
    fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err)
        }
    }

    fn from_body(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Body(err)
        }
    }
}

/// Rewrite a leading `webcal://` to `https://`. Other URLs pass through.
pub fn normalize_feed_url(url: &str) -> String {
    match url.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_string(),
    }
}

/// Build the HTTP client shared by all refresh units.
pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(redirect_policy())
        .timeout(FETCH_TIMEOUT)
        .build()
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt
            .previous()
            .iter()
            .any(|prev| prev.as_str() == url.as_str())
        {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Retrieve the full body of a feed with a single GET.
///
/// No retries happen here; the caller decides what a failure means.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - The client timeout elapsed
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::HttpStatus`] - Any status other than 200
/// - [`FetchError::Body`] - Body read failed after a 200 response
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let url = normalize_feed_url(url);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(FetchError::from_request)?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }

    let bytes = response.bytes().await.map_err(FetchError::from_body)?;
    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed");

    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nSUMMARY:Test\nEND:VEVENT\nEND:VCALENDAR\n";

    /// Answers one request with a 200 that promises 500 bytes, sends a few,
    /// then closes the connection.
    async fn serve_truncated_body() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\n\
                      Content-Type: text/calendar\r\n\
                      Content-Length: 500\r\n\r\n\
                      BEGIN:VCALENDAR\r\n",
                )
                .await
                .unwrap();
        });
        format!("http://{addr}/cal.ics")
    }

    #[test]
    fn test_webcal_is_rewritten_to_https() {
        assert_eq!(
            normalize_feed_url("webcal://example.com/cal.ics"),
            "https://example.com/cal.ics"
        );
    }

    #[test]
    fn test_other_schemes_pass_through() {
        assert_eq!(
            normalize_feed_url("http://example.com/cal.ics"),
            "http://example.com/cal.ics"
        );
        assert_eq!(
            normalize_feed_url("https://example.com/webcal://x"),
            "https://example.com/webcal://x"
        );
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cal.ics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        let body = fetch(&client, &format!("{}/cal.ics", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(body, FEED.as_bytes());
    }

    #[tokio::test]
    async fn test_non_200_is_captured_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        match fetch(&client, &mock_server.uri()).await {
            Err(FetchError::HttpStatus(503)) => {}
            other => panic!("Expected HttpStatus(503), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_2xx_is_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let client = build_client().unwrap();
        assert!(matches!(
            fetch(&client, &mock_server.uri()).await,
            Err(FetchError::HttpStatus(204))
        ));
    }

    #[tokio::test]
    async fn test_slow_server_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(FEED)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        assert!(matches!(
            fetch(&client, &mock_server.uri()).await,
            Err(FetchError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_is_body_error() {
        let url = serve_truncated_body().await;
        let client = build_client().unwrap();
        match fetch(&client, &url).await {
            Err(FetchError::Body(_)) => {}
            other => panic!("Expected Body error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = build_client().unwrap();
        assert!(matches!(
            fetch(&client, "http://127.0.0.1:1/cal.ics").await,
            Err(FetchError::Network(_))
        ));
    }
}
