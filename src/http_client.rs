//! Bounded HTTP downloads used to fetch dataset archives.

use std::io::{self, Read};
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry settings for network operations with exponential backoff.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RetryConfig {
    /// Maximum number of attempts per URL, including the first try.
    pub max_attempts: usize,
    /// Base delay used for the exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay allowed between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Failure to fetch a resource from every candidate URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No download URLs were provided")]
    NoUrls,
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("Failed to read response from {url}: {source}")]
    Body { url: String, source: io::Error },
}

impl FetchError {
    fn is_transient(&self) -> bool {
        match self {
            FetchError::Request { .. } => true,
            FetchError::Body { source, .. } => source.kind() != io::ErrorKind::InvalidData,
            FetchError::NoUrls => false,
        }
    }
}

/// Return a shared HTTP agent with consistent timeouts.
pub(crate) fn agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build()
    })
}

/// Download the first URL that succeeds, retrying transient failures per URL.
///
/// Returns the last error when every mirror fails.
pub(crate) fn fetch_from_mirrors(
    urls: &[String],
    max_bytes: usize,
    retry: RetryConfig,
) -> Result<Vec<u8>, FetchError> {
    let mut last_error = FetchError::NoUrls;
    for url in urls {
        match retry_with_backoff(retry, || fetch_once(url, max_bytes), FetchError::is_transient) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => {
                tracing::warn!("Download from {url} failed: {err}");
                last_error = err;
            }
        }
    }
    Err(last_error)
}

fn fetch_once(url: &str, max_bytes: usize) -> Result<Vec<u8>, FetchError> {
    let response = agent()
        .get(url)
        .call()
        .map_err(|err| FetchError::Request {
            url: url.to_string(),
            message: err.to_string(),
        })?;
    read_response_bytes(response, max_bytes).map_err(|source| FetchError::Body {
        url: url.to_string(),
        source,
    })
}

/// Retry an operation with bounded exponential backoff when the predicate allows it.
pub(crate) fn retry_with_backoff<T, E, F, R>(
    config: RetryConfig,
    mut action: F,
    mut should_retry: R,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    R: FnMut(&E) -> bool,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match action() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !should_retry(&err) {
                    return Err(err);
                }
                std::thread::sleep(backoff_delay(
                    config.base_delay,
                    config.max_delay,
                    attempt,
                ));
            }
        }
    }
}

/// Read a response into memory, enforcing a maximum byte size.
pub(crate) fn read_response_bytes(
    response: ureq::Response,
    max_bytes: usize,
) -> Result<Vec<u8>, io::Error> {
    check_content_length(&response, max_bytes)?;
    let reader = response.into_reader();
    let mut limited = reader.take(max_bytes as u64 + 1);
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response exceeded {max_bytes} bytes"),
        ));
    }
    Ok(bytes)
}

fn check_content_length(response: &ureq::Response, max_bytes: usize) -> Result<(), io::Error> {
    let Some(length) = response.header("Content-Length") else {
        return Ok(());
    };
    let Ok(length) = length.parse::<u64>() else {
        return Ok(());
    };
    if length > max_bytes as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Response too large: {length} bytes"),
        ));
    }
    Ok(())
}

fn backoff_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}", addr)
    }

    fn no_wait() -> RetryConfig {
        RetryConfig {
            max_attempts: 1,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
        }
    }

    #[test]
    fn oversized_content_length_is_rejected() {
        let url = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nok".to_string());
        let response = agent().get(&url).call().unwrap();
        let err = read_response_bytes(response, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn fetch_falls_through_to_working_mirror() {
        let body = "idx";
        let good = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ));
        let dead = "http://127.0.0.1:9/unreachable".to_string();
        let bytes = fetch_from_mirrors(&[dead, good], 64, no_wait()).unwrap();
        assert_eq!(bytes, body.as_bytes());
    }

    #[test]
    fn fetch_without_urls_reports_no_urls() {
        let err = fetch_from_mirrors(&[], 64, no_wait()).unwrap_err();
        assert!(matches!(err, FetchError::NoUrls));
    }

    #[test]
    fn retry_stops_after_success() {
        let mut attempts = 0usize;
        let config = RetryConfig {
            max_attempts: 4,
            ..no_wait()
        };
        let result: Result<u32, &'static str> = retry_with_backoff(
            config,
            || {
                attempts += 1;
                if attempts < 3 { Err("fail") } else { Ok(7) }
            },
            |_| true,
        );
        assert_eq!(result, Ok(7));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn backoff_is_capped() {
        let delay = backoff_delay(Duration::from_millis(500), Duration::from_secs(2), 10);
        assert_eq!(delay, Duration::from_secs(2));
    }
}
