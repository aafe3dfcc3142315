//! Shared HTTP plumbing for the embedding and rerank clients.

use std::thread::sleep;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ModelError, ModelResult};

/// Maximum number of attempts per request (first try included).
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Create the shared blocking HTTP client.
///
/// Config: 10s connect timeout, 120s request timeout,
/// `contextweaver/{version}` user-agent.
pub(crate) fn default_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .user_agent(concat!("contextweaver/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("default HTTP client construction must not fail")
}

/// Error body shape returned by both services: `{"error": {"message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<ErrorBody>() {
        Ok(body) => body.error.message,
        Err(_) => format!("HTTP {status}"),
    }
}

/// Send a request, retrying up to [`MAX_ATTEMPTS`] times on failure.
///
/// Backoff is `500·n` ms for ordinary failures and `1000·n` ms for 429
/// responses, where `n` is the attempt number.
///
/// # Errors
///
/// Returns [`ModelError::RateLimited`] when every attempt was rate limited,
/// [`ModelError::Api`] for a terminal non-success status, and
/// [`ModelError::Http`] for a terminal transport failure.
pub(crate) fn send_with_retry<F>(service: &str, mut send: F) -> ModelResult<Response>
where
    F: FnMut() -> Result<Response, reqwest::Error>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match send() {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                if attempt >= MAX_ATTEMPTS {
                    if rate_limited {
                        return Err(ModelError::RateLimited {
                            service: service.to_string(),
                            attempts: attempt,
                        });
                    }
                    return Err(ModelError::api(
                        service,
                        status.as_u16(),
                        error_message(response),
                    ));
                }
                let base = if rate_limited { 1000 } else { 500 };
                let delay = Duration::from_millis(base * u64::from(attempt));
                warn!(
                    "{service} returned HTTP {status}, retrying in {}ms ({attempt}/{MAX_ATTEMPTS})",
                    delay.as_millis()
                );
                sleep(delay);
            }
            Err(err) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(ModelError::Http(err));
                }
                let delay = Duration::from_millis(500 * u64::from(attempt));
                warn!(
                    "{service} request error ({err}), retrying in {}ms ({attempt}/{MAX_ATTEMPTS})",
                    delay.as_millis()
                );
                sleep(delay);
            }
        }
    }
}

// ============================================================================
// Test support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::{http_response, spawn_mock_server};
    use super::*;
    use std::time::Instant;

    fn url(port: u16) -> String {
        format!("http://127.0.0.1:{port}/test")
    }

    #[test]
    fn success_on_first_attempt() {
        let port = spawn_mock_server(vec![http_response("200 OK", "{}")]);
        let client = default_client();
        let url = url(port);

        let result = send_with_retry("embedding", || client.get(&url).send());
        assert_eq!(result.unwrap().status(), 200);
    }

    #[test]
    fn succeeds_after_one_rate_limit_with_backoff() {
        let port = spawn_mock_server(vec![
            http_response("429 Too Many Requests", ""),
            http_response("200 OK", "{}"),
        ]);
        let client = default_client();
        let url = url(port);

        let started = Instant::now();
        let result = send_with_retry("embedding", || client.get(&url).send());

        assert_eq!(result.unwrap().status(), 200);
        // Rate-limit backoff is 1000 * attempt ms.
        assert!(
            started.elapsed() >= Duration::from_millis(1000),
            "rate-limit retry must back off, elapsed {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn retries_server_error_then_succeeds() {
        let port = spawn_mock_server(vec![
            http_response("500 Internal Server Error", r#"{"error":{"message":"blip"}}"#),
            http_response("200 OK", "{}"),
        ]);
        let client = default_client();
        let url = url(port);

        let started = Instant::now();
        let result = send_with_retry("rerank", || client.get(&url).send());

        assert_eq!(result.unwrap().status(), 200);
        // Ordinary backoff is 500 * attempt ms.
        assert!(started.elapsed() >= Duration::from_millis(500));
    }

    #[test]
    fn exhausted_rate_limits_return_rate_limited() {
        let port = spawn_mock_server(vec![
            http_response("429 Too Many Requests", ""),
            http_response("429 Too Many Requests", ""),
            http_response("429 Too Many Requests", ""),
        ]);
        let client = default_client();
        let url = url(port);

        let result = send_with_retry("rerank", || client.get(&url).send());
        match result {
            Err(ModelError::RateLimited { service, attempts }) => {
                assert_eq!(service, "rerank");
                assert_eq!(attempts, MAX_ATTEMPTS);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn terminal_error_carries_body_message() {
        let body = r#"{"error":{"message":"backend down"}}"#;
        let port = spawn_mock_server(vec![
            http_response("500 Internal Server Error", body),
            http_response("500 Internal Server Error", body),
            http_response("500 Internal Server Error", body),
        ]);
        let client = default_client();
        let url = url(port);

        let result = send_with_retry("embedding", || client.get(&url).send());
        match result {
            Err(ModelError::Api {
                service,
                status,
                message,
            }) => {
                assert_eq!(service, "embedding");
                assert_eq!(status, 500);
                assert_eq!(message, "backend down");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn terminal_error_with_unparseable_body_falls_back_to_status() {
        let port = spawn_mock_server(vec![
            http_response("503 Service Unavailable", "not json"),
            http_response("503 Service Unavailable", "not json"),
            http_response("503 Service Unavailable", "not json"),
        ]);
        let client = default_client();
        let url = url(port);

        let result = send_with_retry("embedding", || client.get(&url).send());
        match result {
            Err(ModelError::Api { status, message, .. }) => {
                assert_eq!(status, 503);
                assert!(message.contains("503"), "message: {message}");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
