// Shared blocking HTTP plumbing for the REST clients (Ollama, Groq, Pinecone, Supabase)


use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use ureq::Body;
use ureq::http::Response;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const TOO_MANY_REQUESTS: u16 = 429;

/// Failure of a single request attempt
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] ureq::Error),
    #[error("HTTP {status}")]
    Status {
        status: u16,
        retry_after: Option<Duration>,
    },
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("HTTP {status} from {target}")]
    Status { status: u16, target: String },
    #[error("Non-retryable error calling {target}: {source}")]
    Fatal {
        target: String,
        #[source]
        source: ureq::Error,
    },
    #[error("All {attempts} attempts to {target} failed: {source}")]
    Exhausted {
        target: String,
        attempts: u32,
        #[source]
        source: AttemptError,
    },
}

impl RequestError {
    /// HTTP status code when the server answered with a non-retryable client error
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match *self {
            Self::Status { status, .. } => Some(status),
            Self::Fatal { .. } | Self::Exhausted { .. } => None,
        }
    }
}

/// Build a blocking agent with a global timeout.
///
/// Status codes are not turned into errors by the agent; callers pass the
/// response through [`check_status`] so `Retry-After` stays readable.
#[inline]
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Pass 2xx/3xx responses through, turn everything else into [`AttemptError::Status`]
#[inline]
pub fn check_status(response: Response<Body>) -> Result<Response<Body>, AttemptError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(parse_retry_after);
    Err(AttemptError::Status {
        status,
        retry_after,
    })
}

/// Check the status and read the body as text
#[inline]
pub fn read_text(response: Response<Body>) -> Result<String, AttemptError> {
    let mut response = check_status(response)?;
    Ok(response.body_mut().read_to_string()?)
}

/// `Retry-After` in delay-seconds form, capped. HTTP dates fall back to backoff.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|seconds| Duration::from_secs(seconds).min(MAX_BACKOFF))
}

fn backoff(attempt: u32) -> Duration {
    let factor = EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1));
    Duration::from_secs(factor).min(MAX_BACKOFF)
}

fn is_retryable_status(status: u16) -> bool {
    status == TOO_MANY_REQUESTS || status >= 500
}

/// Run `request_fn` until it succeeds, retrying transport failures, 429 and 5xx
/// responses with exponential backoff. A `Retry-After` header replaces the
/// computed delay. Other client errors (4xx) are returned immediately.
#[inline]
pub fn with_retry<T, F>(target: &str, attempts: u32, mut request_fn: F) -> Result<T, RequestError>
where
    F: FnMut() -> Result<T, AttemptError>,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("HTTP request attempt {}/{} to {}", attempt, attempts, target);

        let error = match request_fn() {
            Ok(value) => {
                debug!("Request succeeded on attempt {}", attempt);
                return Ok(value);
            }
            Err(AttemptError::Transport(ureq::Error::StatusCode(status))) => {
                AttemptError::Status {
                    status,
                    retry_after: None,
                }
            }
            Err(error) => error,
        };

        let mut delay = backoff(attempt);
        match error {
            AttemptError::Status {
                status,
                retry_after,
            } => {
                if !is_retryable_status(status) {
                    warn!("Client error (status {}), not retrying", status);
                    return Err(RequestError::Status {
                        status,
                        target: target.to_string(),
                    });
                }
                warn!(
                    "Retryable status {}, attempt {}/{}",
                    status, attempt, attempts
                );
                if let Some(wait) = retry_after {
                    delay = wait;
                }
            }
            AttemptError::Transport(
                ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound
                | ureq::Error::Timeout(_)
                | ureq::Error::Io(_),
            ) => {
                warn!(
                    "Transport error: {}, attempt {}/{}",
                    error, attempt, attempts
                );
            }
            AttemptError::Transport(source) => {
                warn!("Non-retryable error: {}", source);
                return Err(RequestError::Fatal {
                    target: target.to_string(),
                    source,
                });
            }
        }

        if attempt >= attempts {
            error!("All retry attempts failed for request to {}", target);
            return Err(RequestError::Exhausted {
                target: target.to_string(),
                attempts,
                source: error,
            });
        }

        debug!("Waiting {:?} before retry", delay);
        std::thread::sleep(delay);
    }
}
