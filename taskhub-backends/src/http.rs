//! Shared `ureq` plumbing: agent construction and error classification.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use taskhub_sync::{SourceError, StorageError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_BODY_IN_ERROR: usize = 512;

pub(crate) fn agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .user_agent(concat!("taskhub/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Strip trailing slashes so paths can be appended with `format!`.
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn body_excerpt(response: ureq::Response) -> String {
    let mut body = response.into_string().unwrap_or_default();
    if body.len() > MAX_BODY_IN_ERROR {
        let mut cut = MAX_BODY_IN_ERROR;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

/// Wait hint from `retry-after` (seconds) or `x-ratelimit-reset` (epoch seconds).
fn rate_limit_hint(response: &ureq::Response) -> Option<Duration> {
    if let Some(secs) = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return Some(Duration::from_secs(secs));
    }
    let reset = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<u64>().ok())?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    Some(Duration::from_secs(reset.saturating_sub(now)))
}

fn is_throttled(status: u16, response: &ureq::Response) -> bool {
    match status {
        429 => true,
        403 => {
            response.header("x-ratelimit-remaining") == Some("0")
                || response.header("retry-after").is_some()
        }
        _ => false,
    }
}

/// Map a failed source request. Throttling becomes the recoverable
/// [`SourceError::RateLimited`]; everything else is final.
pub(crate) fn source_error(err: ureq::Error) -> SourceError {
    match err {
        ureq::Error::Status(status, response) => {
            if is_throttled(status, &response) {
                let retry_after = rate_limit_hint(&response);
                return SourceError::RateLimited {
                    message: format!("HTTP {status}: {}", body_excerpt(response)),
                    retry_after,
                };
            }
            let message = body_excerpt(response);
            match status {
                401 => SourceError::Auth(message),
                _ => SourceError::Http { status, message },
            }
        }
        ureq::Error::Transport(transport) => SourceError::Transport(transport.to_string()),
    }
}

pub(crate) fn storage_error(err: ureq::Error) -> StorageError {
    match err {
        ureq::Error::Status(status, response) => StorageError::Http {
            status,
            message: body_excerpt(response),
        },
        ureq::Error::Transport(transport) => StorageError::Transport(transport.to_string()),
    }
}

pub(crate) fn source_decode(err: std::io::Error) -> SourceError {
    SourceError::Decode(err.to_string())
}

pub(crate) fn storage_decode(err: std::io::Error) -> StorageError {
    StorageError::Decode(err.to_string())
}
