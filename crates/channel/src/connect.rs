use std::future::Future;

use tracing::{info, warn};

use crate::config::ConnectRetry;
use crate::error::ChannelError;

/// Run `attempt` until it succeeds or the retry budget is spent.
///
/// Sleeps `retry.delay` between attempts. When every attempt fails the last
/// error is returned inside [`ChannelError::ConnectExhausted`]; the caller is
/// expected to treat that as fatal.
pub async fn connect_with_retry<T, F, Fut>(
    retry: &ConnectRetry,
    mut attempt: F,
) -> Result<T, ChannelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChannelError>>,
{
    let attempts = retry.max_attempts.max(1);
    let mut last_error = String::new();

    for n in 1..=attempts {
        match attempt().await {
            Ok(value) => {
                info!(attempt = n, "channel connected");
                return Ok(value);
            }
            Err(e) => {
                warn!(attempt = n, max_attempts = attempts, error = %e, "channel connect failed");
                last_error = e.to_string();
            }
        }
        if n < attempts {
            tokio::time::sleep(retry.delay).await;
        }
    }

    Err(ChannelError::ConnectExhausted {
        attempts,
        last_error,
    })
}
