//! Bounded-attempt, jittered exponential backoff for optimistic-lock
//! conflicts (spec §4.1 "Status-update retry", reused by §4.2's patch
//! discipline): roughly 5 attempts, starting at 10ms, growing by a small
//! factor, jittered. One shared helper so both call sites get the same
//! schedule instead of drifting apart.

use rand::Rng;
use std::time::Duration;

use super::Error;

const MAX_ATTEMPTS: u32 = 5;
const BASE: Duration = Duration::from_millis(10);
const GROWTH: f64 = 2.0;

/// Runs `op` up to `MAX_ATTEMPTS` times, sleeping a jittered exponential
/// backoff between attempts whenever `op` fails with a conflict. Any
/// non-conflict error is returned immediately without retrying. Exhausting
/// all attempts on a conflict returns [`Error::ConflictExhausted`].
pub async fn with_conflict_retry<T, F, Fut>(mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                let backoff = jittered_delay(attempt);
                tracing::debug!(attempt, ?backoff, "retrying after optimistic lock conflict");
                tokio::time::sleep(backoff).await;
            }
            Err(e) if e.is_conflict() => {
                return Err(Error::ConflictExhausted { attempts: attempt });
            }
            Err(e) => return Err(e),
        }
    }
}

fn jittered_delay(attempt: u32) -> Duration {
    let scale = GROWTH.powi(attempt as i32 - 1);
    let base_ms = (BASE.as_millis() as f64) * scale;
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((base_ms * jitter).round() as u64)
}
