//! Device-loss recovery
//!
//! Some instruments enumerate and accept the open long before they start
//! streaming. The synchronizer cycles the connection until the driver
//! reports buffered input.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::connection::SerialTransport;
use super::TransportError;

/// Backoff between close and reopen, in milliseconds
const BACKOFF_MS: Range<u64> = 250..350;

/// Granularity of cancellation checks while backing off
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// How a synchronize call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Input is buffered and ready to read
    Ready {
        /// Close/reopen cycles it took
        retries: u32,
    },
    /// The cancellation token fired first
    Cancelled {
        /// Close/reopen cycles performed before cancellation
        retries: u32,
    },
}

impl SyncOutcome {
    /// Whether the device is producing data
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncOutcome::Ready { .. })
    }
}

/// Blocks until an open transport has data waiting
pub struct ReconnectSynchronizer<'a> {
    transport: &'a SerialTransport,
    backoff: Range<u64>,
    rng: StdRng,
}

impl<'a> ReconnectSynchronizer<'a> {
    /// Synchronizer with the standard 250-350 ms jittered backoff
    pub fn new(transport: &'a SerialTransport) -> Self {
        Self {
            transport,
            backoff: BACKOFF_MS,
            rng: StdRng::from_entropy(),
        }
    }

    /// Override the backoff range (milliseconds, end exclusive)
    pub fn with_backoff(mut self, backoff: Range<u64>) -> Self {
        if !backoff.is_empty() {
            self.backoff = backoff;
        }
        self
    }

    /// Use a fixed seed for the jitter
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Wait until `available() > 0`, cycling the connection meanwhile.
    ///
    /// Holds both transport locks for the whole call. There is no retry
    /// limit; pass a token to make the wait abortable. Reopen failures are
    /// logged and retried.
    pub fn synchronize(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<SyncOutcome, TransportError> {
        let transport = self.transport;
        let (mut reader, mut writer) = transport.lock_both();
        if !transport.is_open() {
            return Err(TransportError::NotOpen);
        }
        if transport.available_locked(&mut reader)? > 0 {
            return Ok(SyncOutcome::Ready { retries: 0 });
        }

        tracing::info!(
            "{} unavailable, cycling the port until data arrives",
            transport.port()
        );

        let mut retries = 0u32;
        loop {
            if is_cancelled(cancel) {
                tracing::info!("synchronize cancelled after {} retries", retries);
                return Ok(SyncOutcome::Cancelled { retries });
            }

            if transport.is_open() {
                if let Err(e) = transport.flush_locked(&mut writer) {
                    tracing::debug!("synchronize: flush failed: {}", e);
                }
                if let Err(e) = transport.purge_locked(&mut reader, &mut writer) {
                    tracing::debug!("synchronize: purge failed: {}", e);
                }
            }
            transport.close_locked(&mut reader, &mut writer);

            let pause = Duration::from_millis(self.rng.gen_range(self.backoff.clone()));
            if !sleep_unless_cancelled(pause, cancel) {
                tracing::info!("synchronize cancelled after {} retries", retries);
                return Ok(SyncOutcome::Cancelled { retries });
            }

            retries += 1;
            if let Err(e) = transport.open_locked(&mut reader, &mut writer) {
                tracing::warn!("synchronize: reopen #{} failed: {}", retries, e);
                continue;
            }
            tracing::debug!("synchronize: reopen #{}", retries);

            match transport.available_locked(&mut reader) {
                Ok(n) if n > 0 => {
                    tracing::info!("{} ready after {} retries", transport.port(), retries);
                    return Ok(SyncOutcome::Ready { retries });
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("synchronize: {}", e),
            }
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

/// Sleep for `duration` in short slices; false if cancelled meanwhile
pub(crate) fn sleep_unless_cancelled(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if is_cancelled(cancel) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(CANCEL_POLL));
    }
}
