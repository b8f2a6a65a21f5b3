//! Global in-flight request ceiling with per-endpoint accounting.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::denial::Denial;

/// Default ceiling on requests executing at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 50;

#[derive(Debug, Default)]
struct InFlight {
    /// Sum of all per-endpoint counts
    total: usize,
    /// Active requests per endpoint; entries at zero are removed
    endpoints: HashMap<String, usize>,
}

/// Caps the number of requests executing at once across all endpoints.
///
/// The ceiling check and the increment happen under one lock, so two requests
/// can never both take the last slot.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    in_flight: Mutex<InFlight>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    /// Admit a request to `endpoint` if the global ceiling allows it.
    ///
    /// A refused request leaves every counter untouched. An admitted request
    /// holds its slot until the returned permit is dropped.
    pub fn try_acquire(self: &Arc<Self>, endpoint: &str) -> Result<ConcurrencyPermit, Denial> {
        let mut in_flight = self.in_flight.lock();

        if in_flight.total >= self.max_concurrent {
            debug!(
                endpoint = %endpoint,
                in_flight = in_flight.total,
                max_concurrent = self.max_concurrent,
                "Concurrency ceiling reached"
            );
            return Err(Denial::TooBusy);
        }

        in_flight.total += 1;
        let active = in_flight.endpoints.entry(endpoint.to_string()).or_insert(0);
        *active += 1;
        trace!(endpoint = %endpoint, active = *active, "Request admitted");

        Ok(ConcurrencyPermit {
            limiter: Arc::clone(self),
            endpoint: endpoint.to_string(),
        })
    }

    /// Run `f` while holding a slot for `endpoint`.
    ///
    /// The slot is returned whether `f` returns normally or panics.
    pub fn run<T>(self: &Arc<Self>, endpoint: &str, f: impl FnOnce() -> T) -> Result<T, Denial> {
        let _permit = self.try_acquire(endpoint)?;
        Ok(f())
    }

    fn release(&self, endpoint: &str) {
        let mut in_flight = self.in_flight.lock();

        let remaining = match in_flight.endpoints.get_mut(endpoint) {
            Some(active) => {
                *active = active.saturating_sub(1);
                *active
            }
            None => return,
        };
        if remaining == 0 {
            in_flight.endpoints.remove(endpoint);
        }
        in_flight.total = in_flight.total.saturating_sub(1);
        trace!(endpoint = %endpoint, active = remaining, "Request released");
    }

    /// Requests currently executing against one endpoint.
    pub fn in_flight(&self, endpoint: &str) -> usize {
        self.in_flight.lock().endpoints.get(endpoint).copied().unwrap_or(0)
    }

    /// Requests currently executing across all endpoints.
    pub fn total_in_flight(&self) -> usize {
        self.in_flight.lock().total
    }

    /// Copy of the per-endpoint counts.
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.in_flight.lock().endpoints.clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// A held in-flight slot. Dropping it releases the slot exactly once.
#[derive(Debug)]
pub struct ConcurrencyPermit {
    limiter: Arc<ConcurrencyLimiter>,
    endpoint: String,
}

impl ConcurrencyPermit {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        self.limiter.release(&self.endpoint);
    }
}
