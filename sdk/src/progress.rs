use {
    anyhow::{Result, ensure},
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    std::{fmt, sync::Arc},
};

/// Receives the overall upload progress in percent.
pub type ProgressCallback = Box<dyn FnMut(u8) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Local work before any bytes are sent.
    Preparing,
    /// Sending the ciphertext.
    Transfer,
    /// Everything after the endpoint acknowledged the upload.
    Finalize,
}

/// Splits 100% between the phases of an upload.
///
/// `Finalize` gets whatever is left after `preparing` and `transfer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressWeights {
    preparing: u8,
    transfer: u8,
}

impl ProgressWeights {
    #[inline]
    pub fn new(preparing: u8, transfer: u8) -> Result<Self> {
        ensure!(
            u16::from(preparing) + u16::from(transfer) <= 100,
            "progress weights exceed 100% (preparing: {preparing}, transfer: {transfer})"
        );
        Ok(Self {
            preparing,
            transfer,
        })
    }

    #[must_use]
    #[inline]
    pub fn transfer(&self) -> u8 {
        self.transfer
    }

    fn finalize(&self) -> u8 {
        100u8
            .saturating_sub(self.preparing)
            .saturating_sub(self.transfer)
    }

    fn range(&self, phase: Phase) -> (u8, u8) {
        match phase {
            Phase::Preparing => (0, self.preparing),
            Phase::Transfer => (self.preparing, self.transfer),
            Phase::Finalize => (
                self.preparing.saturating_add(self.transfer),
                self.finalize(),
            ),
        }
    }

    /// Overall percentage after `done` of `total` units of `phase` have completed.
    ///
    /// The phase's share is rounded down, so 100 is only reached when the
    /// last phase completes.
    #[must_use]
    #[inline]
    pub fn percentage(&self, phase: Phase, done: u64, total: u64) -> u8 {
        let (start, weight) = self.range(phase);
        let scaled = if total == 0 {
            u128::from(weight)
        } else {
            u128::from(done.min(total)) * u128::from(weight) / u128::from(total)
        };
        let scaled = u8::try_from(scaled).unwrap_or(weight);
        start.saturating_add(scaled).min(100)
    }
}

impl Default for ProgressWeights {
    #[inline]
    fn default() -> Self {
        Self {
            preparing: 0,
            transfer: 90,
        }
    }
}

struct ReporterState {
    last: u8,
    closed: bool,
}

/// Forwards progress of one upload to the caller's callback.
///
/// Only strictly increasing values are forwarded, and nothing is forwarded once
/// the reporter is closed. Clones report into the same state. The callback may
/// inspect or close the reporter, but must not report through it.
#[derive(Clone)]
pub struct ProgressReporter {
    weights: ProgressWeights,
    state: Arc<Mutex<ReporterState>>,
    /// Held while the callback runs so that calls stay ordered.
    callback: Arc<Mutex<ProgressCallback>>,
}

impl ProgressReporter {
    #[must_use]
    #[inline]
    pub fn new(weights: ProgressWeights, callback: ProgressCallback) -> Self {
        Self {
            weights,
            state: Arc::new(Mutex::new(ReporterState {
                last: 0,
                closed: false,
            })),
            callback: Arc::new(Mutex::new(callback)),
        }
    }

    #[must_use]
    #[inline]
    pub fn weights(&self) -> ProgressWeights {
        self.weights
    }

    #[inline]
    pub fn report(&self, phase: Phase, done: u64, total: u64) {
        self.emit(self.weights.percentage(phase, done, total));
    }

    /// Reports 100% and closes the reporter.
    #[inline]
    pub fn complete(&self) {
        self.emit(100);
        self.close();
    }

    /// No callbacks start after this returns.
    #[inline]
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    #[must_use]
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn emit(&self, value: u8) {
        let mut callback = self.callback.lock();
        {
            let mut state = self.state.lock();
            if state.closed || value <= state.last {
                return;
            }
            state.last = value;
        }
        (*callback)(value);
    }
}

impl fmt::Debug for ProgressReporter {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ProgressReporter")
            .field("weights", &self.weights)
            .field("last", &state.last)
            .field("closed", &state.closed)
            .finish()
    }
}
