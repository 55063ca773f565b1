use {
    std::sync::Arc,
    tokio::sync::watch,
    tracing::debug,
};

/// Single-use cancellation token of an upload.
///
/// Clones observe the same token. Aborting more than once has no effect.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Returns `false` if the handle had already been triggered.
    #[inline]
    pub fn abort(&self) -> bool {
        let triggered = self.sender.send_if_modified(|aborted| {
            if *aborted {
                false
            } else {
                *aborted = true;
                true
            }
        });
        if triggered {
            debug!("abort requested");
        }
        triggered
    }

    #[must_use]
    #[inline]
    pub fn is_aborted(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the handle is triggered.
    #[inline]
    pub async fn aborted(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives as long as `self`, so waiting can't fail.
        let _ = receiver.wait_for(|aborted| *aborted).await;
    }
}

impl Default for AbortHandle {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
