use {
    crate::abort::AbortHandle,
    anyhow::{Context, Result},
    derive_more::Display,
    futures::{FutureExt, future::select},
    parking_lot::Mutex,
    std::{future::Future, pin::pin, sync::Arc},
    tokio::{signal::ctrl_c, task::JoinHandle},
    tracing::{info, warn},
};

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Sigint,
    Sigterm,
}

pub async fn shutdown_signal() -> Result<ShutdownSignal> {
    let sigint = ctrl_c().map(|signal| {
        signal
            .map(|()| ShutdownSignal::Sigint)
            .context("failed to install sigint signal handler")
    });
    let sigint = pin!(sigint);
    let sigterm = sigterm()
        .context("failed to install sigterm signal handler")?
        .map(|()| Ok(ShutdownSignal::Sigterm));
    let sigterm = pin!(sigterm);
    let (signal, _unfired_signal) = select(sigint, sigterm).await.factor_first();
    signal
}

fn sigterm() -> Result<impl Future<Output = ()>> {
    #[cfg(target_family = "unix")]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(async move {
            sigterm.recv().await;
        })
    }

    #[cfg(not(target_family = "unix"))]
    Ok(std::future::pending())
}

/// Resolves on the first SIGINT or SIGTERM. Never resolves if the handlers can't be installed.
///
/// Once polled, tokio keeps handling these signals for the rest of the process,
/// so a caller that keeps running after its uploads must keep listening itself.
#[inline]
pub async fn interrupted() {
    match shutdown_signal().await {
        Ok(signal) => info!(%signal, "interrupted"),
        Err(err) => {
            warn!(?err, "interrupt handling is unavailable");
            std::future::pending::<()>().await;
        }
    }
}

/// Aborts registered uploads when the process is interrupted.
///
/// The listener is removed when the guard is dropped. Interrupts arriving after
/// that abort nothing and are not turned back into the default behavior.
#[derive(Debug)]
pub struct InterruptGuard {
    /// `None` once the interrupt has fired.
    handles: Arc<Mutex<Option<Vec<AbortHandle>>>>,
    listener: JoinHandle<()>,
}

impl InterruptGuard {
    /// Listens for SIGINT and SIGTERM.
    #[must_use]
    #[inline]
    pub fn install(handle: AbortHandle) -> Self {
        Self::with_trigger(handle, interrupted())
    }

    /// Aborts the registered handles when `trigger` resolves.
    #[must_use]
    #[inline]
    pub fn with_trigger(
        handle: AbortHandle,
        trigger: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        let handles = Arc::new(Mutex::new(Some(vec![handle])));
        let listener = tokio::spawn({
            let handles = Arc::clone(&handles);
            async move {
                trigger.await;
                let fired = handles.lock().take();
                for handle in fired.into_iter().flatten() {
                    handle.abort();
                }
            }
        });
        Self { handles, listener }
    }

    #[inline]
    pub fn register(&self, handle: AbortHandle) {
        let mut handles = self.handles.lock();
        match &mut *handles {
            Some(handles) => handles.push(handle),
            None => {
                handle.abort();
            }
        }
    }
}

impl Drop for InterruptGuard {
    #[inline]
    fn drop(&mut self) {
        self.listener.abort();
    }
}
