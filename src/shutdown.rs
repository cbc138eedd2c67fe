//! Ctrl-C / SIGTERM handling
//!
//! A signal only raises a flag. The command loops poll it and leave through
//! their normal path, so the station still disconnects and the crosshead is
//! stopped. A second signal exits immediately.

use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Exit status used when a second signal cuts shutdown short
const FORCED_EXIT_CODE: i32 = 130;

/// Granularity of [`ShutdownSignal::sleep`]
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shared "please stop" flag
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to wind down
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until shutdown is requested
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }

    /// Raise this flag on SIGINT or SIGTERM (Ctrl-C on Windows)
    ///
    /// The handlers run on a dedicated thread with a single-threaded tokio
    /// runtime.
    pub fn install_handlers(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let signal = self.clone();
        std::thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || runtime.block_on(signal.watch()))?;

        tracing::debug!("Signal handlers installed");
        Ok(())
    }

    #[cfg(unix)]
    async fn watch(self) {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        loop {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            self.on_signal(name);
        }
    }

    #[cfg(windows)]
    async fn watch(self) {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install Ctrl-C handler: {}", e);
                return;
            }
            self.on_signal("Ctrl-C");
        }
    }

    fn on_signal(&self, name: &str) {
        if self.is_requested() {
            tracing::error!("Received {} again - exiting without cleanup", name);
            std::process::exit(FORCED_EXIT_CODE);
        }
        tracing::warn!("Received {} - stopping the crosshead and shutting down", name);
        self.request();
    }
}
