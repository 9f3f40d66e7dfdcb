//! Termination signal handling with signal-hook.
//!
//! The first SIGINT/SIGTERM/SIGHUP requests a graceful shutdown: sessions are
//! interrupted and joined. A second signal exits the process immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing::info;

#[cfg(unix)]
use signal_hook::consts::signal::SIGHUP;

const MONITOR_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

/// Cloneable shutdown flag with a blocking wait.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal and wire it to the process termination signals.
    pub fn install() -> std::io::Result<Self> {
        let signal = Self::new();

        // Arc-based flag for signal-hook
        let raised = Arc::new(AtomicBool::new(false));
        for &sig in TERM_SIGNALS {
            // Second signal terminates immediately if shutdown already requested
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&raised))?;
            flag::register(sig, Arc::clone(&raised))?;
        }
        #[cfg(unix)]
        {
            flag::register_conditional_shutdown(SIGHUP, 1, Arc::clone(&raised))?;
            flag::register(SIGHUP, Arc::clone(&raised))?;
        }

        // Signal handlers cannot notify a condvar, so a monitor thread forwards the flag
        let forward = signal.clone();
        std::thread::Builder::new()
            .name("oxsync-signal".into())
            .spawn(move || {
                while !raised.load(Ordering::Relaxed) {
                    if forward.is_requested() {
                        return;
                    }
                    std::thread::sleep(MONITOR_INTERVAL);
                }
                info!("Shutdown requested (send the signal again to force exit)");
                forward.request();
            })?;

        Ok(signal)
    }

    /// Request shutdown and wake every waiter.
    pub fn request(&self) {
        let _guard = self.inner.lock.lock();
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.cvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        let mut guard = self.inner.lock.lock();
        while !self.is_requested() {
            self.inner.cvar.wait(&mut guard);
        }
    }

    /// Block until shutdown is requested or `timeout` expires. Returns whether
    /// shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.inner.lock.lock();
        if self.is_requested() {
            return true;
        }
        let _ = self.inner.cvar.wait_for(&mut guard, timeout);
        self.is_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();
        let handle = thread::spawn(move || waiter.wait());
        thread::sleep(Duration::from_millis(20));
        signal.request();
        handle.join().unwrap();
        assert!(signal.is_requested());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.request();
        assert!(signal.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_install_succeeds() {
        let signal = ShutdownSignal::install().unwrap();
        assert!(!signal.is_requested());
        // Stops the monitor thread
        signal.request();
    }
}
