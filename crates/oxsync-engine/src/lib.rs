//! Bidirectional, event-driven encrypt/decrypt directory synchronization.
//!
//! Two [`SyncSession`]s mirror a plaintext root and a ciphertext root into each
//! other. Each session blocks on its own directory watch, classifies the
//! drained notifications and hands every file operation to a
//! [`CryptoBoundary`](oxsync_core::CryptoBoundary) while holding the shared
//! [`MutualExclusionGate`].
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use oxsync_core::WalletProvider;
//! use oxsync_engine::{Supervisor, SyncConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = Supervisor::start(
//!     Path::new("/home/me/plain"),
//!     Path::new("/home/me/enc"),
//!     SyncConfig::from_env(),
//!     Arc::new(WalletProvider::new()),
//! )?;
//! handle.shutdown();
//! let report = handle.join()?;
//! println!("{report:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gate;
pub mod notification;
pub mod session;
pub mod shutdown;
pub mod supervisor;
pub mod watch;

pub use config::{IdentitySource, ReadMode, SyncConfig};
pub use gate::{GateMetrics, GateMetricsSnapshot, GatePermit, MutualExclusionGate};
pub use notification::{ChangeKind, ChangeNotification};
pub use session::{
    Direction, Dispatch, EventOutcome, SessionContext, SessionError, SessionExit, SessionState,
    SkipReason, SyncAction, SyncSession,
};
pub use shutdown::ShutdownSignal;
pub use supervisor::{Supervisor, SupervisorError, SupervisorHandle, SupervisorReport};
pub use watch::{Interrupter, WatchError, WatchHandle, register};
