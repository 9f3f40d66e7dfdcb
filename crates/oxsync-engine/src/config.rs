//! Engine configuration.
//!
//! There are no flags and no configuration file. Defaults reproduce the
//! reference behavior; a handful of environment variables can override them
//! (see [`SyncConfig::from_env`]).

use std::str::FromStr;
use std::time::Duration;

use oxsync_core::REFERENCE_SEED;
use tracing::warn;

/// Largest number of bytes captured by a single encrypt read (32 KiB).
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 32 * 1024;

/// Interval used by polling watcher backends.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Platform metadata files that are never synchronized.
pub const DEFAULT_NOISE_NAMES: &[&str] = &[".DS_Store"];

pub const ENV_READ_MODE: &str = "OXSYNC_READ_MODE";
pub const ENV_MAX_CHUNK_SIZE: &str = "OXSYNC_MAX_CHUNK_SIZE";
pub const ENV_GATE_DELETES: &str = "OXSYNC_GATE_DELETES";
pub const ENV_RANDOM_IDENTITY: &str = "OXSYNC_RANDOM_IDENTITY";

/// How the encrypting session reads a plaintext file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// One bounded read of at most `max_chunk_size` bytes. Larger files are
    /// truncated to that size.
    #[default]
    SingleRead,
    /// Read until end-of-file and encrypt the whole file.
    ToEnd,
}

impl FromStr for ReadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "single-read" => Ok(ReadMode::SingleRead),
            "full" | "to-end" => Ok(ReadMode::ToEnd),
            other => Err(format!("unknown read mode '{other}' (expected 'single' or 'full')")),
        }
    }
}

/// Where session identities come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// Derive both identities from a fixed seed. Reproducible, for tests and
    /// parity with the reference setup only.
    FixedSeed(String),
    /// Fresh random identities per run.
    Random,
}

impl Default for IdentitySource {
    fn default() -> Self {
        IdentitySource::FixedSeed(REFERENCE_SEED.to_string())
    }
}

/// Configuration shared by both sync sessions.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Read buffer size for the encrypt path.
    ///
    /// Default: 32768 bytes.
    pub max_chunk_size: usize,

    /// Single bounded read (default) or read to end-of-file.
    pub read_mode: ReadMode,

    /// Exact base names that are skipped under every event kind.
    pub noise_names: Vec<String>,

    /// Take the gate around counterpart deletes as well as encrypt/decrypt.
    ///
    /// Default: true.
    pub gate_deletes: bool,

    /// Poll interval for watcher backends that poll.
    pub poll_interval: Duration,

    pub identity: IdentitySource,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            read_mode: ReadMode::default(),
            noise_names: DEFAULT_NOISE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            gate_deletes: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
            identity: IdentitySource::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with `OXSYNC_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_READ_MODE) {
            match raw.parse() {
                Ok(mode) => config.read_mode = mode,
                Err(e) => warn!(variable = ENV_READ_MODE, "Ignoring: {e}"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_CHUNK_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => config.max_chunk_size = size,
                _ => warn!(
                    variable = ENV_MAX_CHUNK_SIZE,
                    value = %raw,
                    "Ignoring invalid chunk size"
                ),
            }
        }

        if let Some(raw) = lookup(ENV_GATE_DELETES) {
            match parse_flag(&raw) {
                Some(flag) => config.gate_deletes = flag,
                None => warn!(
                    variable = ENV_GATE_DELETES,
                    value = %raw,
                    "Ignoring invalid boolean"
                ),
            }
        }

        if let Some(raw) = lookup(ENV_RANDOM_IDENTITY) {
            match parse_flag(&raw) {
                Some(true) => config.identity = IdentitySource::Random,
                Some(false) => {}
                None => warn!(
                    variable = ENV_RANDOM_IDENTITY,
                    value = %raw,
                    "Ignoring invalid boolean"
                ),
            }
        }

        config
    }

    #[must_use]
    pub fn max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    #[must_use]
    pub fn read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    #[must_use]
    pub fn noise_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.noise_names = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn gate_deletes(mut self, gate: bool) -> Self {
        self.gate_deletes = gate;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn identity(mut self, source: IdentitySource) -> Self {
        self.identity = source;
        self
    }

    /// Whether `name` is a platform artifact that must never be synchronized.
    pub fn is_noise(&self, name: &str) -> bool {
        self.noise_names.iter().any(|noise| noise == name)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
