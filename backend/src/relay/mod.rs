//! Live device video relay.
//!
//! A relay session bridges a pull-based camera source into a push-based
//! client connection: it looks the device up, probes it, opens the RTSP
//! source with decrypted credentials and pushes JPEG frames until the
//! client leaves, the source fails or the server shuts down.

pub mod credentials;
pub mod encoder;
pub mod probe;
pub mod session;
pub mod source;
pub mod vendor;
pub mod video_frame;

pub use credentials::{build_source_url, SecretCipher, SecretError, SecretStore};
pub use probe::{PingProber, ProbeOutcome, Prober};
pub use session::{
    ClientChannel, DeviceDirectory, PushOutcome, RelayDeps, RelayMessage, RelaySession, SessionExit,
    SessionReport, TransportError,
};
pub use source::{
    open_on_blocking_pool, FrameSource, GstSourceOpener, ReadOutcome, SourceError, SourceOpener,
};
pub use vendor::StreamProfile;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default JPEG quality for relayed frames.
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

/// Timing and encoding parameters for relay sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upper bound on the reachability probe
    pub probe_timeout_ms: u64,
    /// Upper bound on opening the source pipeline
    pub open_timeout_ms: u64,
    /// Upper bound on a single frame read
    pub pull_timeout_ms: u64,
    /// Delay after each pushed frame
    pub frame_interval_ms: u64,
    /// Delay before retrying when no frame was ready
    pub retry_backoff_ms: u64,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2_000,
            open_timeout_ms: 10_000,
            pull_timeout_ms: 100,
            frame_interval_ms: 30,
            retry_backoff_ms: 20,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl RelayConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// JPEG quality clamped to the encoder's valid range.
    pub fn quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}
