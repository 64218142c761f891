//! Relay session state machine.
//!
//! One session serves one client connection:
//! `Connecting -> Lookup -> Probing -> Opening -> Streaming -> Closing -> Closed`.
//! Any failure emits at most one status message and jumps to `Closing`,
//! which releases the source and closes the connection exactly once.

use async_trait::async_trait;
use std::fmt;
use tardet_types::{Company, CompanyId, Device, DeviceId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::credentials::{build_source_url, SecretStore};
use super::encoder;
use super::probe::{ProbeOutcome, Prober};
use super::source::{FrameSource, ReadOutcome, SourceOpener};
use super::vendor::StreamProfile;
use super::RelayConfig;

/// Extra time allowed beyond the probe timeout before the session gives up.
const PROBE_GRACE: std::time::Duration = std::time::Duration::from_millis(500);

/// Read access to device and vendor records.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get_device(&self, id: DeviceId) -> Option<Device>;
    async fn get_company(&self, id: CompanyId) -> Option<Company>;
}

/// A message sent to the client as `<status>|<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    DeviceNotFound,
    VendorNotFound,
    Unreachable,
    ProbeTimeout,
    CannotOpenStream,
    InvalidStream,
    /// A JPEG data URI
    Frame(String),
}

impl RelayMessage {
    pub fn status_code(&self) -> u16 {
        match self {
            RelayMessage::DeviceNotFound | RelayMessage::VendorNotFound => 404,
            RelayMessage::Unreachable
            | RelayMessage::ProbeTimeout
            | RelayMessage::CannotOpenStream
            | RelayMessage::InvalidStream => 400,
            RelayMessage::Frame(_) => 200,
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            RelayMessage::DeviceNotFound => "device not found",
            RelayMessage::VendorNotFound => "vendor not found",
            RelayMessage::Unreachable => "unreachable",
            RelayMessage::ProbeTimeout => "probe timeout",
            RelayMessage::CannotOpenStream => "cannot open stream",
            RelayMessage::InvalidStream => "invalid stream",
            RelayMessage::Frame(data) => data,
        }
    }
}

impl fmt::Display for RelayMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.status_code(), self.payload())
    }
}

/// The client connection is gone.
#[derive(Debug, Error)]
#[error("client transport closed: {0}")]
pub struct TransportError(pub String);

/// What happened to a pushed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The outbound slot was still occupied
    Dropped,
}

/// The client side of a relay session.
#[async_trait]
pub trait ClientChannel: Send {
    fn is_open(&self) -> bool;

    /// Send a status message, waiting for it to be queued.
    async fn send_status(&mut self, message: RelayMessage) -> Result<(), TransportError>;

    /// Offer a frame without waiting; frames may be dropped under backpressure.
    fn push_frame(&mut self, message: RelayMessage) -> Result<PushOutcome, TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Lookup,
    Probing,
    Opening,
    Streaming,
    Closing,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    DeviceNotFound,
    VendorNotFound,
    Unreachable,
    ProbeTimeout,
    InvalidStream,
    OpenFailed,
    ClientGone,
    TransportClosed,
    EndOfStream,
    SourceFailed(String),
    EncodeFailed(String),
    Cancelled,
}

impl SessionExit {
    /// Whether the session ended without a fault on either side.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            SessionExit::ClientGone | SessionExit::TransportClosed | SessionExit::Cancelled
        )
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub device_id: String,
    pub exit: SessionExit,
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Holds the open source and releases it exactly once.
#[derive(Default)]
struct SourceSlot {
    source: Option<Box<dyn FrameSource>>,
}

impl SourceSlot {
    fn fill(&mut self, source: Box<dyn FrameSource>) {
        self.release();
        self.source = Some(source);
    }

    fn get_mut(&mut self) -> Option<&mut (dyn FrameSource + 'static)> {
        self.source.as_deref_mut()
    }

    fn release(&mut self) -> bool {
        match self.source.take() {
            Some(mut source) => {
                source.release();
                true
            }
            None => false,
        }
    }
}

impl Drop for SourceSlot {
    fn drop(&mut self) {
        self.release();
    }
}

/// Collaborators a relay session needs.
#[derive(Clone, Copy)]
pub struct RelayDeps<'a> {
    pub directory: &'a dyn DeviceDirectory,
    pub secrets: &'a dyn SecretStore,
    pub prober: &'a dyn Prober,
    pub opener: &'a dyn SourceOpener,
}

/// One client's viewing session for one device.
pub struct RelaySession<'a> {
    deps: RelayDeps<'a>,
    config: RelayConfig,
    cancel: CancellationToken,
    phase: Phase,
    source: SourceSlot,
    frames_sent: u64,
    frames_dropped: u64,
}

impl<'a> RelaySession<'a> {
    pub fn new(deps: RelayDeps<'a>, config: RelayConfig, cancel: CancellationToken) -> Self {
        Self {
            deps,
            config,
            cancel,
            phase: Phase::Connecting,
            source: SourceSlot::default(),
            frames_sent: 0,
            frames_dropped: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the session to completion on an accepted connection.
    pub async fn run<C: ClientChannel>(mut self, device_id: &str, channel: &mut C) -> SessionReport {
        let exit = self.drive(device_id, channel).await;

        self.enter(Phase::Closing);
        if self.source.release() {
            debug!("Released source for device {}", device_id);
        }
        channel.close().await;
        self.enter(Phase::Closed);

        SessionReport {
            device_id: device_id.to_string(),
            exit,
            frames_sent: self.frames_sent,
            frames_dropped: self.frames_dropped,
        }
    }

    fn enter(&mut self, phase: Phase) {
        trace!("Relay session {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    async fn drive<C: ClientChannel>(&mut self, raw_id: &str, channel: &mut C) -> SessionExit {
        self.enter(Phase::Lookup);

        let device = match Uuid::parse_str(raw_id) {
            Ok(id) => self.deps.directory.get_device(id).await,
            Err(_) => None,
        };
        let Some(device) = device else {
            return reject(channel, RelayMessage::DeviceNotFound, SessionExit::DeviceNotFound)
                .await;
        };

        let company = match device.company_id {
            Some(company_id) => self.deps.directory.get_company(company_id).await,
            None => None,
        };
        let Some(company) = company else {
            return reject(channel, RelayMessage::VendorNotFound, SessionExit::VendorNotFound)
                .await;
        };

        self.enter(Phase::Probing);
        let probe_timeout = self.config.probe_timeout();
        let probe = tokio::time::timeout(
            probe_timeout + PROBE_GRACE,
            self.deps.prober.probe(&device.ip_address, probe_timeout),
        );
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return SessionExit::Cancelled,
            outcome = probe => outcome.unwrap_or(ProbeOutcome::TimedOut),
        };
        match outcome {
            ProbeOutcome::Reachable => {}
            ProbeOutcome::Unreachable => {
                return reject(channel, RelayMessage::Unreachable, SessionExit::Unreachable).await;
            }
            ProbeOutcome::TimedOut => {
                return reject(channel, RelayMessage::ProbeTimeout, SessionExit::ProbeTimeout)
                    .await;
            }
        }

        self.enter(Phase::Opening);
        let profile = StreamProfile::for_company(&company);
        let url = match build_source_url(&device, &profile, self.deps.secrets) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build stream URL for device {}: {}", device.id, e);
                return reject(channel, RelayMessage::InvalidStream, SessionExit::InvalidStream)
                    .await;
            }
        };

        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return SessionExit::Cancelled,
            opened = self.deps.opener.open(&url) => opened,
        };
        match opened {
            Ok(source) => self.source.fill(source),
            Err(e) => {
                warn!("Cannot open stream for device {}: {}", device.id, e);
                return reject(channel, RelayMessage::CannotOpenStream, SessionExit::OpenFailed)
                    .await;
            }
        }

        self.enter(Phase::Streaming);
        info!("Streaming device {} ({})", device.name, device.id);
        self.stream(channel).await
    }

    async fn stream<C: ClientChannel>(&mut self, channel: &mut C) -> SessionExit {
        loop {
            if self.cancel.is_cancelled() {
                return SessionExit::Cancelled;
            }
            if !channel.is_open() {
                return SessionExit::ClientGone;
            }

            let Some(source) = self.source.get_mut() else {
                return SessionExit::SourceFailed("source not open".to_string());
            };
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return SessionExit::Cancelled,
                outcome = source.read_frame() => outcome,
            };

            match outcome {
                ReadOutcome::NoFrameYet => {
                    if pause(&self.cancel, self.config.retry_backoff()).await {
                        return SessionExit::Cancelled;
                    }
                }
                ReadOutcome::EndOfStream => {
                    info!("Source reached end of stream");
                    return SessionExit::EndOfStream;
                }
                ReadOutcome::Failed(reason) => {
                    warn!("Source read failed: {}", reason);
                    return SessionExit::SourceFailed(reason);
                }
                ReadOutcome::Frame(frame) => {
                    let quality = self.config.quality();
                    let encoded =
                        tokio::task::spawn_blocking(move || encoder::encode_frame(&frame, quality))
                            .await;
                    let data = match encoded {
                        Ok(Ok(data)) => data,
                        Ok(Err(e)) => {
                            warn!("Failed to encode frame: {}", e);
                            return SessionExit::EncodeFailed(e.to_string());
                        }
                        Err(e) => {
                            warn!("Frame encode task failed: {}", e);
                            return SessionExit::EncodeFailed(e.to_string());
                        }
                    };

                    match channel.push_frame(RelayMessage::Frame(data)) {
                        Ok(PushOutcome::Delivered) => self.frames_sent += 1,
                        Ok(PushOutcome::Dropped) => {
                            self.frames_dropped += 1;
                            trace!("Client slow, frame dropped");
                        }
                        Err(e) => {
                            debug!("{}", e);
                            return SessionExit::TransportClosed;
                        }
                    }

                    if pause(&self.cancel, self.config.frame_interval()).await {
                        return SessionExit::Cancelled;
                    }
                }
            }
        }
    }
}

/// Sleep unless cancelled first. Returns true on cancellation.
async fn pause(cancel: &CancellationToken, duration: std::time::Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Report a failure to the client and end the session.
async fn reject<C: ClientChannel>(
    channel: &mut C,
    message: RelayMessage,
    exit: SessionExit,
) -> SessionExit {
    debug!("Rejecting relay session: {}", message);
    if let Err(e) = channel.send_status(message).await {
        debug!("{}", e);
    }
    exit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::credentials::SecretCipher;
    use crate::relay::source::{open_on_blocking_pool, SourceError};
    use image::{Rgb, RgbImage};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};
    use tardet_types::VendorKind;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct FakeDirectory {
        devices: HashMap<DeviceId, Device>,
        companies: HashMap<CompanyId, Company>,
    }

    #[async_trait]
    impl DeviceDirectory for FakeDirectory {
        async fn get_device(&self, id: DeviceId) -> Option<Device> {
            self.devices.get(&id).cloned()
        }

        async fn get_company(&self, id: CompanyId) -> Option<Company> {
            self.companies.get(&id).cloned()
        }
    }

    struct FakeProber {
        outcome: ProbeOutcome,
        calls: AtomicUsize,
    }

    impl FakeProber {
        fn new(outcome: ProbeOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, _host: &str, _timeout: Duration) -> ProbeOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    struct FakeSource {
        script: VecDeque<ReadOutcome>,
        hang_when_done: bool,
        releases: Arc<AtomicUsize>,
        released: bool,
    }

    impl FakeSource {
        fn new(
            script: VecDeque<ReadOutcome>,
            hang_when_done: bool,
            releases: Arc<AtomicUsize>,
        ) -> Self {
            Self {
                script,
                hang_when_done,
                releases,
                released: false,
            }
        }
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            self.release();
        }
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        async fn read_frame(&mut self) -> ReadOutcome {
            match self.script.pop_front() {
                Some(outcome) => outcome,
                None if self.hang_when_done => std::future::pending().await,
                None => ReadOutcome::EndOfStream,
            }
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.releases.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeOpener {
        script: Vec<ReadOutcome>,
        hang_when_done: bool,
        fail: bool,
        /// Open on the blocking pool, taking this long
        open_delay: Option<Duration>,
        opens: AtomicUsize,
        releases: Arc<AtomicUsize>,
        last_url: Mutex<Option<String>>,
    }

    impl FakeOpener {
        fn new(script: Vec<ReadOutcome>) -> Self {
            Self {
                script,
                hang_when_done: false,
                fail: false,
                open_delay: None,
                opens: AtomicUsize::new(0),
                releases: Arc::new(AtomicUsize::new(0)),
                last_url: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SourceOpener for FakeOpener {
        async fn open(&self, url: &str) -> Result<Box<dyn FrameSource>, SourceError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.to_string());
            if self.fail {
                return Err(SourceError::Start("connection refused".to_string()));
            }
            let source = FakeSource::new(
                self.script.clone().into(),
                self.hang_when_done,
                self.releases.clone(),
            );
            match self.open_delay {
                Some(delay) => {
                    open_on_blocking_pool(move || {
                        std::thread::sleep(delay);
                        Ok(Box::new(source) as Box<dyn FrameSource>)
                    })
                    .await
                }
                None => Ok(Box::new(source)),
            }
        }
    }

    #[derive(Default)]
    struct FakeChannel {
        sent: Vec<(Instant, String)>,
        closes: usize,
        open: bool,
        /// Report the peer gone after this many frames
        gone_after_frames: Option<usize>,
        /// Fail pushes after this many frames
        fail_after_frames: Option<usize>,
        frames: usize,
    }

    impl FakeChannel {
        fn new() -> Self {
            Self {
                open: true,
                ..Default::default()
            }
        }

        fn messages(&self) -> Vec<String> {
            self.sent.iter().map(|(_, m)| m.clone()).collect()
        }
    }

    #[async_trait]
    impl ClientChannel for FakeChannel {
        fn is_open(&self) -> bool {
            self.open
        }

        async fn send_status(&mut self, message: RelayMessage) -> Result<(), TransportError> {
            self.sent.push((Instant::now(), message.to_string()));
            Ok(())
        }

        fn push_frame(&mut self, message: RelayMessage) -> Result<PushOutcome, TransportError> {
            if self.fail_after_frames == Some(self.frames) {
                return Err(TransportError("broken pipe".to_string()));
            }
            self.frames += 1;
            self.sent.push((Instant::now(), message.to_string()));
            if self.gone_after_frames == Some(self.frames) {
                self.open = false;
            }
            Ok(PushOutcome::Delivered)
        }

        async fn close(&mut self) {
            self.closes += 1;
            self.open = false;
        }
    }

    // ------------------------------------------------------------------
    // Fixtures
    // ------------------------------------------------------------------

    fn cipher() -> SecretCipher {
        SecretCipher::new([9u8; 32], [4u8; 16])
    }

    fn frame(size: u32) -> ReadOutcome {
        ReadOutcome::Frame(RgbImage::from_pixel(size, size, Rgb([10, 200, 30])))
    }

    /// A directory with one streamable device.
    fn directory(cipher: &SecretCipher) -> (FakeDirectory, Device) {
        let company = Company {
            id: Uuid::new_v4(),
            name: "Hik".to_string(),
            vendor: VendorKind::Hikvision,
            stream_scheme: None,
            stream_path: None,
        };
        let device = Device {
            id: Uuid::new_v4(),
            name: "gate".to_string(),
            code: "CAM-1".to_string(),
            director: None,
            ip_address: "10.1.2.3".to_string(),
            port: 554,
            admin_account: "admin".to_string(),
            admin_pwd: cipher.encrypt("pw"),
            company_id: Some(company.id),
            node_id: None,
            connected_time: None,
            disconnected_time: None,
            sync_time: None,
            is_online: true,
        };

        let mut dir = FakeDirectory::default();
        dir.companies.insert(company.id, company);
        dir.devices.insert(device.id, device.clone());
        (dir, device)
    }

    fn fast_config() -> RelayConfig {
        RelayConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    async fn run_session(
        dir: &FakeDirectory,
        secrets: &dyn SecretStore,
        prober: &FakeProber,
        opener: &FakeOpener,
        device_id: &str,
        channel: &mut FakeChannel,
        cancel: CancellationToken,
    ) -> SessionReport {
        let deps = RelayDeps {
            directory: dir,
            secrets,
            prober,
            opener,
        };
        RelaySession::new(deps, fast_config(), cancel)
            .run(device_id, channel)
            .await
    }

    fn jpeg_size(message: &str) -> u32 {
        use base64::Engine;
        let payload = message
            .strip_prefix("200|data:image/jpeg;base64,")
            .expect("frame message");
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .unwrap();
        image::load_from_memory_with_format(&bytes, image::ImageFormat::Jpeg)
            .unwrap()
            .width()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn test_message_format() {
        assert_eq!(RelayMessage::DeviceNotFound.to_string(), "404|device not found");
        assert_eq!(RelayMessage::VendorNotFound.to_string(), "404|vendor not found");
        assert_eq!(RelayMessage::Unreachable.to_string(), "400|unreachable");
        assert_eq!(RelayMessage::ProbeTimeout.to_string(), "400|probe timeout");
        assert_eq!(
            RelayMessage::CannotOpenStream.to_string(),
            "400|cannot open stream"
        );
        assert_eq!(RelayMessage::InvalidStream.to_string(), "400|invalid stream");
        assert_eq!(
            RelayMessage::Frame("data:image/jpeg;base64,AAA".to_string()).to_string(),
            "200|data:image/jpeg;base64,AAA"
        );
    }

    #[tokio::test]
    async fn test_unknown_device_sends_single_404() {
        let cipher = cipher();
        let (dir, _) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![frame(4)]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &Uuid::new_v4().to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::DeviceNotFound);
        assert_eq!(channel.messages(), vec!["404|device not found"]);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_malformed_device_id_is_not_found() {
        let cipher = cipher();
        let (dir, _) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            "not-a-uuid",
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::DeviceNotFound);
        assert_eq!(channel.messages(), vec!["404|device not found"]);
    }

    #[tokio::test]
    async fn test_dangling_vendor_reference_sends_404_before_probe() {
        let cipher = cipher();
        let (mut dir, device) = directory(&cipher);
        dir.companies.clear();
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![frame(4)]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::VendorNotFound);
        assert_eq!(channel.messages(), vec!["404|vendor not found"]);
        assert_eq!(prober.calls.load(Ordering::SeqCst), 0);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_device_without_vendor_is_vendor_not_found() {
        let cipher = cipher();
        let (mut dir, mut device) = directory(&cipher);
        device.company_id = None;
        dir.devices.insert(device.id, device.clone());
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![]);
        let mut channel = FakeChannel::new();

        run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(channel.messages(), vec!["404|vendor not found"]);
    }

    #[tokio::test]
    async fn test_unreachable_device_is_never_opened() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Unreachable);
        let opener = FakeOpener::new(vec![frame(4)]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::Unreachable);
        assert_eq!(channel.messages(), vec!["400|unreachable"]);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 0);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::TimedOut);
        let opener = FakeOpener::new(vec![]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::ProbeTimeout);
        assert_eq!(channel.messages(), vec!["400|probe timeout"]);
    }

    #[tokio::test]
    async fn test_open_failure() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let mut opener = FakeOpener::new(vec![]);
        opener.fail = true;
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::OpenFailed);
        assert_eq!(channel.messages(), vec!["400|cannot open stream"]);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 0);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_undecryptable_secret_is_invalid_stream() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let other_key = SecretCipher::new([1u8; 32], [1u8; 16]);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![frame(4)]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &other_key,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::InvalidStream);
        assert_eq!(channel.messages(), vec!["400|invalid stream"]);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_frames_are_paced_and_ordered() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![
            frame(8),
            ReadOutcome::NoFrameYet,
            frame(16),
            frame(24),
        ]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::EndOfStream);
        assert_eq!(report.frames_sent, 3);

        let sizes: Vec<u32> = channel.messages().iter().map(|m| jpeg_size(m)).collect();
        assert_eq!(sizes, vec![8, 16, 24]);

        for pair in channel.sent.windows(2) {
            let gap = pair[1].0.duration_since(pair[0].0);
            assert!(gap >= Duration::from_millis(29), "frames {:?} apart", gap);
        }

        assert_eq!(
            opener.last_url.lock().unwrap().as_deref(),
            Some("rtsp://admin:pw@10.1.2.3:554/Streaming/Channels/101")
        );
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_client_disconnect_stops_streaming() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let mut opener = FakeOpener::new(vec![frame(4), frame(4), frame(4), frame(4)]);
        opener.hang_when_done = true;
        let mut channel = FakeChannel::new();
        channel.gone_after_frames = Some(2);

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::ClientGone);
        assert_eq!(channel.frames, 2);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![frame(4), frame(4), frame(4)]);
        let mut channel = FakeChannel::new();
        channel.fail_after_frames = Some(1);

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(report.exit, SessionExit::TransportClosed);
        assert_eq!(report.frames_sent, 1);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_read_releases_source() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let mut opener = FakeOpener::new(vec![frame(4)]);
        opener.hang_when_done = true;
        let mut channel = FakeChannel::new();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            cancel,
        )
        .await;

        assert_eq!(report.exit, SessionExit::Cancelled);
        assert_eq!(report.frames_sent, 1);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_cancellation_during_open_releases_late_source() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let mut opener = FakeOpener::new(vec![frame(4)]);
        opener.open_delay = Some(Duration::from_millis(200));
        let mut channel = FakeChannel::new();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            cancel,
        )
        .await;

        assert_eq!(report.exit, SessionExit::Cancelled);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert!(channel.messages().is_empty());
        assert_eq!(channel.closes, 1);

        // The open finishes after the session ended and its source is released
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_probe_sends_nothing() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![frame(4)]);
        let mut channel = FakeChannel::new();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            cancel,
        )
        .await;

        assert_eq!(report.exit, SessionExit::Cancelled);
        assert!(channel.messages().is_empty());
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
        assert_eq!(channel.closes, 1);
    }

    #[tokio::test]
    async fn test_source_failure_ends_session() {
        let cipher = cipher();
        let (dir, device) = directory(&cipher);
        let prober = FakeProber::new(ProbeOutcome::Reachable);
        let opener = FakeOpener::new(vec![
            frame(4),
            ReadOutcome::Failed("decoder error".to_string()),
        ]);
        let mut channel = FakeChannel::new();

        let report = run_session(
            &dir,
            &cipher,
            &prober,
            &opener,
            &device.id.to_string(),
            &mut channel,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            report.exit,
            SessionExit::SourceFailed("decoder error".to_string())
        );
        assert_eq!(channel.frames, 1);
        assert_eq!(opener.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_slot_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut slot = SourceSlot::default();
        slot.fill(Box::new(FakeSource::new(VecDeque::new(), false, releases.clone())));

        assert!(slot.release());
        assert!(!slot.release());
        drop(slot);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_source_slot_releases_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let mut slot = SourceSlot::default();
            slot.fill(Box::new(FakeSource::new(VecDeque::new(), false, releases.clone())));
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
