//! # Telemetry Session
//!
//! Owns the single logical connection to the scooter and everything that
//! hangs off it: the live reading, the active trip and the trip archive.
//!
//! ## Scheduling
//!
//! While connected, three tasks feed one unbounded channel:
//!
//! - a ticker emitting `SessionEvent::Tick` once per tick interval
//! - a reader framing lines off the sensor link
//! - a position watch forwarding fixes and provider failures
//!
//! The session owner drains the channel with `next_event` and applies each
//! event with `handle_event`. Only the owner mutates state, and only `Tick`
//! records a trip sample, so at most one sample lands per tick.
//!
//! Every event carries the epoch of the session that produced it. `disconnect`
//! aborts the tasks and bumps the epoch, so anything already queued from the
//! old session is dropped on arrival.
//!
//! ## States
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//!       ▲                          │                  │
//!       └──── timeout / error ─────┘                  │
//!       └────────────────── disconnect() ─────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::{Config, LinkConfig};
use crate::error::{Result, TelemetryError};
use crate::frame::framer::{FramedLine, LineFramer};
use crate::freshness::StreamState;
use crate::geo::GeoFix;
use crate::link::{find_target, CommandWriter, FrameReader, LinkChannel, SerialBridge};
use crate::merger::{LiveReading, LiveReadingMerger};
use crate::notify::{Notifier, Severity};
use crate::position::{run_watch, PositionUpdate, SharedPositionProvider, WatchOptions};
use crate::store::KeyValueStore;
use crate::synthetic::SyntheticGenerator;
use crate::trip::{TripArchive, TripRecord, TripStats};

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Work queued for the session owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Tick { epoch: u64 },
    Fix { epoch: u64, fix: GeoFix },
    PositionUnavailable { epoch: u64, reason: String },
    Frame { epoch: u64, line: String },
    LinkClosed { epoch: u64, reason: Option<String> },
}

impl SessionEvent {
    pub fn epoch(&self) -> u64 {
        match self {
            SessionEvent::Tick { epoch }
            | SessionEvent::Fix { epoch, .. }
            | SessionEvent::PositionUnavailable { epoch, .. }
            | SessionEvent::Frame { epoch, .. }
            | SessionEvent::LinkClosed { epoch, .. } => *epoch,
        }
    }
}

/// Resets the state to `Disconnected` unless the handshake succeeded,
/// including when the `connect()` future is dropped mid-handshake
struct ConnectingGuard<'a> {
    state: &'a mut ConnectionState,
    armed: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn new(state: &'a mut ConnectionState) -> Self {
        *state = ConnectionState::Connecting;
        Self { state, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state = ConnectionState::Disconnected;
        }
    }
}

/// The single owner of connection, live reading and trip state
pub struct TelemetrySession {
    config: Config,
    state: ConnectionState,
    epoch: u64,
    bridge: Arc<dyn SerialBridge>,
    position: SharedPositionProvider,
    notifier: Arc<dyn Notifier>,
    merger: LiveReadingMerger,
    stats: TripStats,
    archive: TripArchive,
    writer: Option<Box<dyn CommandWriter>>,
    tasks: Vec<JoinHandle<()>>,
    connected_at: Option<DateTime<Utc>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl std::fmt::Debug for TelemetrySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetrySession")
            .field("state", &self.state)
            .field("epoch", &self.epoch)
            .field("merger", &self.merger)
            .field("archive", &self.archive)
            .finish_non_exhaustive()
    }
}

impl TelemetrySession {
    /// Build a disconnected session
    ///
    /// The odometer and trip archive are restored from `store` here, so the
    /// live reading is meaningful before the first `connect()`.
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        bridge: Arc<dyn SerialBridge>,
        position: SharedPositionProvider,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let synthetic = SyntheticGenerator::new(config.fallback.rpm_ceiling);
        let merger = LiveReadingMerger::new(
            store.clone(),
            synthetic,
            config.fallback.staleness(),
            config.fallback.tick_interval(),
        );
        let archive = TripArchive::load(store);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            state: ConnectionState::Disconnected,
            epoch: 0,
            bridge,
            position,
            notifier,
            merger,
            stats: TripStats::new(),
            archive,
            writer: None,
            tasks: Vec::new(),
            connected_at: None,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    pub fn live_reading(&self) -> LiveReading {
        self.merger.reading()
    }

    pub fn trip_archive(&self) -> &TripArchive {
        &self.archive
    }

    pub fn trip_stats(&self) -> &TripStats {
        &self.stats
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    /// Freshness of the (position, sensor) streams
    pub fn stream_states(&self) -> (StreamState, StreamState) {
        (self.merger.position_state(), self.merger.sensor_state())
    }

    /// Open a session
    ///
    /// Enumerates paired devices, picks the one matching the configured name
    /// prefix and opens it, all bounded by the connect timeout. When the
    /// platform has no serial transport at all the session still opens and
    /// runs on synthetic engine data.
    ///
    /// # Errors
    ///
    /// - `SessionBusy` if already connecting or connected (state unchanged)
    /// - `ConnectionTimeout` if the handshake outlives the timeout
    /// - `DeviceNotFound` if no paired device matches
    /// - `Serial` if the device cannot be opened
    ///
    /// Every failure leaves the session `Disconnected`.
    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Connecting => return Err(TelemetryError::SessionBusy("connecting")),
            ConnectionState::Connected => return Err(TelemetryError::SessionBusy("connected")),
            ConnectionState::Disconnected => {}
        }

        let bridge = self.bridge.clone();
        let link = self.config.link.clone();
        info!("Connecting to '{}'...", link.device_name_prefix);

        let result = {
            let guard = ConnectingGuard::new(&mut self.state);
            let timeout = link.connect_timeout();
            let result = match tokio::time::timeout(timeout, establish(bridge, &link)).await {
                Ok(result) => result,
                Err(_) => Err(TelemetryError::ConnectionTimeout(link.connect_timeout_ms)),
            };
            if result.is_ok() {
                guard.disarm();
            }
            result
        };

        match result {
            Ok(channel) => {
                let synthetic_only = channel.is_none();
                self.start_session(channel);
                let message = if synthetic_only {
                    "No serial transport, showing simulated engine data"
                } else {
                    "Scooter connected"
                };
                self.notifier.notify("Connected", message, Severity::Info);
                Ok(())
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.notifier.notify("Connection failed", &e.to_string(), Severity::Error);
                Err(e)
            }
        }
    }

    fn start_session(&mut self, channel: Option<LinkChannel>) {
        self.epoch += 1;
        let epoch = self.epoch;
        self.state = ConnectionState::Connected;

        let now = Utc::now();
        self.connected_at = Some(now);
        self.stats.seed_start(now);

        self.tasks.push(spawn_ticker(
            self.config.fallback.tick_interval(),
            epoch,
            self.events_tx.clone(),
        ));

        let tx = self.events_tx.clone();
        self.tasks.push(tokio::spawn(run_watch(
            self.position.clone(),
            WatchOptions::from(&self.config.position),
            Duration::from_millis(self.config.position.retry_backoff_ms),
            move |update| {
                let event = match update {
                    PositionUpdate::Fix(fix) => SessionEvent::Fix { epoch, fix },
                    PositionUpdate::Unavailable(reason) => SessionEvent::PositionUnavailable { epoch, reason },
                };
                tx.send(event).is_ok()
            },
        )));

        match channel {
            Some(LinkChannel { reader, writer }) => {
                self.writer = Some(writer);
                self.tasks.push(tokio::spawn(read_frames(
                    reader,
                    self.config.link.delimiter_byte(),
                    epoch,
                    self.events_tx.clone(),
                )));
            }
            None => self.merger.sensor_unavailable(),
        }

        info!("Session {} connected", epoch);
    }

    /// Close the session
    ///
    /// Idempotent. Cancels every task before returning; events they already
    /// queued are ignored. Zeroes speed, rpm and acceleration but keeps the
    /// odometer.
    pub fn disconnect(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.writer = None;
        self.epoch += 1;

        if self.state != ConnectionState::Disconnected {
            info!("Disconnected");
        }
        self.state = ConnectionState::Disconnected;
        self.merger.stop();
    }

    /// Wait for the next queued event
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Apply one event; events from a closed session are ignored
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.state != ConnectionState::Connected || event.epoch() != self.epoch {
            trace!("Ignoring event from closed session: {:?}", event);
            return;
        }

        let now = Instant::now();
        match event {
            SessionEvent::Tick { .. } => {
                let sample = self.merger.tick(now);
                self.stats.record_sample(sample.speed, sample.rpm, sample.acceleration);
                trace!("Tick sample {:?}", sample);
            }
            SessionEvent::Fix { fix, .. } => self.merger.apply_fix(fix, now),
            SessionEvent::PositionUnavailable { reason, .. } => {
                debug!("Position unavailable: {}", reason);
                self.merger.position_unavailable();
            }
            SessionEvent::Frame { line, .. } => {
                self.merger.apply_frame(&line, now);
            }
            SessionEvent::LinkClosed { reason, .. } => {
                match reason {
                    Some(reason) => warn!("Sensor link failed: {}", reason),
                    None => warn!("Sensor link closed"),
                }
                self.writer = None;
                self.merger.sensor_unavailable();
                self.notifier.notify(
                    "Sensor link lost",
                    "Showing simulated engine data",
                    Severity::Warning,
                );
            }
        }
    }

    /// Close the active trip and start a new one
    ///
    /// Saves a `TripRecord` to the archive when the trip covered distance and
    /// has samples, then clears the odometer.
    ///
    /// # Errors
    ///
    /// Returns the store error if the archive cannot be written; the trip and
    /// odometer are then left as they were.
    pub fn reset_trip(&mut self) -> Result<Option<TripRecord>> {
        let odometer = self.merger.reading().odometer;
        let snapshot = self.stats.clone();
        let record = self.stats.finalize(odometer, &self.archive, Utc::now());

        if let Some(record) = &record {
            if let Err(e) = self.archive.append(record.clone()) {
                self.stats = snapshot;
                self.notifier.notify("Trip not saved", &e.to_string(), Severity::Error);
                return Err(e);
            }
            let message = format!("{}: {:.2} km", record.name, record.distance_km);
            self.notifier.notify("Trip saved", &message, Severity::Info);
        }

        self.merger.reset_odometer();
        Ok(record)
    }

    /// Remove a trip from the archive; `false` if no such trip
    pub fn delete_trip(&mut self, id: &str) -> Result<bool> {
        let removed = self.archive.delete(id)?;
        if removed {
            info!("Deleted trip {}", id);
        }
        Ok(removed)
    }

    /// Send a text command to the scooter, terminated by the line delimiter
    ///
    /// Failures raise an error notification but never change the connection
    /// state.
    pub async fn send_command(&mut self, text: &str) -> Result<()> {
        let result = self.write_command(text).await;
        if let Err(e) = &result {
            self.notifier.notify("Command failed", &e.to_string(), Severity::Error);
        }
        result
    }

    async fn write_command(&mut self, text: &str) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(TelemetryError::NotConnected);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TelemetryError::LinkWrite("no sensor link open".to_string()))?;

        let mut payload = text.as_bytes().to_vec();
        payload.push(self.config.link.delimiter_byte());

        writer
            .write_all(&payload)
            .await
            .map_err(|e| TelemetryError::LinkWrite(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TelemetryError::LinkWrite(e.to_string()))?;

        debug!("Sent command {:?}", text);
        Ok(())
    }
}

impl Drop for TelemetrySession {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Discover and open the target device
///
/// `Ok(None)` means the platform has no serial transport.
async fn establish(bridge: Arc<dyn SerialBridge>, link: &LinkConfig) -> Result<Option<LinkChannel>> {
    if !bridge.is_available() {
        warn!("Serial transport unavailable, engine data will be simulated");
        return Ok(None);
    }

    let devices = bridge.paired_devices().await?;
    let target = find_target(&devices, &link.device_name_prefix)
        .ok_or_else(|| TelemetryError::DeviceNotFound(link.device_name_prefix.clone()))?;
    debug!("Found {} at {}", target.name, target.address);

    let channel = bridge.open(target).await?;
    Ok(Some(channel))
}

fn spawn_ticker(
    period: Duration,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.send(SessionEvent::Tick { epoch }).is_err() {
                break;
            }
        }
    })
}

async fn read_frames(
    mut reader: Box<dyn FrameReader>,
    delimiter: u8,
    epoch: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut framer = LineFramer::new(delimiter);
    let mut buf = [0u8; 256];

    loop {
        let reason = match reader.read_chunk(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                framer.extend(&buf[..n]);
                while let Some(framed) = framer.next_line() {
                    if let FramedLine::Line(line) = framed {
                        if tx.send(SessionEvent::Frame { epoch, line }).is_err() {
                            return;
                        }
                    }
                }
                continue;
            }
            Err(e) => Some(e.to_string()),
        };

        let _ = tx.send(SessionEvent::LinkClosed { epoch, reason });
        return;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::port_trait::mocks::MockSerialBridge;
    use crate::notify::mocks::RecordingNotifier;
    use crate::position::mocks::MockPositionProvider;
    use crate::position::{shared, NoPositionProvider};
    use crate::store::{MemoryStore, ODOMETER_KEY};

    struct Harness {
        session: TelemetrySession,
        bridge: MockSerialBridge,
        notifier: RecordingNotifier,
        store: Arc<MemoryStore>,
    }

    fn harness_with(bridge: MockSerialBridge, store: Arc<MemoryStore>) -> Harness {
        let notifier = RecordingNotifier::default();
        let session = TelemetrySession::new(
            Config::default(),
            store.clone(),
            Arc::new(bridge.clone()),
            shared(NoPositionProvider),
            Arc::new(notifier.clone()),
        );
        Harness { session, bridge, notifier, store }
    }

    fn harness() -> Harness {
        harness_with(MockSerialBridge::new(), Arc::new(MemoryStore::new()))
    }

    fn fix(lat: f64, kmh: f64) -> GeoFix {
        GeoFix {
            latitude: lat,
            longitude: -46.63,
            speed_mps: Some(kmh / 3.6),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_connect_opens_link_and_notifies() {
        let mut h = harness();
        assert_eq!(h.session.state(), ConnectionState::Disconnected);

        h.session.connect().await.unwrap();
        assert!(h.session.is_connected());
        assert!(!h.session.is_connecting());
        assert!(h.session.connected_at().is_some());
        assert!(h.session.trip_stats().start().is_some());
        assert_eq!(h.bridge.opens(), 1);
        assert_eq!(h.notifier.titles(), vec!["Connected"]);
    }

    #[tokio::test]
    async fn test_second_connect_is_rejected() {
        let mut h = harness();
        h.session.connect().await.unwrap();

        let result = h.session.connect().await;
        assert!(matches!(result, Err(TelemetryError::SessionBusy("connected"))));
        assert!(h.session.is_connected());
        assert_eq!(h.bridge.opens(), 1);
    }

    #[tokio::test]
    async fn test_device_not_found() {
        let mut bridge = MockSerialBridge::new();
        bridge.devices.clear();
        let mut h = harness_with(bridge, Arc::new(MemoryStore::new()));

        match h.session.connect().await {
            Err(TelemetryError::DeviceNotFound(prefix)) => assert_eq!(prefix, "HC-06"),
            other => panic!("Expected DeviceNotFound, got: {:?}", other),
        }
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        let (title, _, severity) = h.notifier.last().unwrap();
        assert_eq!(title, "Connection failed");
        assert_eq!(severity, Severity::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let mut bridge = MockSerialBridge::new();
        bridge.open_delay = Some(Duration::from_secs(10));
        let mut h = harness_with(bridge, Arc::new(MemoryStore::new()));

        let result = h.session.connect().await;
        assert!(matches!(result, Err(TelemetryError::ConnectionTimeout(3000))));
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_connect_does_not_stay_connecting() {
        let mut bridge = MockSerialBridge::new();
        bridge.open_delay = Some(Duration::from_secs(2));
        let mut h = harness_with(bridge, Arc::new(MemoryStore::new()));

        let abandoned = tokio::time::timeout(Duration::from_millis(100), h.session.connect()).await;
        assert!(abandoned.is_err());
        assert_eq!(h.session.state(), ConnectionState::Disconnected);

        h.session.connect().await.unwrap();
        assert!(h.session.is_connected());
    }

    #[tokio::test]
    async fn test_unavailable_transport_runs_synthetic() {
        let mut h = harness_with(MockSerialBridge::unavailable(), Arc::new(MemoryStore::new()));
        h.session.connect().await.unwrap();
        assert!(h.session.is_connected());
        assert_eq!(h.bridge.opens(), 0);

        let epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Tick { epoch });
        assert_eq!(h.session.stream_states(), (StreamState::Synthetic, StreamState::Synthetic));
        assert!(h.session.live_reading().rpm < 9000);
        assert_eq!(h.session.trip_stats().sample_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_frame_trip_scenario() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;

        let frames = [
            r#"{"rpm":1000,"accel":10}"#,
            r#"{"rpm":3000,"accel":50}"#,
            r#"{"rpm":5000,"accel":90}"#,
        ];
        for (i, frame) in frames.iter().enumerate() {
            h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.55 - 0.001 * i as f64, 20.0) });
            h.session.handle_event(SessionEvent::Frame { epoch, line: frame.to_string() });
            tokio::time::advance(Duration::from_secs(1)).await;
            h.session.handle_event(SessionEvent::Tick { epoch });
        }
        assert_eq!(h.session.trip_stats().sample_count(), 3);
        assert!(h.session.live_reading().odometer > 0.0);

        let record = h.session.reset_trip().unwrap().expect("trip saved");
        assert_eq!(record.avg_rpm, 3000.0);
        assert_eq!(record.avg_acceleration, 50.0);
        assert_eq!(record.avg_speed, 20.0);
        assert_eq!(record.max_speed, 20.0);
        assert_eq!(record.name, "Trip 1");

        assert_eq!(h.session.trip_archive().len(), 1);
        assert_eq!(h.session.live_reading().odometer, 0.0);
        assert_eq!(h.session.trip_stats().sample_count(), 0);
        assert_eq!(h.notifier.last().unwrap().0, "Trip saved");
    }

    #[tokio::test]
    async fn test_reset_without_distance_saves_nothing() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Frame { epoch, line: r#"{"rpm":900}"#.to_string() });

        assert!(h.session.reset_trip().unwrap().is_none());
        assert!(h.session.trip_archive().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_does_not_resurrect_stale_fix() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let old_epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Fix { epoch: old_epoch, fix: fix(-23.55, 30.0) });

        h.session.disconnect();
        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;
        assert_ne!(epoch, old_epoch);

        // A late event from the old session is ignored
        h.session.handle_event(SessionEvent::Fix { epoch: old_epoch, fix: fix(-23.60, 30.0) });
        assert_eq!(h.session.live_reading().speed, 0.0);

        // The first fix of the new session has nothing to measure against
        h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.70, 30.0) });
        assert_eq!(h.session.live_reading().odometer, 0.0);
        assert_eq!(h.session.live_reading().speed, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_gps_falls_back_to_synthetic() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.55, 42.0) });

        tokio::time::advance(Duration::from_millis(4000)).await;
        h.session.handle_event(SessionEvent::Tick { epoch });

        assert_eq!(h.session.stream_states().0, StreamState::Synthetic);
        let speed = h.session.live_reading().speed;
        assert!((0.0..99.0).contains(&speed));
    }

    #[tokio::test]
    async fn test_disconnect_zeroes_motion_and_keeps_odometer() {
        let store = Arc::new(MemoryStore::new());
        store.set(ODOMETER_KEY, "12.34").unwrap();
        let mut h = harness_with(MockSerialBridge::new(), store);
        assert_eq!(h.session.live_reading().odometer, 12.34);

        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Frame { epoch, line: r#"{"rpm":4000,"acceleration":70}"#.to_string() });
        h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.55, 25.0) });

        h.session.disconnect();
        h.session.disconnect();
        let reading = h.session.live_reading();
        assert_eq!((reading.rpm, reading.acceleration, reading.speed), (0, 0, 0.0));
        assert_eq!(reading.odometer, 12.34);
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(h.session.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_events_ignored_while_disconnected() {
        let mut h = harness();
        h.session.handle_event(SessionEvent::Tick { epoch: 0 });
        assert_eq!(h.session.trip_stats().sample_count(), 0);
    }

    #[tokio::test]
    async fn test_send_command_appends_delimiter() {
        let mut h = harness();
        h.session.connect().await.unwrap();

        h.session.send_command("TESTE").await.unwrap();
        assert_eq!(h.bridge.get_written_data(), vec![b"TESTE\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_command_failure_keeps_connection() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        h.bridge.set_write_error(std::io::ErrorKind::BrokenPipe);

        let result = h.session.send_command("TESTE").await;
        assert!(matches!(result, Err(TelemetryError::LinkWrite(_))));
        assert!(h.session.is_connected());
        let (title, _, severity) = h.notifier.last().unwrap();
        assert_eq!(title, "Command failed");
        assert_eq!(severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_send_command_while_disconnected() {
        let mut h = harness();
        let result = h.session.send_command("TESTE").await;
        assert!(matches!(result, Err(TelemetryError::NotConnected)));
        assert_eq!(h.notifier.last().unwrap().0, "Command failed");
    }

    #[tokio::test]
    async fn test_delete_trip() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        let epoch = h.session.epoch;
        h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.55, 20.0) });
        h.session.handle_event(SessionEvent::Fix { epoch, fix: fix(-23.56, 20.0) });
        h.session.handle_event(SessionEvent::Tick { epoch });
        let record = h.session.reset_trip().unwrap().unwrap();

        assert!(!h.session.delete_trip("nope").unwrap());
        assert!(h.session.delete_trip(&record.id).unwrap());
        assert!(h.session.trip_archive().is_empty());
        assert!(h.store.get(crate::store::TRIP_HISTORY_KEY).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_feed_frames_and_ticks() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        h.bridge.feed(b"{\"rpm\":4200,\"acceleration\":60}\n");

        while h.session.trip_stats().sample_count() == 0 {
            let event = h.session.next_event().await.expect("event");
            h.session.handle_event(event);
        }
        assert_eq!(h.session.trip_stats().rpm_sum(), 4200);
        assert_eq!(h.session.trip_stats().acceleration_sum(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_hang_up_falls_back_to_synthetic() {
        let mut h = harness();
        h.session.connect().await.unwrap();
        h.bridge.hang_up();

        loop {
            let event = h.session.next_event().await.expect("event");
            let closed = matches!(event, SessionEvent::LinkClosed { .. });
            h.session.handle_event(event);
            if closed {
                break;
            }
        }
        assert!(h.session.is_connected());
        assert_eq!(h.notifier.last().unwrap().0, "Sensor link lost");
        assert!(matches!(h.session.send_command("x").await, Err(TelemetryError::LinkWrite(_))));
    }

    #[tokio::test]
    async fn test_position_watch_fix_reaches_session() {
        let (provider, feed) = MockPositionProvider::new();
        let bridge = MockSerialBridge::new();
        let notifier = RecordingNotifier::default();
        let mut session = TelemetrySession::new(
            Config::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(bridge),
            shared(provider),
            Arc::new(notifier),
        );
        session.connect().await.unwrap();
        feed.send(Ok(fix(-23.55, 36.0))).unwrap();

        loop {
            let event = session.next_event().await.expect("event");
            let is_fix = matches!(event, SessionEvent::Fix { .. });
            session.handle_event(event);
            if is_fix {
                break;
            }
        }
        assert_eq!(session.live_reading().speed, 36.0);
        assert_eq!(session.stream_states().0, StreamState::Live);
    }
}
