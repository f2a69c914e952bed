//! # CRSF Session Module
//!
//! One session per physical link. It owns the frame synchronizer and applies
//! every decoded frame to the link state:
//! - Current and previous RC channel snapshots
//! - Latest link statistics
//! - Connection state with `Connected` / `Disconnected` edges
//!
//! The failsafe timer belongs to the host: it calls
//! [`CrsfSession::on_timeout_check`] periodically and the session raises
//! `Disconnected` once no valid frame has been seen for the failsafe timeout.

pub mod handler;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::crsf::channels::ChannelSet;
use crate::crsf::encoder;
use crate::crsf::protocol::{DeviceAddress, Frame, FramePayload, LinkStatistics};
use crate::crsf::sync::{FrameSynchronizer, SyncEvent, SyncSettings, SyncStats};

pub use handler::SessionHandler;

/// Default failsafe timeout (500ms)
pub const DEFAULT_FAILSAFE_TIMEOUT: Duration = Duration::from_millis(500);

/// Session timing and addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Silence after which the link is declared disconnected
    pub failsafe_timeout: Duration,

    /// Address byte used for outgoing RC frames
    pub rc_target: DeviceAddress,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            failsafe_timeout: DEFAULT_FAILSAFE_TIMEOUT,
            rc_target: DeviceAddress::FlightController,
        }
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            failsafe_timeout: Duration::from_millis(config.failsafe_timeout_ms),
            rc_target: DeviceAddress::from(config.rc_target_address),
        }
    }
}

/// Parameter write addressed to a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterUpdate {
    pub dest: DeviceAddress,
    pub origin: DeviceAddress,
    pub field_index: u8,
    pub value: Vec<u8>,
}

/// Event produced by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// New RC channel values, with the snapshot they replaced
    ChannelsUpdated { current: ChannelSet, previous: ChannelSet },
    LinkStatisticsUpdated(LinkStatistics),
    /// First RC frame after being disconnected
    Connected,
    /// No valid frame for the failsafe timeout
    Disconnected,
    ParameterUpdate(ParameterUpdate),
    /// Typed frame without session semantics
    FrameReceived(Frame),
    /// Frame of an unknown type, payload kept as raw bytes
    OpaqueFrame(Frame),
}

/// CRSF link session
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::ChannelSet;
/// use crsf_link::session::{CrsfSession, DecodedEvent};
///
/// let mut session = CrsfSession::default();
/// let frame = session.build_rc_frame(&ChannelSet::splat(1500));
///
/// session.feed(&frame);
/// assert_eq!(session.poll_frame(), Some(DecodedEvent::Connected));
/// assert!(matches!(session.poll_frame(), Some(DecodedEvent::ChannelsUpdated { .. })));
/// assert_eq!(session.current_channels(), ChannelSet::splat(1500));
/// ```
#[derive(Debug)]
pub struct CrsfSession {
    sync: FrameSynchronizer,
    settings: SessionSettings,
    pending: VecDeque<DecodedEvent>,
    queue_depth: usize,
    current: ChannelSet,
    previous: ChannelSet,
    link_stats: Option<LinkStatistics>,
    connected: bool,
    /// A valid frame arrived since the last timeout check
    frame_since_check: bool,
    last_seen: Option<Instant>,
    events_overflowed: u64,
}

impl Default for CrsfSession {
    fn default() -> Self {
        Self::new(SyncSettings::default(), SessionSettings::default())
    }
}

impl CrsfSession {
    pub fn new(sync_settings: SyncSettings, settings: SessionSettings) -> Self {
        let sync = FrameSynchronizer::new(sync_settings);
        let queue_depth = sync.settings().event_queue_depth;
        Self {
            sync,
            settings,
            pending: VecDeque::with_capacity(queue_depth),
            queue_depth,
            current: ChannelSet::default(),
            previous: ChannelSet::default(),
            link_stats: None,
            connected: false,
            frame_since_check: false,
            last_seen: None,
            events_overflowed: 0,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Hand received bytes to the session
    ///
    /// Frames completed by these bytes are applied to the session state
    /// immediately; their events are queued for [`poll_frame`](Self::poll_frame).
    pub fn feed(&mut self, bytes: &[u8]) {
        self.sync.feed(bytes);
        while let Some(event) = self.sync.poll() {
            match event {
                SyncEvent::Frame(frame) => self.on_valid_frame(frame),
                SyncEvent::Dropped(dropped) => {
                    debug!("Discarded CRSF frame: {}", dropped.reason);
                }
            }
        }
    }

    /// Next queued event, if any
    pub fn poll_frame(&mut self) -> Option<DecodedEvent> {
        self.pending.pop_front()
    }

    /// Drain queued events into a handler, returning how many were delivered
    pub fn dispatch<H: SessionHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.poll_frame() {
            handler::dispatch(handler, &event);
            delivered += 1;
        }
        delivered
    }

    /// Apply one valid frame to the session state
    pub fn on_valid_frame(&mut self, frame: Frame) {
        self.frame_since_check = true;

        match frame.payload {
            FramePayload::RcChannels(channels) => {
                if !self.connected {
                    self.connected = true;
                    info!("CRSF link connected");
                    self.push(DecodedEvent::Connected);
                }
                self.previous = self.current;
                self.current = channels;
                self.push(DecodedEvent::ChannelsUpdated {
                    current: self.current,
                    previous: self.previous,
                });
            }
            FramePayload::LinkStatistics(stats) => {
                self.link_stats = Some(stats);
                self.push(DecodedEvent::LinkStatisticsUpdated(stats));
            }
            FramePayload::ParameterWrite(ref write) => {
                // Always extended, the decoder guarantees the header
                let (dest, origin) = frame
                    .extended
                    .map(|header| (header.dest, header.origin))
                    .unwrap_or((DeviceAddress::Broadcast, DeviceAddress::Broadcast));
                self.push(DecodedEvent::ParameterUpdate(ParameterUpdate {
                    dest,
                    origin,
                    field_index: write.field_index,
                    value: write.value.clone(),
                }));
            }
            FramePayload::Opaque { .. } => self.push(DecodedEvent::OpaqueFrame(frame)),
            _ => self.push(DecodedEvent::FrameReceived(frame)),
        }
    }

    /// Run the failsafe check at `now`
    ///
    /// Returns `true` when this call raised `Disconnected`.
    pub fn on_timeout_check(&mut self, now: Instant) -> bool {
        if std::mem::take(&mut self.frame_since_check) {
            self.last_seen = Some(now);
            return false;
        }

        if !self.connected {
            return false;
        }

        let timeout = self.settings.failsafe_timeout;
        let expired = self
            .last_seen
            .map_or(true, |seen| now.saturating_duration_since(seen) >= timeout);

        if expired {
            self.connected = false;
            warn!(
                "CRSF link lost: no valid frame for {}ms",
                self.settings.failsafe_timeout.as_millis()
            );
            self.push(DecodedEvent::Disconnected);
        }
        expired
    }

    /// Latest RC channel values (all zero before the first RC frame)
    pub fn current_channels(&self) -> ChannelSet {
        self.current
    }

    /// Channel values before the latest RC frame
    pub fn previous_channels(&self) -> ChannelSet {
        self.previous
    }

    pub fn link_statistics(&self) -> Option<LinkStatistics> {
        self.link_stats
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    /// Session events lost because the queue was full
    pub fn events_overflowed(&self) -> u64 {
        self.events_overflowed
    }

    /// Back to the just-constructed state, counters kept
    pub fn reset(&mut self) {
        self.sync.reset();
        self.pending.clear();
        self.current = ChannelSet::default();
        self.previous = ChannelSet::default();
        self.link_stats = None;
        self.connected = false;
        self.frame_since_check = false;
        self.last_seen = None;
    }

    /// RC frame addressed to the configured target
    pub fn build_rc_frame(&self, channels: &ChannelSet) -> Vec<u8> {
        encoder::build_rc_frame_to(self.settings.rc_target, channels)
    }

    /// Link statistics frame addressed to the configured target
    pub fn build_link_stats_frame(&self, stats: &LinkStatistics) -> Vec<u8> {
        encoder::build_link_stats_frame_to(self.settings.rc_target, stats)
    }

    fn push(&mut self, event: DecodedEvent) {
        if self.pending.len() >= self.queue_depth {
            self.pending.pop_front();
            self.events_overflowed += 1;
            warn!("Session event queue full, discarding oldest event");
        }
        self.pending.push_back(event);
    }
}
