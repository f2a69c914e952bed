//! # CRSF Frame Synchronizer
//!
//! Recovers frame boundaries from a continuous, possibly noisy byte stream.
//!
//! ```text
//!   SeekingSync ──start byte──▶ AccumulatingLength ──valid size──▶ AccumulatingPayload
//!        ▲                              │                                  │
//!        └──── drop byte 0, rescan ─────┴───── parse fails / frame done ───┘
//! ```
//!
//! Bytes are consumed eagerly by [`FrameSynchronizer::feed`]; finished frames
//! and drop notices wait in a bounded queue for [`FrameSynchronizer::poll`].
//! When a candidate is rejected only its first byte is discarded and the
//! search restarts at the byte after it, so a corrupted frame never swallows
//! a valid one that starts inside it.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace, warn};

use super::decoder::parse_frame_with_limit;
use super::protocol::{
    Frame, CRSF_FRAME_NOT_COUNTED_BYTES, CRSF_MAX_FRAME_LEN, CRSF_MAX_FRAME_SIZE,
    CRSF_MIN_FRAME_SIZE, CRSF_SYNC_BYTE,
};
use crate::config::LinkConfig;
use crate::error::FrameError;

/// Default start-of-frame addresses (FC, handset, receiver, TX module)
pub const DEFAULT_ACCEPTED_ADDRESSES: [u8; 4] = [CRSF_SYNC_BYTE, 0xEA, 0xEC, 0xEE];

/// Default depth of the decoded event queue
pub const DEFAULT_EVENT_QUEUE_DEPTH: usize = 32;

/// Smallest usable candidate buffer (address + size + minimum frame)
const MIN_BUFFER_CAPACITY: usize = CRSF_FRAME_NOT_COUNTED_BYTES + CRSF_MIN_FRAME_SIZE as usize;

/// Synchronizer tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Address bytes recognised as a frame start
    pub accepted_addresses: Vec<u8>,

    /// Upper bound on `frame_size` (at most 62)
    pub max_frame_size: u8,

    /// Candidate buffer size in bytes (at most 64)
    pub buffer_capacity: usize,

    /// Events held before the oldest is discarded
    pub event_queue_depth: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            accepted_addresses: DEFAULT_ACCEPTED_ADDRESSES.to_vec(),
            max_frame_size: CRSF_MAX_FRAME_SIZE,
            buffer_capacity: CRSF_MAX_FRAME_LEN,
            event_queue_depth: DEFAULT_EVENT_QUEUE_DEPTH,
        }
    }
}

impl SyncSettings {
    /// Clamp every bound into its protocol range
    fn normalized(mut self) -> Self {
        self.max_frame_size = self.max_frame_size.clamp(CRSF_MIN_FRAME_SIZE, CRSF_MAX_FRAME_SIZE);
        self.buffer_capacity = self.buffer_capacity.clamp(MIN_BUFFER_CAPACITY, CRSF_MAX_FRAME_LEN);
        self.event_queue_depth = self.event_queue_depth.max(1);
        self
    }
}

impl From<&LinkConfig> for SyncSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            accepted_addresses: config.accepted_addresses.clone(),
            max_frame_size: config.max_frame_size,
            buffer_capacity: config.buffer_capacity,
            event_queue_depth: config.event_queue_depth,
        }
    }
}

/// Synchronizer state between bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Discarding bytes until an accepted address byte
    SeekingSync,
    /// Start byte buffered, waiting for `frame_size`
    AccumulatingLength,
    /// Waiting for `frame_size` more bytes
    ///
    /// Reaching the full length is the "frame ready" point: the candidate is
    /// validated immediately and the state returns to `SeekingSync`.
    AccumulatingPayload { frame_size: u8 },
}

/// Candidate that failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFrame {
    pub reason: FrameError,
}

/// Output of the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Frame(Frame),
    Dropped(DroppedFrame),
}

/// Synchronizer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub frames_decoded: u64,
    pub unknown_types: u64,
    pub size_errors: u64,
    pub truncated: u64,
    pub crc_errors: u64,
    pub overruns: u64,
    pub malformed: u64,
    /// Bytes skipped while seeking a start byte
    pub bytes_discarded: u64,
    /// Events lost because the queue was full
    pub events_overflowed: u64,
}

impl SyncStats {
    /// Total candidates dropped for any reason
    pub fn frames_dropped(&self) -> u64 {
        self.size_errors + self.truncated + self.crc_errors + self.overruns + self.malformed
    }

    fn record_drop(&mut self, reason: &FrameError) {
        match reason {
            FrameError::SizeOutOfRange { .. } => self.size_errors += 1,
            FrameError::TruncatedPayload { .. } => self.truncated += 1,
            FrameError::CrcMismatch { .. } => self.crc_errors += 1,
            FrameError::BufferOverrun { .. } => self.overruns += 1,
            _ => self.malformed += 1,
        }
    }
}

/// Incremental CRSF frame synchronizer
///
/// One instance per physical link. Not internally synchronized: feed and poll
/// from a single task.
///
/// # Examples
///
/// ```
/// use crsf_link::crsf::channels::ChannelSet;
/// use crsf_link::crsf::encoder::build_rc_frame;
/// use crsf_link::crsf::sync::{FrameSynchronizer, SyncEvent, SyncSettings};
///
/// let mut sync = FrameSynchronizer::new(SyncSettings::default());
/// let raw = build_rc_frame(&ChannelSet::centered());
///
/// // Bytes may arrive in arbitrary pieces
/// sync.feed(&raw[..5]);
/// assert!(sync.poll().is_none());
/// sync.feed(&raw[5..]);
/// assert!(matches!(sync.poll(), Some(SyncEvent::Frame(_))));
/// ```
#[derive(Debug)]
pub struct FrameSynchronizer {
    settings: SyncSettings,
    buffer: BytesMut,
    state: SyncState,
    events: VecDeque<SyncEvent>,
    stats: SyncStats,
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new(SyncSettings::default())
    }
}

impl FrameSynchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        let settings = settings.normalized();
        Self {
            buffer: BytesMut::with_capacity(settings.buffer_capacity),
            events: VecDeque::with_capacity(settings.event_queue_depth),
            state: SyncState::SeekingSync,
            stats: SyncStats::default(),
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Bytes currently held for the candidate frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Events waiting to be polled
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Accept received bytes
    ///
    /// Any number of bytes, including zero. The candidate buffer never grows
    /// past `buffer_capacity`.
    pub fn feed(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            // advance() always leaves at least one free byte
            let room = self.settings.buffer_capacity - self.buffer.len();
            let take = room.min(bytes.len());
            self.buffer.put_slice(&bytes[..take]);
            bytes = &bytes[take..];
            self.advance();
        }
    }

    /// Next decoded frame or drop notice
    ///
    /// Returns `None` without touching synchronizer state when nothing is
    /// queued.
    pub fn poll(&mut self) -> Option<SyncEvent> {
        self.events.pop_front()
    }

    /// Drain queued events
    pub fn events(&mut self) -> impl Iterator<Item = SyncEvent> + '_ {
        std::iter::from_fn(move || self.poll())
    }

    /// Discard the partial candidate and queued events, back to `SeekingSync`
    ///
    /// Counters are kept.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.events.clear();
        self.state = SyncState::SeekingSync;
    }

    fn is_frame_start(&self, byte: u8) -> bool {
        self.settings.accepted_addresses.contains(&byte)
    }

    /// Run the state machine until it needs more input
    fn advance(&mut self) {
        loop {
            match self.state {
                SyncState::SeekingSync => {
                    let start = self.buffer.iter().position(|&b| self.is_frame_start(b));
                    let skipped = start.unwrap_or(self.buffer.len());
                    if skipped > 0 {
                        self.buffer.advance(skipped);
                        self.stats.bytes_discarded += skipped as u64;
                    }
                    if start.is_none() {
                        return;
                    }
                    self.state = SyncState::AccumulatingLength;
                }
                SyncState::AccumulatingLength => {
                    if self.buffer.len() < CRSF_FRAME_NOT_COUNTED_BYTES {
                        return;
                    }
                    let frame_size = self.buffer[1];
                    if !(CRSF_MIN_FRAME_SIZE..=self.settings.max_frame_size).contains(&frame_size) {
                        self.resync(FrameError::SizeOutOfRange {
                            size: frame_size as usize,
                            min: CRSF_MIN_FRAME_SIZE,
                            max: self.settings.max_frame_size,
                        });
                        continue;
                    }
                    let needed = CRSF_FRAME_NOT_COUNTED_BYTES + frame_size as usize;
                    if needed > self.settings.buffer_capacity {
                        self.resync(FrameError::BufferOverrun {
                            needed,
                            capacity: self.settings.buffer_capacity,
                        });
                        continue;
                    }
                    self.state = SyncState::AccumulatingPayload { frame_size };
                }
                SyncState::AccumulatingPayload { frame_size } => {
                    let total = CRSF_FRAME_NOT_COUNTED_BYTES + frame_size as usize;
                    if self.buffer.len() < total {
                        return;
                    }
                    let parsed =
                        parse_frame_with_limit(&self.buffer[..total], self.settings.max_frame_size);
                    match parsed {
                        Ok(frame) => {
                            self.buffer.advance(total);
                            self.state = SyncState::SeekingSync;
                            self.stats.frames_decoded += 1;
                            if frame.payload.is_opaque() {
                                self.stats.unknown_types += 1;
                            }
                            trace!("Decoded frame type 0x{:02X}", frame.frame_type());
                            self.emit(SyncEvent::Frame(frame));
                        }
                        Err(reason) => self.resync(reason),
                    }
                }
            }
        }
    }

    /// Drop the candidate's start byte and rescan from the byte after it
    fn resync(&mut self, reason: FrameError) {
        debug!("Dropping CRSF candidate: {}", reason);
        if self.buffer.has_remaining() {
            self.buffer.advance(1);
        }
        self.state = SyncState::SeekingSync;
        self.stats.record_drop(&reason);
        self.emit(SyncEvent::Dropped(DroppedFrame { reason }));
    }

    fn emit(&mut self, event: SyncEvent) {
        if self.events.len() >= self.settings.event_queue_depth {
            self.events.pop_front();
            self.stats.events_overflowed += 1;
            warn!("CRSF event queue full, discarding oldest event");
        }
        self.events.push_back(event);
    }
}
