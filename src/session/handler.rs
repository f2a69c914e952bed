//! Host callback interface for session events

use super::{DecodedEvent, ParameterUpdate};
use crate::crsf::channels::ChannelSet;
use crate::crsf::protocol::{Frame, LinkStatistics};

/// Receives session events drained by [`CrsfSession::dispatch`]
///
/// Every method defaults to a no-op, so a handler implements only the
/// events it cares about.
///
/// [`CrsfSession::dispatch`]: super::CrsfSession::dispatch
#[cfg_attr(test, mockall::automock)]
pub trait SessionHandler {
    fn on_connected(&mut self) {}

    fn on_disconnected(&mut self) {}

    fn on_channels_updated(&mut self, _current: &ChannelSet, _previous: &ChannelSet) {}

    fn on_link_statistics(&mut self, _stats: &LinkStatistics) {}

    fn on_parameter_update(&mut self, _update: &ParameterUpdate) {}

    /// Typed frame with no session semantics (GPS, battery, MSP, ...)
    fn on_frame(&mut self, _frame: &Frame) {}

    /// Frame of a type the decoder does not interpret
    fn on_opaque_frame(&mut self, _frame: &Frame) {}
}

/// Route one event to the matching handler method
pub fn dispatch<H: SessionHandler + ?Sized>(handler: &mut H, event: &DecodedEvent) {
    match event {
        DecodedEvent::Connected => handler.on_connected(),
        DecodedEvent::Disconnected => handler.on_disconnected(),
        DecodedEvent::ChannelsUpdated { current, previous } => {
            handler.on_channels_updated(current, previous)
        }
        DecodedEvent::LinkStatisticsUpdated(stats) => handler.on_link_statistics(stats),
        DecodedEvent::ParameterUpdate(update) => handler.on_parameter_update(update),
        DecodedEvent::FrameReceived(frame) => handler.on_frame(frame),
        DecodedEvent::OpaqueFrame(frame) => handler.on_opaque_frame(frame),
    }
}
