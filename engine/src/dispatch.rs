// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Routing of control frames to their handlers.

use crate::context::{Engine, LaunchError};
use crate::frame::{Action, Frame, FrameError, Message};
use msgchan::{Channel, ChannelError};
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("frame dropped: {0}")]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Handle at most one frame waiting on `channel`.
///
/// Never waits: with nothing to do the processor is yielded and `Ok` returned, so the caller
/// can poll in a loop.
pub fn process(engine: &Engine, channel: &Channel<Frame>) -> Result<(), DispatchError> {
    let mut frames = Vec::with_capacity(1);
    if channel.recv(&mut frames, 1, Duration::ZERO)? == 0 {
        std::thread::yield_now();
        return Ok(());
    }
    match frames.first() {
        Some(frame) => dispatch(engine, channel, frame),
        None => Ok(()),
    }
}

/// Decode `frame` and run its handler. `channel` is the one it arrived on; an exit frame
/// destroys it.
#[tracing::instrument(level = "debug", skip(engine, channel))]
pub fn dispatch(engine: &Engine, channel: &Channel<Frame>, frame: &Frame) -> Result<(), DispatchError> {
    let message = frame.message().inspect_err(|e| {
        error!("{} frame rejected: {e}", Action::name(frame.action_code()));
    })?;
    match message {
        Message::Unknown(code) => {
            info!("ignoring {} frame, action {code}", Action::name(code));
            Ok(())
        }
        Message::Exit => {
            engine.exit();
            channel.destroy()?;
            debug!("channel {} released", channel.name());
            Ok(())
        }
        Message::Launch(msg) => {
            engine.launch(msg.call_main)?;
            Ok(())
        }
        Message::Port(msg) => {
            engine.port_control(msg);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::{DispatchError, process};
    use crate::context::{Engine, EngineConfig};
    use crate::frame::{Action, Frame, FRAME_SIZE};
    use msgchan::{ChannelError, ChannelRegistry};
    use port::SoftPorts;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn engine() -> Engine {
        Engine::new(EngineConfig::default(), Arc::new(SoftPorts::new(1, 16)))
    }

    #[test]
    fn empty_channel_is_not_an_error() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        process(&engine(), &channel).unwrap();
        assert_eq!(channel.info().unwrap().recv_timeouts, 0);
    }

    #[test]
    #[traced_test]
    fn unknown_actions_are_ignored() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        let peer = registry.attach("ctl").unwrap();
        let mut bytes = Frame::exit().to_bytes();
        bytes[0] = 77;
        peer.send(&[Frame::from_bytes(&bytes)]).unwrap();
        process(&engine(), &channel).unwrap();
        assert!(logs_contain("ignoring Unknown frame, action 77"));
        assert!(channel.is_valid());
    }

    #[test]
    fn oversize_length_is_dropped() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        let peer = registry.attach("ctl").unwrap();
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0] = 1;
        bytes[2] = 200;
        peer.send(&[Frame::from_bytes(&bytes)]).unwrap();
        assert!(matches!(
            process(&engine(), &channel),
            Err(DispatchError::Frame(_))
        ));
        // the bad frame was consumed and nothing else happened
        assert!(channel.is_valid());
        process(&engine(), &channel).unwrap();
    }

    #[test]
    fn one_frame_per_call() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        let peer = registry.attach("ctl").unwrap();
        let noop = Frame::new(Action::Unknown, &[]).unwrap();
        peer.send(&[noop, noop]).unwrap();
        let engine = engine();
        process(&engine, &channel).unwrap();
        assert_eq!(channel.info().unwrap().recv_total, 1);
        process(&engine, &channel).unwrap();
        assert_eq!(channel.info().unwrap().recv_total, 2);
    }

    #[test]
    fn exit_releases_the_channel() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        let peer = registry.attach("ctl").unwrap();
        peer.send(&[Frame::exit()]).unwrap();
        let engine = engine();
        process(&engine, &channel).unwrap();
        assert!(engine.has_exited());
        assert!(!channel.is_valid());
        assert!(!peer.is_valid());
        assert!(registry.lookup("ctl").is_err());
        assert!(matches!(
            process(&engine, &channel),
            Err(DispatchError::Channel(ChannelError::InvalidChannel(_)))
        ));
    }

    #[test]
    fn launch_without_mapping_is_reported() {
        let registry = ChannelRegistry::<Frame>::new();
        let channel = registry.create("ctl", 8).unwrap();
        let peer = registry.attach("ctl").unwrap();
        peer.send(&[Frame::launch(false)]).unwrap();
        assert!(matches!(
            process(&engine(), &channel),
            Err(DispatchError::Launch(_))
        ));
    }
}
