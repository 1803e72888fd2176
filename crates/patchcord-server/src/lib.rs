//! Patchcord Server - the engine's side of the audio-server connection
//!
//! - [`ServerBridge`] - Implements [`AudioServer`](patchcord_core::AudioServer)
//!   by framing requests for a [`Transport`] and correlating replies through a
//!   [`Scheduler`](patchcord_core::Scheduler)
//! - [`protocol`] - Line-delimited JSON request/reply messages
//! - [`LoopbackTransport`] - A simulated server on a background thread, used
//!   by tests and the CLI
//!
//! # Threading
//!
//! The bridge, the scheduler and the canvas live on one thread. Only the
//! transport's reader side runs elsewhere, and it only ever pushes replies
//! into the scheduler's queue.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use patchcord_core::{Canvas, CanvasOptions, Scheduler};
//! use patchcord_server::{LoopbackOptions, LoopbackTransport, ServerBridge};
//!
//! let scheduler = Scheduler::init();
//! let transport = LoopbackTransport::spawn(scheduler.reply_sender(), LoopbackOptions::default());
//! let bridge = Rc::new(ServerBridge::new(transport, scheduler.clone()));
//! let canvas = Canvas::with_server(bridge, CanvasOptions::default());
//!
//! // Main loop: settle replies as they arrive
//! scheduler.wait(std::time::Duration::from_millis(10));
//! ```

mod bridge;
mod loopback;
pub mod protocol;
mod transport;

pub use bridge::ServerBridge;
pub use loopback::{
    FIRST_BUS, FIRST_GROUP, FIRST_NODE, LoopbackOptions, LoopbackState, LoopbackTransport,
};
pub use protocol::{Outgoing, ProtocolError, ServerReply, ServerRequest, WireToken};
pub use transport::{Transport, TransportError};
