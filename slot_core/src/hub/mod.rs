//! Realtime hub: connection registry and ordered per-connection delivery.
//!
//! One [`HubActor`] owns the registry and processes commands in arrival order.
//! Each connection gets a bounded outbound queue drained by a single writer
//! task, the only code that writes to its transport. A client whose queue
//! fills up is disconnected rather than slowing producers down.

pub mod actor;
pub mod client;
pub mod dispatcher;
pub mod errors;
pub mod events;

pub use actor::{ClientConnection, DEFAULT_CLIENT_QUEUE, HubActor, HubCommand, HubHandle};
pub use client::{ClientId, ClientSink, Frame, spawn_writer};
pub use dispatcher::{
    ClientContext, ClientMessage, GameDispatcher, InboundFrame, MessageDispatcher, read_loop,
};
pub use errors::{HubError, HubResult};
pub use events::{EventPublisher, HubEvent, NoopPublisher, RecordingPublisher, Route};
