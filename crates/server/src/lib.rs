//! Drover server runtime - dispatcher tree, session routing, instrumentation.
//!
//! This crate is the server side of the drover protocol:
//!
//! - **Transport**: bidirectional JSON message channel (pipe or WebSocket)
//! - **Dispatcher tree**: guid-addressed server objects mirroring domain
//!   object lifetime, with recursive children-first disposal
//! - **Session**: routes inbound commands to dispatchers, correlates
//!   responses, pushes events back to the client
//! - **Instrumentation bus**: before/after/call-log hooks observed by
//!   cross-cutting listeners (recorder, debugger)
//! - **Pause controller**: suspends dispatch at instrumented call boundaries
//!
//! # Architecture
//!
//! ```text
//! client ──envelope──▶ Session ──guid──▶ DispatcherNode ──▶ handler
//!                        │                     │
//!                        │ before/after        │ __create__/__dispose__
//!                        ▼                     ▼
//!                InstrumentationBus      outbound events
//! ```

pub mod dispatcher;
pub mod error;
pub mod instrumentation;
pub mod object_store;
pub mod pause;
pub mod session;
pub mod transport;

pub use dispatcher::{DispatcherHandler, DispatcherNode, NodeState};
pub use error::{Error, Result};
pub use instrumentation::{InstrumentationBus, InstrumentationListener};
pub use object_store::ObjectStore;
pub use pause::PauseController;
pub use session::Session;
pub use transport::{
    PipeTransport, Transport, TransportParts, TransportReceiver, TransportSender,
    WebSocketTransport, loopback,
};
