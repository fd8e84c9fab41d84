//! Wire types for the drover protocol.
//!
//! This crate defines the shared vocabulary between the session layer, the
//! dispatcher tree, and the recorder:
//!
//! - **Envelopes**: request/response/event messages crossing the transport
//! - **Call metadata**: per-call bookkeeping observed by instrumentation
//! - **Actions**: the recorded-action data model and its signals
//! - **Validator**: per-(type, method) parameter and result schemas
//!
//! Everything here is plain data - no I/O, no async. The server and recorder
//! crates own all behavior.

pub mod actions;
pub mod envelope;
pub mod metadata;
pub mod validator;

pub use actions::{Action, ActionInContext, FrameDescription, Modifier, MouseButton, Signal};
pub use envelope::{
    ErrorPayload, ErrorWrapper, Event, Message, Request, Response, deserialize_arc_str,
    serialize_arc_str,
};
pub use metadata::{CallMetadata, CallType, Point, StackFrame};
pub use validator::{ParamKind, ValidationError, Validator};
