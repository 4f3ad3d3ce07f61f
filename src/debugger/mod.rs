//! Remote PL/pgSQL debug session engine.
//!
//! Layers, leaves first:
//! - [`protocol`]: typed access to the `pldbgapi` SQL functions over a [`Connection`],
//! - [`source`]: routine descriptors and alignment of body lines with the definition,
//! - [`resolver`]: routine lookup by oid, by name or by call statement,
//! - [`snapshot`]: immutable stack snapshots,
//! - [`session`]: the worker serializing every operation of one session,
//! - [`direct`]: a call statement run on its own connection until it stops in the debugger.

pub mod breakpoint;
pub mod call;
pub mod direct;
mod error;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod source;
pub mod variable;

pub use breakpoint::{Breakpoint, BreakpointSink};
pub use call::{parse_break_notice, CallSite};
pub use direct::{TargetCall, DEFAULT_ATTACH_TIMEOUT};
pub use error::Error;
pub use protocol::connection::{Canceller, Connection, Row, TransportError};
pub use protocol::postgres::{PostgresConnection, NOTICE_LOG_TARGET};
pub use protocol::{activate_for_routine, Client, SessionHandle};
pub use resolver::{Resolver, RoutineCache};
pub use session::{
    ChannelObserver, SessionControl, SessionEvent, SessionObserver, SessionState, SessionWorker,
    Task,
};
pub use snapshot::{StackFrame, StackResult, StackSnapshot, StepResult};
pub use source::RoutineDescriptor;
pub use variable::{VarClass, VariableRecord};

/// Object identifier of a routine in the server catalog.
pub type Oid = i64;
