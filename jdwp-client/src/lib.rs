// JDWP client library for Java debugging
//
// Implements the parts of the JDWP protocol a debugger engine needs:
// - Connection management and the event loop
// - Event requests (breakpoints, steps, field watches, exceptions, class loads)
// - Stack and thread inspection, monitors
// - Object, string and array access, instance creation

pub mod array;
pub mod commands;
pub mod connection;
pub mod eventloop;
pub mod eventrequest;
pub mod events;
pub mod method;
pub mod object;
pub mod protocol;
pub mod reader;
pub mod reftype;
pub mod stackframe;
pub mod string;
pub mod thread;
pub mod types;
pub mod vm;
pub mod writer;

pub use connection::JdwpConnection;
pub use eventrequest::SuspendPolicy;
pub use events::{Event, EventKind, EventModifier, EventSet};
pub use protocol::{JdwpError, JdwpResult};
