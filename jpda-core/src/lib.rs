// JPDA debugger engine
//
// Coordinates a debugging session over a `TargetVm`:
// - Breakpoint registry and request resolution against loaded classes
// - One dispatch task per session turning event sets into stops
// - Stepping, thread and monitor inspection, deadlock detection
// - Expression evaluation and host-side value mirrors

pub mod breakpoint;
pub mod config;
pub mod deadlock;
mod dispatch;
pub mod error;
pub mod eval;
pub mod launch;
pub mod mirror;
pub mod mock;
pub mod parser;
pub mod registry;
mod resolve;
pub mod session;
pub mod source;
pub mod step;
pub mod stop;
pub mod target;
pub mod threads;

pub use breakpoint::{
    Breakpoint, BreakpointEvent, BreakpointId, BreakpointKind, ConditionResult, HitCountFilter,
    Validity,
};
pub use config::DebuggerConfig;
pub use deadlock::Deadlock;
pub use error::{DebuggerError, Result};
pub use mirror::{HostValue, MirrorGraph, Variable, VariableKind};
pub use registry::BreakpointRegistry;
pub use session::{DebuggerEvent, DebuggerSession, SessionState, SourceLocation, StackFrame};
pub use step::{Step, StepDepth, StepEvent, StepSize, StepState};
pub use stop::StopHandle;
pub use target::TargetVm;
pub use threads::{ContendedMonitor, OwnedMonitorInfo, ThreadInfo};
