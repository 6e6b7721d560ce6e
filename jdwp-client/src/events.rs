// JDWP event handling
//
// Events are sent from the JVM to notify about breakpoints, steps, etc.

use crate::commands::{event_kinds, modifier_kinds};
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_location, read_string, read_u64, read_u8, read_value};
use crate::types::*;
use crate::writer::{put_location, put_string};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Composite event packet (can contain multiple events)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSet {
    pub suspend_policy: u8,
    pub events: Vec<Event>,
}

/// Single event within an event set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: u8,
    pub request_id: i32,
    pub details: EventKind,
}

impl Event {
    /// Thread the event happened in, if the kind carries one
    pub fn thread(&self) -> Option<ThreadId> {
        self.details.thread()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    VMStart {
        thread: ThreadId,
    },
    VMDeath,
    ThreadStart {
        thread: ThreadId,
    },
    ThreadDeath {
        thread: ThreadId,
    },
    ClassPrepare {
        thread: ThreadId,
        ref_type: ReferenceTypeId,
        signature: String,
        status: i32,
    },
    ClassUnload {
        signature: String,
    },
    Breakpoint {
        thread: ThreadId,
        location: Location,
    },
    Step {
        thread: ThreadId,
        location: Location,
    },
    Exception {
        thread: ThreadId,
        location: Location,
        exception: ObjectId,
        catch_location: Option<Location>,
    },
    FieldAccess {
        thread: ThreadId,
        location: Location,
        ref_type: ReferenceTypeId,
        field_id: FieldId,
        object: ObjectId,
    },
    FieldModification {
        thread: ThreadId,
        location: Location,
        ref_type: ReferenceTypeId,
        field_id: FieldId,
        object: ObjectId,
        value_to_be: Value,
    },
    MethodEntry {
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        thread: ThreadId,
        location: Location,
    },
    MethodExitWithReturnValue {
        thread: ThreadId,
        location: Location,
        value: Value,
    },
    MonitorContendedEnter {
        thread: ThreadId,
        object: ObjectId,
        location: Location,
    },
    MonitorContendedEntered {
        thread: ThreadId,
        object: ObjectId,
        location: Location,
    },
    MonitorWait {
        thread: ThreadId,
        object: ObjectId,
        location: Location,
        timeout: u64,
    },
    MonitorWaited {
        thread: ThreadId,
        object: ObjectId,
        location: Location,
        timed_out: bool,
    },
    Unknown {
        kind: u8,
    },
}

impl EventKind {
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            EventKind::VMStart { thread }
            | EventKind::ThreadStart { thread }
            | EventKind::ThreadDeath { thread }
            | EventKind::ClassPrepare { thread, .. }
            | EventKind::Breakpoint { thread, .. }
            | EventKind::Step { thread, .. }
            | EventKind::Exception { thread, .. }
            | EventKind::FieldAccess { thread, .. }
            | EventKind::FieldModification { thread, .. }
            | EventKind::MethodEntry { thread, .. }
            | EventKind::MethodExit { thread, .. }
            | EventKind::MethodExitWithReturnValue { thread, .. }
            | EventKind::MonitorContendedEnter { thread, .. }
            | EventKind::MonitorContendedEntered { thread, .. }
            | EventKind::MonitorWait { thread, .. }
            | EventKind::MonitorWaited { thread, .. } => Some(*thread),
            EventKind::VMDeath | EventKind::ClassUnload { .. } | EventKind::Unknown { .. } => None,
        }
    }

    /// Code location the event happened at, if the kind carries one
    pub fn location(&self) -> Option<Location> {
        match self {
            EventKind::Breakpoint { location, .. }
            | EventKind::Step { location, .. }
            | EventKind::Exception { location, .. }
            | EventKind::FieldAccess { location, .. }
            | EventKind::FieldModification { location, .. }
            | EventKind::MethodEntry { location, .. }
            | EventKind::MethodExit { location, .. }
            | EventKind::MethodExitWithReturnValue { location, .. }
            | EventKind::MonitorContendedEnter { location, .. }
            | EventKind::MonitorContendedEntered { location, .. }
            | EventKind::MonitorWait { location, .. }
            | EventKind::MonitorWaited { location, .. } => Some(*location),
            _ => None,
        }
    }
}

// Event request modifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventModifier {
    Count(i32),
    ThreadOnly(ThreadId),
    ClassOnly(ReferenceTypeId),
    ClassMatch(String),
    ClassExclude(String),
    LocationOnly(Location),
    ExceptionOnly {
        ref_type: ReferenceTypeId, // 0 = any exception
        caught: bool,
        uncaught: bool,
    },
    FieldOnly {
        ref_type: ReferenceTypeId,
        field_id: FieldId,
    },
    Step {
        thread: ThreadId,
        size: i32,
        depth: i32,
    },
    InstanceOnly(ObjectId),
}

impl EventModifier {
    /// Append the modifier in EventRequest.Set layout
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            EventModifier::Count(count) => {
                buf.put_u8(modifier_kinds::COUNT);
                buf.put_i32(*count);
            }
            EventModifier::ThreadOnly(thread) => {
                buf.put_u8(modifier_kinds::THREAD_ONLY);
                buf.put_u64(*thread);
            }
            EventModifier::ClassOnly(class) => {
                buf.put_u8(modifier_kinds::CLASS_ONLY);
                buf.put_u64(*class);
            }
            EventModifier::ClassMatch(pattern) => {
                buf.put_u8(modifier_kinds::CLASS_MATCH);
                put_string(buf, pattern);
            }
            EventModifier::ClassExclude(pattern) => {
                buf.put_u8(modifier_kinds::CLASS_EXCLUDE);
                put_string(buf, pattern);
            }
            EventModifier::LocationOnly(location) => {
                buf.put_u8(modifier_kinds::LOCATION_ONLY);
                put_location(buf, location);
            }
            EventModifier::ExceptionOnly {
                ref_type,
                caught,
                uncaught,
            } => {
                buf.put_u8(modifier_kinds::EXCEPTION_ONLY);
                buf.put_u64(*ref_type);
                buf.put_u8(u8::from(*caught));
                buf.put_u8(u8::from(*uncaught));
            }
            EventModifier::FieldOnly { ref_type, field_id } => {
                buf.put_u8(modifier_kinds::FIELD_ONLY);
                buf.put_u64(*ref_type);
                buf.put_u64(*field_id);
            }
            EventModifier::Step {
                thread,
                size,
                depth,
            } => {
                buf.put_u8(modifier_kinds::STEP);
                buf.put_u64(*thread);
                buf.put_i32(*size);
                buf.put_i32(*depth);
            }
            EventModifier::InstanceOnly(object) => {
                buf.put_u8(modifier_kinds::INSTANCE_ONLY);
                buf.put_u64(*object);
            }
        }
    }
}

/// Parse an event packet from JDWP
pub fn parse_event_packet(data: &[u8]) -> JdwpResult<EventSet> {
    let mut buf = data;

    let suspend_policy = read_u8(&mut buf)?;
    let event_count = read_i32(&mut buf)?;

    let mut events = Vec::with_capacity(event_count.max(0) as usize);

    for _ in 0..event_count {
        let kind = read_u8(&mut buf)?;
        let request_id = read_i32(&mut buf)?;

        let details = match kind {
            event_kinds::BREAKPOINT => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::Breakpoint { thread, location }
            }
            event_kinds::SINGLE_STEP => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::Step { thread, location }
            }
            event_kinds::EXCEPTION => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                let _tag = read_u8(&mut buf)?;
                let exception = read_u64(&mut buf)?;
                let catch_location = read_location(&mut buf)?;
                // An uncaught exception reports a zeroed catch location
                let catch_location = (catch_location.class_id != 0).then_some(catch_location);
                EventKind::Exception {
                    thread,
                    location,
                    exception,
                    catch_location,
                }
            }
            event_kinds::FIELD_ACCESS | event_kinds::FIELD_MODIFICATION => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                let _ref_type_tag = read_u8(&mut buf)?;
                let ref_type = read_u64(&mut buf)?;
                let field_id = read_u64(&mut buf)?;
                let _object_tag = read_u8(&mut buf)?;
                let object = read_u64(&mut buf)?;
                if kind == event_kinds::FIELD_ACCESS {
                    EventKind::FieldAccess {
                        thread,
                        location,
                        ref_type,
                        field_id,
                        object,
                    }
                } else {
                    let value_to_be = read_value(&mut buf)?;
                    EventKind::FieldModification {
                        thread,
                        location,
                        ref_type,
                        field_id,
                        object,
                        value_to_be,
                    }
                }
            }
            event_kinds::METHOD_ENTRY => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::MethodEntry { thread, location }
            }
            event_kinds::METHOD_EXIT => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                EventKind::MethodExit { thread, location }
            }
            event_kinds::METHOD_EXIT_WITH_RETURN_VALUE => {
                let thread = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                let value = read_value(&mut buf)?;
                EventKind::MethodExitWithReturnValue {
                    thread,
                    location,
                    value,
                }
            }
            event_kinds::MONITOR_CONTENDED_ENTER
            | event_kinds::MONITOR_CONTENDED_ENTERED
            | event_kinds::MONITOR_WAIT
            | event_kinds::MONITOR_WAITED => {
                let thread = read_u64(&mut buf)?;
                let _tag = read_u8(&mut buf)?;
                let object = read_u64(&mut buf)?;
                let location = read_location(&mut buf)?;
                match kind {
                    event_kinds::MONITOR_CONTENDED_ENTER => EventKind::MonitorContendedEnter {
                        thread,
                        object,
                        location,
                    },
                    event_kinds::MONITOR_CONTENDED_ENTERED => EventKind::MonitorContendedEntered {
                        thread,
                        object,
                        location,
                    },
                    event_kinds::MONITOR_WAIT => EventKind::MonitorWait {
                        thread,
                        object,
                        location,
                        timeout: read_u64(&mut buf)?,
                    },
                    _ => EventKind::MonitorWaited {
                        thread,
                        object,
                        location,
                        timed_out: read_u8(&mut buf)? != 0,
                    },
                }
            }
            event_kinds::CLASS_PREPARE => {
                let thread = read_u64(&mut buf)?;
                let _ref_type_tag = read_u8(&mut buf)?;
                let ref_type = read_u64(&mut buf)?;
                let signature = read_string(&mut buf)?;
                let status = read_i32(&mut buf)?;
                EventKind::ClassPrepare {
                    thread,
                    ref_type,
                    signature,
                    status,
                }
            }
            event_kinds::CLASS_UNLOAD => {
                let signature = read_string(&mut buf)?;
                EventKind::ClassUnload { signature }
            }
            event_kinds::VM_START => {
                let thread = read_u64(&mut buf)?;
                EventKind::VMStart { thread }
            }
            event_kinds::VM_DEATH => EventKind::VMDeath,
            event_kinds::THREAD_START => {
                let thread = read_u64(&mut buf)?;
                EventKind::ThreadStart { thread }
            }
            event_kinds::THREAD_DEATH => {
                let thread = read_u64(&mut buf)?;
                EventKind::ThreadDeath { thread }
            }
            _ => {
                // Payload length is unknown, so nothing after this event can be parsed
                warn!("Unsupported event kind: {}", kind);
                events.push(Event {
                    kind,
                    request_id,
                    details: EventKind::Unknown { kind },
                });
                break;
            }
        };

        events.push(Event {
            kind,
            request_id,
            details,
        });
    }

    Ok(EventSet {
        suspend_policy,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::put_value;

    fn header(buf: &mut Vec<u8>, policy: u8, count: i32) {
        buf.put_u8(policy);
        buf.put_i32(count);
    }

    fn location(index: u64) -> Location {
        Location {
            type_tag: 1,
            class_id: 0x10,
            method_id: 0x20,
            index,
        }
    }

    #[test]
    fn test_composite_breakpoint_and_step() {
        let mut buf = Vec::new();
        header(&mut buf, 1, 2);
        buf.put_u8(event_kinds::BREAKPOINT);
        buf.put_i32(5);
        buf.put_u64(0x99);
        put_location(&mut buf, &location(3));
        buf.put_u8(event_kinds::SINGLE_STEP);
        buf.put_i32(6);
        buf.put_u64(0x99);
        put_location(&mut buf, &location(3));

        let set = parse_event_packet(&buf).unwrap();
        assert_eq!(set.suspend_policy, 1);
        assert_eq!(set.events.len(), 2);
        assert_eq!(set.events[0].request_id, 5);
        assert_eq!(set.events[1].thread(), Some(0x99));
        assert_eq!(set.events[1].details.location(), Some(location(3)));
    }

    #[test]
    fn test_field_modification_carries_new_value() {
        let mut buf = Vec::new();
        header(&mut buf, 2, 1);
        buf.put_u8(event_kinds::FIELD_MODIFICATION);
        buf.put_i32(11);
        buf.put_u64(0x1);
        put_location(&mut buf, &location(7));
        buf.put_u8(1);
        buf.put_u64(0x10);
        buf.put_u64(0x30);
        buf.put_u8(b'L');
        buf.put_u64(0x40);
        put_value(&mut buf, &Value::int(42));

        let set = parse_event_packet(&buf).unwrap();
        match &set.events[0].details {
            EventKind::FieldModification {
                field_id,
                object,
                value_to_be,
                ..
            } => {
                assert_eq!(*field_id, 0x30);
                assert_eq!(*object, 0x40);
                assert_eq!(*value_to_be, Value::int(42));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_uncaught_exception_has_no_catch_location() {
        let mut buf = Vec::new();
        header(&mut buf, 2, 1);
        buf.put_u8(event_kinds::EXCEPTION);
        buf.put_i32(3);
        buf.put_u64(0x1);
        put_location(&mut buf, &location(2));
        buf.put_u8(b'L');
        buf.put_u64(0x55);
        put_location(
            &mut buf,
            &Location {
                type_tag: 0,
                class_id: 0,
                method_id: 0,
                index: 0,
            },
        );

        let set = parse_event_packet(&buf).unwrap();
        match &set.events[0].details {
            EventKind::Exception {
                exception,
                catch_location,
                ..
            } => {
                assert_eq!(*exception, 0x55);
                assert!(catch_location.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_class_prepare() {
        let mut buf = Vec::new();
        header(&mut buf, 1, 1);
        buf.put_u8(event_kinds::CLASS_PREPARE);
        buf.put_i32(4);
        buf.put_u64(0x1);
        buf.put_u8(1);
        buf.put_u64(0x77);
        put_string(&mut buf, "Lcom/example/Main;");
        buf.put_i32(7);

        let set = parse_event_packet(&buf).unwrap();
        match &set.events[0].details {
            EventKind::ClassPrepare {
                ref_type,
                signature,
                ..
            } => {
                assert_eq!(*ref_type, 0x77);
                assert_eq!(signature, "Lcom/example/Main;");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_truncated_event_is_an_error() {
        let mut buf = Vec::new();
        header(&mut buf, 1, 1);
        buf.put_u8(event_kinds::BREAKPOINT);
        buf.put_i32(1);
        buf.put_u64(0x1);
        assert!(parse_event_packet(&buf).is_err());
    }

    #[test]
    fn test_step_modifier_layout() {
        let mut buf = Vec::new();
        EventModifier::Step {
            thread: 0x2,
            size: 1,
            depth: 2,
        }
        .encode(&mut buf);
        assert_eq!(buf.len(), 1 + 8 + 4 + 4);
        assert_eq!(buf[0], modifier_kinds::STEP);
    }
}
