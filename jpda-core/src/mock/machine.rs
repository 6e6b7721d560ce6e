// Interpreter state for the in-memory VM
//
// Every thread alternates between arriving at an instruction (breakpoint,
// step and method-entry checks) and executing it. Instructions that report
// events before they take effect (field access, field writes, throws,
// returns) run in two passes so a suspension lands between the report and
// the effect.

use super::program::{
    HeapDef, MockLocal, MockProgram, Op, OBJECT_BASE, OBJECT_CLASS, STRING_CLASS, THREAD_BASE,
    THREAD_CLASS,
};
use crate::registry::{class_signature, pattern_matches};
use jdwp_client::commands::{event_kinds, step_depths, step_sizes};
use jdwp_client::method::{LineTable, LineTableEntry};
use jdwp_client::object::MonitorInfo;
use jdwp_client::protocol::error_codes;
use jdwp_client::reftype::MethodInfo;
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::thread::{Frame, OwnedMonitor};
use jdwp_client::types::{
    ref_type_tags, signature_tag, FieldId, FieldInfo, FrameId, Location, MethodId, ObjectId,
    ReferenceTypeId, SuspendStatus, ThreadId, ThreadStatus, Value, Variable,
};
use jdwp_client::vm::ClassInfo;
use jdwp_client::{Event, EventKind, EventModifier, EventSet, JdwpError, JdwpResult, SuspendPolicy};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub(crate) const CLASS_BASE: ReferenceTypeId = 0x100;
const METHOD_BASE: MethodId = 0x2_0000;
const FIELD_BASE: FieldId = 0x3_0000;
const FRAME_BASE: FrameId = 0x4_0000;

// VERIFIED | PREPARED | INITIALIZED
const CLASS_STATUS_READY: i32 = 7;
const ACC_PUBLIC: i32 = 0x0001;
const ACC_STATIC: i32 = 0x0008;

const KNOWN_EVENT_KINDS: &[u8] = &[
    event_kinds::SINGLE_STEP,
    event_kinds::BREAKPOINT,
    event_kinds::EXCEPTION,
    event_kinds::THREAD_START,
    event_kinds::THREAD_DEATH,
    event_kinds::CLASS_PREPARE,
    event_kinds::CLASS_UNLOAD,
    event_kinds::FIELD_ACCESS,
    event_kinds::FIELD_MODIFICATION,
    event_kinds::METHOD_ENTRY,
    event_kinds::METHOD_EXIT,
    event_kinds::METHOD_EXIT_WITH_RETURN_VALUE,
    event_kinds::MONITOR_CONTENDED_ENTER,
    event_kinds::MONITOR_CONTENDED_ENTERED,
    event_kinds::VM_DEATH,
];

fn err<T>(code: u16) -> JdwpResult<T> {
    Err(JdwpError::code(code))
}

/// Zero value for a JNI type signature
pub(crate) fn default_value(signature: &str) -> Value {
    match signature.as_bytes().first() {
        Some(b'Z') => Value::boolean(false),
        Some(b'B') => Value::byte(0),
        Some(b'C') => Value::char(0),
        Some(b'S') => Value::short(0),
        Some(b'I') => Value::int(0),
        Some(b'J') => Value::long(0),
        Some(b'F') => Value::float(0.0),
        Some(b'D') => Value::double(0.0),
        _ => Value::object(signature_tag(signature), 0),
    }
}

fn default_for_tag(tag: u8) -> Value {
    default_value(&(tag as char).to_string())
}

struct FieldRt {
    id: FieldId,
    name: String,
    signature: String,
    is_static: bool,
}

struct MethodRt {
    id: MethodId,
    name: String,
    signature: String,
    is_static: bool,
    synthetic: bool,
    locals: Vec<MockLocal>,
    code: Vec<(i32, Op)>,
}

struct ClassRt {
    id: ReferenceTypeId,
    name: String,
    signature: String,
    tag: u8,
    superclass: Option<usize>,
    fields: Vec<FieldRt>,
    methods: Vec<MethodRt>,
    loaded: bool,
}

enum ObjKind {
    Plain(HashMap<FieldId, Value>),
    Str(String),
    Array(Vec<Value>),
    Thread,
}

struct ObjectRt {
    class: usize,
    kind: ObjKind,
}

#[derive(Default)]
struct MonitorRt {
    owner: Option<usize>,
    count: u32,
}

struct FrameRt {
    id: FrameId,
    class: usize,
    method: usize,
    pc: usize,
    this: Option<ObjectId>,
    locals: HashMap<u32, Value>,
    fresh: bool,
    returned: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Arrive,
    Execute,
    Reported,
}

struct ThreadRt {
    id: ThreadId,
    name: String,
    entry_class: String,
    entry_method: String,
    entry_this: Option<ObjectId>,
    frames: Vec<FrameRt>,
    suspend_count: u32,
    phase: Phase,
    blocked_on: Option<ObjectId>,
    // (monitor, index of the frame that entered it)
    owned: Vec<(ObjectId, usize)>,
    started: bool,
    dead: bool,
}

struct StepRt {
    size: i32,
    depth: i32,
    origin_depth: usize,
    origin_line: i32,
}

struct RequestRt {
    id: i32,
    kind: u8,
    policy: SuspendPolicy,
    modifiers: Vec<EventModifier>,
    count_left: Option<i32>,
    step: Option<StepRt>,
}

#[derive(Default)]
struct Ctx {
    thread: Option<usize>,
    class: Option<usize>,
    location: Option<Location>,
    field: Option<(usize, FieldId)>,
    exception: Option<(usize, bool)>,
    this: Option<ObjectId>,
}

struct Hit {
    request_id: i32,
    policy: SuspendPolicy,
    kind: u8,
    details: EventKind,
}

pub(crate) enum Tick {
    Progress,
    Idle,
    Finished,
}

pub(crate) struct Machine {
    classes: Vec<ClassRt>,
    methods: HashMap<MethodId, (usize, usize)>,
    fields: HashMap<FieldId, (usize, usize)>,
    statics: HashMap<FieldId, Value>,
    objects: HashMap<ObjectId, ObjectRt>,
    next_object: ObjectId,
    monitors: HashMap<ObjectId, MonitorRt>,
    threads: Vec<ThreadRt>,
    requests: Vec<RequestRt>,
    next_request: i32,
    next_frame: FrameId,
    next_method: MethodId,
    next_field: FieldId,
    events: Option<mpsc::UnboundedSender<EventSet>>,
    dead: bool,
    closed: bool,
}

impl Machine {
    /// Build the VM and report VMStart with every thread suspended
    pub(crate) fn new(program: &MockProgram, events: mpsc::UnboundedSender<EventSet>) -> Self {
        let mut machine = Machine {
            classes: Vec::new(),
            methods: HashMap::new(),
            fields: HashMap::new(),
            statics: HashMap::new(),
            objects: HashMap::new(),
            next_object: OBJECT_BASE + program.heap.len() as u64,
            monitors: HashMap::new(),
            threads: Vec::new(),
            requests: Vec::new(),
            next_request: 1,
            next_frame: FRAME_BASE,
            next_method: METHOD_BASE,
            next_field: FIELD_BASE,
            events: Some(events),
            dead: false,
            closed: false,
        };

        for class in &program.classes {
            let index = machine.classes.len();
            let mut fields = Vec::new();
            for field in &class.fields {
                let id = machine.next_field;
                machine.next_field += 1;
                machine.fields.insert(id, (index, fields.len()));
                if let Some(initial) = &field.initial {
                    machine.statics.insert(id, initial.clone());
                }
                fields.push(FieldRt {
                    id,
                    name: field.name.clone(),
                    signature: field.signature.clone(),
                    is_static: field.is_static,
                });
            }

            let mut methods = Vec::new();
            let has_ctor = class.methods.iter().any(|m| m.name == "<init>");
            let ctor = (!has_ctor).then(|| MethodRt {
                id: 0,
                name: "<init>".to_string(),
                signature: "()V".to_string(),
                is_static: false,
                synthetic: true,
                locals: Vec::new(),
                code: vec![(0, Op::Return(None))],
            });
            let declared = class.methods.iter().map(|m| MethodRt {
                id: 0,
                name: m.name.clone(),
                signature: m.signature.clone(),
                is_static: m.is_static,
                synthetic: false,
                locals: m.locals.clone(),
                code: m.finished_code(),
            });
            for mut method in ctor.into_iter().chain(declared) {
                method.id = machine.next_method;
                machine.next_method += 1;
                machine.methods.insert(method.id, (index, methods.len()));
                methods.push(method);
            }

            machine.classes.push(ClassRt {
                id: CLASS_BASE + index as u64,
                name: class.name.clone(),
                signature: class_signature(&class.name),
                tag: ref_type_tags::CLASS,
                superclass: None,
                fields,
                methods,
                loaded: class.preloaded,
            });
        }
        for (index, class) in program.classes.iter().enumerate() {
            machine.classes[index].superclass =
                class.superclass.as_deref().and_then(|name| machine.find_class(name));
        }

        for (offset, def) in program.heap.iter().enumerate() {
            let id = OBJECT_BASE + offset as u64;
            let object = match def {
                HeapDef::Object { class, fields } => {
                    let class = machine.find_class(class).unwrap_or_else(|| machine.object_class());
                    let mut values = HashMap::new();
                    for (name, value) in fields {
                        match machine.resolve_field(class, name) {
                            Some((_, field_id, false)) => {
                                values.insert(field_id, value.clone());
                            }
                            _ => warn!("mock heap: no instance field {} on object {:x}", name, id),
                        }
                    }
                    ObjectRt {
                        class,
                        kind: ObjKind::Plain(values),
                    }
                }
                HeapDef::Array {
                    signature,
                    elements,
                } => ObjectRt {
                    class: machine.array_class(signature),
                    kind: ObjKind::Array(elements.clone()),
                },
                HeapDef::Str(value) => ObjectRt {
                    class: machine.find_class(STRING_CLASS).unwrap_or(0),
                    kind: ObjKind::Str(value.clone()),
                },
            };
            machine.objects.insert(id, object);
        }

        let thread_class = machine.find_class(THREAD_CLASS).unwrap_or(0);
        for (index, thread) in program.threads.iter().enumerate() {
            let id = THREAD_BASE + index as u64;
            machine.objects.insert(
                id,
                ObjectRt {
                    class: thread_class,
                    kind: ObjKind::Thread,
                },
            );
            machine.threads.push(ThreadRt {
                id,
                name: thread.name.clone(),
                entry_class: thread.class.clone(),
                entry_method: thread.method.clone(),
                entry_this: thread.this,
                frames: Vec::new(),
                suspend_count: 0,
                phase: Phase::Arrive,
                blocked_on: None,
                owned: Vec::new(),
                started: false,
                dead: false,
            });
        }

        let main = machine.threads.first().map(|t| t.id).unwrap_or(0);
        machine.emit(
            None,
            vec![Hit {
                request_id: 0,
                policy: SuspendPolicy::All,
                kind: event_kinds::VM_START,
                details: EventKind::VMStart { thread: main },
            }],
        );
        machine
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.dead
    }

    // ---- scheduling ----

    pub(crate) fn tick(&mut self) -> Tick {
        if self.dead || self.closed {
            return Tick::Finished;
        }
        let mut progressed = false;
        for t in 0..self.threads.len() {
            if self.threads[t].dead || self.threads[t].suspend_count > 0 {
                continue;
            }
            if self.run_thread(t) {
                progressed = true;
            }
        }
        if self.threads.iter().all(|t| t.dead) {
            self.vm_death();
            return Tick::Finished;
        }
        if progressed {
            Tick::Progress
        } else {
            Tick::Idle
        }
    }

    fn run_thread(&mut self, t: usize) -> bool {
        if self.threads[t].frames.is_empty() {
            return self.start_thread(t);
        }
        match self.threads[t].phase {
            Phase::Arrive => {
                self.arrive(t);
                true
            }
            Phase::Execute | Phase::Reported => self.execute(t),
        }
    }

    fn start_thread(&mut self, t: usize) -> bool {
        if self.threads[t].started {
            return false;
        }
        let class_name = self.threads[t].entry_class.clone();
        let Some(class) = self.find_class(&class_name) else {
            warn!("mock: thread {} starts in unknown class {}", self.threads[t].name, class_name);
            self.finish_thread(t);
            return true;
        };
        if !self.classes[class].loaded {
            self.load_class(class, t);
            return true;
        }
        let method_name = self.threads[t].entry_method.clone();
        let Some((class, method)) = self.find_method(class, &method_name) else {
            warn!("mock: thread {} starts in unknown method {}", self.threads[t].name, method_name);
            self.finish_thread(t);
            return true;
        };
        self.threads[t].started = true;
        let this = self.threads[t].entry_this;
        self.push_frame(t, class, method, this);
        if t != 0 {
            let thread = self.threads[t].id;
            let ctx = Ctx {
                thread: Some(t),
                ..Default::default()
            };
            let hits = self.hits(event_kinds::THREAD_START, &ctx, EventKind::ThreadStart { thread });
            self.emit(Some(t), hits);
        }
        true
    }

    fn arrive(&mut self, t: usize) {
        self.threads[t].phase = Phase::Execute;
        let Some(location) = self.location(t) else {
            return;
        };
        let thread = self.threads[t].id;
        let Some(frame) = self.threads[t].frames.last_mut() else {
            return;
        };
        let fresh = std::mem::take(&mut frame.fresh);
        let returned = frame.returned;
        let ctx = Ctx {
            thread: Some(t),
            class: Some(frame.class),
            location: Some(location),
            this: frame.this,
            ..Default::default()
        };

        let mut hits = Vec::new();
        // Execution resumes after the invoke, so the call site's breakpoint
        // does not fire again
        if !returned {
            hits.extend(self.hits(
                event_kinds::BREAKPOINT,
                &ctx,
                EventKind::Breakpoint { thread, location },
            ));
        }
        hits.extend(self.hits(
            event_kinds::SINGLE_STEP,
            &ctx,
            EventKind::Step { thread, location },
        ));
        if fresh {
            hits.extend(self.hits(
                event_kinds::METHOD_ENTRY,
                &ctx,
                EventKind::MethodEntry { thread, location },
            ));
        }
        self.emit(Some(t), hits);
    }

    fn execute(&mut self, t: usize) -> bool {
        let Some(frame) = self.threads[t].frames.last_mut() else {
            return false;
        };
        if frame.returned {
            frame.returned = false;
            self.advance(t);
            return true;
        }
        let (class, method, pc, this) = (frame.class, frame.method, frame.pc, frame.this);
        let Some((_, op)) = self.classes[class].methods[method].code.get(pc).cloned() else {
            self.pop_frame(t);
            return true;
        };

        if let Some(name) = op.referenced_class() {
            if let Some(target) = self.find_class(name) {
                if !self.classes[target].loaded {
                    self.load_class(target, t);
                    return true;
                }
            }
        }

        let reported = self.threads[t].phase == Phase::Reported;
        let thread = self.threads[t].id;
        let Some(location) = self.location(t) else {
            return false;
        };
        let ctx = Ctx {
            thread: Some(t),
            class: Some(class),
            location: Some(location),
            this,
            ..Default::default()
        };

        match op {
            Op::Nop => self.advance(t),
            Op::SetLocal { slot, value } => {
                if let Some(frame) = self.threads[t].frames.last_mut() {
                    frame.locals.insert(slot, value);
                }
                self.advance(t);
            }
            Op::Call {
                class: class_name,
                method: method_name,
            } => {
                let target = self
                    .find_class(&class_name)
                    .and_then(|c| self.find_method(c, &method_name));
                match target {
                    Some((callee_class, callee)) => {
                        let callee_this = if self.classes[callee_class].methods[callee].is_static {
                            None
                        } else {
                            this
                        };
                        self.push_frame(t, callee_class, callee, callee_this);
                    }
                    None => {
                        warn!("mock: no method {}.{}", class_name, method_name);
                        self.advance(t);
                    }
                }
            }
            Op::Return(value) => {
                if !reported {
                    self.threads[t].phase = Phase::Reported;
                    let mut hits =
                        self.hits(event_kinds::METHOD_EXIT, &ctx, EventKind::MethodExit { thread, location });
                    hits.extend(self.hits(
                        event_kinds::METHOD_EXIT_WITH_RETURN_VALUE,
                        &ctx,
                        EventKind::MethodExitWithReturnValue {
                            thread,
                            location,
                            value: value.unwrap_or_else(Value::void),
                        },
                    ));
                    if self.emit(Some(t), hits) {
                        return true;
                    }
                }
                self.pop_frame(t);
            }
            Op::PutField { field, value } => {
                let Some((owner, field_id, is_static)) = self.resolve_field(class, &field) else {
                    warn!("mock: no field {} in {}", field, self.classes[class].name);
                    self.advance(t);
                    return true;
                };
                let object = if is_static { 0 } else { this.unwrap_or(0) };
                if !reported {
                    self.threads[t].phase = Phase::Reported;
                    let ctx = Ctx {
                        field: Some((owner, field_id)),
                        ..ctx
                    };
                    let hits = self.hits(
                        event_kinds::FIELD_MODIFICATION,
                        &ctx,
                        EventKind::FieldModification {
                            thread,
                            location,
                            ref_type: self.classes[owner].id,
                            field_id,
                            object,
                            value_to_be: value.clone(),
                        },
                    );
                    if self.emit(Some(t), hits) {
                        return true;
                    }
                }
                if is_static {
                    self.statics.insert(field_id, value);
                } else if let Some(ObjectRt {
                    kind: ObjKind::Plain(fields),
                    ..
                }) = self.objects.get_mut(&object)
                {
                    fields.insert(field_id, value);
                }
                self.advance(t);
            }
            Op::GetField { field } => {
                let Some((owner, field_id, is_static)) = self.resolve_field(class, &field) else {
                    warn!("mock: no field {} in {}", field, self.classes[class].name);
                    self.advance(t);
                    return true;
                };
                if !reported {
                    self.threads[t].phase = Phase::Reported;
                    let ctx = Ctx {
                        field: Some((owner, field_id)),
                        ..ctx
                    };
                    let hits = self.hits(
                        event_kinds::FIELD_ACCESS,
                        &ctx,
                        EventKind::FieldAccess {
                            thread,
                            location,
                            ref_type: self.classes[owner].id,
                            field_id,
                            object: if is_static { 0 } else { this.unwrap_or(0) },
                        },
                    );
                    if self.emit(Some(t), hits) {
                        return true;
                    }
                }
                self.advance(t);
            }
            Op::Throw {
                class: class_name,
                caught,
            } => {
                let Some(exception_class) = self.find_class(&class_name) else {
                    warn!("mock: no exception class {}", class_name);
                    self.advance(t);
                    return true;
                };
                if !reported {
                    self.threads[t].phase = Phase::Reported;
                    let exception = self.allocate(exception_class, ObjKind::Plain(HashMap::new()));
                    let catch_location = caught.then_some(Location {
                        index: pc as u64 + 1,
                        ..location
                    });
                    let ctx = Ctx {
                        exception: Some((exception_class, caught)),
                        ..ctx
                    };
                    let hits = self.hits(
                        event_kinds::EXCEPTION,
                        &ctx,
                        EventKind::Exception {
                            thread,
                            location,
                            exception,
                            catch_location,
                        },
                    );
                    if self.emit(Some(t), hits) {
                        return true;
                    }
                }
                if caught {
                    self.advance(t);
                } else {
                    debug!("mock: uncaught {} in thread {}", class_name, self.threads[t].name);
                    self.finish_thread(t);
                }
            }
            Op::MonitorEnter(monitor) => return self.monitor_enter(t, monitor, &ctx),
            Op::MonitorExit(monitor) => {
                self.release_monitor(t, monitor);
                self.advance(t);
            }
        }
        true
    }

    fn monitor_enter(&mut self, t: usize, monitor: ObjectId, ctx: &Ctx) -> bool {
        let thread = self.threads[t].id;
        let Some(location) = ctx.location else {
            return false;
        };
        let owner = self.monitors.entry(monitor).or_default().owner;
        if owner.is_some_and(|owner| owner != t) {
            if self.threads[t].blocked_on.is_some() {
                return false;
            }
            self.threads[t].blocked_on = Some(monitor);
            let hits = self.hits(
                event_kinds::MONITOR_CONTENDED_ENTER,
                ctx,
                EventKind::MonitorContendedEnter {
                    thread,
                    object: monitor,
                    location,
                },
            );
            self.emit(Some(t), hits);
            return true;
        }

        let was_blocked = self.threads[t].blocked_on.take().is_some();
        let entry = self.monitors.entry(monitor).or_default();
        entry.owner = Some(t);
        entry.count += 1;
        let depth = self.threads[t].frames.len().saturating_sub(1);
        self.threads[t].owned.push((monitor, depth));
        if was_blocked {
            let hits = self.hits(
                event_kinds::MONITOR_CONTENDED_ENTERED,
                ctx,
                EventKind::MonitorContendedEntered {
                    thread,
                    object: monitor,
                    location,
                },
            );
            self.emit(Some(t), hits);
        }
        self.advance(t);
        true
    }

    fn release_monitor(&mut self, t: usize, monitor: ObjectId) {
        let Some(entry) = self.monitors.get_mut(&monitor) else {
            return;
        };
        if entry.owner != Some(t) {
            return;
        }
        entry.count = entry.count.saturating_sub(1);
        if entry.count == 0 {
            entry.owner = None;
        }
        let owned = &mut self.threads[t].owned;
        if let Some(pos) = owned.iter().rposition(|(m, _)| *m == monitor) {
            owned.remove(pos);
        }
    }

    fn push_frame(&mut self, t: usize, class: usize, method: usize, this: Option<ObjectId>) {
        let id = self.next_frame;
        self.next_frame += 1;
        let thread = &mut self.threads[t];
        thread.frames.push(FrameRt {
            id,
            class,
            method,
            pc: 0,
            this,
            locals: HashMap::new(),
            fresh: true,
            returned: false,
        });
        thread.phase = Phase::Arrive;
    }

    fn pop_frame(&mut self, t: usize) {
        let thread = &mut self.threads[t];
        thread.frames.pop();
        if thread.frames.is_empty() {
            self.finish_thread(t);
            return;
        }
        let top = thread.frames.len() - 1;
        for (_, depth) in thread.owned.iter_mut() {
            *depth = (*depth).min(top);
        }
        if let Some(caller) = thread.frames.last_mut() {
            caller.returned = true;
        }
        thread.phase = Phase::Arrive;
    }

    fn advance(&mut self, t: usize) {
        let thread = &mut self.threads[t];
        if let Some(frame) = thread.frames.last_mut() {
            frame.pc += 1;
        }
        thread.phase = Phase::Arrive;
    }

    fn finish_thread(&mut self, t: usize) {
        let owned = std::mem::take(&mut self.threads[t].owned);
        for (monitor, _) in owned {
            if let Some(entry) = self.monitors.get_mut(&monitor) {
                if entry.owner == Some(t) {
                    entry.owner = None;
                    entry.count = 0;
                }
            }
        }
        let thread = &mut self.threads[t];
        thread.frames.clear();
        thread.blocked_on = None;
        thread.started = true;
        thread.dead = true;
        debug!("mock: thread {} finished", thread.name);

        let id = thread.id;
        let ctx = Ctx {
            thread: Some(t),
            ..Default::default()
        };
        let hits = self.hits(event_kinds::THREAD_DEATH, &ctx, EventKind::ThreadDeath { thread: id });
        self.emit(Some(t), hits);
    }

    fn load_class(&mut self, class: usize, t: usize) {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(index) = current {
            if self.classes[index].loaded {
                break;
            }
            chain.push(index);
            current = self.classes[index].superclass;
        }

        let thread = self.threads[t].id;
        let mut hits = Vec::new();
        for index in chain.into_iter().rev() {
            self.classes[index].loaded = true;
            debug!("mock: loaded {}", self.classes[index].name);
            let ctx = Ctx {
                thread: Some(t),
                class: Some(index),
                ..Default::default()
            };
            let details = EventKind::ClassPrepare {
                thread,
                ref_type: self.classes[index].id,
                signature: self.classes[index].signature.clone(),
                status: CLASS_STATUS_READY,
            };
            hits.extend(self.hits(event_kinds::CLASS_PREPARE, &ctx, details));
        }
        self.emit(Some(t), hits);
    }

    fn vm_death(&mut self) {
        self.dead = true;
        let mut events = vec![Event {
            kind: event_kinds::VM_DEATH,
            request_id: 0,
            details: EventKind::VMDeath,
        }];
        events.extend(
            self.requests
                .iter()
                .filter(|r| r.kind == event_kinds::VM_DEATH)
                .map(|r| Event {
                    kind: event_kinds::VM_DEATH,
                    request_id: r.id,
                    details: EventKind::VMDeath,
                }),
        );
        if let Some(tx) = self.events.take() {
            tx.send(EventSet {
                suspend_policy: SuspendPolicy::None as u8,
                events,
            })
            .ok();
        }
        info!("mock: VM died");
    }

    // ---- event matching ----

    fn hits(&mut self, kind: u8, ctx: &Ctx, details: EventKind) -> Vec<Hit> {
        let position = ctx
            .thread
            .map(|t| (self.threads[t].frames.len(), self.current_line(t)));
        let mut hits = Vec::new();
        let mut expired = Vec::new();
        for index in 0..self.requests.len() {
            let request = &self.requests[index];
            if request.kind != kind || !self.modifiers_match(request, ctx) {
                continue;
            }
            let request = &mut self.requests[index];
            if let Some(left) = request.count_left.as_mut() {
                *left -= 1;
                if *left > 0 {
                    continue;
                }
                expired.push(request.id);
            }
            if let (Some(step), Some((depth, line))) = (request.step.as_mut(), position) {
                step.origin_depth = depth;
                step.origin_line = line;
            }
            hits.push(Hit {
                request_id: request.id,
                policy: request.policy,
                kind,
                details: details.clone(),
            });
        }
        if !expired.is_empty() {
            self.requests.retain(|r| !expired.contains(&r.id));
        }
        hits
    }

    fn modifiers_match(&self, request: &RequestRt, ctx: &Ctx) -> bool {
        let thread_id = ctx.thread.map(|t| self.threads[t].id);
        request.modifiers.iter().all(|modifier| match modifier {
            EventModifier::Count(_) => true,
            EventModifier::ThreadOnly(id) => thread_id == Some(*id),
            EventModifier::ClassOnly(class) => ctx
                .class
                .is_some_and(|c| self.is_subclass_of(c, *class)),
            EventModifier::ClassMatch(pattern) => ctx
                .class
                .is_some_and(|c| pattern_matches(pattern, &self.classes[c].name)),
            EventModifier::ClassExclude(pattern) => ctx
                .class
                .map_or(true, |c| !pattern_matches(pattern, &self.classes[c].name)),
            EventModifier::LocationOnly(location) => ctx.location.as_ref() == Some(location),
            EventModifier::ExceptionOnly {
                ref_type,
                caught,
                uncaught,
            } => match ctx.exception {
                Some((class, is_caught)) => {
                    (*ref_type == 0 || self.is_subclass_of(class, *ref_type))
                        && if is_caught { *caught } else { *uncaught }
                }
                None => false,
            },
            EventModifier::FieldOnly { ref_type, field_id } => ctx
                .field
                .is_some_and(|(class, field)| field == *field_id && self.classes[class].id == *ref_type),
            EventModifier::Step { thread, .. } => {
                thread_id == Some(*thread) && self.step_fires(request, ctx)
            }
            EventModifier::InstanceOnly(object) => ctx.this == Some(*object),
        })
    }

    fn step_fires(&self, request: &RequestRt, ctx: &Ctx) -> bool {
        let (Some(step), Some(t)) = (&request.step, ctx.thread) else {
            return false;
        };
        let depth = self.threads[t].frames.len();
        let new_position = step.size == step_sizes::MIN || self.current_line(t) != step.origin_line;
        match step.depth {
            step_depths::OUT => depth < step.origin_depth,
            step_depths::OVER => {
                depth < step.origin_depth || (depth == step.origin_depth && new_position)
            }
            _ => depth != step.origin_depth || new_position,
        }
    }

    fn emit(&mut self, thread: Option<usize>, hits: Vec<Hit>) -> bool {
        if hits.is_empty() {
            return false;
        }
        let policy = hits.iter().fold(SuspendPolicy::None, |acc, hit| {
            if hit.policy as u8 > acc as u8 {
                hit.policy
            } else {
                acc
            }
        });
        match policy {
            SuspendPolicy::All => self.threads.iter_mut().for_each(|t| t.suspend_count += 1),
            SuspendPolicy::EventThread => {
                if let Some(t) = thread {
                    self.threads[t].suspend_count += 1;
                }
            }
            SuspendPolicy::None => {}
        }
        let set = EventSet {
            suspend_policy: policy as u8,
            events: hits
                .into_iter()
                .map(|hit| Event {
                    kind: hit.kind,
                    request_id: hit.request_id,
                    details: hit.details,
                })
                .collect(),
        };
        debug!(
            "mock: event set policy={:?} kinds={:?}",
            policy,
            set.events.iter().map(|e| e.kind).collect::<Vec<_>>()
        );
        if let Some(tx) = &self.events {
            if tx.send(set).is_err() {
                self.events = None;
            }
        }
        true
    }

    // ---- lookups ----

    pub(crate) fn find_class(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| c.name == name)
    }

    fn object_class(&self) -> usize {
        self.find_class(OBJECT_CLASS).unwrap_or(0)
    }

    fn array_class(&mut self, signature: &str) -> usize {
        if let Some(index) = self.classes.iter().position(|c| c.signature == signature) {
            return index;
        }
        let index = self.classes.len();
        self.classes.push(ClassRt {
            id: CLASS_BASE + index as u64,
            name: signature.to_string(),
            signature: signature.to_string(),
            tag: ref_type_tags::ARRAY,
            superclass: Some(self.object_class()),
            fields: Vec::new(),
            methods: Vec::new(),
            loaded: true,
        });
        index
    }

    /// Method by name in the class or its superclasses
    fn find_method(&self, class: usize, name: &str) -> Option<(usize, usize)> {
        let mut current = Some(class);
        while let Some(index) = current {
            if let Some(method) = self.classes[index].methods.iter().position(|m| m.name == name) {
                return Some((index, method));
            }
            current = self.classes[index].superclass;
        }
        None
    }

    /// (declaring class, field id, is static) for a field visible from `class`
    fn resolve_field(&self, class: usize, name: &str) -> Option<(usize, FieldId, bool)> {
        let mut current = Some(class);
        while let Some(index) = current {
            if let Some(field) = self.classes[index].fields.iter().find(|f| f.name == name) {
                return Some((index, field.id, field.is_static));
            }
            current = self.classes[index].superclass;
        }
        None
    }

    fn is_subclass_of(&self, class: usize, ancestor: ReferenceTypeId) -> bool {
        let mut current = Some(class);
        while let Some(index) = current {
            if self.classes[index].id == ancestor {
                return true;
            }
            current = self.classes[index].superclass;
        }
        false
    }

    fn location(&self, t: usize) -> Option<Location> {
        let frame = self.threads[t].frames.last()?;
        Some(self.frame_location(frame))
    }

    fn frame_location(&self, frame: &FrameRt) -> Location {
        let class = &self.classes[frame.class];
        Location {
            type_tag: ref_type_tags::CLASS,
            class_id: class.id,
            method_id: class.methods[frame.method].id,
            index: frame.pc as u64,
        }
    }

    fn current_line(&self, t: usize) -> i32 {
        self.threads[t]
            .frames
            .last()
            .and_then(|f| self.classes[f.class].methods[f.method].code.get(f.pc))
            .map(|(line, _)| *line)
            .unwrap_or(-1)
    }

    fn allocate(&mut self, class: usize, kind: ObjKind) -> ObjectId {
        let id = self.next_object;
        self.next_object += 1;
        self.objects.insert(id, ObjectRt { class, kind });
        id
    }

    fn class_index(&self, id: ReferenceTypeId) -> JdwpResult<usize> {
        match id.checked_sub(CLASS_BASE) {
            Some(index) if (index as usize) < self.classes.len() => Ok(index as usize),
            _ => err(error_codes::INVALID_CLASS),
        }
    }

    fn method_index(&self, class: ReferenceTypeId, method: MethodId) -> JdwpResult<(usize, usize)> {
        let class = self.class_index(class)?;
        match self.methods.get(&method) {
            Some(&(c, m)) if c == class => Ok((c, m)),
            _ => err(error_codes::INVALID_METHODID),
        }
    }

    fn thread_index(&self, id: ThreadId) -> JdwpResult<usize> {
        match id.checked_sub(THREAD_BASE) {
            Some(index) if (index as usize) < self.threads.len() => Ok(index as usize),
            _ => err(error_codes::INVALID_THREAD),
        }
    }

    fn suspended_thread(&self, id: ThreadId) -> JdwpResult<usize> {
        let t = self.thread_index(id)?;
        if self.threads[t].suspend_count == 0 {
            return err(error_codes::THREAD_NOT_SUSPENDED);
        }
        Ok(t)
    }

    fn frame_mut(&mut self, thread: ThreadId, frame: FrameId) -> JdwpResult<&mut FrameRt> {
        let t = self.suspended_thread(thread)?;
        match self.threads[t].frames.iter_mut().find(|f| f.id == frame) {
            Some(frame) => Ok(frame),
            None => err(error_codes::INVALID_FRAMEID),
        }
    }

    fn object(&self, id: ObjectId) -> JdwpResult<&ObjectRt> {
        match self.objects.get(&id) {
            Some(object) => Ok(object),
            None => err(error_codes::INVALID_OBJECT),
        }
    }

    fn field(&self, id: FieldId) -> JdwpResult<&FieldRt> {
        match self.fields.get(&id) {
            Some(&(c, f)) => Ok(&self.classes[c].fields[f]),
            None => err(error_codes::INVALID_FIELDID),
        }
    }

    fn class_info(&self, class: &ClassRt) -> ClassInfo {
        ClassInfo {
            ref_type_tag: class.tag,
            type_id: class.id,
            signature: class.signature.clone(),
            status: CLASS_STATUS_READY,
        }
    }

    // ---- test helpers ----

    pub(crate) fn thread_named(&self, name: &str) -> Option<ThreadId> {
        self.threads.iter().find(|t| t.name == name).map(|t| t.id)
    }

    pub(crate) fn class_named(&self, name: &str) -> Option<ReferenceTypeId> {
        self.find_class(name).map(|c| self.classes[c].id)
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn thread_suspend_count(&self, thread: ThreadId) -> Option<u32> {
        let t = self.thread_index(thread).ok()?;
        Some(self.threads[t].suspend_count)
    }

    pub(crate) fn field_by_name(&self, object: ObjectId, name: &str) -> Option<Value> {
        let object = self.objects.get(&object)?;
        let (_, field_id, _) = self.resolve_field(object.class, name)?;
        match &object.kind {
            ObjKind::Plain(fields) => Some(
                fields
                    .get(&field_id)
                    .cloned()
                    .unwrap_or_else(|| default_value(&self.fields_signature(field_id))),
            ),
            _ => None,
        }
    }

    pub(crate) fn static_by_name(&self, class: &str, name: &str) -> Option<Value> {
        let class = self.find_class(class)?;
        let (_, field_id, is_static) = self.resolve_field(class, name)?;
        is_static.then(|| {
            self.statics
                .get(&field_id)
                .cloned()
                .unwrap_or_else(|| default_value(&self.fields_signature(field_id)))
        })
    }

    fn fields_signature(&self, field: FieldId) -> String {
        self.field(field).map(|f| f.signature.clone()).unwrap_or_default()
    }

    // ---- commands ----

    pub(crate) fn all_classes(&self) -> Vec<ClassInfo> {
        self.classes
            .iter()
            .filter(|c| c.loaded)
            .map(|c| self.class_info(c))
            .collect()
    }

    pub(crate) fn classes_by_signature(&mut self, signature: &str) -> Vec<ClassInfo> {
        if signature.starts_with('[') {
            let index = self.array_class(signature);
            return vec![self.class_info(&self.classes[index])];
        }
        self.classes
            .iter()
            .filter(|c| c.loaded && c.signature == signature)
            .map(|c| self.class_info(c))
            .collect()
    }

    pub(crate) fn signature(&self, ref_type: ReferenceTypeId) -> JdwpResult<String> {
        Ok(self.classes[self.class_index(ref_type)?].signature.clone())
    }

    pub(crate) fn methods(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        let class = &self.classes[self.class_index(ref_type)?];
        Ok(class
            .methods
            .iter()
            .map(|m| MethodInfo {
                method_id: m.id,
                name: m.name.clone(),
                signature: m.signature.clone(),
                mod_bits: ACC_PUBLIC | if m.is_static { ACC_STATIC } else { 0 },
            })
            .collect())
    }

    pub(crate) fn fields(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        let class = &self.classes[self.class_index(ref_type)?];
        Ok(class
            .fields
            .iter()
            .map(|f| FieldInfo {
                field_id: f.id,
                name: f.name.clone(),
                signature: f.signature.clone(),
                mod_bits: ACC_PUBLIC | if f.is_static { ACC_STATIC } else { 0 },
            })
            .collect())
    }

    pub(crate) fn superclass(&self, class: ReferenceTypeId) -> JdwpResult<Option<ReferenceTypeId>> {
        let class = &self.classes[self.class_index(class)?];
        Ok(class.superclass.map(|s| self.classes[s].id))
    }

    pub(crate) fn line_table(&self, ref_type: ReferenceTypeId, method: MethodId) -> JdwpResult<LineTable> {
        let (c, m) = self.method_index(ref_type, method)?;
        let method = &self.classes[c].methods[m];
        let mut lines: Vec<LineTableEntry> = Vec::new();
        if !method.synthetic {
            for (index, (line, _)) in method.code.iter().enumerate() {
                if lines.last().map(|e| e.line_number) != Some(*line) {
                    lines.push(LineTableEntry {
                        line_code_index: index as u64,
                        line_number: *line,
                    });
                }
            }
        }
        Ok(LineTable {
            start: 0,
            end: method.code.len().saturating_sub(1) as u64,
            lines,
        })
    }

    pub(crate) fn variable_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> JdwpResult<Vec<Variable>> {
        let (c, m) = self.method_index(ref_type, method)?;
        let method = &self.classes[c].methods[m];
        Ok(method
            .locals
            .iter()
            .map(|local| Variable {
                code_index: 0,
                name: local.name.clone(),
                signature: local.signature.clone(),
                length: method.code.len() as u32,
                slot: local.slot,
            })
            .collect())
    }

    pub(crate) fn set_event_request(
        &mut self,
        kind: u8,
        policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> JdwpResult<i32> {
        if !KNOWN_EVENT_KINDS.contains(&kind) {
            return err(error_codes::INVALID_EVENT_TYPE);
        }
        let mut step = None;
        if kind == event_kinds::SINGLE_STEP {
            let Some((thread, size, depth)) = modifiers.iter().find_map(|m| match m {
                EventModifier::Step {
                    thread,
                    size,
                    depth,
                } => Some((*thread, *size, *depth)),
                _ => None,
            }) else {
                return err(error_codes::ILLEGAL_ARGUMENT);
            };
            let t = self.thread_index(thread)?;
            if self.threads[t].frames.is_empty() {
                return err(error_codes::INVALID_THREAD);
            }
            step = Some(StepRt {
                size,
                depth,
                origin_depth: self.threads[t].frames.len(),
                origin_line: self.current_line(t),
            });
        }
        let count_left = modifiers.iter().find_map(|m| match m {
            EventModifier::Count(count) => Some(*count),
            _ => None,
        });

        let id = self.next_request;
        self.next_request += 1;
        self.requests.push(RequestRt {
            id,
            kind,
            policy,
            modifiers: modifiers.to_vec(),
            count_left,
            step,
        });
        debug!("mock: request {} kind={} policy={:?}", id, kind, policy);
        Ok(id)
    }

    pub(crate) fn clear_event_request(&mut self, kind: u8, request_id: i32) {
        self.requests
            .retain(|r| !(r.kind == kind && r.id == request_id));
    }

    pub(crate) fn all_threads(&self) -> Vec<ThreadId> {
        self.threads.iter().filter(|t| !t.dead).map(|t| t.id).collect()
    }

    pub(crate) fn thread_name(&self, thread: ThreadId) -> JdwpResult<String> {
        Ok(self.threads[self.thread_index(thread)?].name.clone())
    }

    pub(crate) fn thread_status(&self, thread: ThreadId) -> JdwpResult<(ThreadStatus, SuspendStatus)> {
        let thread = &self.threads[self.thread_index(thread)?];
        let status = if thread.dead {
            ThreadStatus::Zombie
        } else if thread.blocked_on.is_some() {
            ThreadStatus::Monitor
        } else {
            ThreadStatus::Running
        };
        let suspend = if thread.suspend_count > 0 {
            SuspendStatus::Suspended
        } else {
            SuspendStatus::Running
        };
        Ok((status, suspend))
    }

    pub(crate) fn suspend_count(&self, thread: ThreadId) -> JdwpResult<i32> {
        Ok(self.threads[self.thread_index(thread)?].suspend_count as i32)
    }

    pub(crate) fn suspend_thread(&mut self, thread: ThreadId) -> JdwpResult<()> {
        let t = self.thread_index(thread)?;
        self.threads[t].suspend_count += 1;
        Ok(())
    }

    pub(crate) fn resume_thread(&mut self, thread: ThreadId) -> JdwpResult<()> {
        let t = self.thread_index(thread)?;
        let count = &mut self.threads[t].suspend_count;
        *count = count.saturating_sub(1);
        Ok(())
    }

    pub(crate) fn suspend_all(&mut self) {
        self.threads.iter_mut().for_each(|t| t.suspend_count += 1);
    }

    pub(crate) fn resume_all(&mut self) {
        self.threads
            .iter_mut()
            .for_each(|t| t.suspend_count = t.suspend_count.saturating_sub(1));
    }

    pub(crate) fn frames(&self, thread: ThreadId, start: i32, length: i32) -> JdwpResult<Vec<Frame>> {
        let t = self.suspended_thread(thread)?;
        let frames = self.threads[t].frames.iter().rev().map(|f| Frame {
            frame_id: f.id,
            location: self.frame_location(f),
        });
        let frames = frames.skip(start.max(0) as usize);
        Ok(if length < 0 {
            frames.collect()
        } else {
            frames.take(length as usize).collect()
        })
    }

    pub(crate) fn owned_monitors(&self, thread: ThreadId) -> JdwpResult<Vec<OwnedMonitor>> {
        let t = self.suspended_thread(thread)?;
        let thread = &self.threads[t];
        let top = thread.frames.len().saturating_sub(1);
        let mut monitors: Vec<OwnedMonitor> = Vec::new();
        for (monitor, frame) in thread.owned.iter().rev() {
            if monitors.iter().any(|m| m.monitor == *monitor) {
                continue;
            }
            monitors.push(OwnedMonitor {
                monitor: *monitor,
                stack_depth: top.saturating_sub(*frame) as i32,
            });
        }
        Ok(monitors)
    }

    pub(crate) fn contended_monitor(&self, thread: ThreadId) -> JdwpResult<Option<ObjectId>> {
        let t = self.suspended_thread(thread)?;
        Ok(self.threads[t].blocked_on)
    }

    pub(crate) fn monitor_info(&self, object: ObjectId) -> JdwpResult<MonitorInfo> {
        self.object(object)?;
        let entry = self.monitors.get(&object);
        Ok(MonitorInfo {
            owner: entry.and_then(|m| m.owner).map(|t| self.threads[t].id),
            entry_count: entry.map(|m| m.count as i32).unwrap_or(0),
            waiters: self
                .threads
                .iter()
                .filter(|t| t.blocked_on == Some(object))
                .map(|t| t.id)
                .collect(),
        })
    }

    pub(crate) fn frame_values(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[VariableSlot],
    ) -> JdwpResult<Vec<Value>> {
        let frame = self.frame_mut(thread, frame)?;
        Ok(slots
            .iter()
            .map(|s| {
                frame
                    .locals
                    .get(&(s.slot as u32))
                    .cloned()
                    .unwrap_or_else(|| default_for_tag(s.sig_byte))
            })
            .collect())
    }

    pub(crate) fn set_frame_values(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
        values: &[(i32, Value)],
    ) -> JdwpResult<()> {
        let frame = self.frame_mut(thread, frame)?;
        for (slot, value) in values {
            frame.locals.insert(*slot as u32, value.clone());
        }
        Ok(())
    }

    pub(crate) fn this_object(&mut self, thread: ThreadId, frame: FrameId) -> JdwpResult<Option<ObjectId>> {
        Ok(self.frame_mut(thread, frame)?.this)
    }

    pub(crate) fn object_reference_type(&self, object: ObjectId) -> JdwpResult<(u8, ReferenceTypeId)> {
        let class = &self.classes[self.object(object)?.class];
        Ok((class.tag, class.id))
    }

    pub(crate) fn object_values(&self, object: ObjectId, fields: &[FieldId]) -> JdwpResult<Vec<Value>> {
        let object = self.object(object)?;
        fields
            .iter()
            .map(|id| {
                let field = self.field(*id)?;
                let stored = match &object.kind {
                    ObjKind::Plain(values) => values.get(id).cloned(),
                    _ => None,
                };
                Ok(stored.unwrap_or_else(|| default_value(&field.signature)))
            })
            .collect()
    }

    pub(crate) fn set_object_values(&mut self, object: ObjectId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        for (id, _) in values {
            self.field(*id)?;
        }
        match self.objects.get_mut(&object) {
            Some(ObjectRt {
                kind: ObjKind::Plain(fields),
                ..
            }) => {
                for (id, value) in values {
                    fields.insert(*id, value.clone());
                }
                Ok(())
            }
            Some(_) => err(error_codes::INVALID_FIELDID),
            None => err(error_codes::INVALID_OBJECT),
        }
    }

    pub(crate) fn static_values(&self, ref_type: ReferenceTypeId, fields: &[FieldId]) -> JdwpResult<Vec<Value>> {
        self.class_index(ref_type)?;
        fields
            .iter()
            .map(|id| {
                let field = self.field(*id)?;
                Ok(self
                    .statics
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| default_value(&field.signature)))
            })
            .collect()
    }

    pub(crate) fn set_static_values(&mut self, class: ReferenceTypeId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        self.class_index(class)?;
        for (id, value) in values {
            self.field(*id)?;
            self.statics.insert(*id, value.clone());
        }
        Ok(())
    }

    pub(crate) fn string_value(&self, string: ObjectId) -> JdwpResult<String> {
        match &self.object(string)?.kind {
            ObjKind::Str(value) => Ok(value.clone()),
            _ => err(error_codes::INVALID_OBJECT),
        }
    }

    pub(crate) fn create_string(&mut self, value: &str) -> ObjectId {
        let class = self.find_class(STRING_CLASS).unwrap_or(0);
        self.allocate(class, ObjKind::Str(value.to_string()))
    }

    fn array(&self, array: ObjectId) -> JdwpResult<&Vec<Value>> {
        match &self.object(array)?.kind {
            ObjKind::Array(elements) => Ok(elements),
            _ => err(error_codes::INVALID_OBJECT),
        }
    }

    pub(crate) fn array_length(&self, array: ObjectId) -> JdwpResult<i32> {
        Ok(self.array(array)?.len() as i32)
    }

    pub(crate) fn array_values(&self, array: ObjectId, first: i32, length: i32) -> JdwpResult<Vec<Value>> {
        let elements = self.array(array)?;
        let (first, length) = (first.max(0) as usize, length.max(0) as usize);
        match elements.get(first..first + length) {
            Some(slice) => Ok(slice.to_vec()),
            None => err(error_codes::INVALID_INDEX),
        }
    }

    pub(crate) fn set_array_values(&mut self, array: ObjectId, first: i32, values: &[Value]) -> JdwpResult<()> {
        let first = first.max(0) as usize;
        match self.objects.get_mut(&array).map(|o| &mut o.kind) {
            Some(ObjKind::Array(elements)) => {
                if first + values.len() > elements.len() {
                    return err(error_codes::INVALID_INDEX);
                }
                elements[first..first + values.len()].clone_from_slice(values);
                Ok(())
            }
            _ => err(error_codes::INVALID_OBJECT),
        }
    }

    pub(crate) fn new_instance(
        &mut self,
        class: ReferenceTypeId,
        thread: ThreadId,
        constructor: MethodId,
    ) -> JdwpResult<ObjectId> {
        let (c, m) = self.method_index(class, constructor)?;
        self.suspended_thread(thread)?;
        if self.classes[c].methods[m].name != "<init>" {
            return err(error_codes::INVALID_METHODID);
        }
        Ok(self.allocate(c, ObjKind::Plain(HashMap::new())))
    }

    pub(crate) fn new_array(&mut self, array_type: ReferenceTypeId, length: i32) -> JdwpResult<ObjectId> {
        let c = self.class_index(array_type)?;
        if self.classes[c].tag != ref_type_tags::ARRAY {
            return err(error_codes::INVALID_CLASS);
        }
        let component = self.classes[c].signature[1..].to_string();
        let elements = vec![default_value(&component); length.max(0) as usize];
        Ok(self.allocate(c, ObjKind::Array(elements)))
    }

    pub(crate) fn dispose(&mut self) {
        self.requests.clear();
        self.threads.iter_mut().for_each(|t| t.suspend_count = 0);
        self.events = None;
        self.closed = true;
        info!("mock: debugger detached");
    }

    pub(crate) fn exit(&mut self, code: i32) {
        self.dead = true;
        self.closed = true;
        self.events = None;
        info!("mock: VM exited with code {}", code);
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::program::{MockClass, MockMethod};

    fn program() -> MockProgram {
        let mut program = MockProgram::new();
        program.class(
            MockClass::new("com.example.Main")
                .method(
                    MockMethod::static_method("main")
                        .line(3, Op::Nop)
                        .line(4, Op::call("com.example.Main", "helper"))
                        .line(5, Op::Nop),
                )
                .method(MockMethod::static_method("helper").line(10, Op::Nop)),
        );
        program.thread("main", "com.example.Main", "main");
        program
    }

    fn run_until_idle(machine: &mut Machine) {
        for _ in 0..1000 {
            if !matches!(machine.tick(), Tick::Progress) {
                return;
            }
        }
    }

    #[test]
    fn test_vm_start_suspends_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut machine = Machine::new(&program(), tx);
        let set = rx.try_recv().unwrap();
        assert_eq!(set.suspend_policy, SuspendPolicy::All as u8);
        assert!(matches!(set.events[0].details, EventKind::VMStart { thread } if thread == THREAD_BASE));
        assert!(matches!(machine.tick(), Tick::Idle));
    }

    #[test]
    fn test_breakpoint_suspends_at_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut machine = Machine::new(&program(), tx);
        rx.try_recv().unwrap();

        let class = machine.class_named("com.example.Main").unwrap();
        let main = machine.methods(class).unwrap().into_iter().find(|m| m.name == "main").unwrap();
        let table = machine.line_table(class, main.method_id).unwrap();
        let index = table.index_for_line(5).unwrap();
        let location = Location {
            type_tag: 1,
            class_id: class,
            method_id: main.method_id,
            index,
        };
        let id = machine
            .set_event_request(
                event_kinds::BREAKPOINT,
                SuspendPolicy::EventThread,
                &[EventModifier::LocationOnly(location)],
            )
            .unwrap();

        machine.resume_all();
        run_until_idle(&mut machine);

        let set = rx.try_recv().unwrap();
        assert_eq!(set.events[0].request_id, id);
        assert_eq!(set.events[0].details.location(), Some(location));
        assert_eq!(machine.suspend_count(THREAD_BASE).unwrap(), 1);

        machine.resume_thread(THREAD_BASE).unwrap();
        run_until_idle(&mut machine);
        assert!(machine.is_dead());
    }

    #[test]
    fn test_frames_require_suspension() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut machine = Machine::new(&program(), tx);
        machine.resume_all();
        assert_eq!(
            machine.frames(THREAD_BASE, 0, -1).unwrap_err().error_code(),
            Some(error_codes::THREAD_NOT_SUSPENDED)
        );
    }
}
