// JDWP command implementations
//
// Command Sets:
// 1 = VirtualMachine
// 2 = ReferenceType
// 3 = ClassType
// 4 = ArrayType
// 6 = Method
// 9 = ObjectReference
// 10 = StringReference
// 11 = ThreadReference
// 13 = ArrayReference
// 15 = EventRequest
// 16 = StackFrame

// Command set IDs
pub mod command_sets {
    pub const VIRTUAL_MACHINE: u8 = 1;
    pub const REFERENCE_TYPE: u8 = 2;
    pub const CLASS_TYPE: u8 = 3;
    pub const ARRAY_TYPE: u8 = 4;
    pub const METHOD: u8 = 6;
    pub const OBJECT_REFERENCE: u8 = 9;
    pub const STRING_REFERENCE: u8 = 10;
    pub const THREAD_REFERENCE: u8 = 11;
    pub const ARRAY_REFERENCE: u8 = 13;
    pub const EVENT_REQUEST: u8 = 15;
    pub const STACK_FRAME: u8 = 16;
}

// VirtualMachine commands (set 1)
pub mod vm_commands {
    pub const VERSION: u8 = 1;
    pub const CLASSES_BY_SIGNATURE: u8 = 2;
    pub const ALL_CLASSES: u8 = 3;
    pub const ALL_THREADS: u8 = 4;
    pub const DISPOSE: u8 = 6;
    pub const ID_SIZES: u8 = 7;
    pub const SUSPEND: u8 = 8;
    pub const RESUME: u8 = 9;
    pub const EXIT: u8 = 10;
    pub const CREATE_STRING: u8 = 11;
}

// ReferenceType commands (set 2)
pub mod reference_type_commands {
    pub const SIGNATURE: u8 = 1;
    pub const FIELDS: u8 = 4;
    pub const METHODS: u8 = 5;
    pub const GET_VALUES: u8 = 6;
    pub const STATUS: u8 = 9;
}

// ClassType commands (set 3)
pub mod class_type_commands {
    pub const SUPERCLASS: u8 = 1;
    pub const SET_VALUES: u8 = 2;
    pub const NEW_INSTANCE: u8 = 4;
}

// ArrayType commands (set 4)
pub mod array_type_commands {
    pub const NEW_INSTANCE: u8 = 1;
}

// Method commands (set 6)
pub mod method_commands {
    pub const LINE_TABLE: u8 = 1;
    pub const VARIABLE_TABLE: u8 = 2;
}

// ObjectReference commands (set 9)
pub mod object_reference_commands {
    pub const REFERENCE_TYPE: u8 = 1;
    pub const GET_VALUES: u8 = 2;
    pub const SET_VALUES: u8 = 3;
    pub const MONITOR_INFO: u8 = 5;
}

// StringReference commands (set 10)
pub mod string_reference_commands {
    pub const VALUE: u8 = 1;
}

// ThreadReference commands (set 11)
pub mod thread_commands {
    pub const NAME: u8 = 1;
    pub const SUSPEND: u8 = 2;
    pub const RESUME: u8 = 3;
    pub const STATUS: u8 = 4;
    pub const FRAMES: u8 = 6;
    pub const CURRENT_CONTENDED_MONITOR: u8 = 9;
    pub const INTERRUPT: u8 = 11;
    pub const SUSPEND_COUNT: u8 = 12;
    pub const OWNED_MONITORS_STACK_DEPTH_INFO: u8 = 13;
}

// ArrayReference commands (set 13)
pub mod array_reference_commands {
    pub const LENGTH: u8 = 1;
    pub const GET_VALUES: u8 = 2;
    pub const SET_VALUES: u8 = 3;
}

// EventRequest commands (set 15)
pub mod event_commands {
    pub const SET: u8 = 1;
    pub const CLEAR: u8 = 2;
}

// StackFrame commands (set 16)
pub mod stack_frame_commands {
    pub const GET_VALUES: u8 = 1;
    pub const SET_VALUES: u8 = 2;
    pub const THIS_OBJECT: u8 = 3;
}

// Event kinds for EventRequest.Set
pub mod event_kinds {
    pub const SINGLE_STEP: u8 = 1;
    pub const BREAKPOINT: u8 = 2;
    pub const EXCEPTION: u8 = 4;
    pub const THREAD_START: u8 = 6;
    pub const THREAD_DEATH: u8 = 7;
    pub const CLASS_PREPARE: u8 = 8;
    pub const CLASS_UNLOAD: u8 = 9;
    pub const FIELD_ACCESS: u8 = 20;
    pub const FIELD_MODIFICATION: u8 = 21;
    pub const EXCEPTION_CATCH: u8 = 30;
    pub const METHOD_ENTRY: u8 = 40;
    pub const METHOD_EXIT: u8 = 41;
    pub const METHOD_EXIT_WITH_RETURN_VALUE: u8 = 42;
    pub const MONITOR_CONTENDED_ENTER: u8 = 43;
    pub const MONITOR_CONTENDED_ENTERED: u8 = 44;
    pub const MONITOR_WAIT: u8 = 45;
    pub const MONITOR_WAITED: u8 = 46;
    pub const VM_START: u8 = 90;
    pub const VM_DEATH: u8 = 99;
}

// Modifier kinds for EventRequest.Set
pub mod modifier_kinds {
    pub const COUNT: u8 = 1;
    pub const CONDITIONAL: u8 = 2;
    pub const THREAD_ONLY: u8 = 3;
    pub const CLASS_ONLY: u8 = 4;
    pub const CLASS_MATCH: u8 = 5;
    pub const CLASS_EXCLUDE: u8 = 6;
    pub const LOCATION_ONLY: u8 = 7;
    pub const EXCEPTION_ONLY: u8 = 8;
    pub const FIELD_ONLY: u8 = 9;
    pub const STEP: u8 = 10;
    pub const INSTANCE_ONLY: u8 = 11;
}

// Method invocation options
pub mod invoke_options {
    pub const INVOKE_SINGLE_THREADED: i32 = 0x01;
    pub const INVOKE_NONVIRTUAL: i32 = 0x02;
}

// Step sizes
pub mod step_sizes {
    pub const MIN: i32 = 0;
    pub const LINE: i32 = 1;
}

// Step depths
pub mod step_depths {
    pub const INTO: i32 = 0;
    pub const OVER: i32 = 1;
    pub const OUT: i32 = 2;
}
