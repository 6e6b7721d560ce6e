// Scripted programs for the in-memory VM

use jdwp_client::types::{ObjectId, ThreadId, Value};

pub const OBJECT_CLASS: &str = "java.lang.Object";
pub const STRING_CLASS: &str = "java.lang.String";
pub const THREAD_CLASS: &str = "java.lang.Thread";
pub const RUNTIME_EXCEPTION_CLASS: &str = "java.lang.RuntimeException";

pub(crate) const THREAD_BASE: ThreadId = 0x1000;
pub(crate) const OBJECT_BASE: ObjectId = 0x10_0000;

/// One instruction. Each instruction occupies one bytecode index.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Nop,
    /// Invoke a method; `this` carries over when the callee is an instance
    /// method of the caller's class
    Call { class: String, method: String },
    Return(Option<Value>),
    /// Write a field of `this`, or a static field, of the current class
    PutField { field: String, value: Value },
    GetField { field: String },
    SetLocal { slot: u32, value: Value },
    Throw { class: String, caught: bool },
    MonitorEnter(ObjectId),
    MonitorExit(ObjectId),
}

impl Op {
    pub fn call(class: impl Into<String>, method: impl Into<String>) -> Self {
        Op::Call {
            class: class.into(),
            method: method.into(),
        }
    }

    pub fn put_field(field: impl Into<String>, value: Value) -> Self {
        Op::PutField {
            field: field.into(),
            value,
        }
    }

    pub fn get_field(field: impl Into<String>) -> Self {
        Op::GetField {
            field: field.into(),
        }
    }

    pub fn throw(class: impl Into<String>, caught: bool) -> Self {
        Op::Throw {
            class: class.into(),
            caught,
        }
    }

    /// Class this instruction needs loaded before it runs
    pub(crate) fn referenced_class(&self) -> Option<&str> {
        match self {
            Op::Call { class, .. } | Op::Throw { class, .. } => Some(class),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockLocal {
    pub name: String,
    pub signature: String,
    pub slot: u32,
}

#[derive(Debug, Clone)]
pub struct MockMethod {
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) is_static: bool,
    pub(crate) locals: Vec<MockLocal>,
    pub(crate) code: Vec<(i32, Op)>,
}

impl MockMethod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: "()V".to_string(),
            is_static: false,
            locals: Vec::new(),
            code: Vec::new(),
        }
    }

    pub fn static_method(name: impl Into<String>) -> Self {
        Self {
            is_static: true,
            ..Self::new(name)
        }
    }

    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn local(mut self, name: impl Into<String>, signature: impl Into<String>, slot: u32) -> Self {
        self.locals.push(MockLocal {
            name: name.into(),
            signature: signature.into(),
            slot,
        });
        self
    }

    /// Append an instruction on a source line
    pub fn line(mut self, line: i32, op: Op) -> Self {
        self.code.push((line, op));
        self
    }

    /// Code with a trailing `return` when the script does not end in one
    pub(crate) fn finished_code(&self) -> Vec<(i32, Op)> {
        let mut code = self.code.clone();
        if !matches!(code.last(), Some((_, Op::Return(_)))) {
            let line = code.last().map(|(line, _)| *line).unwrap_or(1);
            code.push((line, Op::Return(None)));
        }
        code
    }
}

#[derive(Debug, Clone)]
pub struct MockField {
    pub(crate) name: String,
    pub(crate) signature: String,
    pub(crate) is_static: bool,
    pub(crate) initial: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct MockClass {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) fields: Vec<MockField>,
    pub(crate) methods: Vec<MockMethod>,
    pub(crate) preloaded: bool,
}

impl MockClass {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            superclass: (name != OBJECT_CLASS).then(|| OBJECT_CLASS.to_string()),
            name,
            fields: Vec::new(),
            methods: Vec::new(),
            preloaded: false,
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.fields.push(MockField {
            name: name.into(),
            signature: signature.into(),
            is_static: false,
            initial: None,
        });
        self
    }

    pub fn static_field(
        mut self,
        name: impl Into<String>,
        signature: impl Into<String>,
        initial: Value,
    ) -> Self {
        self.fields.push(MockField {
            name: name.into(),
            signature: signature.into(),
            is_static: true,
            initial: Some(initial),
        });
        self
    }

    pub fn method(mut self, method: MockMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Loaded before the VM starts instead of on first use
    pub fn preloaded(mut self) -> Self {
        self.preloaded = true;
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) enum HeapDef {
    Object {
        class: String,
        fields: Vec<(String, Value)>,
    },
    Array {
        signature: String,
        elements: Vec<Value>,
    },
    Str(String),
}

#[derive(Debug, Clone)]
pub(crate) struct MockThread {
    pub(crate) name: String,
    pub(crate) class: String,
    pub(crate) method: String,
    pub(crate) this: Option<ObjectId>,
}

/// Classes, threads and an initial heap. Thread 0 is the thread the VM
/// reports in VMStart.
#[derive(Debug, Clone)]
pub struct MockProgram {
    pub(crate) classes: Vec<MockClass>,
    pub(crate) threads: Vec<MockThread>,
    pub(crate) heap: Vec<HeapDef>,
}

impl Default for MockProgram {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProgram {
    pub fn new() -> Self {
        let builtins = [OBJECT_CLASS, STRING_CLASS, THREAD_CLASS, RUNTIME_EXCEPTION_CLASS]
            .into_iter()
            .map(|name| MockClass::new(name).preloaded())
            .collect();
        Self {
            classes: builtins,
            threads: Vec::new(),
            heap: Vec::new(),
        }
    }

    pub fn class(&mut self, class: MockClass) -> &mut Self {
        self.classes.retain(|c| c.name != class.name);
        self.classes.push(class);
        self
    }

    /// Add a thread that starts in a static method
    pub fn thread(
        &mut self,
        name: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
    ) -> ThreadId {
        self.push_thread(name.into(), class.into(), method.into(), None)
    }

    /// Add a thread that starts in an instance method of `this`
    pub fn thread_on(
        &mut self,
        name: impl Into<String>,
        class: impl Into<String>,
        method: impl Into<String>,
        this: ObjectId,
    ) -> ThreadId {
        self.push_thread(name.into(), class.into(), method.into(), Some(this))
    }

    fn push_thread(
        &mut self,
        name: String,
        class: String,
        method: String,
        this: Option<ObjectId>,
    ) -> ThreadId {
        self.threads.push(MockThread {
            name,
            class,
            method,
            this,
        });
        THREAD_BASE + self.threads.len() as u64 - 1
    }

    pub fn object(&mut self, class: impl Into<String>) -> ObjectId {
        self.push_heap(HeapDef::Object {
            class: class.into(),
            fields: Vec::new(),
        })
    }

    pub fn string(&mut self, value: impl Into<String>) -> ObjectId {
        self.push_heap(HeapDef::Str(value.into()))
    }

    /// `signature` is the array type, e.g. "[I" or "[Ljava/lang/Object;"
    pub fn array(&mut self, signature: impl Into<String>, elements: Vec<Value>) -> ObjectId {
        self.push_heap(HeapDef::Array {
            signature: signature.into(),
            elements,
        })
    }

    fn push_heap(&mut self, def: HeapDef) -> ObjectId {
        self.heap.push(def);
        OBJECT_BASE + self.heap.len() as u64 - 1
    }

    /// Initial value of an instance field of a heap object
    pub fn set_field(&mut self, object: ObjectId, field: impl Into<String>, value: Value) -> &mut Self {
        let index = object.wrapping_sub(OBJECT_BASE) as usize;
        if let Some(HeapDef::Object { fields, .. }) = self.heap.get_mut(index) {
            fields.push((field.into(), value));
        }
        self
    }

    pub fn set_element(&mut self, array: ObjectId, index: usize, value: Value) -> &mut Self {
        let slot = array.wrapping_sub(OBJECT_BASE) as usize;
        if let Some(HeapDef::Array { elements, .. }) = self.heap.get_mut(slot) {
            if index < elements.len() {
                elements[index] = value;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_return_on_last_line() {
        let method = MockMethod::static_method("main")
            .line(3, Op::Nop)
            .line(4, Op::Nop);
        let code = method.finished_code();
        assert_eq!(code.len(), 3);
        assert_eq!(code[2], (4, Op::Return(None)));
    }

    #[test]
    fn test_ids_are_stable() {
        let mut program = MockProgram::new();
        let main = program.thread("main", "com.example.Main", "main");
        let worker = program.thread("worker", "com.example.Main", "work");
        assert_eq!(main, THREAD_BASE);
        assert_eq!(worker, THREAD_BASE + 1);

        let a = program.object("java.lang.Object");
        let b = program.string("hi");
        assert_eq!(b, a + 1);
    }
}
