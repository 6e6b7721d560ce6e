// JDWP type definitions
//
// Common types used across the JDWP protocol

use serde::{Deserialize, Serialize};

// Object IDs are 8 bytes in JDWP (HotSpot reports 8 for every ID size)
pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type ThreadGroupId = ObjectId;
pub type StringId = ObjectId;
pub type ClassLoaderId = ObjectId;
pub type ClassObjectId = ObjectId;
pub type ArrayId = ObjectId;

pub type ReferenceTypeId = u64;
pub type ClassId = ReferenceTypeId;
pub type InterfaceId = ReferenceTypeId;
pub type ArrayTypeId = ReferenceTypeId;

pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

// Reference type tags
pub mod ref_type_tags {
    pub const CLASS: u8 = 1;
    pub const INTERFACE: u8 = 2;
    pub const ARRAY: u8 = 3;
}

// Location identifies a code position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub type_tag: u8, // 1=class, 2=interface, 3=array
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64, // bytecode index (PC)
}

// Thread status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ThreadStatus {
    Zombie = 0,
    Running = 1,
    Sleeping = 2,
    Monitor = 3,
    Wait = 4,
}

impl ThreadStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(ThreadStatus::Zombie),
            1 => Some(ThreadStatus::Running),
            2 => Some(ThreadStatus::Sleeping),
            3 => Some(ThreadStatus::Monitor),
            4 => Some(ThreadStatus::Wait),
            _ => None,
        }
    }
}

// Suspend status values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum SuspendStatus {
    Running = 0,
    Suspended = 1,
}

// Type tags for values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Array = 91,        // '['
    Byte = 66,         // 'B'
    Char = 67,         // 'C'
    Object = 76,       // 'L'
    Float = 70,        // 'F'
    Double = 68,       // 'D'
    Int = 73,          // 'I'
    Long = 74,         // 'J'
    Short = 83,        // 'S'
    Void = 86,         // 'V'
    Boolean = 90,      // 'Z'
    String = 115,      // 's'
    Thread = 116,      // 't'
    ThreadGroup = 103, // 'g'
    ClassLoader = 108, // 'l'
    ClassObject = 99,  // 'c'
}

impl TypeTag {
    /// Tags whose values are object references
    pub fn is_object_tag(tag: u8) -> bool {
        matches!(tag, 76 | 115 | 116 | 103 | 108 | 99 | 91)
    }
}

/// Value tag for a JNI type signature ("I", "Ljava/lang/String;", "[I", ...)
pub fn signature_tag(signature: &str) -> u8 {
    match signature {
        "Ljava/lang/String;" => TypeTag::String as u8,
        "Ljava/lang/Thread;" => TypeTag::Thread as u8,
        _ => signature.as_bytes().first().copied().unwrap_or(TypeTag::Object as u8),
    }
}

// Tagged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub tag: u8,
    pub data: ValueData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Byte(i8),
    Char(u16),
    Float(f32),
    Double(f64),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(ObjectId),
    Void,
}

impl Value {
    pub fn void() -> Self {
        Self { tag: TypeTag::Void as u8, data: ValueData::Void }
    }

    pub fn null() -> Self {
        Self { tag: TypeTag::Object as u8, data: ValueData::Object(0) }
    }

    pub fn boolean(v: bool) -> Self {
        Self { tag: TypeTag::Boolean as u8, data: ValueData::Boolean(v) }
    }

    pub fn byte(v: i8) -> Self {
        Self { tag: TypeTag::Byte as u8, data: ValueData::Byte(v) }
    }

    pub fn char(v: u16) -> Self {
        Self { tag: TypeTag::Char as u8, data: ValueData::Char(v) }
    }

    pub fn short(v: i16) -> Self {
        Self { tag: TypeTag::Short as u8, data: ValueData::Short(v) }
    }

    pub fn int(v: i32) -> Self {
        Self { tag: TypeTag::Int as u8, data: ValueData::Int(v) }
    }

    pub fn long(v: i64) -> Self {
        Self { tag: TypeTag::Long as u8, data: ValueData::Long(v) }
    }

    pub fn float(v: f32) -> Self {
        Self { tag: TypeTag::Float as u8, data: ValueData::Float(v) }
    }

    pub fn double(v: f64) -> Self {
        Self { tag: TypeTag::Double as u8, data: ValueData::Double(v) }
    }

    pub fn object(tag: u8, id: ObjectId) -> Self {
        Self { tag, data: ValueData::Object(id) }
    }

    /// Object id for reference values (0 is null)
    pub fn object_id(&self) -> Option<ObjectId> {
        match self.data {
            ValueData::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.data, ValueData::Object(0))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self.data, ValueData::Object(_) | ValueData::Void)
    }

    /// Format value for display
    pub fn format(&self) -> String {
        match &self.data {
            ValueData::Byte(v) => format!("(byte) {}", v),
            ValueData::Char(v) => format!("(char) '{}'", char::from_u32(*v as u32).unwrap_or('?')),
            ValueData::Float(v) => format!("(float) {}", v),
            ValueData::Double(v) => format!("(double) {}", v),
            ValueData::Int(v) => format!("(int) {}", v),
            ValueData::Long(v) => format!("(long) {}", v),
            ValueData::Short(v) => format!("(short) {}", v),
            ValueData::Boolean(v) => format!("(boolean) {}", v),
            ValueData::Object(id) => {
                if *id == 0 {
                    "(object) null".to_string()
                } else {
                    format!("(object) @{:x}", id)
                }
            }
            ValueData::Void => "(void)".to_string(),
        }
    }
}

// Variable information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub code_index: u64,
    pub name: String,
    pub signature: String,
    pub length: u32,
    pub slot: u32,
}

impl Variable {
    /// Whether the variable is live at the given bytecode index
    pub fn is_live_at(&self, index: u64) -> bool {
        index >= self.code_index && index < self.code_index + self.length as u64
    }
}

// Field information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub field_id: FieldId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

impl FieldInfo {
    pub const STATIC: i32 = 0x0008;

    pub fn is_static(&self) -> bool {
        self.mod_bits & Self::STATIC != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_tags() {
        assert_eq!(signature_tag("I"), TypeTag::Int as u8);
        assert_eq!(signature_tag("Ljava/lang/String;"), TypeTag::String as u8);
        assert_eq!(signature_tag("Lcom/example/Foo;"), TypeTag::Object as u8);
        assert_eq!(signature_tag("[I"), TypeTag::Array as u8);
    }

    #[test]
    fn test_variable_liveness() {
        let var = Variable {
            code_index: 4,
            name: "x".to_string(),
            signature: "I".to_string(),
            length: 10,
            slot: 1,
        };
        assert!(!var.is_live_at(3));
        assert!(var.is_live_at(4));
        assert!(var.is_live_at(13));
        assert!(!var.is_live_at(14));
    }
}
