// Value mirrors
//
// Host-side copies of target values. Objects and arrays live in a
// `MirrorGraph` arena and refer to each other by node index, so cyclic
// structures keep their shape and reference identity in both directions.

use crate::error::{DebuggerError, Result};
use crate::registry::{class_name_from_signature, class_signature};
use crate::session::{thread_error, DebuggerSession, SessionInner};
use crate::target::TargetVm;
use jdwp_client::protocol::error_codes;
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::types::{
    ref_type_tags, signature_tag, ArrayId, ClassId, FieldId, FieldInfo, FrameId, ObjectId,
    ReferenceTypeId, ThreadId, TypeTag, Value, ValueData,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Mirrors larger than this are refused
pub const MAX_MIRROR_NODES: usize = 10_000;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum HostValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// Object or array node of the owning graph
    Ref(NodeId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorNode {
    Object {
        class_name: String,
        fields: Vec<(String, HostValue)>,
    },
    Array {
        /// Array type signature, e.g. "[Ljava/lang/Object;"
        signature: String,
        elements: Vec<HostValue>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorGraph {
    nodes: Vec<MirrorNode>,
    root: HostValue,
}

impl Default for MirrorGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: HostValue::Null,
        }
    }

    /// A graph holding a single primitive, string or null
    pub fn value(value: HostValue) -> Self {
        Self {
            nodes: Vec::new(),
            root: value,
        }
    }

    pub fn root(&self) -> &HostValue {
        &self.root
    }

    pub fn set_root(&mut self, root: HostValue) -> &mut Self {
        self.root = root;
        self
    }

    pub fn node(&self, id: NodeId) -> Option<&MirrorNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[MirrorNode] {
        &self.nodes
    }

    pub fn add_object(&mut self, class_name: impl Into<String>) -> NodeId {
        self.push(MirrorNode::Object {
            class_name: class_name.into(),
            fields: Vec::new(),
        })
    }

    pub fn add_array(&mut self, signature: impl Into<String>, elements: Vec<HostValue>) -> NodeId {
        self.push(MirrorNode::Array {
            signature: signature.into(),
            elements,
        })
    }

    fn push(&mut self, node: MirrorNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Set (or add) a field of an object node
    pub fn set_field(&mut self, node: NodeId, name: impl Into<String>, value: HostValue) -> &mut Self {
        if let Some(MirrorNode::Object { fields, .. }) = self.nodes.get_mut(node) {
            let name = name.into();
            match fields.iter_mut().find(|(n, _)| *n == name) {
                Some((_, slot)) => *slot = value,
                None => fields.push((name, value)),
            }
        }
        self
    }

    pub fn field(&self, node: NodeId, name: &str) -> Option<&HostValue> {
        match self.nodes.get(node)? {
            MirrorNode::Object { fields, .. } => {
                fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
            }
            MirrorNode::Array { .. } => None,
        }
    }

    pub fn elements(&self, node: NodeId) -> Option<&[HostValue]> {
        match self.nodes.get(node)? {
            MirrorNode::Array { elements, .. } => Some(elements),
            MirrorNode::Object { .. } => None,
        }
    }
}

/// Where a target value lives, which decides whether it can be written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableKind {
    Local {
        thread: ThreadId,
        frame: FrameId,
        slot: i32,
    },
    Field {
        object: ObjectId,
        field: FieldId,
    },
    StaticField {
        class: ClassId,
        field: FieldId,
    },
    ArrayElement {
        array: ArrayId,
        index: i32,
    },
    /// A computed value with no storage behind it
    Value,
}

/// A target-resident value and its storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    /// JNI signature of the declared type
    pub signature: String,
    pub value: Value,
    pub kind: VariableKind,
}

impl Variable {
    pub fn is_mutable(&self) -> bool {
        self.kind != VariableKind::Value
    }
}

fn host_primitive(value: &Value) -> Option<HostValue> {
    Some(match value.data {
        ValueData::Boolean(v) => HostValue::Boolean(v),
        ValueData::Byte(v) => HostValue::Byte(v),
        ValueData::Char(v) => HostValue::Char(v),
        ValueData::Short(v) => HostValue::Short(v),
        ValueData::Int(v) => HostValue::Int(v),
        ValueData::Long(v) => HostValue::Long(v),
        ValueData::Float(v) => HostValue::Float(v),
        ValueData::Double(v) => HostValue::Double(v),
        ValueData::Object(0) | ValueData::Void => HostValue::Null,
        ValueData::Object(_) => return None,
    })
}

fn target_primitive(value: &HostValue) -> Option<Value> {
    Some(match value {
        HostValue::Null => Value::null(),
        HostValue::Boolean(v) => Value::boolean(*v),
        HostValue::Byte(v) => Value::byte(*v),
        HostValue::Char(v) => Value::char(*v),
        HostValue::Short(v) => Value::short(*v),
        HostValue::Int(v) => Value::int(*v),
        HostValue::Long(v) => Value::long(*v),
        HostValue::Float(v) => Value::float(*v),
        HostValue::Double(v) => Value::double(*v),
        HostValue::String(_) | HostValue::Ref(_) => return None,
    })
}

/// Convert a primitive to the declared type, widening and narrowing the way
/// an assignment from a host number would
fn coerce(value: Value, signature: &str) -> Result<Value> {
    let tag = signature_tag(signature);
    if tag == value.tag || (TypeTag::is_object_tag(tag) && !value.is_primitive()) {
        return Ok(value);
    }
    let number = match value.data {
        ValueData::Byte(v) => v as f64,
        ValueData::Char(v) => v as f64,
        ValueData::Short(v) => v as f64,
        ValueData::Int(v) => v as f64,
        ValueData::Long(v) => v as f64,
        ValueData::Float(v) => v as f64,
        ValueData::Double(v) => v,
        _ => return Err(mismatch(&value, signature)),
    };
    let integral = match value.data {
        ValueData::Long(v) => v,
        _ => number as i64,
    };
    Ok(match tag {
        t if t == TypeTag::Byte as u8 => Value::byte(integral as i8),
        t if t == TypeTag::Char as u8 => Value::char(integral as u16),
        t if t == TypeTag::Short as u8 => Value::short(integral as i16),
        t if t == TypeTag::Int as u8 => Value::int(integral as i32),
        t if t == TypeTag::Long as u8 => Value::long(integral),
        t if t == TypeTag::Float as u8 => Value::float(number as f32),
        t if t == TypeTag::Double as u8 => Value::double(number),
        _ => return Err(mismatch(&value, signature)),
    })
}

fn mismatch(value: &Value, signature: &str) -> DebuggerError {
    DebuggerError::InvalidState(format!(
        "cannot assign {} to a variable of type {}",
        value.format(),
        signature
    ))
}

impl<T: TargetVm> SessionInner<T> {
    /// Instance fields of a class and its superclasses, subclass first
    async fn instance_fields(&self, class: ReferenceTypeId) -> Result<Vec<FieldInfo>> {
        let mut fields = Vec::new();
        let mut current = Some(class);
        while let Some(ref_type) = current {
            fields.extend(self.fields(ref_type).await?.iter().filter(|f| !f.is_static()).cloned());
            current = self.target.superclass(ref_type).await.unwrap_or(None);
        }
        Ok(fields)
    }

    /// Host value for a target value. Unseen objects and arrays get a node
    /// and are queued so their contents are read later.
    async fn host_value(
        &self,
        value: &Value,
        graph: &mut MirrorGraph,
        seen: &mut HashMap<ObjectId, NodeId>,
        queue: &mut VecDeque<(ObjectId, NodeId, ReferenceTypeId)>,
    ) -> Result<HostValue> {
        if let Some(primitive) = host_primitive(value) {
            return Ok(primitive);
        }
        let Some(object) = value.object_id() else {
            return Ok(HostValue::Null);
        };
        if let Some(node) = seen.get(&object) {
            return Ok(HostValue::Ref(*node));
        }
        if seen.len() >= MAX_MIRROR_NODES {
            return Err(DebuggerError::InvalidState(format!(
                "object graph exceeds {} nodes",
                MAX_MIRROR_NODES
            )));
        }
        let (tag, ref_type) = self.target.object_reference_type(object).await?;
        let node = if tag == ref_type_tags::ARRAY {
            let signature = self.target.signature(ref_type).await?;
            graph.add_array(signature, Vec::new())
        } else {
            let class_name = self.class_name(ref_type).await?;
            if class_name == "java.lang.String" {
                return Ok(HostValue::String(self.target.string_value(object).await?));
            }
            graph.add_object(class_name)
        };
        seen.insert(object, node);
        queue.push_back((object, node, ref_type));
        Ok(HostValue::Ref(node))
    }

    /// Rebuild the object graph reachable from `value`, breadth first
    pub(crate) async fn mirror_of(&self, value: &Value) -> Result<MirrorGraph> {
        let mut graph = MirrorGraph::new();
        let mut seen = HashMap::new();
        let mut queue = VecDeque::new();
        let root = self.host_value(value, &mut graph, &mut seen, &mut queue).await?;
        graph.set_root(root);

        while let Some((object, node, ref_type)) = queue.pop_front() {
            let is_array = matches!(graph.nodes[node], MirrorNode::Array { .. });
            if is_array {
                let length = self.target.array_length(object).await?;
                let values = if length > 0 {
                    self.target.array_values(object, 0, length).await?
                } else {
                    Vec::new()
                };
                let mut elements = Vec::with_capacity(values.len());
                for value in &values {
                    elements.push(self.host_value(value, &mut graph, &mut seen, &mut queue).await?);
                }
                if let MirrorNode::Array { elements: slot, .. } = &mut graph.nodes[node] {
                    *slot = elements;
                }
            } else {
                let fields = self.instance_fields(ref_type).await?;
                let ids: Vec<FieldId> = fields.iter().map(|f| f.field_id).collect();
                let values = if ids.is_empty() {
                    Vec::new()
                } else {
                    self.target.object_values(object, &ids).await?
                };
                for (field, value) in fields.iter().zip(&values) {
                    let host = self.host_value(value, &mut graph, &mut seen, &mut queue).await?;
                    graph.set_field(node, field.name.clone(), host);
                }
            }
        }
        debug!("Mirrored {} node(s)", graph.nodes.len());
        Ok(graph)
    }

    async fn loaded_type(&self, signature: &str) -> Result<ReferenceTypeId> {
        self.target
            .classes_by_signature(signature)
            .await?
            .first()
            .map(|c| c.type_id)
            .ok_or_else(|| {
                DebuggerError::InvalidState(format!(
                    "type {} is not loaded in the target",
                    class_name_from_signature(signature)
                ))
            })
    }

    /// Create target objects for every node, then fill them in, so cycles
    /// point back at the objects already created
    async fn lift(&self, graph: &MirrorGraph, value: &HostValue) -> Result<Value> {
        if let Some(primitive) = target_primitive(value) {
            return Ok(primitive);
        }
        if let HostValue::String(text) = value {
            let id = self.target.create_string(text).await?;
            return Ok(Value::object(TypeTag::String as u8, id));
        }

        let mut created = Vec::with_capacity(graph.nodes.len());
        let mut types = Vec::with_capacity(graph.nodes.len());
        for node in &graph.nodes {
            let (ref_type, value) = match node {
                MirrorNode::Array {
                    signature,
                    elements,
                } => {
                    let array_type = self.loaded_type(signature).await?;
                    let length = i32::try_from(elements.len()).map_err(|_| {
                        DebuggerError::InvalidState("array is too long".to_string())
                    })?;
                    let id = self.target.new_array(array_type, length).await?;
                    (array_type, Value::object(TypeTag::Array as u8, id))
                }
                MirrorNode::Object { class_name, .. } => {
                    let class = self.loaded_type(&class_signature(class_name)).await?;
                    let id = self.instantiate(class, class_name).await?;
                    (class, Value::object(TypeTag::Object as u8, id))
                }
            };
            types.push(ref_type);
            created.push(value);
        }

        for (index, node) in graph.nodes.iter().enumerate() {
            let Some(object) = created[index].object_id() else {
                continue;
            };
            match node {
                MirrorNode::Array {
                    signature,
                    elements,
                } => {
                    if elements.is_empty() {
                        continue;
                    }
                    let component = signature.strip_prefix('[').unwrap_or(signature);
                    let mut values = Vec::with_capacity(elements.len());
                    for element in elements {
                        let value = self.lift_member(&created, element).await?;
                        values.push(coerce(value, component)?);
                    }
                    self.target.set_array_values(object, 0, &values).await?;
                }
                MirrorNode::Object { class_name, fields } => {
                    let declared = self.instance_fields(types[index]).await?;
                    let mut values = Vec::with_capacity(fields.len());
                    for (name, host) in fields {
                        let field = declared.iter().find(|f| f.name == *name).ok_or_else(|| {
                            DebuggerError::InvalidState(format!(
                                "{} has no field '{}'",
                                class_name, name
                            ))
                        })?;
                        let value = self.lift_member(&created, host).await?;
                        values.push((field.field_id, coerce(value, &field.signature)?));
                    }
                    if !values.is_empty() {
                        self.target.set_object_values(object, &values).await?;
                    }
                }
            }
        }

        match value {
            HostValue::Ref(node) => created.get(*node).cloned().ok_or_else(|| {
                DebuggerError::InvalidState(format!("mirror has no node {}", node))
            }),
            _ => Ok(Value::null()),
        }
    }

    async fn lift_member(&self, created: &[Value], value: &HostValue) -> Result<Value> {
        match value {
            HostValue::Ref(node) => created.get(*node).cloned().ok_or_else(|| {
                DebuggerError::InvalidState(format!("mirror has no node {}", node))
            }),
            HostValue::String(text) => {
                let id = self.target.create_string(text).await?;
                Ok(Value::object(TypeTag::String as u8, id))
            }
            other => target_primitive(other)
                .ok_or_else(|| DebuggerError::InvalidState("unsupported mirror value".to_string())),
        }
    }

    /// New instance through the no-argument constructor, on a suspended thread
    async fn instantiate(&self, class: ClassId, class_name: &str) -> Result<ObjectId> {
        let thread = self.current_thread().ok_or_else(|| {
            DebuggerError::InvalidState("no suspended thread to create objects on".to_string())
        })?;
        let constructor = self
            .methods(class)
            .await?
            .iter()
            .find(|m| m.name == "<init>" && m.signature == "()V")
            .map(|m| m.method_id)
            .ok_or_else(|| {
                DebuggerError::InvalidState(format!("{} has no no-argument constructor", class_name))
            })?;
        self.target
            .new_instance(class, thread, constructor, &[])
            .await
            .map_err(|e| thread_error(e, thread))
    }

    async fn store(&self, variable: &Variable, value: &Value) -> Result<()> {
        match variable.kind {
            VariableKind::Local {
                thread,
                frame,
                slot,
            } => self
                .target
                .set_frame_values(thread, frame, &[(slot, value.clone())])
                .await
                .map_err(|e| thread_error(e, thread)),
            VariableKind::Field { object, field } => Ok(self
                .target
                .set_object_values(object, &[(field, value.clone())])
                .await?),
            VariableKind::StaticField { class, field } => Ok(self
                .target
                .set_static_values(class, &[(field, value.clone())])
                .await?),
            VariableKind::ArrayElement { array, index } => Ok(self
                .target
                .set_array_values(array, index, std::slice::from_ref(value))
                .await?),
            VariableKind::Value => Err(DebuggerError::NotMutable),
        }
    }
}

impl<T: TargetVm> DebuggerSession<T> {
    /// Lift a host value into the target. Objects are created through their
    /// no-argument constructor on the current thread, which must be suspended.
    pub async fn create_mirror_var(&self, host: &MirrorGraph) -> Result<Variable> {
        self.inner.ensure_connected()?;
        let value = self.inner.lift(host, host.root()).await?;
        let signature = match host.root() {
            HostValue::Ref(node) => match host.node(*node) {
                Some(MirrorNode::Array { signature, .. }) => signature.clone(),
                Some(MirrorNode::Object { class_name, .. }) => class_signature(class_name),
                None => "Ljava/lang/Object;".to_string(),
            },
            HostValue::String(_) => "Ljava/lang/String;".to_string(),
            HostValue::Null => "Ljava/lang/Object;".to_string(),
            _ => (value.tag as char).to_string(),
        };
        Ok(Variable {
            name: "mirror".to_string(),
            signature,
            value,
            kind: VariableKind::Value,
        })
    }

    /// Host copy of the object graph reachable from a variable
    pub async fn create_mirror_object(&self, variable: &Variable) -> Result<MirrorGraph> {
        self.inner.ensure_connected()?;
        self.inner.mirror_of(&variable.value).await
    }

    /// Write a host value into a mutable variable; returns the variable
    /// with its new value
    pub async fn set_from_mirror_object(
        &self,
        variable: &Variable,
        host: &MirrorGraph,
    ) -> Result<Variable> {
        if !variable.is_mutable() {
            return Err(DebuggerError::NotMutable);
        }
        self.inner.ensure_connected()?;
        let value = self.inner.lift(host, host.root()).await?;
        let value = coerce(value, &variable.signature)?;
        self.inner.store(variable, &value).await?;
        Ok(Variable {
            value,
            ..variable.clone()
        })
    }

    /// Local variable visible in frame `depth` of a suspended thread
    pub async fn local_variable(&self, thread: ThreadId, depth: usize, name: &str) -> Result<Variable> {
        self.inner.ensure_connected()?;
        let frames = self.inner.frames(thread).await?;
        let frame = frames.get(depth).ok_or_else(|| {
            DebuggerError::InvalidState(format!("thread {:#x} has no frame {}", thread, depth))
        })?;
        let location = frame.location.location;
        let variables = match self
            .inner
            .target
            .variable_table(location.class_id, location.method_id)
            .await
        {
            Ok(variables) => variables,
            Err(e) if e.error_code() == Some(error_codes::ABSENT_INFORMATION) => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let local = variables
            .into_iter()
            .find(|v| v.name == name && v.is_live_at(location.index))
            .ok_or_else(|| {
                DebuggerError::InvalidState(format!("no local '{}' in frame {}", name, depth))
            })?;
        let slot = VariableSlot {
            slot: local.slot as i32,
            sig_byte: signature_tag(&local.signature),
        };
        let value = self
            .inner
            .target
            .frame_values(thread, frame.frame_id, &[slot])
            .await
            .map_err(|e| thread_error(e, thread))?
            .pop()
            .unwrap_or_else(Value::null);
        Ok(Variable {
            name: local.name,
            signature: local.signature,
            value,
            kind: VariableKind::Local {
                thread,
                frame: frame.frame_id,
                slot: local.slot as i32,
            },
        })
    }

    /// Every local live in frame `depth`, in slot order. Empty when the
    /// class was compiled without variable tables.
    pub async fn visible_variables(&self, thread: ThreadId, depth: usize) -> Result<Vec<Variable>> {
        self.inner.ensure_connected()?;
        let frames = self.inner.frames(thread).await?;
        let Some(frame) = frames.get(depth) else {
            return Ok(Vec::new());
        };
        let location = frame.location.location;
        let mut locals = match self
            .inner
            .target
            .variable_table(location.class_id, location.method_id)
            .await
        {
            Ok(variables) => variables,
            Err(e) if e.error_code() == Some(error_codes::ABSENT_INFORMATION) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        locals.retain(|v| v.is_live_at(location.index));
        locals.sort_by_key(|v| v.slot);
        if locals.is_empty() {
            return Ok(Vec::new());
        }

        let slots: Vec<VariableSlot> = locals
            .iter()
            .map(|v| VariableSlot {
                slot: v.slot as i32,
                sig_byte: signature_tag(&v.signature),
            })
            .collect();
        let values = self
            .inner
            .target
            .frame_values(thread, frame.frame_id, &slots)
            .await
            .map_err(|e| thread_error(e, thread))?;
        Ok(locals
            .into_iter()
            .zip(values)
            .map(|(local, value)| Variable {
                kind: VariableKind::Local {
                    thread,
                    frame: frame.frame_id,
                    slot: local.slot as i32,
                },
                name: local.name,
                signature: local.signature,
                value,
            })
            .collect())
    }

    /// Instance field of an object, searching superclasses
    pub async fn field_variable(&self, object: ObjectId, name: &str) -> Result<Variable> {
        self.inner.ensure_connected()?;
        let (_, ref_type) = self.inner.target.object_reference_type(object).await?;
        let (declaring, field) = self
            .inner
            .find_field(ref_type, name)
            .await?
            .ok_or_else(|| DebuggerError::InvalidState(format!("no field '{}'", name)))?;
        if field.is_static() {
            return self.static_variable(declaring, field).await;
        }
        let value = self
            .inner
            .target
            .object_values(object, &[field.field_id])
            .await?
            .pop()
            .unwrap_or_else(Value::null);
        Ok(Variable {
            name: field.name,
            signature: field.signature,
            value,
            kind: VariableKind::Field {
                object,
                field: field.field_id,
            },
        })
    }

    /// Static field of a loaded class, by class name
    pub async fn static_field_variable(&self, class_name: &str, name: &str) -> Result<Variable> {
        self.inner.ensure_connected()?;
        let class = self.inner.loaded_type(&class_signature(class_name)).await?;
        let (declaring, field) = self
            .inner
            .find_field(class, name)
            .await?
            .filter(|(_, f)| f.is_static())
            .ok_or_else(|| {
                DebuggerError::InvalidState(format!("no static field '{}' in {}", name, class_name))
            })?;
        self.static_variable(declaring, field).await
    }

    async fn static_variable(&self, class: ClassId, field: FieldInfo) -> Result<Variable> {
        let value = self
            .inner
            .target
            .static_values(class, &[field.field_id])
            .await?
            .pop()
            .unwrap_or_else(Value::null);
        Ok(Variable {
            name: field.name,
            signature: field.signature,
            value,
            kind: VariableKind::StaticField {
                class,
                field: field.field_id,
            },
        })
    }

    pub async fn array_element(&self, array: ArrayId, index: i32) -> Result<Variable> {
        self.inner.ensure_connected()?;
        let (_, ref_type) = self.inner.target.object_reference_type(array).await?;
        let signature = self.inner.target.signature(ref_type).await?;
        let component = signature.strip_prefix('[').ok_or_else(|| {
            DebuggerError::InvalidState(format!("object {:#x} is not an array", array))
        })?;
        let length = self.inner.target.array_length(array).await?;
        if index < 0 || index >= length {
            return Err(DebuggerError::InvalidState(format!(
                "index {} out of bounds for length {}",
                index, length
            )));
        }
        let value = self
            .inner
            .target
            .array_values(array, index, 1)
            .await?
            .pop()
            .unwrap_or_else(Value::null);
        Ok(Variable {
            name: format!("[{}]", index),
            signature: component.to_string(),
            value,
            kind: VariableKind::ArrayElement { array, index },
        })
    }

    /// Wrap a value that has no storage, such as an evaluation result
    pub fn value_variable(&self, name: impl Into<String>, value: Value) -> Variable {
        let signature = match value.tag {
            t if t == TypeTag::String as u8 => "Ljava/lang/String;".to_string(),
            t if TypeTag::is_object_tag(t) => "Ljava/lang/Object;".to_string(),
            t => (t as char).to_string(),
        };
        Variable {
            name: name.into(),
            signature,
            value,
            kind: VariableKind::Value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder_keeps_cycles_as_indices() {
        let mut graph = MirrorGraph::new();
        let list = graph.add_object("java.util.ArrayList");
        let data = graph.add_array("[Ljava/lang/Object;", vec![HostValue::Ref(list)]);
        graph
            .set_field(list, "elementData", HostValue::Ref(data))
            .set_field(list, "size", HostValue::Int(1))
            .set_root(HostValue::Ref(list));

        assert_eq!(graph.field(list, "elementData"), Some(&HostValue::Ref(data)));
        assert_eq!(graph.elements(data), Some(&[HostValue::Ref(list)][..]));

        graph.set_field(list, "size", HostValue::Int(2));
        assert_eq!(graph.field(list, "size"), Some(&HostValue::Int(2)));
        assert_eq!(graph.nodes().len(), 2);
    }

    #[test]
    fn test_coerce_numbers_to_declared_type() {
        assert_eq!(coerce(Value::int(7), "J").unwrap(), Value::long(7));
        assert_eq!(coerce(Value::int(300), "B").unwrap(), Value::byte(44));
        assert_eq!(coerce(Value::double(2.5), "I").unwrap(), Value::int(2));
        assert_eq!(coerce(Value::int(3), "D").unwrap(), Value::double(3.0));
        assert!(coerce(Value::boolean(true), "I").is_err());
        assert!(coerce(Value::int(1), "Z").is_err());
    }

    #[test]
    fn test_references_pass_through_coercion() {
        let list = Value::object(TypeTag::Object as u8, 0x42);
        assert_eq!(coerce(list.clone(), "Ljava/util/List;").unwrap(), list);
        assert_eq!(coerce(Value::null(), "[I").unwrap(), Value::null());
    }

    #[test]
    fn test_only_value_variables_are_immutable() {
        let variable = Variable {
            name: "x".to_string(),
            signature: "I".to_string(),
            value: Value::int(1),
            kind: VariableKind::Value,
        };
        assert!(!variable.is_mutable());

        let local = Variable {
            kind: VariableKind::Local {
                thread: 1,
                frame: 2,
                slot: 0,
            },
            ..variable
        };
        assert!(local.is_mutable());
    }
}
