// ReferenceType and ClassType/ArrayType command implementations
//
// Commands for working with classes, interfaces, and arrays

use crate::commands::{
    array_type_commands, class_type_commands, command_sets, invoke_options,
    reference_type_commands,
};
use crate::connection::JdwpConnection;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::{read_i32, read_string, read_u64, read_u8, read_value};
use crate::types::{
    ArrayId, ArrayTypeId, ClassId, FieldId, FieldInfo, MethodId, ObjectId, ReferenceTypeId,
    ThreadId, Value,
};
use crate::writer::{put_untagged_value, put_value};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Method information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method_id: MethodId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

impl MethodInfo {
    pub const STATIC: i32 = 0x0008;

    pub fn is_static(&self) -> bool {
        self.mod_bits & Self::STATIC != 0
    }
}

fn ref_type_payload(ref_type_id: ReferenceTypeId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.put_u64(ref_type_id);
    payload
}

impl JdwpConnection {
    /// ReferenceType.Signature, e.g. "Lcom/example/Main;"
    pub async fn get_signature(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<String> {
        let reply = self
            .request(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::SIGNATURE,
                ref_type_payload(ref_type_id),
            )
            .await?;

        let mut data = reply.data();
        read_string(&mut data)
    }

    /// ReferenceType.Methods
    pub async fn get_methods(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        let reply = self
            .request(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::METHODS,
                ref_type_payload(ref_type_id),
            )
            .await?;

        let mut data = reply.data();

        let methods_count = read_i32(&mut data)?;
        let mut methods = Vec::with_capacity(methods_count.max(0) as usize);

        for _ in 0..methods_count {
            methods.push(MethodInfo {
                method_id: read_u64(&mut data)?,
                name: read_string(&mut data)?,
                signature: read_string(&mut data)?,
                mod_bits: read_i32(&mut data)?,
            });
        }

        Ok(methods)
    }

    /// ReferenceType.Fields (declared fields only, no inherited ones)
    pub async fn get_fields(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        let reply = self
            .request(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::FIELDS,
                ref_type_payload(ref_type_id),
            )
            .await?;

        let mut data = reply.data();

        let fields_count = read_i32(&mut data)?;
        let mut fields = Vec::with_capacity(fields_count.max(0) as usize);

        for _ in 0..fields_count {
            fields.push(FieldInfo {
                field_id: read_u64(&mut data)?,
                name: read_string(&mut data)?,
                signature: read_string(&mut data)?,
                mod_bits: read_i32(&mut data)?,
            });
        }

        Ok(fields)
    }

    /// ReferenceType.GetValues for static fields
    pub async fn get_static_values(
        &self,
        ref_type_id: ReferenceTypeId,
        field_ids: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        let mut payload = ref_type_payload(ref_type_id);
        payload.put_i32(field_ids.len() as i32);
        for field_id in field_ids {
            payload.put_u64(*field_id);
        }

        let reply = self
            .request(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::GET_VALUES,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let count = read_i32(&mut data)?;
        (0..count).map(|_| read_value(&mut data)).collect()
    }

    /// ClassType.Superclass. `None` for java.lang.Object.
    pub async fn get_superclass(&self, class_id: ClassId) -> JdwpResult<Option<ClassId>> {
        let reply = self
            .request(
                command_sets::CLASS_TYPE,
                class_type_commands::SUPERCLASS,
                ref_type_payload(class_id),
            )
            .await?;

        let mut data = reply.data();
        let superclass = read_u64(&mut data)?;
        Ok((superclass != 0).then_some(superclass))
    }

    /// ClassType.SetValues for static fields
    pub async fn set_static_values(
        &self,
        class_id: ClassId,
        values: &[(FieldId, Value)],
    ) -> JdwpResult<()> {
        let mut payload = ref_type_payload(class_id);
        payload.put_i32(values.len() as i32);
        for (field_id, value) in values {
            payload.put_u64(*field_id);
            put_untagged_value(&mut payload, value);
        }

        self.request(
            command_sets::CLASS_TYPE,
            class_type_commands::SET_VALUES,
            payload,
        )
        .await?;
        Ok(())
    }

    /// ClassType.NewInstance: runs the given constructor on a suspended thread
    pub async fn new_instance(
        &self,
        class_id: ClassId,
        thread: ThreadId,
        constructor: MethodId,
        args: &[Value],
    ) -> JdwpResult<ObjectId> {
        let mut payload = ref_type_payload(class_id);
        payload.put_u64(thread);
        payload.put_u64(constructor);
        payload.put_i32(args.len() as i32);
        for arg in args {
            put_value(&mut payload, arg);
        }
        payload.put_i32(invoke_options::INVOKE_SINGLE_THREADED);

        let reply = self
            .request(
                command_sets::CLASS_TYPE,
                class_type_commands::NEW_INSTANCE,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let _tag = read_u8(&mut data)?;
        let object = read_u64(&mut data)?;
        let _exception_tag = read_u8(&mut data)?;
        let exception = read_u64(&mut data)?;
        if exception != 0 {
            return Err(JdwpError::Protocol(format!(
                "Constructor threw exception @{:x}",
                exception
            )));
        }
        Ok(object)
    }

    /// ArrayType.NewInstance
    pub async fn new_array(&self, array_type: ArrayTypeId, length: i32) -> JdwpResult<ArrayId> {
        let mut payload = ref_type_payload(array_type);
        payload.put_i32(length);

        let reply = self
            .request(
                command_sets::ARRAY_TYPE,
                array_type_commands::NEW_INSTANCE,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let _tag = read_u8(&mut data)?;
        read_u64(&mut data)
    }
}
