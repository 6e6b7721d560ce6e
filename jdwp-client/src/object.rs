// ObjectReference command implementations
//
// Commands for working with object instances

use crate::commands::{command_sets, object_reference_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_u64, read_u8, read_value};
use crate::types::{FieldId, ObjectId, ReferenceTypeId, ThreadId, Value};
use crate::writer::put_untagged_value;
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Ownership state of an object's monitor (ObjectReference.MonitorInfo)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub owner: Option<ThreadId>,
    pub entry_count: i32,
    pub waiters: Vec<ThreadId>,
}

fn object_payload(object_id: ObjectId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.put_u64(object_id);
    payload
}

impl JdwpConnection {
    /// Runtime class of an object as (type tag, reference type)
    pub async fn get_object_reference_type(
        &self,
        object_id: ObjectId,
    ) -> JdwpResult<(u8, ReferenceTypeId)> {
        let reply = self
            .request(
                command_sets::OBJECT_REFERENCE,
                object_reference_commands::REFERENCE_TYPE,
                object_payload(object_id),
            )
            .await?;

        let mut data = reply.data();
        let type_tag = read_u8(&mut data)?;
        let reference_type_id = read_u64(&mut data)?;

        Ok((type_tag, reference_type_id))
    }

    /// ObjectReference.GetValues
    pub async fn get_object_values(
        &self,
        object_id: ObjectId,
        field_ids: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        let mut payload = object_payload(object_id);
        payload.put_i32(field_ids.len() as i32);
        for field_id in field_ids {
            payload.put_u64(*field_id);
        }

        let reply = self
            .request(
                command_sets::OBJECT_REFERENCE,
                object_reference_commands::GET_VALUES,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let values_count = read_i32(&mut data)?;
        (0..values_count).map(|_| read_value(&mut data)).collect()
    }

    /// ObjectReference.SetValues (values are written untagged)
    pub async fn set_object_values(
        &self,
        object_id: ObjectId,
        values: &[(FieldId, Value)],
    ) -> JdwpResult<()> {
        let mut payload = object_payload(object_id);
        payload.put_i32(values.len() as i32);
        for (field_id, value) in values {
            payload.put_u64(*field_id);
            put_untagged_value(&mut payload, value);
        }

        self.request(
            command_sets::OBJECT_REFERENCE,
            object_reference_commands::SET_VALUES,
            payload,
        )
        .await?;
        Ok(())
    }

    /// ObjectReference.MonitorInfo. Requires the canGetMonitorInfo capability.
    pub async fn get_monitor_info(&self, object_id: ObjectId) -> JdwpResult<MonitorInfo> {
        let reply = self
            .request(
                command_sets::OBJECT_REFERENCE,
                object_reference_commands::MONITOR_INFO,
                object_payload(object_id),
            )
            .await?;

        let mut data = reply.data();
        let owner = read_u64(&mut data)?;
        let entry_count = read_i32(&mut data)?;
        let waiter_count = read_i32(&mut data)?;
        let waiters = (0..waiter_count)
            .map(|_| read_u64(&mut data))
            .collect::<JdwpResult<Vec<_>>>()?;

        Ok(MonitorInfo {
            owner: (owner != 0).then_some(owner),
            entry_count,
            waiters,
        })
    }
}
