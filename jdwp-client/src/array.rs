// ArrayReference command implementations

use crate::commands::{array_reference_commands, command_sets};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_u8, read_untagged_value, read_value};
use crate::types::{ArrayId, TypeTag, Value};
use crate::writer::put_untagged_value;
use bytes::BufMut;

fn array_payload(array_id: ArrayId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.put_u64(array_id);
    payload
}

impl JdwpConnection {
    /// ArrayReference.Length
    pub async fn get_array_length(&self, array_id: ArrayId) -> JdwpResult<i32> {
        let reply = self
            .request(
                command_sets::ARRAY_REFERENCE,
                array_reference_commands::LENGTH,
                array_payload(array_id),
            )
            .await?;

        let mut data = reply.data();
        read_i32(&mut data)
    }

    /// ArrayReference.GetValues
    ///
    /// The reply is an array region: one element tag, then untagged values for
    /// primitive arrays or tagged values for object arrays.
    pub async fn get_array_values(
        &self,
        array_id: ArrayId,
        first_index: i32,
        length: i32,
    ) -> JdwpResult<Vec<Value>> {
        let mut payload = array_payload(array_id);
        payload.put_i32(first_index);
        payload.put_i32(length);

        let reply = self
            .request(
                command_sets::ARRAY_REFERENCE,
                array_reference_commands::GET_VALUES,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let tag = read_u8(&mut data)?;
        let count = read_i32(&mut data)?;

        let mut values = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            if TypeTag::is_object_tag(tag) {
                values.push(read_value(&mut data)?);
            } else {
                let element = read_untagged_value(tag, &mut data)?;
                values.push(Value { tag, data: element });
            }
        }

        Ok(values)
    }

    /// ArrayReference.SetValues starting at `first_index`
    pub async fn set_array_values(
        &self,
        array_id: ArrayId,
        first_index: i32,
        values: &[Value],
    ) -> JdwpResult<()> {
        let mut payload = array_payload(array_id);
        payload.put_i32(first_index);
        payload.put_i32(values.len() as i32);
        for value in values {
            put_untagged_value(&mut payload, value);
        }

        self.request(
            command_sets::ARRAY_REFERENCE,
            array_reference_commands::SET_VALUES,
            payload,
        )
        .await?;
        Ok(())
    }
}
