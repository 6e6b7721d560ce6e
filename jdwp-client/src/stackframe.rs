// StackFrame command implementations
//
// Commands for inspecting and changing stack frame variables

use crate::commands::{command_sets, stack_frame_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_u64, read_u8, read_value};
use crate::types::{FrameId, ObjectId, ThreadId, Value};
use crate::writer::put_value;
use bytes::BufMut;

/// Variable slot information for GetValues
#[derive(Debug, Clone)]
pub struct VariableSlot {
    pub slot: i32,
    pub sig_byte: u8,
}

fn frame_payload(thread_id: ThreadId, frame_id: FrameId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);
    payload.put_u64(thread_id);
    payload.put_u64(frame_id);
    payload
}

impl JdwpConnection {
    /// StackFrame.GetValues
    pub async fn get_frame_values(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
        slots: &[VariableSlot],
    ) -> JdwpResult<Vec<Value>> {
        let mut payload = frame_payload(thread_id, frame_id);
        payload.put_i32(slots.len() as i32);
        for slot in slots {
            payload.put_i32(slot.slot);
            payload.put_u8(slot.sig_byte);
        }

        let reply = self
            .request(
                command_sets::STACK_FRAME,
                stack_frame_commands::GET_VALUES,
                payload,
            )
            .await?;

        let mut data = reply.data();
        let values_count = read_i32(&mut data)?;
        (0..values_count).map(|_| read_value(&mut data)).collect()
    }

    /// StackFrame.SetValues
    pub async fn set_frame_values(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
        values: &[(i32, Value)],
    ) -> JdwpResult<()> {
        let mut payload = frame_payload(thread_id, frame_id);
        payload.put_i32(values.len() as i32);
        for (slot, value) in values {
            payload.put_i32(*slot);
            put_value(&mut payload, value);
        }

        self.request(
            command_sets::STACK_FRAME,
            stack_frame_commands::SET_VALUES,
            payload,
        )
        .await?;
        Ok(())
    }

    /// StackFrame.ThisObject. `None` in static or native frames.
    pub async fn get_this_object(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
    ) -> JdwpResult<Option<ObjectId>> {
        let reply = self
            .request(
                command_sets::STACK_FRAME,
                stack_frame_commands::THIS_OBJECT,
                frame_payload(thread_id, frame_id),
            )
            .await?;

        let mut data = reply.data();
        let _tag = read_u8(&mut data)?;
        let object = read_u64(&mut data)?;
        Ok((object != 0).then_some(object))
    }
}
