// EventRequest command implementations
//
// Set up event requests (breakpoints, steps, exceptions, etc.)

use crate::commands::{command_sets, event_commands, event_kinds};
use crate::connection::JdwpConnection;
use crate::events::EventModifier;
use crate::protocol::JdwpResult;
use crate::reader::read_i32;
use crate::types::{Location, MethodId, ReferenceTypeId};
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Suspend policy for events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    #[default]
    All = 2,
}

impl SuspendPolicy {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SuspendPolicy::None),
            1 => Some(SuspendPolicy::EventThread),
            2 => Some(SuspendPolicy::All),
            _ => None,
        }
    }
}

impl JdwpConnection {
    /// EventRequest.Set with an arbitrary modifier list. Returns the request ID.
    pub async fn set_event_request(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> JdwpResult<i32> {
        let mut data = Vec::new();
        data.put_u8(event_kind);
        data.put_u8(suspend_policy as u8);
        data.put_i32(modifiers.len() as i32);
        for modifier in modifiers {
            modifier.encode(&mut data);
        }

        let reply = self
            .request(command_sets::EVENT_REQUEST, event_commands::SET, data)
            .await?;

        let mut data = reply.data();
        let request_id = read_i32(&mut data)?;
        debug!("Event request kind={} -> id={}", event_kind, request_id);

        Ok(request_id)
    }

    /// Set a breakpoint at a specific location
    pub async fn set_breakpoint(
        &self,
        class_id: ReferenceTypeId,
        method_id: MethodId,
        bytecode_index: u64,
        suspend_policy: SuspendPolicy,
    ) -> JdwpResult<i32> {
        let location = Location {
            type_tag: 1,
            class_id,
            method_id,
            index: bytecode_index,
        };
        self.set_event_request(
            event_kinds::BREAKPOINT,
            suspend_policy,
            &[EventModifier::LocationOnly(location)],
        )
        .await
    }

    /// EventRequest.Clear
    pub async fn clear_event_request(&self, event_kind: u8, request_id: i32) -> JdwpResult<()> {
        let mut data = Vec::new();
        data.put_u8(event_kind);
        data.put_i32(request_id);

        self.request(command_sets::EVENT_REQUEST, event_commands::CLEAR, data)
            .await?;
        Ok(())
    }

    pub async fn clear_breakpoint(&self, request_id: i32) -> JdwpResult<()> {
        self.clear_event_request(event_kinds::BREAKPOINT, request_id)
            .await
    }
}
