// ThreadReference command implementations
//
// Commands for working with threads (frames, status, suspend/resume, monitors)

use crate::commands::{command_sets, thread_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_location, read_string, read_u32, read_u64, read_u8};
use crate::types::{FrameId, Location, ObjectId, SuspendStatus, ThreadId, ThreadStatus};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Stack frame information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: FrameId,
    pub location: Location,
}

/// A monitor held by a thread and the stack depth that acquired it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedMonitor {
    pub monitor: ObjectId,
    pub stack_depth: i32,
}

fn thread_payload(thread_id: ThreadId) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.put_u64(thread_id);
    payload
}

impl JdwpConnection {
    /// Get stack frames for a thread (ThreadReference.Frames)
    /// `length` of -1 means all frames from `start_frame`
    pub async fn get_frames(
        &self,
        thread_id: ThreadId,
        start_frame: i32,
        length: i32,
    ) -> JdwpResult<Vec<Frame>> {
        let mut payload = thread_payload(thread_id);
        payload.put_i32(start_frame);
        payload.put_i32(length);

        let reply = self
            .request(command_sets::THREAD_REFERENCE, thread_commands::FRAMES, payload)
            .await?;

        let mut data = reply.data();

        let frames_count = read_i32(&mut data)?;
        let mut frames = Vec::with_capacity(frames_count.max(0) as usize);

        for _ in 0..frames_count {
            frames.push(Frame {
                frame_id: read_u64(&mut data)?,
                location: read_location(&mut data)?,
            });
        }

        Ok(frames)
    }

    /// ThreadReference.Name
    pub async fn get_thread_name(&self, thread_id: ThreadId) -> JdwpResult<String> {
        let reply = self
            .request(
                command_sets::THREAD_REFERENCE,
                thread_commands::NAME,
                thread_payload(thread_id),
            )
            .await?;

        let mut data = reply.data();
        read_string(&mut data)
    }

    /// ThreadReference.Status
    pub async fn get_thread_status(
        &self,
        thread_id: ThreadId,
    ) -> JdwpResult<(ThreadStatus, SuspendStatus)> {
        let reply = self
            .request(
                command_sets::THREAD_REFERENCE,
                thread_commands::STATUS,
                thread_payload(thread_id),
            )
            .await?;

        let mut data = reply.data();
        let thread_status = ThreadStatus::from_u32(read_u32(&mut data)?).unwrap_or(ThreadStatus::Running);
        let suspend_status = if read_u32(&mut data)? & 1 != 0 {
            SuspendStatus::Suspended
        } else {
            SuspendStatus::Running
        };

        Ok((thread_status, suspend_status))
    }

    /// ThreadReference.Suspend (increments the thread's suspend count)
    pub async fn suspend_thread(&self, thread_id: ThreadId) -> JdwpResult<()> {
        self.request(
            command_sets::THREAD_REFERENCE,
            thread_commands::SUSPEND,
            thread_payload(thread_id),
        )
        .await?;
        Ok(())
    }

    /// ThreadReference.Resume (decrements the thread's suspend count)
    pub async fn resume_thread(&self, thread_id: ThreadId) -> JdwpResult<()> {
        self.request(
            command_sets::THREAD_REFERENCE,
            thread_commands::RESUME,
            thread_payload(thread_id),
        )
        .await?;
        Ok(())
    }

    /// ThreadReference.SuspendCount
    pub async fn get_suspend_count(&self, thread_id: ThreadId) -> JdwpResult<i32> {
        let reply = self
            .request(
                command_sets::THREAD_REFERENCE,
                thread_commands::SUSPEND_COUNT,
                thread_payload(thread_id),
            )
            .await?;

        let mut data = reply.data();
        read_i32(&mut data)
    }

    /// ThreadReference.OwnedMonitorsStackDepthInfo. Thread must be suspended.
    pub async fn get_owned_monitors(&self, thread_id: ThreadId) -> JdwpResult<Vec<OwnedMonitor>> {
        let reply = self
            .request(
                command_sets::THREAD_REFERENCE,
                thread_commands::OWNED_MONITORS_STACK_DEPTH_INFO,
                thread_payload(thread_id),
            )
            .await?;

        let mut data = reply.data();

        let count = read_i32(&mut data)?;
        let mut monitors = Vec::with_capacity(count.max(0) as usize);

        for _ in 0..count {
            let _tag = read_u8(&mut data)?;
            let monitor = read_u64(&mut data)?;
            let stack_depth = read_i32(&mut data)?;
            monitors.push(OwnedMonitor {
                monitor,
                stack_depth,
            });
        }

        Ok(monitors)
    }

    /// ThreadReference.CurrentContendedMonitor. Thread must be suspended.
    pub async fn get_contended_monitor(&self, thread_id: ThreadId) -> JdwpResult<Option<ObjectId>> {
        let reply = self
            .request(
                command_sets::THREAD_REFERENCE,
                thread_commands::CURRENT_CONTENDED_MONITOR,
                thread_payload(thread_id),
            )
            .await?;

        let mut data = reply.data();
        let _tag = read_u8(&mut data)?;
        let monitor = read_u64(&mut data)?;
        Ok((monitor != 0).then_some(monitor))
    }
}
