// Thread and monitor inspection

use crate::error::Result;
use crate::session::{thread_error, DebuggerSession, SessionInner, StackFrame};
use crate::target::TargetVm;
use jdwp_client::types::{ObjectId, SuspendStatus, ThreadId, ThreadStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    pub suspended: bool,
    pub suspend_count: i32,
}

/// A monitor a thread holds and the frame that entered it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedMonitorInfo {
    pub monitor: ObjectId,
    /// Stack depth of the entering frame; -1 when the VM cannot tell
    pub stack_depth: i32,
    pub frame: Option<StackFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContendedMonitor {
    pub monitor: ObjectId,
    pub owner: Option<ThreadId>,
}

impl<T: TargetVm> SessionInner<T> {
    pub(crate) async fn thread_info(&self, thread: ThreadId) -> Result<ThreadInfo> {
        let name = self.target.thread_name(thread).await?;
        let (status, suspend) = self.target.thread_status(thread).await?;
        let suspend_count = self.target.suspend_count(thread).await?;
        Ok(ThreadInfo {
            id: thread,
            name,
            status,
            suspended: suspend == SuspendStatus::Suspended,
            suspend_count,
        })
    }

    pub(crate) async fn contended_monitor_and_owner(
        &self,
        thread: ThreadId,
    ) -> Result<Option<ContendedMonitor>> {
        let monitor = self
            .target
            .contended_monitor(thread)
            .await
            .map_err(|e| thread_error(e, thread))?;
        let Some(monitor) = monitor.filter(|m| *m != 0) else {
            return Ok(None);
        };
        let info = self.target.monitor_info(monitor).await?;
        Ok(Some(ContendedMonitor {
            monitor,
            owner: info.owner.filter(|owner| *owner != 0),
        }))
    }
}

impl<T: TargetVm> DebuggerSession<T> {
    pub async fn all_threads(&self) -> Result<Vec<ThreadInfo>> {
        self.inner.ensure_connected()?;
        let ids = self.inner.target.all_threads().await?;
        let mut threads = Vec::with_capacity(ids.len());
        for id in ids {
            threads.push(self.inner.thread_info(id).await?);
        }
        Ok(threads)
    }

    pub async fn thread_info(&self, thread: ThreadId) -> Result<ThreadInfo> {
        self.inner.thread_info(thread).await
    }

    /// Monitors held by a suspended thread, with the frames that took them
    pub async fn owned_monitors_and_frames(&self, thread: ThreadId) -> Result<Vec<OwnedMonitorInfo>> {
        self.inner.ensure_connected()?;
        let owned = self
            .inner
            .target
            .owned_monitors(thread)
            .await
            .map_err(|e| thread_error(e, thread))?;
        let stack = if owned.is_empty() {
            Vec::new()
        } else {
            self.inner.frames(thread).await?
        };
        Ok(owned
            .into_iter()
            .map(|m| OwnedMonitorInfo {
                monitor: m.monitor,
                stack_depth: m.stack_depth,
                frame: usize::try_from(m.stack_depth)
                    .ok()
                    .and_then(|depth| stack.get(depth).cloned()),
            })
            .collect())
    }

    /// The monitor a suspended thread is blocked on, and who holds it
    pub async fn contended_monitor_and_owner(
        &self,
        thread: ThreadId,
    ) -> Result<Option<ContendedMonitor>> {
        self.inner.ensure_connected()?;
        self.inner.contended_monitor_and_owner(thread).await
    }
}
