// The operations the engine needs from a target VM
//
// `JdwpConnection` implements this over the wire; `MockVm` implements it in
// memory for tests.

use jdwp_client::method::LineTable;
use jdwp_client::object::MonitorInfo;
use jdwp_client::reftype::MethodInfo;
use jdwp_client::stackframe::VariableSlot;
use jdwp_client::thread::{Frame, OwnedMonitor};
use jdwp_client::types::{
    ArrayId, ClassId, FieldId, FieldInfo, FrameId, MethodId, ObjectId, ReferenceTypeId,
    StringId, SuspendStatus, ThreadId, ThreadStatus, Value, Variable,
};
use jdwp_client::vm::ClassInfo;
use jdwp_client::{EventModifier, EventSet, JdwpConnection, JdwpResult, SuspendPolicy};
use std::future::Future;

pub trait TargetVm: Send + Sync + 'static {
    // Classes and members
    fn all_classes(&self) -> impl Future<Output = JdwpResult<Vec<ClassInfo>>> + Send;
    fn classes_by_signature(
        &self,
        signature: &str,
    ) -> impl Future<Output = JdwpResult<Vec<ClassInfo>>> + Send;
    fn signature(&self, ref_type: ReferenceTypeId)
        -> impl Future<Output = JdwpResult<String>> + Send;
    fn methods(
        &self,
        ref_type: ReferenceTypeId,
    ) -> impl Future<Output = JdwpResult<Vec<MethodInfo>>> + Send;
    fn fields(
        &self,
        ref_type: ReferenceTypeId,
    ) -> impl Future<Output = JdwpResult<Vec<FieldInfo>>> + Send;
    fn superclass(&self, class: ClassId) -> impl Future<Output = JdwpResult<Option<ClassId>>> + Send;
    fn line_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> impl Future<Output = JdwpResult<LineTable>> + Send;
    fn variable_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> impl Future<Output = JdwpResult<Vec<Variable>>> + Send;

    // Event requests and events
    fn set_event_request(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> impl Future<Output = JdwpResult<i32>> + Send;
    fn clear_event_request(
        &self,
        event_kind: u8,
        request_id: i32,
    ) -> impl Future<Output = JdwpResult<()>> + Send;
    /// Next composite event; `None` once the target is gone
    fn recv_event(&self) -> impl Future<Output = Option<EventSet>> + Send;

    // Threads
    fn all_threads(&self) -> impl Future<Output = JdwpResult<Vec<ThreadId>>> + Send;
    fn thread_name(&self, thread: ThreadId) -> impl Future<Output = JdwpResult<String>> + Send;
    fn thread_status(
        &self,
        thread: ThreadId,
    ) -> impl Future<Output = JdwpResult<(ThreadStatus, SuspendStatus)>> + Send;
    fn suspend_count(&self, thread: ThreadId) -> impl Future<Output = JdwpResult<i32>> + Send;
    fn suspend_thread(&self, thread: ThreadId) -> impl Future<Output = JdwpResult<()>> + Send;
    fn resume_thread(&self, thread: ThreadId) -> impl Future<Output = JdwpResult<()>> + Send;
    fn suspend_all(&self) -> impl Future<Output = JdwpResult<()>> + Send;
    fn resume_all(&self) -> impl Future<Output = JdwpResult<()>> + Send;
    fn frames(
        &self,
        thread: ThreadId,
        start: i32,
        length: i32,
    ) -> impl Future<Output = JdwpResult<Vec<Frame>>> + Send;
    fn owned_monitors(
        &self,
        thread: ThreadId,
    ) -> impl Future<Output = JdwpResult<Vec<OwnedMonitor>>> + Send;
    fn contended_monitor(
        &self,
        thread: ThreadId,
    ) -> impl Future<Output = JdwpResult<Option<ObjectId>>> + Send;
    fn monitor_info(&self, object: ObjectId) -> impl Future<Output = JdwpResult<MonitorInfo>> + Send;

    // Frames
    fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[VariableSlot],
    ) -> impl Future<Output = JdwpResult<Vec<Value>>> + Send;
    fn set_frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        values: &[(i32, Value)],
    ) -> impl Future<Output = JdwpResult<()>> + Send;
    fn this_object(
        &self,
        thread: ThreadId,
        frame: FrameId,
    ) -> impl Future<Output = JdwpResult<Option<ObjectId>>> + Send;

    // Objects, strings and arrays
    fn object_reference_type(
        &self,
        object: ObjectId,
    ) -> impl Future<Output = JdwpResult<(u8, ReferenceTypeId)>> + Send;
    fn object_values(
        &self,
        object: ObjectId,
        fields: &[FieldId],
    ) -> impl Future<Output = JdwpResult<Vec<Value>>> + Send;
    fn set_object_values(
        &self,
        object: ObjectId,
        values: &[(FieldId, Value)],
    ) -> impl Future<Output = JdwpResult<()>> + Send;
    fn static_values(
        &self,
        ref_type: ReferenceTypeId,
        fields: &[FieldId],
    ) -> impl Future<Output = JdwpResult<Vec<Value>>> + Send;
    fn set_static_values(
        &self,
        class: ClassId,
        values: &[(FieldId, Value)],
    ) -> impl Future<Output = JdwpResult<()>> + Send;
    fn string_value(&self, string: StringId) -> impl Future<Output = JdwpResult<String>> + Send;
    fn create_string(&self, value: &str) -> impl Future<Output = JdwpResult<StringId>> + Send;
    fn array_length(&self, array: ArrayId) -> impl Future<Output = JdwpResult<i32>> + Send;
    fn array_values(
        &self,
        array: ArrayId,
        first: i32,
        length: i32,
    ) -> impl Future<Output = JdwpResult<Vec<Value>>> + Send;
    fn set_array_values(
        &self,
        array: ArrayId,
        first: i32,
        values: &[Value],
    ) -> impl Future<Output = JdwpResult<()>> + Send;
    fn new_instance(
        &self,
        class: ClassId,
        thread: ThreadId,
        constructor: MethodId,
        args: &[Value],
    ) -> impl Future<Output = JdwpResult<ObjectId>> + Send;
    fn new_array(
        &self,
        array_type: ReferenceTypeId,
        length: i32,
    ) -> impl Future<Output = JdwpResult<ArrayId>> + Send;

    // Lifecycle
    fn dispose(&self) -> impl Future<Output = JdwpResult<()>> + Send;
    fn exit(&self, exit_code: i32) -> impl Future<Output = JdwpResult<()>> + Send;
}

impl TargetVm for JdwpConnection {
    async fn all_classes(&self) -> JdwpResult<Vec<ClassInfo>> {
        JdwpConnection::all_classes(self).await
    }

    async fn classes_by_signature(&self, signature: &str) -> JdwpResult<Vec<ClassInfo>> {
        JdwpConnection::classes_by_signature(self, signature).await
    }

    async fn signature(&self, ref_type: ReferenceTypeId) -> JdwpResult<String> {
        self.get_signature(ref_type).await
    }

    async fn methods(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        self.get_methods(ref_type).await
    }

    async fn fields(&self, ref_type: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        self.get_fields(ref_type).await
    }

    async fn superclass(&self, class: ClassId) -> JdwpResult<Option<ClassId>> {
        self.get_superclass(class).await
    }

    async fn line_table(&self, ref_type: ReferenceTypeId, method: MethodId) -> JdwpResult<LineTable> {
        self.get_line_table(ref_type, method).await
    }

    async fn variable_table(
        &self,
        ref_type: ReferenceTypeId,
        method: MethodId,
    ) -> JdwpResult<Vec<Variable>> {
        self.get_variable_table(ref_type, method).await
    }

    async fn set_event_request(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> JdwpResult<i32> {
        JdwpConnection::set_event_request(self, event_kind, suspend_policy, modifiers).await
    }

    async fn clear_event_request(&self, event_kind: u8, request_id: i32) -> JdwpResult<()> {
        JdwpConnection::clear_event_request(self, event_kind, request_id).await
    }

    async fn recv_event(&self) -> Option<EventSet> {
        JdwpConnection::recv_event(self).await
    }

    async fn all_threads(&self) -> JdwpResult<Vec<ThreadId>> {
        self.get_all_threads().await
    }

    async fn thread_name(&self, thread: ThreadId) -> JdwpResult<String> {
        self.get_thread_name(thread).await
    }

    async fn thread_status(&self, thread: ThreadId) -> JdwpResult<(ThreadStatus, SuspendStatus)> {
        self.get_thread_status(thread).await
    }

    async fn suspend_count(&self, thread: ThreadId) -> JdwpResult<i32> {
        self.get_suspend_count(thread).await
    }

    async fn suspend_thread(&self, thread: ThreadId) -> JdwpResult<()> {
        JdwpConnection::suspend_thread(self, thread).await
    }

    async fn resume_thread(&self, thread: ThreadId) -> JdwpResult<()> {
        JdwpConnection::resume_thread(self, thread).await
    }

    async fn suspend_all(&self) -> JdwpResult<()> {
        JdwpConnection::suspend_all(self).await
    }

    async fn resume_all(&self) -> JdwpResult<()> {
        JdwpConnection::resume_all(self).await
    }

    async fn frames(&self, thread: ThreadId, start: i32, length: i32) -> JdwpResult<Vec<Frame>> {
        self.get_frames(thread, start, length).await
    }

    async fn owned_monitors(&self, thread: ThreadId) -> JdwpResult<Vec<OwnedMonitor>> {
        self.get_owned_monitors(thread).await
    }

    async fn contended_monitor(&self, thread: ThreadId) -> JdwpResult<Option<ObjectId>> {
        self.get_contended_monitor(thread).await
    }

    async fn monitor_info(&self, object: ObjectId) -> JdwpResult<MonitorInfo> {
        self.get_monitor_info(object).await
    }

    async fn frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[VariableSlot],
    ) -> JdwpResult<Vec<Value>> {
        self.get_frame_values(thread, frame, slots).await
    }

    async fn set_frame_values(
        &self,
        thread: ThreadId,
        frame: FrameId,
        values: &[(i32, Value)],
    ) -> JdwpResult<()> {
        JdwpConnection::set_frame_values(self, thread, frame, values).await
    }

    async fn this_object(&self, thread: ThreadId, frame: FrameId) -> JdwpResult<Option<ObjectId>> {
        self.get_this_object(thread, frame).await
    }

    async fn object_reference_type(&self, object: ObjectId) -> JdwpResult<(u8, ReferenceTypeId)> {
        self.get_object_reference_type(object).await
    }

    async fn object_values(&self, object: ObjectId, fields: &[FieldId]) -> JdwpResult<Vec<Value>> {
        self.get_object_values(object, fields).await
    }

    async fn set_object_values(&self, object: ObjectId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        JdwpConnection::set_object_values(self, object, values).await
    }

    async fn static_values(
        &self,
        ref_type: ReferenceTypeId,
        fields: &[FieldId],
    ) -> JdwpResult<Vec<Value>> {
        self.get_static_values(ref_type, fields).await
    }

    async fn set_static_values(&self, class: ClassId, values: &[(FieldId, Value)]) -> JdwpResult<()> {
        JdwpConnection::set_static_values(self, class, values).await
    }

    async fn string_value(&self, string: StringId) -> JdwpResult<String> {
        self.get_string_value(string).await
    }

    async fn create_string(&self, value: &str) -> JdwpResult<StringId> {
        JdwpConnection::create_string(self, value).await
    }

    async fn array_length(&self, array: ArrayId) -> JdwpResult<i32> {
        self.get_array_length(array).await
    }

    async fn array_values(&self, array: ArrayId, first: i32, length: i32) -> JdwpResult<Vec<Value>> {
        self.get_array_values(array, first, length).await
    }

    async fn set_array_values(&self, array: ArrayId, first: i32, values: &[Value]) -> JdwpResult<()> {
        JdwpConnection::set_array_values(self, array, first, values).await
    }

    async fn new_instance(
        &self,
        class: ClassId,
        thread: ThreadId,
        constructor: MethodId,
        args: &[Value],
    ) -> JdwpResult<ObjectId> {
        JdwpConnection::new_instance(self, class, thread, constructor, args).await
    }

    async fn new_array(&self, array_type: ReferenceTypeId, length: i32) -> JdwpResult<ArrayId> {
        JdwpConnection::new_array(self, array_type, length).await
    }

    async fn dispose(&self) -> JdwpResult<()> {
        JdwpConnection::dispose(self).await
    }

    async fn exit(&self, exit_code: i32) -> JdwpResult<()> {
        JdwpConnection::exit(self, exit_code).await
    }
}
