// Breakpoint resolution
//
// Turns registry breakpoints into target event requests. Breakpoints bound to
// classes are resolved against classes already loaded and, through
// class-prepare requests, against classes loaded later.

use crate::breakpoint::{
    Breakpoint, BreakpointId, BreakpointKind, ClassBreakpointType, FieldBreakpointType,
    MethodBreakpointType, ThreadBreakpointType, Validity,
};
use crate::error::Result;
use crate::registry::{class_name_from_signature, RegistryEvent};
use crate::session::{lock, Installation, RequestOwner, SessionInner, SessionState};
use crate::target::TargetVm;
use jdwp_client::commands::event_kinds;
use jdwp_client::types::{ref_type_tags, Location, MethodId, ReferenceTypeId};
use jdwp_client::{EventModifier, SuspendPolicy};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl<T: TargetVm> SessionInner<T> {
    pub(crate) async fn apply_registry_change(self: &Arc<Self>, change: RegistryEvent) {
        // Breakpoints added before VMStart are installed when it arrives
        if matches!(
            self.state(),
            SessionState::Starting | SessionState::Disconnected
        ) {
            return;
        }
        match change {
            RegistryEvent::Added(breakpoint) => self.install(&breakpoint).await,
            RegistryEvent::Removed(breakpoint) => self.uninstall(breakpoint.id()).await,
            RegistryEvent::Changed(breakpoint) => {
                // Policy and condition decide the request suspend policy
                self.uninstall(breakpoint.id()).await;
                breakpoint.set_validity(Validity::Unknown);
                if self.registry.contains(&breakpoint) {
                    self.install(&breakpoint).await;
                }
            }
        }
    }

    pub(crate) async fn install_all(self: &Arc<Self>) {
        let breakpoints = self.registry.breakpoints();
        info!("Installing {} breakpoint(s)", breakpoints.len());
        for breakpoint in &breakpoints {
            self.install(breakpoint).await;
        }
    }

    /// Bring installed requests back in line with the registry
    pub(crate) async fn reinstall_all(self: &Arc<Self>) {
        let installed: Vec<BreakpointId> = lock(&self.installs).keys().copied().collect();
        for id in installed {
            self.uninstall(id).await;
        }
        self.install_all().await;
    }

    /// Install a breakpoint's requests. Installing twice is a no-op.
    pub(crate) async fn install(self: &Arc<Self>, breakpoint: &Breakpoint) {
        {
            let mut installs = lock(&self.installs);
            if installs.contains_key(&breakpoint.id()) {
                return;
            }
            installs.insert(breakpoint.id(), Installation::default());
        }
        debug!("Installing breakpoint {:?}", breakpoint);
        if let Err(e) = self.install_requests(breakpoint).await {
            warn!("Failed to install breakpoint {}: {}", breakpoint.id(), e);
            if !e.is_disconnect() {
                breakpoint.set_validity(Validity::Invalid(e.to_string()));
            }
        }
    }

    pub(crate) async fn uninstall(&self, id: BreakpointId) {
        let Some(install) = lock(&self.installs).remove(&id) else {
            return;
        };
        debug!("Uninstalling breakpoint {} ({} request(s))", id, install.requests.len());
        for (kind, request_id) in install.requests {
            lock(&self.requests).remove(&request_id);
            if let Err(e) = self.target.clear_event_request(kind, request_id).await {
                debug!("Clearing request {} failed: {}", request_id, e);
            }
        }
    }

    /// Suspend policy for a breakpoint's requests. A condition needs the
    /// event thread suspended to be evaluated.
    fn request_policy(&self, breakpoint: &Breakpoint) -> SuspendPolicy {
        let policy = breakpoint
            .suspend_policy()
            .unwrap_or(self.config.suspend_policy);
        if policy == SuspendPolicy::None && breakpoint.condition().is_some() {
            SuspendPolicy::EventThread
        } else {
            policy
        }
    }

    async fn add_request(
        &self,
        breakpoint: &Breakpoint,
        owner: RequestOwner,
        kind: u8,
        policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> Result<()> {
        let request_id = self
            .target
            .set_event_request(kind, policy, modifiers)
            .await?;
        let recorded = match lock(&self.installs).get_mut(&breakpoint.id()) {
            Some(install) => {
                install.requests.push((kind, request_id));
                lock(&self.requests).insert(request_id, owner);
                true
            }
            None => false,
        };
        if !recorded {
            // Uninstalled while the request was in flight
            self.target.clear_event_request(kind, request_id).await.ok();
        }
        Ok(())
    }

    async fn install_requests(&self, breakpoint: &Breakpoint) -> Result<()> {
        let policy = self.request_policy(breakpoint);
        let owner = RequestOwner::Breakpoint(breakpoint.id());
        let names = self.registry.class_names(breakpoint);
        let exclusions: Vec<EventModifier> = names
            .excluded
            .iter()
            .map(|pattern| EventModifier::ClassExclude(pattern.clone()))
            .collect();

        match breakpoint.kind() {
            BreakpointKind::Thread { kind } => {
                let kinds: &[u8] = match kind {
                    ThreadBreakpointType::Start => &[event_kinds::THREAD_START],
                    ThreadBreakpointType::Death => &[event_kinds::THREAD_DEATH],
                    ThreadBreakpointType::StartAndDeath => {
                        &[event_kinds::THREAD_START, event_kinds::THREAD_DEATH]
                    }
                };
                for event_kind in kinds {
                    self.add_request(breakpoint, owner, *event_kind, policy, &[])
                        .await?;
                }
                breakpoint.set_validity(Validity::Valid);
                return Ok(());
            }
            BreakpointKind::Class { kind, .. } => {
                let kinds: &[u8] = match kind {
                    ClassBreakpointType::Prepare => &[event_kinds::CLASS_PREPARE],
                    ClassBreakpointType::Unload => &[event_kinds::CLASS_UNLOAD],
                    ClassBreakpointType::PrepareAndUnload => {
                        &[event_kinds::CLASS_PREPARE, event_kinds::CLASS_UNLOAD]
                    }
                };
                for event_kind in kinds {
                    for pattern in &names.names {
                        let mut modifiers = vec![EventModifier::ClassMatch(pattern.clone())];
                        modifiers.extend(exclusions.iter().cloned());
                        self.add_request(breakpoint, owner, *event_kind, policy, &modifiers)
                            .await?;
                    }
                }
                breakpoint.set_validity(Validity::Valid);
                return Ok(());
            }
            BreakpointKind::Exception {
                class,
                caught,
                uncaught,
            } if class == "*" => {
                let modifiers = [EventModifier::ExceptionOnly {
                    ref_type: 0,
                    caught: *caught,
                    uncaught: *uncaught,
                }];
                self.add_request(breakpoint, owner, event_kinds::EXCEPTION, policy, &modifiers)
                    .await?;
                breakpoint.set_validity(Validity::Valid);
                return Ok(());
            }
            _ => {}
        }

        // Classes loaded later
        for pattern in &names.names {
            let mut modifiers = vec![EventModifier::ClassMatch(pattern.clone())];
            modifiers.extend(exclusions.iter().cloned());
            self.add_request(
                breakpoint,
                RequestOwner::Deferred(breakpoint.id()),
                event_kinds::CLASS_PREPARE,
                SuspendPolicy::EventThread,
                &modifiers,
            )
            .await?;
        }

        // Classes already loaded
        for class in self.target.all_classes().await? {
            if class.ref_type_tag == ref_type_tags::ARRAY {
                continue;
            }
            let name = class_name_from_signature(&class.signature);
            if names.matches(&name) {
                self.resolve_in_class(breakpoint, class.type_id, &name).await?;
            }
        }
        Ok(())
    }

    /// A class matching a deferred breakpoint was prepared
    pub(crate) async fn resolve_deferred(
        &self,
        id: BreakpointId,
        ref_type: ReferenceTypeId,
        signature: &str,
    ) {
        let Some(breakpoint) = self.registry.get(id) else {
            return;
        };
        let name = class_name_from_signature(signature);
        if !self.registry.class_names(&breakpoint).matches(&name) {
            return;
        }
        debug!("Resolving breakpoint {} in newly loaded {}", id, name);
        if let Err(e) = self.resolve_in_class(&breakpoint, ref_type, &name).await {
            warn!("Resolving breakpoint {} in {} failed: {}", id, name, e);
        }
    }

    async fn resolve_in_class(
        &self,
        breakpoint: &Breakpoint,
        class_id: ReferenceTypeId,
        class_name: &str,
    ) -> Result<()> {
        {
            let mut installs = lock(&self.installs);
            let Some(install) = installs.get_mut(&breakpoint.id()) else {
                return Ok(());
            };
            if !install.resolved_classes.insert(class_id) {
                return Ok(());
            }
        }
        let policy = self.request_policy(breakpoint);
        let owner = RequestOwner::Breakpoint(breakpoint.id());

        match breakpoint.kind() {
            BreakpointKind::Line { line, .. } => {
                let mut locations = Vec::new();
                for method in self.methods(class_id).await?.iter() {
                    let table = self.line_table(class_id, method.method_id).await?;
                    if let Some(index) = table.index_for_line(*line) {
                        locations.push(Location {
                            type_tag: ref_type_tags::CLASS,
                            class_id,
                            method_id: method.method_id,
                            index,
                        });
                    }
                }
                if locations.is_empty() {
                    self.mark_unresolved(
                        breakpoint,
                        format!("No executable code at line {} in {}", line, class_name),
                    );
                    return Ok(());
                }
                for location in locations {
                    self.add_request(
                        breakpoint,
                        owner,
                        event_kinds::BREAKPOINT,
                        policy,
                        &[EventModifier::LocationOnly(location)],
                    )
                    .await?;
                }
            }
            BreakpointKind::Method { method, kind, .. } => {
                let ids: HashSet<MethodId> = self
                    .methods(class_id)
                    .await?
                    .iter()
                    .filter(|m| m.name == *method)
                    .map(|m| m.method_id)
                    .collect();
                if ids.is_empty() {
                    self.mark_unresolved(
                        breakpoint,
                        format!("Method {} not found in {}", method, class_name),
                    );
                    return Ok(());
                }
                if let Some(install) = lock(&self.installs).get_mut(&breakpoint.id()) {
                    install.methods.extend(ids);
                }
                let modifiers = [EventModifier::ClassOnly(class_id)];
                if matches!(kind, MethodBreakpointType::Entry | MethodBreakpointType::EntryAndExit) {
                    self.add_request(breakpoint, owner, event_kinds::METHOD_ENTRY, policy, &modifiers)
                        .await?;
                }
                if matches!(kind, MethodBreakpointType::Exit | MethodBreakpointType::EntryAndExit) {
                    self.add_request(
                        breakpoint,
                        owner,
                        event_kinds::METHOD_EXIT_WITH_RETURN_VALUE,
                        policy,
                        &modifiers,
                    )
                    .await?;
                }
            }
            BreakpointKind::Field { field, kind, .. } => {
                let fields = self.fields(class_id).await?;
                let Some(info) = fields.iter().find(|f| f.name == *field) else {
                    self.mark_unresolved(
                        breakpoint,
                        format!("Field {} not found in {}", field, class_name),
                    );
                    return Ok(());
                };
                let modifiers = [EventModifier::FieldOnly {
                    ref_type: class_id,
                    field_id: info.field_id,
                }];
                if matches!(kind, FieldBreakpointType::Access | FieldBreakpointType::AccessAndModification) {
                    self.add_request(breakpoint, owner, event_kinds::FIELD_ACCESS, policy, &modifiers)
                        .await?;
                }
                if matches!(
                    kind,
                    FieldBreakpointType::Modification | FieldBreakpointType::AccessAndModification
                ) {
                    self.add_request(
                        breakpoint,
                        owner,
                        event_kinds::FIELD_MODIFICATION,
                        policy,
                        &modifiers,
                    )
                    .await?;
                }
            }
            BreakpointKind::Exception {
                caught, uncaught, ..
            } => {
                let modifiers = [EventModifier::ExceptionOnly {
                    ref_type: class_id,
                    caught: *caught,
                    uncaught: *uncaught,
                }];
                self.add_request(breakpoint, owner, event_kinds::EXCEPTION, policy, &modifiers)
                    .await?;
            }
            BreakpointKind::Class { .. } | BreakpointKind::Thread { .. } => return Ok(()),
        }

        info!("Breakpoint {} resolved in {}", breakpoint.id(), class_name);
        breakpoint.set_validity(Validity::Valid);
        Ok(())
    }

    /// A matching class lacks the breakpoint's target. Another matching
    /// class may still resolve it.
    fn mark_unresolved(&self, breakpoint: &Breakpoint, message: String) {
        if breakpoint.validity() == Validity::Valid {
            debug!("Breakpoint {}: {}", breakpoint.id(), message);
            return;
        }
        warn!("Breakpoint {} invalid: {}", breakpoint.id(), message);
        breakpoint.set_validity(Validity::Invalid(message));
    }
}
