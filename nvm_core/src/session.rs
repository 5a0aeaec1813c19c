//! Management Session
//!
//! [NvmSession] owns the device catalog, the aggregated capabilities and one security state machine per manageable
//! device. All of it sits behind a single session lock: every operation runs through a [SessionGuard] obtained from
//! [NvmSession::acquire] or [NvmSession::try_acquire], and the lock is released when the guard drops.
//!
//! ```rust,ignore
//! let session = NvmSession::open(services, NvmConfiguration::default())?;
//! let mut guard = session.acquire();
//! let goals = guard.create_goal(&GoalInput { volatile_percent: 25, ..Default::default() }, &[])?;
//! ```
//!
//! Goal planning has no hardware side effects. Committing goals is all-or-nothing across the targeted DIMMs. A DIMM
//! whose staging outcome is unknown is refused for further goal changes until [SessionGuard::get_goal] reads its
//! staged goal back.
//!
//! ## Logging
//!
//! Session operations are logged using the `nvm_session` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use nvm_goal::persistence::GoalFile;
use nvm_goal::planner::{GoalPlan, GoalPlanner, PlanError};
use nvm_goal::staging::GoalStager;
use nvm_goal::validate;
use nvm_inventory::{aggregate, DeviceCatalog};
use nvm_sdk::capabilities::NvmCapabilities;
use nvm_sdk::config::NvmConfiguration;
use nvm_sdk::device::{Device, Uid};
use nvm_sdk::error::{NvmError, Result, ReturnCode, Violation};
use nvm_sdk::event::{Event, EventType, Severity};
use nvm_sdk::goal::{ConfigGoal, GoalInput};
use nvm_sdk::interleave::InterleaveSet;
use nvm_sdk::job::Job;
use nvm_sdk::security::SecurityState;
use nvm_sdk::service::{DeviceEnumerator, EventSink, FirmwareMailbox, NamespaceInventory, PassThrough};
use nvm_security::SecurityMachine;

use crate::passthrough::RawCommandGate;
use crate::session_lock::{SessionLock, SessionLockGuard};

/// The collaborators a session consumes.
#[derive(Clone)]
pub struct PlatformServices {
    pub enumerator: Arc<dyn DeviceEnumerator>,
    pub namespaces: Arc<dyn NamespaceInventory>,
    pub mailbox: Arc<dyn FirmwareMailbox>,
    pub events: Arc<dyn EventSink>,
    /// Raw command transport. Pass-through is unavailable without one.
    pub pass_through: Option<Arc<dyn PassThrough>>,
}

impl PlatformServices {
    /// Uses one platform object for every service.
    pub fn from_platform<P>(platform: Arc<P>) -> Self
    where
        P: DeviceEnumerator + NamespaceInventory + FirmwareMailbox + EventSink + PassThrough + 'static,
    {
        Self {
            enumerator: platform.clone(),
            namespaces: platform.clone(),
            mailbox: platform.clone(),
            events: platform.clone(),
            pass_through: Some(platform),
        }
    }
}

struct SessionState {
    catalog: DeviceCatalog,
    capabilities: NvmCapabilities,
    machines: BTreeMap<Uid, SecurityMachine>,
    /// DIMMs whose staged goal is unknown after a failed commit or delete.
    unsettled: BTreeSet<Uid>,
}

fn discover(services: &PlatformServices) -> Result<(DeviceCatalog, NvmCapabilities)> {
    let catalog = DeviceCatalog::discover(services.enumerator.as_ref())?;
    let capabilities = aggregate::discover_capabilities(services.enumerator.as_ref(), &catalog)?;
    Ok((catalog, capabilities))
}

/// A management session over one platform.
pub struct NvmSession {
    services: PlatformServices,
    config: NvmConfiguration,
    state: SessionLock<SessionState>,
}

impl NvmSession {
    /// Discovers the platform and opens a session over it.
    pub fn open(services: PlatformServices, config: NvmConfiguration) -> Result<Self> {
        let (catalog, capabilities) = discover(&services)?;
        let machines =
            catalog.manageable().map(|device| (device.uid.clone(), SecurityMachine::new(device))).collect();
        log::info!(
            target: "nvm_session",
            "Opened session over {} devices ({} manageable)",
            catalog.len(),
            catalog.manageable().count()
        );
        let state = SessionState { catalog, capabilities, machines, unsettled: BTreeSet::new() };
        Ok(Self { services, config, state: SessionLock::new(state, "nvm_session") })
    }

    pub fn config(&self) -> &NvmConfiguration {
        &self.config
    }

    /// Blocks until the session is available.
    pub fn acquire(&self) -> SessionGuard<'_> {
        SessionGuard { session: self, state: self.state.lock() }
    }

    /// Returns `None` if another caller holds the session.
    pub fn try_acquire(&self) -> Option<SessionGuard<'_>> {
        self.state.try_lock().map(|state| SessionGuard { session: self, state })
    }
}

/// Exclusive access to a session. Every management operation goes through a guard.
pub struct SessionGuard<'s> {
    session: &'s NvmSession,
    state: SessionLockGuard<'s, SessionState>,
}

impl<'s> SessionGuard<'s> {
    fn services(&self) -> &'s PlatformServices {
        &self.session.services
    }

    fn report(&self, event_type: EventType, uid: Option<&Uid>, err: &NvmError) {
        if !self.session.config.record_events {
            return;
        }
        let severity = match err {
            NvmError::FirmwareRejected { .. } | NvmError::TransportFailure { .. } | NvmError::UnknownState(_) => {
                Severity::Critical
            }
            _ => Severity::Warning,
        };
        let event = Event::new(event_type, severity, err.return_code(), uid.cloned(), err.to_string());
        self.services().events.record_event(event);
    }

    fn reported<T>(&self, event_type: EventType, uid: Option<&Uid>, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.report(event_type, uid, err);
        }
        result
    }

    /// Every discovered device in topology order, manageable or not.
    pub fn devices(&self) -> &[Device] {
        self.state.catalog.devices()
    }

    pub fn capabilities(&self) -> &NvmCapabilities {
        &self.state.capabilities
    }

    /// The interleave sets currently mapped by the BIOS.
    pub fn interleave_sets(&self) -> Result<Vec<InterleaveSet>> {
        self.services().enumerator.interleave_sets()
    }

    /// Polls background device jobs.
    pub fn jobs(&self) -> Result<Vec<Job>> {
        self.services().enumerator.jobs()
    }

    /// DIMMs whose staged goal must be read back before they accept goal changes.
    pub fn unsettled(&self) -> impl Iterator<Item = &Uid> {
        self.state.unsettled.iter()
    }

    /// Replaces the catalog and capabilities with a fresh discovery.
    ///
    /// Security machines of devices that are still present keep their boot-scoped state.
    pub fn rediscover(&mut self) -> Result<()> {
        let (catalog, capabilities) = discover(self.services())?;
        let state = &mut *self.state;
        state.machines.retain(|uid, _| catalog.get(uid).is_some_and(Device::is_manageable));
        for device in catalog.manageable() {
            state.machines.entry(device.uid.clone()).or_insert_with(|| SecurityMachine::new(device));
        }
        state.catalog = catalog;
        state.capabilities = capabilities;
        log::info!(target: "nvm_session", "Rediscovered {} devices", state.catalog.len());
        Ok(())
    }

    /// Plans a goal for `targets`, or every manageable DIMM when empty, along with the interleave sets it would form.
    pub fn plan_goal(&self, input: &GoalInput, targets: &[Uid]) -> core::result::Result<GoalPlan, PlanError> {
        let current_sets = self.interleave_sets()?;
        let planner = GoalPlanner::new(&self.state.catalog, &self.state.capabilities, &self.session.config);
        let result = planner.plan(input, targets, self.services().namespaces.as_ref(), &current_sets);
        if let Err(err) = &result {
            self.report(EventType::Config, None, &err.kind);
        }
        result
    }

    /// Plans per-DIMM goals without touching hardware.
    pub fn compute_goal(&self, input: &GoalInput, targets: &[Uid]) -> core::result::Result<Vec<ConfigGoal>, PlanError> {
        self.plan_goal(input, targets).map(|plan| plan.goals)
    }

    /// Validates and stages a goal set on every DIMM it names, or on none of them.
    pub fn commit_goal(&mut self, goals: &[ConfigGoal]) -> Result<()> {
        let result = self.commit(goals);
        self.reported(EventType::Config, None, result)
    }

    fn commit(&mut self, goals: &[ConfigGoal]) -> Result<()> {
        let services = self.services();
        let secured = {
            let targets = validate::check_goal_set(goals, &self.state.catalog)?;
            validate::check_namespaces(&targets, services.namespaces.as_ref())?;
            validate::check_current_sets(&targets, &services.enumerator.interleave_sets()?)?;
            if let Some(device) = targets.iter().find(|device| self.state.unsettled.contains(&device.uid)) {
                return Err(NvmError::UnknownState(device.uid.clone()));
            }
            targets
                .iter()
                .filter(|device| self.security_enabled(&device.uid))
                .map(|device| device.uid.clone())
                .collect::<Vec<_>>()
        };

        for uid in &secured {
            log::warn!(target: "nvm_session", "Creating a goal on {} while security is enabled", uid);
            if self.session.config.record_events {
                services.events.record_event(Event::new(
                    EventType::Config,
                    Severity::Warning,
                    ReturnCode::WarnGoalCreationSecurityUnlocked,
                    Some(uid.clone()),
                    format!("goal created on {uid} while security is enabled"),
                ));
            }
        }

        match GoalStager::new(services.mailbox.as_ref()).commit(goals) {
            Ok(()) => {
                log::info!(target: "nvm_session", "Committed goals on {} DIMMs", goals.len());
                Ok(())
            }
            Err(failure) => {
                self.state.unsettled.extend(failure.unsettled);
                Err(failure.error)
            }
        }
    }

    fn security_enabled(&self, uid: &Uid) -> bool {
        self.state.machines.get(uid).is_some_and(|machine| machine.state().is_enabled())
    }

    /// Plans and commits a goal in one call.
    pub fn create_goal(&mut self, input: &GoalInput, targets: &[Uid]) -> Result<Vec<ConfigGoal>> {
        let goals = self.compute_goal(input, targets)?;
        self.commit_goal(&goals)?;
        Ok(goals)
    }

    /// Reads back the goals staged on `targets`, or on every manageable DIMM when empty.
    ///
    /// DIMMs without a staged goal are omitted. A successful read settles a DIMM left unsettled by a failed commit.
    pub fn get_goal(&mut self, targets: &[Uid]) -> Result<Vec<ConfigGoal>> {
        let result = self.read_goals(targets);
        self.reported(EventType::Config, None, result)
    }

    fn read_goals(&mut self, targets: &[Uid]) -> Result<Vec<ConfigGoal>> {
        let uids = self.target_uids(targets)?;
        let stager = GoalStager::new(self.services().mailbox.as_ref());
        let mut goals = Vec::new();
        for uid in uids {
            let staged = stager.read(&uid)?;
            if self.state.unsettled.remove(&uid) {
                log::info!(target: "nvm_session", "Staged goal on {} settled", uid);
            }
            goals.extend(staged);
        }
        Ok(goals)
    }

    fn target_uids(&self, targets: &[Uid]) -> Result<Vec<Uid>> {
        Ok(self.state.catalog.resolve_targets(targets)?.into_iter().map(|device| device.uid.clone()).collect())
    }

    /// Clears the goals staged on `targets`, or on every manageable DIMM when empty.
    ///
    /// A staged interleave set shared with a DIMM outside `targets` must be deleted as a whole.
    pub fn delete_goal(&mut self, targets: &[Uid]) -> Result<()> {
        let result = self.delete(targets);
        self.reported(EventType::Config, None, result)
    }

    fn delete(&mut self, targets: &[Uid]) -> Result<()> {
        let uids = self.target_uids(targets)?;
        if let Some(uid) = uids.iter().find(|uid| self.state.unsettled.contains(*uid)) {
            return Err(NvmError::UnknownState(uid.clone()));
        }

        let targeted: BTreeSet<&Uid> = uids.iter().collect();
        let sockets: BTreeSet<u16> =
            uids.iter().filter_map(|uid| self.state.catalog.get(uid)).map(Device::socket_id).collect();
        let neighbors: Vec<Uid> = self
            .state
            .catalog
            .manageable()
            .filter(|device| sockets.contains(&device.socket_id()) && !targeted.contains(&device.uid))
            .map(|device| device.uid.clone())
            .collect();

        let stager = GoalStager::new(self.services().mailbox.as_ref());
        let mut shared: BTreeMap<(u16, u8), Uid> = BTreeMap::new();
        for uid in &neighbors {
            if let Some(goal) = stager.read(uid)? {
                for slot in &goal.slots {
                    shared.insert((goal.socket_id, slot.appdirect_index), uid.clone());
                }
            }
        }
        for uid in &uids {
            let Some(goal) = stager.read(uid)? else {
                continue;
            };
            let outside = goal.slots.iter().find_map(|slot| shared.get(&(goal.socket_id, slot.appdirect_index)));
            if let Some(outside) = outside {
                log::warn!(target: "nvm_session", "Staged set on {} is shared with {}", uid, outside);
                return Err(Violation::GoalAffectsUnspecifiedDimm(uid.clone()).into());
            }
        }

        match stager.clear(&uids) {
            Ok(()) => {
                log::info!(target: "nvm_session", "Deleted goals on {} DIMMs", uids.len());
                Ok(())
            }
            Err(failure) => {
                self.state.unsettled.extend(failure.unsettled);
                Err(failure.error)
            }
        }
    }

    /// Writes every staged goal on the platform to a goal file and returns how many were written.
    pub fn dump_goal(&mut self, path: &Path) -> Result<usize> {
        let result = self.read_goals(&[]).and_then(|goals| {
            GoalFile::from_goals(&goals, &self.state.catalog)?.write(path)?;
            Ok(goals.len())
        });
        self.reported(EventType::Config, None, result)
    }

    /// Reads a goal file, maps it onto this platform's DIMMs and commits it.
    pub fn load_goal(&mut self, path: &Path) -> Result<Vec<ConfigGoal>> {
        let result = GoalFile::read(path).and_then(|file| file.resolve(&self.state.catalog));
        let goals = self.reported(EventType::Config, None, result)?;
        self.commit_goal(&goals)?;
        Ok(goals)
    }

    fn with_machine<T>(
        &mut self,
        uid: &Uid,
        operation: impl FnOnce(&mut SecurityMachine, &dyn FirmwareMailbox) -> Result<T>,
    ) -> Result<T> {
        let mailbox = self.services().mailbox.as_ref();
        let checked = self.state.catalog.manageable_device(uid).map(|_| ());
        let result = checked.and_then(|()| match self.state.machines.get_mut(uid) {
            Some(machine) => operation(machine, mailbox),
            None => Err(NvmError::DeviceNotManageable(uid.clone())),
        });
        self.reported(EventType::Security, Some(uid), result)
    }

    /// Enables security with `new`, or rotates the passphrase from `current`.
    pub fn set_passphrase(&mut self, uid: &Uid, current: Option<&str>, new: &str) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| {
            machine.set_passphrase(mailbox, current.map(str::as_bytes), new.as_bytes())
        })
    }

    pub fn remove_passphrase(&mut self, uid: &Uid, current: &str) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| machine.remove_passphrase(mailbox, current.as_bytes()))
    }

    pub fn unlock(&mut self, uid: &Uid, current: &str) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| machine.unlock(mailbox, current.as_bytes()))
    }

    pub fn freeze_lock(&mut self, uid: &Uid) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| machine.freeze_lock(mailbox))
    }

    pub fn erase(&mut self, uid: &Uid, current: Option<&str>) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| machine.erase(mailbox, current.map(str::as_bytes)))
    }

    pub fn set_master_passphrase(&mut self, uid: &Uid, current: &str, new: &str) -> Result<()> {
        self.with_machine(uid, |machine, mailbox| {
            machine.set_master_passphrase(mailbox, current.as_bytes(), new.as_bytes())
        })
    }

    /// The last confirmed security state of a device.
    pub fn security_state(&self, uid: &Uid) -> Result<SecurityState> {
        self.state.catalog.manageable_device(uid)?;
        self.state
            .machines
            .get(uid)
            .map(SecurityMachine::state)
            .ok_or_else(|| NvmError::DeviceNotManageable(uid.clone()))
    }

    /// True if security state changes on the device are blocked until the next platform reset.
    pub fn is_frozen(&self, uid: &Uid) -> Result<bool> {
        self.state.catalog.manageable_device(uid)?;
        Ok(self.state.machines.get(uid).is_some_and(SecurityMachine::is_frozen))
    }

    /// Re-reads a device's security state from hardware.
    pub fn refresh_security_state(&mut self, uid: &Uid) -> Result<SecurityState> {
        self.with_machine(uid, |machine, mailbox| machine.refresh(mailbox))
    }

    /// Records that the platform was reset. Every device's security state must be refreshed before further use.
    pub fn notify_platform_reset(&mut self) {
        log::info!(target: "nvm_session", "Platform reset");
        for machine in self.state.machines.values_mut() {
            machine.platform_reset();
        }
    }

    /// Sends a raw command that does not alias a validated operation.
    pub fn pass_through(&self, uid: &Uid, opcode: u8, sub_opcode: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.state.catalog.device(uid)?;
        let raw = self.services().pass_through.as_ref().ok_or(NvmError::NotSupported("raw command pass-through"))?;
        RawCommandGate::new(raw.as_ref()).send(uid, opcode, sub_opcode, payload)
    }
}
