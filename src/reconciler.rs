// src/reconciler.rs

use std::str::FromStr;

use tracing::{debug, error};

use crate::{
    control::{RegistryControl, ServiceControl, StartMode},
    state::StateStore,
    targets::{ManagedRegistryValue, ManagedService},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Apply,
    Restore,
    Audit,
}

/// Outcome buckets for one run, owned by the caller. Each entry is a human
/// label, possibly annotated. Buckets are never shared across runs.
#[derive(Debug, Default)]
pub struct RunReport {
    pub applied: Vec<String>,
    pub restored: Vec<String>,
    pub already: Vec<String>,
    pub audit: Vec<String>,
    pub failed: Vec<String>,
}

/// Drives the per-item compare-and-decide logic over the managed lists.
///
/// Apply mode runs the apply-direction pass and stamps `last_apply`; restore
/// mode runs the restore-direction pass and stamps `last_restore`; audit runs
/// both directions read-only and persists nothing.
pub struct Reconciler<'a> {
    services: &'a dyn ServiceControl,
    registry: &'a dyn RegistryControl,
}

impl<'a> Reconciler<'a> {
    pub fn new(services: &'a dyn ServiceControl, registry: &'a dyn RegistryControl) -> Self {
        Self { services, registry }
    }

    pub fn run(
        &self,
        mode: RunMode,
        service_targets: &[ManagedService],
        registry_targets: &[ManagedRegistryValue],
        store: &mut StateStore,
    ) -> RunReport {
        let mut report = RunReport::default();

        if matches!(mode, RunMode::Apply | RunMode::Audit) {
            for target in service_targets {
                self.apply_service(target, mode, store, &mut report);
            }
            for target in registry_targets {
                self.apply_registry(target, mode, store, &mut report);
            }
            if mode == RunMode::Apply {
                store.stamp_apply();
                persist(store, &mut report);
            }
        }

        if matches!(mode, RunMode::Restore | RunMode::Audit) {
            for target in service_targets {
                self.restore_service(target, mode, store, &mut report);
            }
            for target in registry_targets {
                self.restore_registry(target, mode, store, &mut report);
            }
            if mode == RunMode::Restore {
                store.stamp_restore();
                persist(store, &mut report);
            }
        }

        report
    }

    fn apply_service(
        &self,
        target: &ManagedService,
        mode: RunMode,
        store: &mut StateStore,
        report: &mut RunReport,
    ) {
        let current = match self.services.query_start_mode(target.id) {
            Ok(Some(mode)) => mode,
            Ok(None) => {
                debug!("Service '{}' not present; nothing to disable.", target.id);
                report
                    .already
                    .push(format!("{} (service not present)", target.label));
                return;
            }
            Err(e) => {
                error!("Failed to query service '{}': {}", target.id, e);
                report
                    .failed
                    .push(format!("{} (unable to query)", target.label));
                return;
            }
        };

        if current == StartMode::Disabled {
            report.already.push(target.label.to_string());
            return;
        }

        if mode == RunMode::Audit {
            report.audit.push(target.label.to_string());
            return;
        }

        // Capture the pre-tool start mode before touching anything; a repeat
        // apply must not overwrite the first capture.
        store.record_service_original(target.id, target.label, current);

        // Stopping is best-effort. A service that refuses to stop can still
        // have its start mode disabled.
        if let Err(e) = self.services.stop(target.id) {
            debug!("Ignoring stop failure for service '{}': {}", target.id, e);
        }

        match self.services.set_start_mode(target.id, StartMode::Disabled) {
            Ok(()) => {
                debug!("Disabled service '{}' (was {}).", target.id, current);
                report.applied.push(target.label.to_string());
            }
            Err(e) => {
                error!("Failed to disable service '{}': {}", target.id, e);
                report.failed.push(target.label.to_string());
            }
        }
    }

    fn restore_service(
        &self,
        target: &ManagedService,
        mode: RunMode,
        store: &StateStore,
        report: &mut RunReport,
    ) {
        let probe = self.services.query_start_mode(target.id);

        if let Ok(None) = probe {
            report
                .already
                .push(format!("{} (service not present)", target.label));
            return;
        }

        let Some(entry) = store.service_original(target.id) else {
            // Restore is driven purely by our own captures; a service we
            // never changed is left alone no matter its current mode.
            report
                .already
                .push(format!("{} (not changed by this tool)", target.label));
            return;
        };

        let original = match StartMode::from_str(&entry.original_start_type) {
            Ok(mode) if mode.is_restorable() => mode,
            _ => {
                error!(
                    "Captured start type '{}' for service '{}' is not restorable.",
                    entry.original_start_type, target.id
                );
                report
                    .failed
                    .push(format!("{} (unknown original state)", target.label));
                return;
            }
        };

        let current = match probe {
            Ok(Some(mode)) => mode,
            Ok(None) => unreachable!("absent handled above"),
            Err(e) => {
                error!("Failed to query service '{}': {}", target.id, e);
                report
                    .failed
                    .push(format!("{} (unable to query)", target.label));
                return;
            }
        };

        if current == original {
            report.already.push(target.label.to_string());
            return;
        }

        if mode == RunMode::Audit {
            report
                .audit
                .push(format!("{} (would restore to {})", target.label, original));
            return;
        }

        match self.services.set_start_mode(target.id, original) {
            Ok(()) => {
                debug!("Restored service '{}' to {}.", target.id, original);
                report.restored.push(target.label.to_string());
            }
            Err(e) => {
                error!("Failed to restore service '{}': {}", target.id, e);
                report.failed.push(target.label.to_string());
            }
        }
    }

    fn apply_registry(
        &self,
        target: &ManagedRegistryValue,
        mode: RunMode,
        store: &mut StateStore,
        report: &mut RunReport,
    ) {
        let current = match self.registry.query_value(target.path, target.name) {
            Ok(current) => current,
            Err(e) => {
                error!(
                    "Failed to query registry value '{}' in '{}': {}",
                    target.name, target.path, e
                );
                report
                    .failed
                    .push(format!("{} (unable to query)", target.label));
                return;
            }
        };

        if let Some(snapshot) = &current {
            if snapshot.matches_desired(&target.desired) {
                report.already.push(target.label.to_string());
                return;
            }
        }

        if mode == RunMode::Audit {
            report.audit.push(target.label.to_string());
            return;
        }

        // `current` may be None here: recording the absence is what lets
        // restore delete the value instead of inventing a default.
        store.record_registry_original(target.path, target.name, target.label, current);

        match self
            .registry
            .set_value(target.path, target.name, &target.desired)
        {
            Ok(()) => {
                debug!(
                    "Set '{}' in '{}' to {}.",
                    target.name, target.path, target.desired
                );
                report.applied.push(target.label.to_string());
            }
            Err(e) => {
                error!(
                    "Failed to set '{}' in '{}': {}",
                    target.name, target.path, e
                );
                report.failed.push(target.label.to_string());
            }
        }
    }

    fn restore_registry(
        &self,
        target: &ManagedRegistryValue,
        mode: RunMode,
        store: &StateStore,
        report: &mut RunReport,
    ) {
        let key = target.state_key();
        let Some(entry) = store.registry_original(&key) else {
            report
                .already
                .push(format!("{} (not changed by this tool)", target.label));
            return;
        };

        let current = match self.registry.query_value(&entry.path, &entry.name) {
            Ok(current) => current,
            Err(e) => {
                error!(
                    "Failed to query registry value '{}' in '{}': {}",
                    entry.name, entry.path, e
                );
                report
                    .failed
                    .push(format!("{} (unable to query)", target.label));
                return;
            }
        };

        let Some(original) = &entry.original else {
            // The value did not exist before we created it; restoring means
            // deleting it again.
            if current.is_none() {
                report.already.push(target.label.to_string());
                return;
            }
            if mode == RunMode::Audit {
                report
                    .audit
                    .push(format!("{} (would delete)", target.label));
                return;
            }
            match self.registry.delete_value(&entry.path, &entry.name) {
                Ok(()) => {
                    debug!("Deleted '{}' in '{}'.", entry.name, entry.path);
                    report.restored.push(target.label.to_string());
                }
                Err(e) => {
                    error!(
                        "Failed to delete '{}' in '{}': {}",
                        entry.name, entry.path, e
                    );
                    report.failed.push(target.label.to_string());
                }
            }
            return;
        };

        if let Some(snapshot) = &current {
            if snapshot.same_value(original) {
                report.already.push(target.label.to_string());
                return;
            }
        }

        if mode == RunMode::Audit {
            report
                .audit
                .push(format!("{} (would restore)", target.label));
            return;
        }

        let Some(value) = original.to_value() else {
            error!(
                "Captured original for '{}' in '{}' is not writable: {:?}",
                entry.name, entry.path, original
            );
            report
                .failed
                .push(format!("{} (unknown original state)", target.label));
            return;
        };

        match self.registry.set_value(&entry.path, &entry.name, &value) {
            Ok(()) => {
                debug!("Restored '{}' in '{}' to {}.", entry.name, entry.path, value);
                report.restored.push(target.label.to_string());
            }
            Err(e) => {
                error!(
                    "Failed to restore '{}' in '{}': {}",
                    entry.name, entry.path, e
                );
                report.failed.push(target.label.to_string());
            }
        }
    }
}

/// A save failure never invalidates the in-memory report; it is surfaced as
/// its own failed line instead.
fn persist(store: &StateStore, report: &mut RunReport) {
    if let Err(e) = store.save() {
        error!("Failed to save state file {:?}: {:?}", store.path(), e);
        report.failed.push("state file (unable to save)".to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        collections::{HashMap, HashSet},
    };

    use tempfile::TempDir;

    use super::*;
    use crate::{
        control::{RegistryKeyValue, RegistryValueSnapshot},
        errors::{RegistryControlError, ServiceControlError},
    };

    #[derive(Default)]
    struct FakeServices {
        modes: RefCell<HashMap<String, StartMode>>,
        fail_query: HashSet<String>,
        fail_set: HashSet<String>,
        fail_stop: HashSet<String>,
        stops: RefCell<Vec<String>>,
        mutations: RefCell<usize>,
    }

    impl FakeServices {
        fn with(entries: &[(&str, StartMode)]) -> Self {
            let fake = Self::default();
            for (name, mode) in entries {
                fake.modes.borrow_mut().insert(name.to_string(), *mode);
            }
            fake
        }

        fn mode_of(&self, name: &str) -> Option<StartMode> {
            self.modes.borrow().get(name).copied()
        }
    }

    impl ServiceControl for FakeServices {
        fn query_start_mode(
            &self,
            service: &str,
        ) -> Result<Option<StartMode>, ServiceControlError> {
            if self.fail_query.contains(service) {
                return Err(ServiceControlError::QueryError(
                    service.to_string(),
                    "injected".to_string(),
                ));
            }
            Ok(self.modes.borrow().get(service).copied())
        }

        fn set_start_mode(
            &self,
            service: &str,
            mode: StartMode,
        ) -> Result<(), ServiceControlError> {
            if self.fail_set.contains(service) {
                return Err(ServiceControlError::ConfigureError(
                    service.to_string(),
                    "injected".to_string(),
                ));
            }
            *self.mutations.borrow_mut() += 1;
            self.modes.borrow_mut().insert(service.to_string(), mode);
            Ok(())
        }

        fn stop(&self, service: &str) -> Result<(), ServiceControlError> {
            self.stops.borrow_mut().push(service.to_string());
            if self.fail_stop.contains(service) {
                return Err(ServiceControlError::StopError(
                    service.to_string(),
                    "injected".to_string(),
                ));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRegistry {
        values: RefCell<HashMap<(String, String), RegistryValueSnapshot>>,
        fail_query: HashSet<String>,
        mutations: RefCell<usize>,
    }

    impl FakeRegistry {
        fn with(entries: &[(&str, &str, &str, &str)]) -> Self {
            let fake = Self::default();
            for (path, name, vtype, raw) in entries {
                fake.values.borrow_mut().insert(
                    (path.to_string(), name.to_string()),
                    RegistryValueSnapshot {
                        value_type: vtype.to_string(),
                        raw: raw.to_string(),
                    },
                );
            }
            fake
        }

        fn value_of(&self, path: &str, name: &str) -> Option<RegistryValueSnapshot> {
            self.values
                .borrow()
                .get(&(path.to_string(), name.to_string()))
                .cloned()
        }
    }

    impl RegistryControl for FakeRegistry {
        fn query_value(
            &self,
            path: &str,
            name: &str,
        ) -> Result<Option<RegistryValueSnapshot>, RegistryControlError> {
            if self.fail_query.contains(name) {
                return Err(RegistryControlError::ReadValueError("injected".to_string()));
            }
            Ok(self.value_of(path, name))
        }

        fn set_value(
            &self,
            path: &str,
            name: &str,
            value: &RegistryKeyValue,
        ) -> Result<(), RegistryControlError> {
            *self.mutations.borrow_mut() += 1;
            self.values
                .borrow_mut()
                .insert((path.to_string(), name.to_string()), value.to_snapshot());
            Ok(())
        }

        fn delete_value(&self, path: &str, name: &str) -> Result<(), RegistryControlError> {
            *self.mutations.borrow_mut() += 1;
            self.values
                .borrow_mut()
                .remove(&(path.to_string(), name.to_string()));
            Ok(())
        }
    }

    fn maps_broker() -> ManagedService {
        ManagedService {
            id: "MapsBroker",
            label: "Offline maps service",
        }
    }

    fn fax() -> ManagedService {
        ManagedService {
            id: "Fax",
            label: "Fax service",
        }
    }

    fn consumer_features() -> ManagedRegistryValue {
        ManagedRegistryValue {
            path: "HKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Windows\\CloudContent",
            name: "DisableWindowsConsumerFeatures",
            desired: RegistryKeyValue::Dword(1),
            label: "Consumer Experience",
        }
    }

    fn game_mode() -> ManagedRegistryValue {
        ManagedRegistryValue {
            path: "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            name: "AllowAutoGameMode",
            desired: RegistryKeyValue::Dword(0),
            label: "Xbox Game Bar",
        }
    }

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::load(dir.path().join("state.json"))
    }

    #[test]
    fn apply_disables_service_and_captures_original() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[("MapsBroker", StartMode::DemandStart)]);
        let registry = FakeRegistry::default();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(report.applied, vec!["Offline maps service"]);
        assert!(report.failed.is_empty());
        assert_eq!(services.mode_of("MapsBroker"), Some(StartMode::Disabled));
        assert_eq!(services.stops.borrow().as_slice(), ["MapsBroker"]);
        assert_eq!(
            store
                .service_original("MapsBroker")
                .unwrap()
                .original_start_type,
            "DEMAND_START"
        );
        assert!(store.state.last_apply.is_some());
    }

    #[test]
    fn apply_twice_leaves_everything_already_and_original_intact() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[("MapsBroker", StartMode::AutoStart)]);
        let registry = FakeRegistry::default();
        let reconciler = Reconciler::new(&services, &registry);

        let first = reconciler.run(
            RunMode::Apply,
            &[maps_broker()],
            &[consumer_features()],
            &mut store,
        );
        assert_eq!(first.applied.len(), 2);

        let second = reconciler.run(
            RunMode::Apply,
            &[maps_broker()],
            &[consumer_features()],
            &mut store,
        );
        assert!(second.applied.is_empty());
        assert_eq!(
            second.already,
            vec!["Offline maps service", "Consumer Experience"]
        );

        // First observed original wins: the second run saw DISABLED but the
        // capture still says AUTO_START, and the absent registry original is
        // still recorded as absent.
        assert_eq!(
            store
                .service_original("MapsBroker")
                .unwrap()
                .original_start_type,
            "AUTO_START"
        );
        assert!(store
            .registry_original(&consumer_features().state_key())
            .unwrap()
            .original
            .is_none());
    }

    #[test]
    fn apply_and_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[
            ("MapsBroker", StartMode::DemandStart),
            ("WerSvc", StartMode::AutoStart),
        ]);
        let registry = FakeRegistry::with(&[(
            "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            "AllowAutoGameMode",
            "REG_DWORD",
            "0x1",
        )]);
        let wersvc = ManagedService {
            id: "WerSvc",
            label: "Error reporting",
        };
        let svc_targets = [maps_broker(), wersvc];
        let reg_targets = [game_mode(), consumer_features()];
        let reconciler = Reconciler::new(&services, &registry);

        reconciler.run(RunMode::Apply, &svc_targets, &reg_targets, &mut store);
        assert_eq!(services.mode_of("MapsBroker"), Some(StartMode::Disabled));
        assert_eq!(services.mode_of("WerSvc"), Some(StartMode::Disabled));

        let restore = reconciler.run(RunMode::Restore, &svc_targets, &reg_targets, &mut store);
        assert_eq!(
            restore.restored,
            vec![
                "Offline maps service",
                "Error reporting",
                "Xbox Game Bar",
                "Consumer Experience"
            ]
        );

        // Every touched item is back at its pre-apply observed state.
        assert_eq!(services.mode_of("MapsBroker"), Some(StartMode::DemandStart));
        assert_eq!(services.mode_of("WerSvc"), Some(StartMode::AutoStart));
        let game_bar = registry
            .value_of(
                "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
                "AllowAutoGameMode",
            )
            .unwrap();
        assert_eq!(game_bar.as_dword(), Some(1));
        assert!(registry
            .value_of(
                "HKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Windows\\CloudContent",
                "DisableWindowsConsumerFeatures",
            )
            .is_none());
        assert!(store.state.last_restore.is_some());

        let again = reconciler.run(RunMode::Restore, &svc_targets, &reg_targets, &mut store);
        assert!(again.restored.is_empty());
        assert_eq!(again.already.len(), 4);
    }

    #[test]
    fn absent_service_is_reported_and_never_recorded() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        let registry = FakeRegistry::default();

        let report =
            Reconciler::new(&services, &registry).run(RunMode::Apply, &[fax()], &[], &mut store);

        assert_eq!(report.already, vec!["Fax service (service not present)"]);
        assert!(store.state.services.is_empty());
    }

    #[test]
    fn query_error_fails_only_that_item() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let mut services = FakeServices::with(&[("MapsBroker", StartMode::DemandStart)]);
        services.fail_query.insert("WerSvc".to_string());
        let registry = FakeRegistry::default();
        let wersvc = ManagedService {
            id: "WerSvc",
            label: "Error reporting",
        };

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[wersvc, maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(report.failed, vec!["Error reporting (unable to query)"]);
        // The failure did not stop the pass: the next item was still applied.
        assert_eq!(report.applied, vec!["Offline maps service"]);
    }

    #[test]
    fn registry_query_error_fails_only_that_item() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        let mut registry = FakeRegistry::default();
        registry
            .fail_query
            .insert("AllowAutoGameMode".to_string());

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[],
            &[game_mode(), consumer_features()],
            &mut store,
        );

        assert_eq!(report.failed, vec!["Xbox Game Bar (unable to query)"]);
        assert_eq!(report.applied, vec!["Consumer Experience"]);
        // The failed item was never captured.
        assert!(store.registry_original(&game_mode().state_key()).is_none());
    }

    #[test]
    fn already_disabled_service_is_not_recaptured() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[("MapsBroker", StartMode::Disabled)]);
        let registry = FakeRegistry::default();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(report.already, vec!["Offline maps service"]);
        assert!(store.state.services.is_empty());
        assert_eq!(*services.mutations.borrow(), 0);
    }

    #[test]
    fn stop_failure_does_not_block_disabling() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let mut services = FakeServices::with(&[("MapsBroker", StartMode::AutoStart)]);
        services.fail_stop.insert("MapsBroker".to_string());
        let registry = FakeRegistry::default();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(report.applied, vec!["Offline maps service"]);
        assert!(report.failed.is_empty());
        assert_eq!(services.mode_of("MapsBroker"), Some(StartMode::Disabled));
    }

    #[test]
    fn failed_disable_is_bucketed_failed() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let mut services = FakeServices::with(&[("MapsBroker", StartMode::AutoStart)]);
        services.fail_set.insert("MapsBroker".to_string());
        let registry = FakeRegistry::default();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(report.failed, vec!["Offline maps service"]);
        assert!(report.applied.is_empty());
    }

    #[test]
    fn dword_hex_text_counts_as_compliant() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        // reg query renders DWORD data as hex; desired is the integer 0.
        let registry = FakeRegistry::with(&[(
            "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            "AllowAutoGameMode",
            "REG_DWORD",
            "0x0",
        )]);

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[],
            &[game_mode()],
            &mut store,
        );

        assert_eq!(report.already, vec!["Xbox Game Bar"]);
        assert_eq!(*registry.mutations.borrow(), 0);
        assert!(store.state.registry.is_empty());
    }

    #[test]
    fn absent_registry_value_is_created_then_deleted_on_restore() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        let registry = FakeRegistry::default();
        let target = consumer_features();
        let reconciler = Reconciler::new(&services, &registry);

        let apply = reconciler.run(RunMode::Apply, &[], &[target.clone()], &mut store);
        assert_eq!(apply.applied, vec!["Consumer Experience"]);
        assert_eq!(
            registry
                .value_of(target.path, target.name)
                .unwrap()
                .as_dword(),
            Some(1)
        );
        assert!(store
            .registry_original(&target.state_key())
            .unwrap()
            .original
            .is_none());

        let restore = reconciler.run(RunMode::Restore, &[], &[target.clone()], &mut store);
        assert_eq!(restore.restored, vec!["Consumer Experience"]);
        assert!(registry.value_of(target.path, target.name).is_none());
    }

    #[test]
    fn restore_never_touches_untracked_items() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[("MapsBroker", StartMode::Disabled)]);
        let registry = FakeRegistry::with(&[(
            "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            "AllowAutoGameMode",
            "REG_DWORD",
            "0x0",
        )]);

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Restore,
            &[maps_broker()],
            &[game_mode()],
            &mut store,
        );

        assert_eq!(
            report.already,
            vec![
                "Offline maps service (not changed by this tool)",
                "Xbox Game Bar (not changed by this tool)"
            ]
        );
        assert_eq!(*services.mutations.borrow(), 0);
        assert_eq!(*registry.mutations.borrow(), 0);
    }

    #[test]
    fn unrecognized_captured_token_fails_instead_of_guessing() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::with(&[("MapsBroker", StartMode::Disabled)]);
        let registry = FakeRegistry::default();

        // Simulate a record written by something else entirely.
        store.record_service_original("MapsBroker", "Offline maps service", StartMode::BootStart);

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Restore,
            &[maps_broker()],
            &[],
            &mut store,
        );

        assert_eq!(
            report.failed,
            vec!["Offline maps service (unknown original state)"]
        );
        assert_eq!(*services.mutations.borrow(), 0);
    }

    #[test]
    fn malformed_dword_original_fails_restore() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        let registry = FakeRegistry::with(&[(
            "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            "AllowAutoGameMode",
            "REG_DWORD",
            "0x1",
        )]);
        let target = game_mode();
        store.record_registry_original(
            target.path,
            target.name,
            target.label,
            Some(RegistryValueSnapshot {
                value_type: "REG_DWORD".to_string(),
                raw: "not-a-number".to_string(),
            }),
        );

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Restore,
            &[],
            &[target],
            &mut store,
        );

        assert_eq!(report.failed, vec!["Xbox Game Bar (unknown original state)"]);
        assert_eq!(*registry.mutations.borrow(), 0);
    }

    #[test]
    fn audit_reports_both_directions_without_mutating_anything() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("state.json");
        let mut store = StateStore::load(&state_path);

        // One service still waiting to be applied, one registry value we
        // changed earlier and could restore.
        let services = FakeServices::with(&[("MapsBroker", StartMode::DemandStart)]);
        let registry = FakeRegistry::with(&[(
            "HKEY_CURRENT_USER\\Software\\Microsoft\\GameBar",
            "AllowAutoGameMode",
            "REG_DWORD",
            "0x0",
        )]);
        let target = game_mode();
        store.record_registry_original(
            target.path,
            target.name,
            target.label,
            Some(RegistryValueSnapshot {
                value_type: "REG_DWORD".to_string(),
                raw: "0x1".to_string(),
            }),
        );
        let services_before = store.state.services.clone();
        let registry_before = store.state.registry.clone();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Audit,
            &[maps_broker()],
            &[target],
            &mut store,
        );

        assert!(report
            .audit
            .contains(&"Offline maps service".to_string()));
        assert!(report
            .audit
            .contains(&"Xbox Game Bar (would restore)".to_string()));
        assert!(report.applied.is_empty());
        assert!(report.restored.is_empty());

        // Audit purity: no mutations, no new captures, no state file.
        assert_eq!(*services.mutations.borrow(), 0);
        assert_eq!(*registry.mutations.borrow(), 0);
        assert!(services.stops.borrow().is_empty());
        assert_eq!(store.state.services, services_before);
        assert_eq!(store.state.registry, registry_before);
        assert!(store.state.last_apply.is_none());
        assert!(store.state.last_restore.is_none());
        assert!(!state_path.exists());
    }

    #[test]
    fn audit_reports_would_delete_for_absent_original() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let services = FakeServices::default();
        let registry = FakeRegistry::with(&[(
            "HKEY_LOCAL_MACHINE\\SOFTWARE\\Policies\\Microsoft\\Windows\\CloudContent",
            "DisableWindowsConsumerFeatures",
            "REG_DWORD",
            "0x1",
        )]);
        let target = consumer_features();
        store.record_registry_original(target.path, target.name, target.label, None);

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Audit,
            &[],
            &[target.clone()],
            &mut store,
        );

        // Apply direction sees the desired value in place; restore direction
        // reports the pending delete.
        assert_eq!(report.already, vec!["Consumer Experience"]);
        assert_eq!(report.audit, vec!["Consumer Experience (would delete)"]);
        assert!(registry
            .value_of(target.path, target.name)
            .is_some());
    }

    #[test]
    fn save_failure_is_reported_but_not_fatal() {
        let dir = TempDir::new().unwrap();
        // Parent "directory" is a plain file, so create_dir_all must fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let mut store = StateStore::load(blocker.join("state.json"));

        let services = FakeServices::with(&[("MapsBroker", StartMode::DemandStart)]);
        let registry = FakeRegistry::default();

        let report = Reconciler::new(&services, &registry).run(
            RunMode::Apply,
            &[maps_broker()],
            &[],
            &mut store,
        );

        // The item itself still applied; only the save is reported failed.
        assert_eq!(report.applied, vec!["Offline maps service"]);
        assert_eq!(report.failed, vec!["state file (unable to save)"]);
    }
}
