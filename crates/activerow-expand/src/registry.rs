use crate::{
    error::CapabilityError,
    spec::{CombinatorSpec, ExpanderSpec, HostProfile},
    state::ExpanderState,
};
use activerow_core::{error::Error, value::Value};
use std::{cell::RefCell, collections::BTreeMap};

///
/// HostEntry
///

pub(crate) struct HostEntry {
    pub(crate) profile: HostProfile,
    pub(crate) expanders: Vec<&'static ExpanderSpec>,
    pub(crate) combinators: Vec<&'static CombinatorSpec>,
    /// Per-type snapshot of the host's class-level fields; static dispatch
    /// syncs against this instead of a live instance.
    pub(crate) static_fields: BTreeMap<&'static str, Value>,
    /// Per-type static state of each registered expander.
    pub(crate) static_expander_state: BTreeMap<&'static str, ExpanderState>,
}

///
/// CapabilityRegistry
///
/// Process-wide map of host type -> ordered expander registrations.
/// Registration is fallible and conflict-checked; dispatch reads the
/// tables in registration order. Tests construct a fresh registry per
/// case; there is no hidden global.
///

#[derive(Default)]
pub struct CapabilityRegistry {
    hosts: RefCell<BTreeMap<&'static str, HostEntry>>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a host type and its member manifest. The static snapshot
    /// is seeded with nulls for every declared static field.
    pub fn register_host(&self, profile: HostProfile) -> Result<(), Error> {
        let mut hosts = self.hosts.borrow_mut();
        if hosts.contains_key(profile.name) {
            return Err(CapabilityError::HostAlreadyRegistered(profile.name.to_string()).into());
        }
        let static_fields = profile
            .statics
            .iter()
            .map(|name| (*name, Value::Null))
            .collect();
        hosts.insert(
            profile.name,
            HostEntry {
                profile,
                expanders: Vec::new(),
                combinators: Vec::new(),
                static_fields,
                static_expander_state: BTreeMap::new(),
            },
        );
        Ok(())
    }

    /// Register an expander on a host.
    ///
    /// The spec is structurally validated, then its method and property
    /// names are checked against the host's own members and every
    /// already-registered expander; any overlap fails with the conflicting
    /// names and leaves the registry unchanged. Re-registering the same
    /// expander is an idempotent no-op.
    pub fn register_expander(
        &self,
        host: &str,
        spec: &'static ExpanderSpec,
    ) -> Result<(), Error> {
        let mut hosts = self.hosts.borrow_mut();
        let entry = hosts
            .get_mut(host)
            .ok_or_else(|| CapabilityError::HostNotRegistered(host.to_string()))?;

        if entry.expanders.iter().any(|e| e.name == spec.name) {
            tracing::debug!(host, expander = spec.name, "expander already registered");
            return Ok(());
        }

        spec.validate()?;

        // Contract-declared members shared by both sides are combinable,
        // not conflicting; everything else collides fatally.
        let mut conflicts: Vec<&'static str> = Vec::new();
        for member in spec.member_names() {
            if entry.profile.declares_member(member) {
                conflicts.push(member);
                continue;
            }
            if entry.expanders.iter().any(|registered| {
                registered.member_names().contains(&member)
                    && !spec.shares_contract_member(registered, member)
            }) {
                conflicts.push(member);
            }
        }
        if !conflicts.is_empty() {
            return Err(CapabilityError::MemberConflict {
                host: host.to_string(),
                expander: spec.name,
                members: conflicts.join(", "),
            }
            .into());
        }

        entry
            .static_expander_state
            .insert(spec.name, seed_state(spec));
        entry.expanders.push(spec);
        Ok(())
    }

    /// Register a combinator for a contract on a host. The first
    /// registered combinator whose contract declares a method wins at
    /// dispatch time.
    pub fn register_combinator(
        &self,
        host: &str,
        combinator: &'static CombinatorSpec,
    ) -> Result<(), Error> {
        if combinator.contract.methods.is_empty() {
            return Err(CapabilityError::EmptyContract {
                combinator: combinator.name,
                contract: combinator.contract.name,
            }
            .into());
        }
        let mut hosts = self.hosts.borrow_mut();
        let entry = hosts
            .get_mut(host)
            .ok_or_else(|| CapabilityError::HostNotRegistered(host.to_string()))?;
        entry.combinators.push(combinator);
        Ok(())
    }

    /// Names of the expanders registered on a host, in order.
    #[must_use]
    pub fn registered(&self, host: &str) -> Vec<&'static str> {
        self.hosts
            .borrow()
            .get(host)
            .map(|entry| entry.expanders.iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    /// Read one field of a host type's static snapshot.
    #[must_use]
    pub fn host_static(&self, host: &str, field: &str) -> Option<Value> {
        self.hosts
            .borrow()
            .get(host)
            .and_then(|entry| entry.static_fields.get(field).cloned())
    }

    /// Write one field of a host type's static snapshot; fails for
    /// undeclared fields.
    pub fn set_host_static(&self, host: &str, field: &str, value: Value) -> Result<(), Error> {
        let mut hosts = self.hosts.borrow_mut();
        let entry = hosts
            .get_mut(host)
            .ok_or_else(|| CapabilityError::HostNotRegistered(host.to_string()))?;
        let Some((key, _)) = entry.static_fields.get_key_value(field) else {
            return Err(CapabilityError::MalformedSpec {
                expander: entry.profile.name,
                detail: format!("'{field}' is not a declared static field"),
            }
            .into());
        };
        let key = *key;
        entry.static_fields.insert(key, value);
        Ok(())
    }

    // Snapshot the cheap, 'static parts of a host entry for dispatch.
    pub(crate) fn snapshot(
        &self,
        host: &str,
    ) -> Option<(
        HostProfile,
        Vec<&'static ExpanderSpec>,
        Vec<&'static CombinatorSpec>,
    )> {
        self.hosts.borrow().get(host).map(|entry| {
            (
                entry.profile,
                entry.expanders.clone(),
                entry.combinators.clone(),
            )
        })
    }

    // Access the mutable static state for static dispatch.
    pub(crate) fn with_entry_mut<R>(
        &self,
        host: &str,
        f: impl FnOnce(&mut HostEntry) -> R,
    ) -> Option<R> {
        self.hosts.borrow_mut().get_mut(host).map(f)
    }
}

/// Seed an expander state from its declared property defaults.
pub(crate) fn seed_state(spec: &'static ExpanderSpec) -> ExpanderState {
    spec.properties
        .iter()
        .map(|p| (p.name, (p.default)()))
        .collect()
}
