use crate::{
    error::DispatchFault,
    registry::{CapabilityRegistry, seed_state},
    spec::{CallerContext, ExpanderSpec, HostProfile, MethodKind, MethodSpec, Visibility},
    state::Expandable,
};
use activerow_core::{error::Error, value::Value};

///
/// Combinands
///
/// Ordered callables handed to a combinator: one per expander that
/// implements the contract and declares the target method. Invoking one
/// runs the expander's handler with full host state sync, exactly like a
/// direct dispatch.
///

pub struct Combinands<'a> {
    host: &'a mut dyn Expandable,
    items: Vec<(&'static ExpanderSpec, &'static MethodSpec)>,
}

impl Combinands<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Name of the expander providing the callable at `index`.
    #[must_use]
    pub fn provider(&self, index: usize) -> &'static str {
        self.items[index].0.name
    }

    /// Invoke one implementation with the given arguments.
    pub fn invoke(&mut self, index: usize, args: &[Value]) -> Result<Value, Error> {
        let (spec, method) = self.items[index];
        invoke_expander(self.host, spec, method, args)
    }
}

// ----------------------------------------------------------------------
// Instance dispatch
// ----------------------------------------------------------------------

/// Resolve a method call on a host.
///
/// Expander states are primed and host fields synced in; a registered
/// combinator whose contract declares the method folds every implementing
/// expander, otherwise the first expander declaring a visible method in
/// registration order wins. A miss after exhausting every expander is an
/// undefined-method error; a visibility denial is indistinguishable from
/// a miss apart from its error class.
pub fn call(
    registry: &CapabilityRegistry,
    host: &mut dyn Expandable,
    method: &str,
    args: &[Value],
    caller: &CallerContext<'_>,
) -> Result<Value, Error> {
    let host_type = host.host_type();
    let miss = move || DispatchFault::UndefinedMethod {
        host: host_type.to_string(),
        method: method.to_string(),
    };

    let Some((profile, expanders, combinators)) = registry.snapshot(host_type) else {
        return Err(miss().surface(false));
    };
    prime(host, &expanders);
    sync_in(host, &expanders);

    // Combinator path: the first registered combinator whose contract
    // declares this method collects every implementing expander.
    if let Some(combinator) = combinators.iter().find(|c| c.contract.declares(method)) {
        let items: Vec<(&'static ExpanderSpec, &'static MethodSpec)> = expanders
            .iter()
            .filter(|spec| spec.implements(combinator.contract.name))
            .filter_map(|spec| spec.method(method).map(|m| (*spec, m)))
            .collect();
        if !items.is_empty() {
            tracing::debug!(
                host = host_type,
                method,
                combinator = combinator.name,
                providers = items.len(),
                "combining method across expanders"
            );
            let mut combinands = Combinands { host, items };
            return (combinator.combine)(None, &mut combinands, args);
        }
    }

    let mut hidden = false;
    for spec in &expanders {
        let Some(found) = spec.method(method) else {
            continue;
        };
        if !visible(found.visibility, spec, &profile, caller) {
            hidden = true;
            continue;
        }
        tracing::debug!(
            host = host_type,
            method,
            expander = spec.name,
            "dispatching to expander"
        );
        return invoke_expander(host, spec, found, args);
    }

    Err(miss().surface(hidden))
}

/// Resolve a property read: the first expander declaring a visible
/// property wins; ad-hoc host extras answer after the expanders.
pub fn get(
    registry: &CapabilityRegistry,
    host: &mut dyn Expandable,
    property: &str,
    caller: &CallerContext<'_>,
) -> Result<Value, Error> {
    let host_type = host.host_type();
    let miss = move || DispatchFault::UndefinedProperty {
        host: host_type.to_string(),
        property: property.to_string(),
    };

    let Some((profile, expanders, _)) = registry.snapshot(host_type) else {
        if let Some(value) = host.mixin_state_ref().extras.get(property) {
            return Ok(value.clone());
        }
        return Err(miss().surface(false));
    };
    prime(host, &expanders);
    sync_in(host, &expanders);

    let mut hidden = false;
    for spec in &expanders {
        let Some(found) = spec.property(property) else {
            continue;
        };
        if !visible(found.visibility, spec, &profile, caller) {
            hidden = true;
            continue;
        }
        let value = host
            .mixin_state_ref()
            .instances
            .get(spec.name)
            .and_then(|state| state.get(found.name))
            .cloned()
            .unwrap_or(Value::Null);
        return Ok(value);
    }

    if let Some(value) = host.mixin_state_ref().extras.get(property) {
        return Ok(value.clone());
    }

    Err(miss().surface(hidden))
}

/// Resolve a property write: the first expander declaring a visible
/// property receives the value; otherwise the assignment becomes an
/// ad-hoc field on the host.
pub fn set(
    registry: &CapabilityRegistry,
    host: &mut dyn Expandable,
    property: &str,
    value: Value,
    caller: &CallerContext<'_>,
) -> Result<(), Error> {
    let Some((profile, expanders, _)) = registry.snapshot(host.host_type()) else {
        host.mixin_state()
            .extras
            .insert(property.to_string(), value);
        return Ok(());
    };
    prime(host, &expanders);
    sync_in(host, &expanders);

    for spec in &expanders {
        let Some(found) = spec.property(property) else {
            continue;
        };
        if !visible(found.visibility, spec, &profile, caller) {
            continue;
        }
        host.mixin_state()
            .instances
            .get_mut(spec.name)
            .expect("expander state primed")
            .insert(found.name, value);
        return Ok(());
    }

    // Dynamic property creation on the host itself.
    host.mixin_state()
        .extras
        .insert(property.to_string(), value);
    Ok(())
}

// ----------------------------------------------------------------------
// Static dispatch
// ----------------------------------------------------------------------

/// Resolve a static method call for a host type. State sync runs against
/// the per-type static snapshot instead of a live instance.
pub fn call_static(
    registry: &CapabilityRegistry,
    host_type: &str,
    method: &str,
    args: &[Value],
    caller: &CallerContext<'_>,
) -> Result<Value, Error> {
    let miss = || DispatchFault::UndefinedStaticMethod {
        host: host_type.to_string(),
        method: method.to_string(),
    };

    let Some((profile, expanders, _)) = registry.snapshot(host_type) else {
        return Err(miss().surface(false));
    };

    let mut hidden = false;
    for spec in &expanders {
        let Some(found) = spec.method(method) else {
            continue;
        };
        if found.kind != MethodKind::Static {
            continue;
        }
        if !visible(found.visibility, spec, &profile, caller) {
            hidden = true;
            continue;
        }

        // Sync the static snapshot into the expander's static state.
        let mut state = registry
            .with_entry_mut(host_type, |entry| {
                let mut state = entry
                    .static_expander_state
                    .get(spec.name)
                    .cloned()
                    .unwrap_or_else(|| seed_state(spec));
                for field in spec.sync_fields {
                    if let Some(value) = entry.static_fields.get(field) {
                        state.insert(*field, value.clone());
                    }
                }
                state
            })
            .ok_or_else(|| miss().surface(false))?;

        let result = (found.handler)(&mut state, args)?;

        // Copy changes back: expander static state and the host snapshot.
        registry.with_entry_mut(host_type, |entry| {
            for field in spec.sync_fields {
                if let Some(value) = state.get(field)
                    && entry.static_fields.contains_key(field)
                {
                    entry.static_fields.insert(*field, value.clone());
                }
            }
            entry.static_expander_state.insert(spec.name, state);
        });

        return Ok(result);
    }

    Err(miss().surface(hidden))
}

/// Read a property from the first expander declaring it, out of the
/// per-type static state.
pub fn get_static(
    registry: &CapabilityRegistry,
    host_type: &str,
    property: &str,
    caller: &CallerContext<'_>,
) -> Result<Value, Error> {
    let miss = || DispatchFault::UndefinedProperty {
        host: host_type.to_string(),
        property: property.to_string(),
    };

    let Some((profile, expanders, _)) = registry.snapshot(host_type) else {
        return Err(miss().surface(false));
    };

    let mut hidden = false;
    for spec in &expanders {
        let Some(found) = spec.property(property) else {
            continue;
        };
        if !visible(found.visibility, spec, &profile, caller) {
            hidden = true;
            continue;
        }
        let value = registry
            .with_entry_mut(host_type, |entry| {
                entry
                    .static_expander_state
                    .get(spec.name)
                    .and_then(|state| state.get(found.name))
                    .cloned()
            })
            .flatten()
            .unwrap_or(Value::Null);
        return Ok(value);
    }

    Err(miss().surface(hidden))
}

/// Write a property into the first expander declaring it, in the
/// per-type static state.
pub fn set_static(
    registry: &CapabilityRegistry,
    host_type: &str,
    property: &str,
    value: Value,
    caller: &CallerContext<'_>,
) -> Result<(), Error> {
    let miss = || DispatchFault::UndefinedProperty {
        host: host_type.to_string(),
        property: property.to_string(),
    };

    let Some((profile, expanders, _)) = registry.snapshot(host_type) else {
        return Err(miss().surface(false));
    };

    let mut hidden = false;
    for spec in &expanders {
        let Some(found) = spec.property(property) else {
            continue;
        };
        if !visible(found.visibility, spec, &profile, caller) {
            hidden = true;
            continue;
        }
        registry.with_entry_mut(host_type, |entry| {
            entry
                .static_expander_state
                .entry(spec.name)
                .or_insert_with(|| seed_state(spec))
                .insert(found.name, value);
        });
        return Ok(());
    }

    Err(miss().surface(hidden))
}

// ----------------------------------------------------------------------
// Shared mechanics
// ----------------------------------------------------------------------

// Lazily create one state per registered expander on this host instance.
fn prime(host: &mut dyn Expandable, expanders: &[&'static ExpanderSpec]) {
    for spec in expanders {
        if !host.mixin_state_ref().is_primed(spec.name) {
            host.mixin_state().instances.insert(spec.name, seed_state(spec));
        }
    }
}

// Copy manifest host fields into every primed expander state.
fn sync_in(host: &mut dyn Expandable, expanders: &[&'static ExpanderSpec]) {
    for spec in expanders {
        for field in spec.sync_fields {
            if let Some(value) = host.get_field(field) {
                host.mixin_state()
                    .instances
                    .get_mut(spec.name)
                    .expect("expander state primed")
                    .insert(*field, value);
            }
        }
    }
}

// Run one expander method with two-way state sync: the handler mutates a
// working copy of the expander state, which is stored back and its
// manifest fields copied onto matching host fields.
fn invoke_expander(
    host: &mut dyn Expandable,
    spec: &'static ExpanderSpec,
    method: &'static MethodSpec,
    args: &[Value],
) -> Result<Value, Error> {
    let mut state = host
        .mixin_state_ref()
        .instances
        .get(spec.name)
        .cloned()
        .unwrap_or_else(|| seed_state(spec));

    let result = (method.handler)(&mut state, args)?;

    for field in spec.sync_fields {
        if let Some(value) = state.get(field) {
            host.set_field(field, value.clone());
        }
    }
    host.mixin_state().instances.insert(spec.name, state);

    Ok(result)
}

fn visible(
    visibility: Visibility,
    spec: &ExpanderSpec,
    profile: &HostProfile,
    caller: &CallerContext<'_>,
) -> bool {
    match visibility {
        Visibility::Public => true,
        Visibility::Private => caller.class == spec.name,
        Visibility::Protected => {
            caller.within(spec.name, spec.family) || caller.within(profile.name, profile.family)
        }
    }
}
