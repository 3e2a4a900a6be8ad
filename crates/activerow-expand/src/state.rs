use activerow_core::value::Value;
use std::collections::BTreeMap;

/// Field state of one expander instance: declared properties plus synced
/// host fields, keyed by declared name.
pub type ExpanderState = BTreeMap<&'static str, Value>;

///
/// MixinState
///
/// Per-host-instance composition state: one lazily created expander
/// state per registered expander class, plus the ad-hoc fields created by
/// writes that no expander declared. Owned by the host instance and
/// dropped with it.
///

#[derive(Clone, Debug, Default)]
pub struct MixinState {
    pub(crate) instances: BTreeMap<&'static str, ExpanderState>,
    pub(crate) extras: BTreeMap<String, Value>,
}

impl MixinState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an expander instance has been primed for this host.
    #[must_use]
    pub fn is_primed(&self, expander: &str) -> bool {
        self.instances.contains_key(expander)
    }

    /// The primed state of one expander, if any.
    #[must_use]
    pub fn instance(&self, expander: &str) -> Option<&ExpanderState> {
        self.instances.get(expander)
    }

    /// Ad-hoc fields created on the host by undeclared property writes.
    #[must_use]
    pub const fn extras(&self) -> &BTreeMap<String, Value> {
        &self.extras
    }
}

///
/// Expandable
///
/// Opt-in contract for host instances. A host exposes its own fields by
/// name (for the sync manifest) and owns a `MixinState`. Implementing
/// this trait is the whole opt-in; hosts need no inheritance.
///

pub trait Expandable {
    /// Host type name as registered in the capability registry.
    fn host_type(&self) -> &'static str;

    /// Read one of the host's own fields.
    fn get_field(&self, name: &str) -> Option<Value>;

    /// Write one of the host's own fields; `false` when the host does not
    /// carry that field (the write then lands in the ad-hoc extras).
    fn set_field(&mut self, name: &str, value: Value) -> bool;

    fn mixin_state(&mut self) -> &mut MixinState;

    fn mixin_state_ref(&self) -> &MixinState;
}
