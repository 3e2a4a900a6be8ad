use crate::{db::session::Session, record::SharedRecord};
use activerow_core::{
    error::{Error, ErrorClass, ErrorOrigin},
    value::Value,
};
use activerow_expand::{
    dispatch,
    registry::CapabilityRegistry,
    spec::CallerContext,
    state::{Expandable, MixinState},
};
use std::rc::Rc;

///
/// CallOutcome
///
/// A dynamic call on a record either hits an expander (a plain value) or
/// falls back to relation navigation (one related record, or the set of
/// records referencing this one).
///

#[derive(Debug)]
pub enum CallOutcome {
    Value(Value),
    Record(Option<SharedRecord>),
    Records(Option<Vec<SharedRecord>>),
}

///
/// ExpandedRecord
///
/// Opt-in wrapper making a record an expandable host. Unknown methods are
/// resolved against the registered expanders first; a plain miss then
/// falls back to navigating the reference graph: a method named like a
/// referenced class loads the one-to-one relation, a pluralized class
/// name loads the one-to-many set.
///

pub struct ExpandedRecord {
    record: SharedRecord,
    mixins: MixinState,
}

impl ExpandedRecord {
    #[must_use]
    pub fn new(record: SharedRecord) -> Self {
        Self {
            record,
            mixins: MixinState::new(),
        }
    }

    #[must_use]
    pub const fn record(&self) -> &SharedRecord {
        &self.record
    }

    /// Resolve a dynamic method: expanders first, then relation
    /// navigation; an access denial never falls through to navigation.
    pub fn call(
        &mut self,
        session: &Session,
        registry: &CapabilityRegistry,
        method: &str,
        args: &[Value],
        caller: &CallerContext<'_>,
    ) -> Result<CallOutcome, Error> {
        match dispatch::call(registry, self, method, args, caller) {
            Ok(value) => Ok(CallOutcome::Value(value)),
            Err(err) if err.is_dispatch_miss() => self.relation_fallback(session, method, err),
            Err(err) => Err(err),
        }
    }

    /// Resolve a dynamic property read against the expanders.
    pub fn get(
        &mut self,
        registry: &CapabilityRegistry,
        property: &str,
        caller: &CallerContext<'_>,
    ) -> Result<Value, Error> {
        dispatch::get(registry, self, property, caller)
    }

    /// Resolve a dynamic property write against the expanders.
    pub fn set(
        &mut self,
        registry: &CapabilityRegistry,
        property: &str,
        value: Value,
        caller: &CallerContext<'_>,
    ) -> Result<(), Error> {
        dispatch::set(registry, self, property, value, caller)
    }

    // Method name as a class: one-to-one through the single referencing
    // column. Pluralized class name: one-to-many from that class back to
    // this record. Anything else re-raises the original miss.
    fn relation_fallback(
        &self,
        session: &Session,
        method: &str,
        original: Error,
    ) -> Result<CallOutcome, Error> {
        let my_class = self.record.borrow().class_name();

        if session.types().contains(method) {
            let columns = self.record.borrow().reference_columns(method);
            return match columns.as_slice() {
                [column] => Ok(CallOutcome::Record(
                    session.one_to_one(&self.record, method, column, None)?,
                )),
                [] => Err(Error::new(
                    ErrorClass::Dispatch,
                    ErrorOrigin::Relation,
                    format!(
                        "method '{method}' does not exist on '{my_class}' and no column references '{method}'"
                    ),
                )),
                _ => Err(Error::new(
                    ErrorClass::Unsupported,
                    ErrorOrigin::Relation,
                    format!(
                        "multiple columns on '{my_class}' reference '{method}'; cannot pick one"
                    ),
                )),
            };
        }

        if let Some(base) = method.strip_suffix('s')
            && session.types().contains(base)
        {
            let far_refs = session.references_of(base)?;
            if let Some(columns) = far_refs.get(my_class) {
                return match columns.as_slice() {
                    [column] => {
                        let pk = self.record.borrow().primary_key();
                        Ok(CallOutcome::Records(session.one_to_many(
                            &self.record,
                            base,
                            &pk,
                            column,
                            None,
                            &[],
                            None,
                        )?))
                    }
                    _ => Err(Error::new(
                        ErrorClass::Unsupported,
                        ErrorOrigin::Relation,
                        format!("multiple columns on '{base}' reference '{my_class}'; cannot pick one"),
                    )),
                };
            }
        }

        Err(original)
    }
}

impl Expandable for ExpandedRecord {
    fn host_type(&self) -> &'static str {
        self.record.borrow().class_name()
    }

    fn get_field(&self, name: &str) -> Option<Value> {
        self.record.borrow().try_get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: Value) -> bool {
        let mut record = self.record.borrow_mut();
        record.has_property(name) && record.set(name, value).is_ok()
    }

    fn mixin_state(&mut self) -> &mut MixinState {
        &mut self.mixins
    }

    fn mixin_state_ref(&self) -> &MixinState {
        &self.mixins
    }
}

// Wrapped and raw handles refer to the same live record.
impl Clone for ExpandedRecord {
    fn clone(&self) -> Self {
        Self {
            record: Rc::clone(&self.record),
            mixins: self.mixins.clone(),
        }
    }
}
