use crate::{error::CapabilityError, state::ExpanderState};
use activerow_core::{error::Error, value::Value};
use std::collections::BTreeSet;

/// Method implementation bound to an expander: it sees the expander's own
/// field state (already primed with synced host fields) and the call
/// arguments.
pub type Handler = fn(&mut ExpanderState, &[Value]) -> Result<Value, Error>;

/// Default initializer for a declared property.
pub fn null_default() -> Value {
    Value::Null
}

///
/// Visibility
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Public,
    /// Reachable only from the declaring expander class itself.
    Private,
    /// Reachable from the declaring hierarchy or the host hierarchy.
    Protected,
}

///
/// MethodKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MethodKind {
    Instance,
    Static,
}

///
/// MethodSpec
///

#[derive(Clone, Copy, Debug)]
pub struct MethodSpec {
    pub name: &'static str,
    pub visibility: Visibility,
    pub kind: MethodKind,
    pub handler: Handler,
}

impl MethodSpec {
    #[must_use]
    pub const fn public(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            visibility: Visibility::Public,
            kind: MethodKind::Instance,
            handler,
        }
    }

    #[must_use]
    pub const fn protected(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            visibility: Visibility::Protected,
            kind: MethodKind::Instance,
            handler,
        }
    }

    #[must_use]
    pub const fn private(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            visibility: Visibility::Private,
            kind: MethodKind::Instance,
            handler,
        }
    }

    #[must_use]
    pub const fn public_static(name: &'static str, handler: Handler) -> Self {
        Self {
            name,
            visibility: Visibility::Public,
            kind: MethodKind::Static,
            handler,
        }
    }
}

///
/// PropertySpec
///

#[derive(Clone, Copy, Debug)]
pub struct PropertySpec {
    pub name: &'static str,
    pub visibility: Visibility,
    pub default: fn() -> Value,
}

impl PropertySpec {
    #[must_use]
    pub const fn public(name: &'static str) -> Self {
        Self {
            name,
            visibility: Visibility::Public,
            default: null_default,
        }
    }

    #[must_use]
    pub const fn with_default(name: &'static str, default: fn() -> Value) -> Self {
        Self {
            name,
            visibility: Visibility::Public,
            default,
        }
    }

    #[must_use]
    pub const fn protected(name: &'static str) -> Self {
        Self {
            name,
            visibility: Visibility::Protected,
            default: null_default,
        }
    }
}

///
/// ExpanderSpec
///
/// The declared capability table of one expander class: its methods and
/// properties, the contracts it implements, its class family (used by
/// protected visibility), and the explicit manifest of host fields it may
/// read and write. Satisfying this type IS the expander contract; there
/// is no separate polymorphic tag.
///

#[derive(Debug)]
pub struct ExpanderSpec {
    pub name: &'static str,
    pub family: &'static [&'static str],
    pub contracts: &'static [&'static ContractSpec],
    pub methods: &'static [MethodSpec],
    pub properties: &'static [PropertySpec],
    pub sync_fields: &'static [&'static str],
}

impl ExpanderSpec {
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&'static MethodSpec> {
        self.methods.iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&'static PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn implements(&self, contract: &str) -> bool {
        self.contracts.iter().any(|c| c.name == contract)
    }

    /// Whether a member name is declared by a contract both this expander
    /// and `other` implement. Such members are combinable rather than
    /// conflicting; everything else keeps the strict no-conflict rule.
    #[must_use]
    pub fn shares_contract_member(&self, other: &Self, member: &str) -> bool {
        self.contracts
            .iter()
            .any(|c| c.declares(member) && other.implements(c.name))
    }

    /// Every method and property name this expander contributes.
    #[must_use]
    pub fn member_names(&self) -> Vec<&'static str> {
        self.methods
            .iter()
            .map(|m| m.name)
            .chain(self.properties.iter().map(|p| p.name))
            .collect()
    }

    // A spec must not declare one member name twice.
    pub(crate) fn validate(&self) -> Result<(), CapabilityError> {
        let mut seen = BTreeSet::new();
        for name in self.member_names() {
            if !seen.insert(name) {
                return Err(CapabilityError::MalformedSpec {
                    expander: self.name,
                    detail: format!("member '{name}' is declared more than once"),
                });
            }
        }
        Ok(())
    }
}

///
/// HostProfile
///
/// Declared member manifest of a host type: the explicit stand-in for
/// reflection. Registration uses it to detect member collisions; the
/// family list feeds protected-visibility checks; `statics` names the
/// class-level fields mirrored into the per-type static snapshot.
///

#[derive(Clone, Copy, Debug)]
pub struct HostProfile {
    pub name: &'static str,
    pub family: &'static [&'static str],
    pub methods: &'static [&'static str],
    pub properties: &'static [&'static str],
    pub statics: &'static [&'static str],
}

impl HostProfile {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            family: &[],
            methods: &[],
            properties: &[],
            statics: &[],
        }
    }

    #[must_use]
    pub fn declares_member(&self, name: &str) -> bool {
        self.methods.iter().any(|m| *m == name) || self.properties.iter().any(|p| *p == name)
    }
}

///
/// ContractSpec
/// A shared capability interface: a name and the methods it declares.
///

#[derive(Debug)]
pub struct ContractSpec {
    pub name: &'static str,
    pub methods: &'static [&'static str],
}

impl ContractSpec {
    #[must_use]
    pub fn declares(&self, method: &str) -> bool {
        self.methods.iter().any(|m| *m == method)
    }
}

///
/// CombinatorSpec
///
/// Fold function over every expander implementing a contract. The
/// framework fixes only the calling convention; the fold policy (union,
/// override, concatenation) belongs to the combinator.
///

pub struct CombinatorSpec {
    pub name: &'static str,
    pub contract: &'static ContractSpec,
    pub combine: fn(
        Option<Value>,
        &mut crate::dispatch::Combinands<'_>,
        &[Value],
    ) -> Result<Value, Error>,
}

impl std::fmt::Debug for CombinatorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinatorSpec")
            .field("name", &self.name)
            .field("contract", &self.contract.name)
            .finish()
    }
}

///
/// CallerContext
///
/// Where a dispatched access originates: the calling class and its
/// hierarchy. External code (no class context) uses `external()`.
///

#[derive(Clone, Copy, Debug)]
pub struct CallerContext<'a> {
    pub class: &'a str,
    pub family: &'a [&'a str],
}

impl<'a> CallerContext<'a> {
    #[must_use]
    pub const fn external() -> CallerContext<'static> {
        CallerContext {
            class: "",
            family: &[],
        }
    }

    #[must_use]
    pub const fn of(class: &'a str, family: &'a [&'a str]) -> Self {
        Self { class, family }
    }

    /// Whether this caller belongs to the hierarchy described by a name
    /// plus family list.
    #[must_use]
    pub fn within(&self, name: &str, family: &[&str]) -> bool {
        if self.class == name || family.contains(&self.class) {
            return true;
        }
        self.family
            .iter()
            .any(|c| *c == name || family.contains(c))
    }
}
