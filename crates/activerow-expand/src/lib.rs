//! Runtime capability composition: host types acquire methods and
//! properties from registered expander providers, with strict visibility
//! enforcement, bidirectional field synchronization, and combinator-based
//! folding across providers that share a capability contract.
//!
//! There is no reflection here. Hosts declare their own members through a
//! [`spec::HostProfile`]; expanders declare methods, properties, and the
//! field-sync manifest through a [`spec::ExpanderSpec`]. Dispatch is a
//! deterministic scan over these tables in registration order.

pub mod dispatch;
pub mod error;
pub mod registry;
pub mod spec;
pub mod state;

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        dispatch::{call, call_static, get, get_static, set, set_static, Combinands},
        registry::CapabilityRegistry,
        spec::{
            CallerContext, CombinatorSpec, ContractSpec, ExpanderSpec, HostProfile, MethodKind,
            MethodSpec, PropertySpec, Visibility, null_default,
        },
        state::{Expandable, ExpanderState, MixinState},
    };
}
