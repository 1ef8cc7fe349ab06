//! Tool approval.
//!
//! Every tool use the engine wants to run goes through a [`PermissionBroker`],
//! which asks the client unless the user already chose "Allow Always" this turn.

mod broker;

pub use broker::{
    PermissionBroker, ALLOW_ALWAYS, ALLOW_ONCE, REJECT, USER_CANCELLED, USER_REJECTED,
};
