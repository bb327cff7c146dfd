//! Ports of car power management.
//!
//! - `inbound`: events the vehicle pushes into the service
//! - `outbound`: hardware, system and user management collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::PowerEventListener;
pub use outbound::{
    InitialUserBehavior, InitialUserSetter, PowerHal, SystemInterface, UserHalGateway,
};
