//! Notification bridge vocabulary: lifecycle status and observable state.

mod bridge_state;
mod bridge_status;

pub use bridge_state::{BridgeState, Delivery};
pub use bridge_status::BridgeStatus;
