//! Capabilities the model can invoke

mod home;
mod registry;

pub use home::{CONTROL_HOME_DEVICE, ControlDeviceHandler};
pub use registry::{CapabilityDeclaration, CapabilityHandler, CapabilityInvocation, CapabilityRegistry};
