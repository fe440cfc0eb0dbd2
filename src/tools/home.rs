//! `control_home_device` capability

use std::sync::Arc;

use async_trait::async_trait;

use super::{CapabilityDeclaration, CapabilityHandler};
use crate::home::{Action, ControlRequest, DeviceRegistry, ENTITY_TYPES, control_home_device};
use crate::{Error, Result};

/// Capability name exposed to the model
pub const CONTROL_HOME_DEVICE: &str = "control_home_device";

/// Lets the model switch Home Assistant devices by spoken name
pub struct ControlDeviceHandler {
    registry: Arc<dyn DeviceRegistry>,
}

impl ControlDeviceHandler {
    #[must_use]
    pub fn new(registry: Arc<dyn DeviceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CapabilityHandler for ControlDeviceHandler {
    fn declaration(&self) -> CapabilityDeclaration {
        let actions: Vec<&str> = Action::ALL.iter().map(|a| a.service()).collect();
        CapabilityDeclaration {
            name: CONTROL_HOME_DEVICE.to_string(),
            description: "Control a smart home device, such as turning lights or switches on or off"
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": actions,
                        "description": "The action to perform on the device"
                    },
                    "entity_name": {
                        "type": "string",
                        "description": "The name of the device, e.g. 'kitchen light'"
                    },
                    "entity_type": {
                        "type": "string",
                        "enum": ENTITY_TYPES,
                        "description": "The type of device"
                    }
                },
                "required": ["action", "entity_name"]
            }),
        }
    }

    async fn call(&self, arguments: serde_json::Map<String, serde_json::Value>) -> Result<String> {
        let request: ControlRequest = serde_json::from_value(serde_json::Value::Object(arguments))
            .map_err(|e| Error::Capability(format!("invalid {CONTROL_HOME_DEVICE} arguments: {e}")))?;

        let result = control_home_device(self.registry.as_ref(), &request).await;
        tracing::info!(success = result.success, message = %result.message, "device control finished");
        Ok(result.message)
    }
}
