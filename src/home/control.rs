//! Device name resolution and the "control device" outcome messages
//!
//! Matching is permissive: a device matches when its display name contains
//! the requested name (case-insensitive), optionally narrowed by a domain
//! prefix. Ambiguity and misses become spoken messages, never errors.

use serde::Deserialize;

use super::DeviceRegistry;
use super::entity::{Action, DeviceEntity};
use crate::Error;

/// Result of resolving a spoken name against an entity snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No entity matched
    NotFound,
    /// More than one entity matched; carries the match count
    Ambiguous(usize),
    /// Exactly one entity matched
    Unique(DeviceEntity),
}

/// Resolve `name` (and optional `entity_type`) against `entities`
#[must_use]
pub fn resolve(entities: Vec<DeviceEntity>, name: &str, entity_type: Option<&str>) -> Resolution {
    let needle = name.trim().to_lowercase();
    let entity_type = entity_type
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);

    let mut matches: Vec<DeviceEntity> = entities
        .into_iter()
        .filter(|entity| {
            entity
                .friendly_name()
                .is_some_and(|friendly| friendly.to_lowercase().contains(&needle))
        })
        .filter(|entity| {
            entity_type
                .as_deref()
                .is_none_or(|t| entity.entity_id.to_lowercase().starts_with(t))
        })
        .collect();

    match matches.len() {
        0 => Resolution::NotFound,
        1 => Resolution::Unique(matches.remove(0)),
        n => Resolution::Ambiguous(n),
    }
}

/// Arguments of the `control_home_device` capability
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlRequest {
    /// `turn_on`, `turn_off` or `toggle`
    pub action: String,

    /// Spoken device name
    pub entity_name: String,

    /// Optional domain filter (`light`, `switch`)
    #[serde(default)]
    pub entity_type: Option<String>,
}

/// Outcome of a device control request, always renderable as speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    fn ok(message: String) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

/// Resolve the requested device and perform the action on it
///
/// Never fails: every outcome, including backend errors, is rendered into
/// [`ActionResult::message`].
pub async fn control_home_device(
    registry: &dyn DeviceRegistry,
    request: &ControlRequest,
) -> ActionResult {
    let name = request.entity_name.trim();
    if name.is_empty() {
        tracing::info!("control request without a device name");
        return ActionResult::failed("Sorry, I didn't catch which device you meant.".to_string());
    }

    let entities = match registry.fetch_entities().await {
        Ok(entities) => entities,
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch entity snapshot");
            return ActionResult::failed(
                "Sorry, I couldn't reach the home automation server.".to_string(),
            );
        }
    };

    let entity = match resolve(entities, name, request.entity_type.as_deref()) {
        Resolution::NotFound => {
            tracing::info!(name, "no device matched");
            return ActionResult::failed(format!(
                "Sorry, I couldn't find any device named '{name}'."
            ));
        }
        Resolution::Ambiguous(count) => {
            tracing::info!(name, count, "device name is ambiguous");
            return ActionResult::failed(format!(
                "I found multiple devices named '{name}'. Please be more specific."
            ));
        }
        Resolution::Unique(entity) => entity,
    };

    let friendly = entity.display_name();
    match registry
        .invoke_action(&entity.entity_id, &request.action)
        .await
    {
        Ok(true) => {
            let phrase = phrase_for(&request.action, Action::past_tense);
            ActionResult::ok(format!("{friendly} has been {phrase}."))
        }
        Ok(false) => {
            let verb = phrase_for(&request.action, Action::verb);
            ActionResult::failed(format!("Sorry, I couldn't {verb} {friendly}."))
        }
        Err(Error::UnsupportedAction(action)) => {
            tracing::warn!(action = %action, "model requested an unsupported action");
            ActionResult::failed(format!("Sorry, I don't know how to '{action}'."))
        }
        Err(e) => {
            tracing::error!(error = %e, entity_id = %entity.entity_id, "device action failed");
            ActionResult::failed(
                "Sorry, I couldn't reach the home automation server.".to_string(),
            )
        }
    }
}

/// Render a known action with `render`, falling back to the raw string
fn phrase_for(action: &str, render: fn(Action) -> &'static str) -> String {
    action
        .parse::<Action>()
        .map_or_else(|_| action.to_string(), |a| render(a).to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct FakeRegistry {
        entities: Vec<DeviceEntity>,
        succeed: bool,
        invoked: Mutex<Vec<(String, String)>>,
    }

    impl FakeRegistry {
        fn new(entities: Vec<DeviceEntity>) -> Self {
            Self {
                entities,
                succeed: true,
                invoked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DeviceRegistry for FakeRegistry {
        async fn fetch_entities(&self) -> crate::Result<Vec<DeviceEntity>> {
            Ok(self.entities.clone())
        }

        async fn invoke_action(&self, entity_id: &str, action: &str) -> crate::Result<bool> {
            let action_kind: Action = action.parse()?;
            self.invoked
                .lock()
                .unwrap()
                .push((entity_id.to_string(), action_kind.service().to_string()));
            Ok(self.succeed)
        }
    }

    fn request(action: &str, name: &str, entity_type: Option<&str>) -> ControlRequest {
        ControlRequest {
            action: action.to_string(),
            entity_name: name.to_string(),
            entity_type: entity_type.map(String::from),
        }
    }

    fn house() -> Vec<DeviceEntity> {
        vec![
            DeviceEntity::new("switch.test_plug", "on", "Test Plug"),
            DeviceEntity::new("light.kitchen", "off", "Kitchen Light"),
            DeviceEntity::new("light.kitchen_island", "off", "Kitchen Island"),
            DeviceEntity::new("switch.kitchen_fan", "off", "Kitchen Fan"),
            DeviceEntity::new("sun.sun", "above_horizon", "Sun"),
        ]
    }

    #[test]
    fn resolve_is_case_insensitive_substring() {
        let resolution = resolve(house(), "test PLUG", None);
        assert!(matches!(resolution, Resolution::Unique(e) if e.entity_id == "switch.test_plug"));
    }

    #[test]
    fn resolve_narrows_by_entity_type() {
        assert_eq!(resolve(house(), "kitchen", None), Resolution::Ambiguous(3));
        assert_eq!(resolve(house(), "kitchen", Some("light")), Resolution::Ambiguous(2));
        assert!(matches!(
            resolve(house(), "kitchen", Some("switch")),
            Resolution::Unique(e) if e.entity_id == "switch.kitchen_fan"
        ));
    }

    #[test]
    fn resolve_ignores_entities_without_friendly_name() {
        let entities = vec![DeviceEntity {
            entity_id: "switch.garage".to_string(),
            state: "off".to_string(),
            attributes: serde_json::Map::new(),
        }];
        assert_eq!(resolve(entities, "garage", None), Resolution::NotFound);
    }

    #[tokio::test]
    async fn unique_match_reports_success() {
        let registry = FakeRegistry::new(house());
        let result =
            control_home_device(&registry, &request("turn_off", "test plug", None)).await;

        assert!(result.success);
        assert_eq!(result.message, "Test Plug has been turned off.");
        assert_eq!(
            registry.invoked.lock().unwrap().as_slice(),
            &[("switch.test_plug".to_string(), "turn_off".to_string())]
        );
    }

    #[tokio::test]
    async fn not_found_names_the_device() {
        let registry = FakeRegistry::new(house());
        let result = control_home_device(&registry, &request("turn_on", "porch", None)).await;

        assert!(!result.success);
        assert!(result.message.contains("'porch'"));
        assert!(result.message.contains("couldn't find"));
        assert!(registry.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_name_is_not_treated_as_ambiguous() {
        let registry = FakeRegistry::new(house());
        let result = control_home_device(&registry, &request("turn_on", "  ", None)).await;

        assert!(!result.success);
        assert_eq!(result.message, "Sorry, I didn't catch which device you meant.");
        assert!(!result.message.contains("multiple devices"));
        assert!(registry.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ambiguous_match_invokes_nothing() {
        let registry = FakeRegistry::new(house());
        let result = control_home_device(&registry, &request("toggle", "kitchen", None)).await;

        assert!(!result.success);
        assert!(result.message.contains("Please be more specific"));
        assert!(registry.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_action_is_reported() {
        let mut registry = FakeRegistry::new(house());
        registry.succeed = false;
        let result =
            control_home_device(&registry, &request("turn_on", "kitchen fan", None)).await;

        assert!(!result.success);
        assert_eq!(result.message, "Sorry, I couldn't turn on Kitchen Fan.");
    }

    #[tokio::test]
    async fn unsupported_action_is_rendered() {
        let registry = FakeRegistry::new(house());
        let result = control_home_device(&registry, &request("dim", "test plug", None)).await;

        assert!(!result.success);
        assert_eq!(result.message, "Sorry, I don't know how to 'dim'.");
    }
}
