//! Home Assistant entity snapshot types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Device categories the model may use to narrow a lookup
pub const ENTITY_TYPES: &[&str] = &["light", "switch"];

/// One entity record from `GET /api/states`
///
/// Snapshots are rebuilt on every fetch; only `entity_id` is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEntity {
    /// `<domain>.<slug>`, e.g. `switch.test_plug`
    pub entity_id: String,

    /// Current state (`on`, `off`, `unavailable`, ...)
    pub state: String,

    /// Free-form attributes, usually including `friendly_name`
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl DeviceEntity {
    /// Create an entity with a friendly name
    #[must_use]
    pub fn new(entity_id: &str, state: &str, friendly_name: &str) -> Self {
        let mut attributes = serde_json::Map::new();
        attributes.insert(
            "friendly_name".to_string(),
            serde_json::Value::String(friendly_name.to_string()),
        );
        Self {
            entity_id: entity_id.to_string(),
            state: state.to_string(),
            attributes,
        }
    }

    /// Domain prefix of the entity id
    #[must_use]
    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    /// The `friendly_name` attribute, if present
    #[must_use]
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(|v| v.as_str())
    }

    /// Name to show or speak: friendly name, falling back to the id
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.friendly_name().unwrap_or(&self.entity_id)
    }
}

/// Substring of an entity id before the first `.`
#[must_use]
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map_or(entity_id, |(domain, _)| domain)
}

/// Device actions mapped onto Home Assistant services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// `turn_on` service
    TurnOn,
    /// `turn_off` service
    TurnOff,
    /// `toggle` service
    Toggle,
}

impl Action {
    /// Every supported action
    pub const ALL: [Self; 3] = [Self::TurnOn, Self::TurnOff, Self::Toggle];

    /// Service name used in `/api/services/{domain}/{service}`
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Toggle => "toggle",
        }
    }

    /// Imperative phrase ("turn off")
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::TurnOn => "turn on",
            Self::TurnOff => "turn off",
            Self::Toggle => "toggle",
        }
    }

    /// Past-tense phrase ("turned off")
    #[must_use]
    pub const fn past_tense(self) -> &'static str {
        match self {
            Self::TurnOn => "turned on",
            Self::TurnOff => "turned off",
            Self::Toggle => "toggled",
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(' ', "_").as_str() {
            "turn_on" => Ok(Self::TurnOn),
            "turn_off" => Ok(Self::TurnOff),
            "toggle" => Ok(Self::Toggle),
            _ => Err(Error::UnsupportedAction(s.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.service())
    }
}
