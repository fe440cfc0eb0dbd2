//! Home Assistant bridge
//!
//! Fetches entity snapshots, performs device actions and keeps the server
//! running.

mod auth;
mod client;
pub mod control;
mod entity;

use async_trait::async_trait;

pub use auth::{Credentials, TokenManager, TokenResponse};
pub use client::HomeClient;
pub use control::{ActionResult, ControlRequest, Resolution, control_home_device, resolve};
pub use entity::{Action, DeviceEntity, ENTITY_TYPES, domain_of};

use crate::Result;

/// Source of device state and target of device actions
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Fetch a fresh snapshot of every entity
    async fn fetch_entities(&self) -> Result<Vec<DeviceEntity>>;

    /// Perform `action` on `entity_id`, returning whether it succeeded
    async fn invoke_action(&self, entity_id: &str, action: &str) -> Result<bool>;
}
