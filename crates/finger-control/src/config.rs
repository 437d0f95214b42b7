use crate::{LoopConfig, DEFAULT_RATE_HZ, MIN_RATE_HZ};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serial_link::{DeviceRole, RoleTable};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// UDP endpoints of the message-bus adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Where external state strings arrive.
    pub bind: String,
    /// Where `"<torque> <position>"` datagrams are sent.
    pub publish: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5005".to_string(),
            publish: "127.0.0.1:5006".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub role: DeviceRole,
    pub roles: RoleTable,
    pub rate_hz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_ttl_ms: Option<u64>,
    pub repair_permissions: bool,
    pub bus: BusConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::Robot,
            roles: RoleTable::builtin(),
            rate_hz: DEFAULT_RATE_HZ,
            stale_ttl_ms: None,
            repair_permissions: true,
            bus: BusConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.rate_hz.is_finite() && self.rate_hz >= MIN_RATE_HZ) {
            anyhow::bail!(
                "rate_hz must be a number >= {MIN_RATE_HZ}, got {}",
                self.rate_hz
            );
        }
        if self.roles.serials(self.role).next().is_none() {
            anyhow::bail!("no hardware serials configured for role {}", self.role);
        }
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            rate_hz: self.rate_hz,
            stale_ttl: self.stale_ttl_ms.map(Duration::from_millis),
        }
    }
}

pub fn load_config_file(path: impl AsRef<Path>) -> anyhow::Result<BridgeConfig> {
    let path = path.as_ref();
    let raw =
        fs::read_to_string(path).with_context(|| format!("reading config: {}", path.display()))?;
    let cfg: BridgeConfig =
        serde_yaml::from_str(&raw).with_context(|| format!("parsing yaml: {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config: {}", path.display()))?;
    Ok(cfg)
}
