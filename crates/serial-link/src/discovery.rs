use crate::{DeviceEnumerator, DeviceIdentity, DeviceRole, DiscoveryError, RoleTable};
use tracing::{debug, info, warn};

/// One enumerated device together with the role its serial maps to, if any.
#[derive(Clone, Debug)]
pub struct SurveyEntry {
    pub device: DeviceIdentity,
    pub role: Option<DeviceRole>,
}

/// Binds logical roles to device paths by hardware serial number.
pub struct DeviceDiscovery<E> {
    enumerator: E,
    table: RoleTable,
}

impl<E: DeviceEnumerator> DeviceDiscovery<E> {
    pub fn new(enumerator: E, table: RoleTable) -> Self {
        Self { enumerator, table }
    }

    pub fn table(&self) -> &RoleTable {
        &self.table
    }

    /// Every enumerated device with its matched role.
    pub fn survey(&self) -> Result<Vec<SurveyEntry>, DiscoveryError> {
        let devices = self
            .enumerator
            .enumerate()
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;
        Ok(devices
            .into_iter()
            .map(|device| {
                let role = device
                    .serial
                    .as_deref()
                    .and_then(|serial| self.table.role_of(serial));
                SurveyEntry { device, role }
            })
            .collect())
    }

    /// Find the single device bound to `role`.
    ///
    /// An enumeration failure reads as "no device"; whether absence is fatal is up to
    /// the caller. Two devices claiming the same role is a configuration error.
    pub fn resolve(&self, role: DeviceRole) -> Result<Option<DeviceIdentity>, DiscoveryError> {
        let entries = match self.survey() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{e}; treating {role} as absent");
                return Ok(None);
            }
        };

        let mut matches = Vec::new();
        for entry in entries {
            match (entry.role, entry.device.serial.as_deref()) {
                (Some(found), Some(serial)) => {
                    info!("{found} dongle {serial} at {}", entry.device.path);
                    if found == role {
                        matches.push(entry.device);
                    }
                }
                _ => debug!(
                    "unmatched tty {} ({:04x}:{:04x})",
                    entry.device.path, entry.device.vendor_id, entry.device.product_id
                ),
            }
        }

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => Err(DiscoveryError::Ambiguous {
                role,
                paths: matches.into_iter().map(|d| d.path).collect(),
            }),
        }
    }

    /// Device path bound to `role`.
    pub fn path_for(&self, role: DeviceRole) -> Result<Option<String>, DiscoveryError> {
        Ok(self.resolve(role)?.map(|d| d.path))
    }
}
