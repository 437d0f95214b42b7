use crate::ConfigError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Logical purpose of a serial-attached dongle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Robot,
    Input,
    Feedback,
}

impl DeviceRole {
    pub const ALL: [DeviceRole; 3] = [DeviceRole::Robot, DeviceRole::Input, DeviceRole::Feedback];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceRole::Robot => "robot",
            DeviceRole::Input => "input",
            DeviceRole::Feedback => "feedback",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "robot" => Ok(DeviceRole::Robot),
            "input" => Ok(DeviceRole::Input),
            "feedback" => Ok(DeviceRole::Feedback),
            other => Err(ConfigError::UnknownRole(other.to_string())),
        }
    }
}

/// A TTY device as reported by the host enumeration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial: Option<String>,
}

impl DeviceIdentity {
    pub fn new(path: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            path: path.into(),
            vendor_id,
            product_id,
            serial: None,
        }
    }

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }
}

/// Role -> hardware serial numbers. Serial sets never overlap across roles.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<DeviceRole, Vec<String>>",
    into = "BTreeMap<DeviceRole, Vec<String>>"
)]
pub struct RoleTable {
    entries: BTreeMap<DeviceRole, BTreeSet<String>>,
}

impl RoleTable {
    /// Build a table, rejecting any serial listed under more than one role.
    pub fn new<I, S>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (DeviceRole, Vec<S>)>,
        S: Into<String>,
    {
        let mut table = RoleTable::default();
        let mut owner: BTreeMap<String, DeviceRole> = BTreeMap::new();
        for (role, serials) in entries {
            for serial in serials {
                let serial = serial.into();
                if let Some(first) = owner.get(&serial) {
                    if *first != role {
                        return Err(ConfigError::DuplicateSerial {
                            serial,
                            first: *first,
                            second: role,
                        });
                    }
                }
                owner.insert(serial.clone(), role);
                table.entries.entry(role).or_default().insert(serial);
            }
        }
        Ok(table)
    }

    /// Serial numbers of the Haria dongles shipped with the hand controller.
    pub fn builtin() -> Self {
        let raw: [(DeviceRole, &[&str]); 3] = [
            (
                DeviceRole::Feedback,
                &["EC:DA:3B:5D:28:B4", "EC:DA:3B:5D:28:B5", "EC:DA:3B:5D:28:B6"],
            ),
            (
                DeviceRole::Input,
                &["EC:DA:3B:5D:27:33", "EC:DA:3B:5D:27:31", "EC:DA:3B:5D:27:32"],
            ),
            (
                DeviceRole::Robot,
                &[
                    "EC:DA:3B:5B:6C:00",
                    "EC:DA:3B:5D:27:30",
                    "EC:DA:3B:5D:27:35",
                    "DC:DA:0C:30:C2:74",
                ],
            ),
        ];
        let mut entries = BTreeMap::new();
        for (role, serials) in raw {
            entries.insert(role, serials.iter().map(|s| s.to_string()).collect());
        }
        Self { entries }
    }

    pub fn role_of(&self, serial: &str) -> Option<DeviceRole> {
        self.entries
            .iter()
            .find(|(_, serials)| serials.contains(serial))
            .map(|(role, _)| *role)
    }

    pub fn serials(&self, role: DeviceRole) -> impl Iterator<Item = &str> {
        self.entries
            .get(&role)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeSet::is_empty)
    }
}

impl TryFrom<BTreeMap<DeviceRole, Vec<String>>> for RoleTable {
    type Error = ConfigError;

    fn try_from(value: BTreeMap<DeviceRole, Vec<String>>) -> Result<Self, Self::Error> {
        RoleTable::new(value)
    }
}

impl From<RoleTable> for BTreeMap<DeviceRole, Vec<String>> {
    fn from(table: RoleTable) -> Self {
        table
            .entries
            .into_iter()
            .map(|(role, serials)| (role, serials.into_iter().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_disjoint() {
        let table = RoleTable::builtin();
        let rebuilt: BTreeMap<DeviceRole, Vec<String>> = table.clone().into();
        assert_eq!(RoleTable::try_from(rebuilt).unwrap(), table);
        assert_eq!(table.role_of("DC:DA:0C:30:C2:74"), Some(DeviceRole::Robot));
        assert_eq!(table.role_of("EC:DA:3B:5D:28:B5"), Some(DeviceRole::Feedback));
        assert_eq!(table.role_of("00:00:00:00:00:00"), None);
    }

    #[test]
    fn duplicate_serial_across_roles_is_rejected() {
        let err = RoleTable::new([
            (DeviceRole::Robot, vec!["SN1", "SN2"]),
            (DeviceRole::Input, vec!["SN2"]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateSerial {
                serial: "SN2".into(),
                first: DeviceRole::Robot,
                second: DeviceRole::Input,
            }
        );
    }

    #[test]
    fn repeated_serial_within_one_role_is_fine() {
        let table = RoleTable::new([(DeviceRole::Robot, vec!["SN1", "SN1"])]).unwrap();
        assert_eq!(table.serials(DeviceRole::Robot).count(), 1);
        assert_eq!(table.serials(DeviceRole::Feedback).count(), 0);
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Robot".parse::<DeviceRole>().unwrap(), DeviceRole::Robot);
        assert_eq!(" feedback ".parse::<DeviceRole>().unwrap(), DeviceRole::Feedback);
        assert!("gripper".parse::<DeviceRole>().is_err());
    }

    #[test]
    fn table_from_yaml() {
        let yaml = "robot: [SN1]\nfeedback: [SN9, SN8]\n";
        let table: RoleTable = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(table.role_of("SN8"), Some(DeviceRole::Feedback));

        let clash = "robot: [SN1]\ninput: [SN1]\n";
        assert!(serde_yaml::from_str::<RoleTable>(clash).is_err());
    }
}
