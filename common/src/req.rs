// rows exchanged between frontend and backend, keep both sides in sync
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Device {
    pub id: Uuid, // unique, key
    pub user_id: Uuid,
    pub device_name: String,
    pub device_location: Option<String>,
    pub is_online: bool,
    pub created_at: DateTime<Utc>,
}

impl Device {
    /// A fresh, offline device with a client generated id.
    pub fn new(user_id: Uuid, device_name: &str, device_location: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            device_name: device_name.to_owned(),
            device_location: device_location.map(str::to_owned),
            is_online: false,
            created_at: Utc::now(),
        }
    }
}

/// Mutable fields of a device. Both are always written.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeviceUpdate {
    pub device_name: String,
    pub device_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Device,
    User,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettingType {
    Thresholds,
    Calibration,
    AlertPreferences,
    Notifications,
}

impl SettingType {
    /// The fixed `setting_key` stored alongside each type.
    pub fn setting_key(&self) -> &'static str {
        match self {
            SettingType::Thresholds => "sensor_thresholds",
            SettingType::Calibration => "sensor_calibration",
            SettingType::AlertPreferences => "user_alert_preferences",
            SettingType::Notifications => "notification_settings",
        }
    }

    pub fn scope_kind(&self) -> ScopeKind {
        match self {
            SettingType::Thresholds | SettingType::Calibration => ScopeKind::Device,
            SettingType::AlertPreferences | SettingType::Notifications => ScopeKind::User,
        }
    }
}

/// Owner of a settings bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Device { device_id: Uuid, user_id: Uuid },
    User { user_id: Uuid },
}

impl Scope {
    pub fn user_id(&self) -> Uuid {
        match self {
            Scope::Device { user_id, .. } | Scope::User { user_id } => *user_id,
        }
    }

    pub fn device_id(&self) -> Option<Uuid> {
        match self {
            Scope::Device { device_id, .. } => Some(*device_id),
            Scope::User { .. } => None,
        }
    }
}

/// One row of the `settings` table. `setting_value` is opaque to the store,
/// its shape depends on `setting_type` only.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SettingRecord {
    pub device_id: Option<Uuid>,
    pub user_id: Uuid,
    pub setting_type: SettingType,
    pub setting_key: String,
    pub setting_value: serde_json::Value,
}

impl SettingRecord {
    pub fn new(scope: Scope, setting_type: SettingType, setting_value: serde_json::Value) -> Self {
        Self {
            device_id: scope.device_id(),
            user_id: scope.user_id(),
            setting_type,
            setting_key: setting_type.setting_key().to_owned(),
            setting_value,
        }
    }

    /// `None` when the record lacks the device a device-scoped type needs.
    pub fn scope(&self) -> Option<Scope> {
        match (self.setting_type.scope_kind(), self.device_id) {
            (ScopeKind::Device, Some(device_id)) => Some(Scope::Device {
                device_id,
                user_id: self.user_id,
            }),
            (ScopeKind::Device, None) => None,
            (ScopeKind::User, _) => Some(Scope::User {
                user_id: self.user_id,
            }),
        }
    }
}

/// Error payload of every non-2xx backend response.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    pub const NOT_FOUND: &'static str = "not_found";
    pub const CONFLICT: &'static str = "conflict";
    pub const AMBIGUOUS: &'static str = "ambiguous";
    pub const BAD_REQUEST: &'static str = "bad_request";
    pub const INTERNAL: &'static str = "internal";
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn setting_type_string_forms_agree() {
        for ty in SettingType::iter() {
            let json = serde_json::to_value(ty).unwrap();
            assert_eq!(json, serde_json::Value::String(ty.to_string()));
            assert_eq!(SettingType::from_str(ty.as_ref()).unwrap(), ty);
        }
        assert_eq!(SettingType::AlertPreferences.as_ref(), "alert_preferences");
    }

    #[test]
    fn record_scope_requires_device_for_device_types() {
        let user_id = Uuid::new_v4();
        let mut rec = SettingRecord::new(
            Scope::User { user_id },
            SettingType::Thresholds,
            serde_json::json!({}),
        );
        assert_eq!(rec.scope(), None);

        let device_id = Uuid::new_v4();
        rec.device_id = Some(device_id);
        assert_eq!(rec.scope(), Some(Scope::Device { device_id, user_id }));
        assert_eq!(rec.setting_key, "sensor_thresholds");
    }
}
