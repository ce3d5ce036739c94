// setting_value shapes, one per SettingType
//
// Missing fields decode to their defaults so an older or partial row still loads.

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ThresholdSettings {
    pub ph_min: f64,
    pub ph_max: f64,
    pub tds_min: f64,         // ppm
    pub tds_max: f64,         // ppm
    pub turbidity_max: f64,   // NTU
    pub temperature_max: f64, // °C
    pub water_level_min: f64, // percent
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            ph_min: 6.5,
            ph_max: 8.5,
            tds_min: 0.0,
            tds_max: 500.0,
            turbidity_max: 5.0,
            temperature_max: 35.0,
            water_level_min: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub ph_offset: f64,
    pub tds_multiplier: f64,
    pub turbidity_offset: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            ph_offset: 0.0,
            tds_multiplier: 1.0,
            turbidity_offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AlertPreferences {
    pub ph_alerts: bool,
    pub tds_alerts: bool,
    pub turbidity_alerts: bool,
    pub temperature_alerts: bool,
    pub water_level_alerts: bool,
    pub email_notifications: bool,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            ph_alerts: true,
            tds_alerts: true,
            turbidity_alerts: true,
            temperature_alerts: true,
            water_level_alerts: true,
            email_notifications: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub push_enabled: bool,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub dnd_enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            push_enabled: true,
            sound_enabled: true,
            vibration_enabled: true,
            dnd_enabled: false,
        }
    }
}
