//! Form state of the settings screens and how each bundle maps to it.

use common::{
    req::SettingType,
    settings::{AlertPreferences, CalibrationSettings, NotificationSettings, ThresholdSettings},
};
use serde::{de::DeserializeOwned, Serialize};

use crate::validate::{self, ValidationError};

/// A settings bundle that one screen edits as a whole.
pub trait SettingsBundle: Serialize + DeserializeOwned + Default + Clone {
    /// What the user edits, e.g. text fields for numbers.
    type Form: Clone + PartialEq + std::fmt::Debug;

    const SETTING_TYPE: SettingType;
    /// Used in fallback messages ("Failed to load thresholds").
    const NOUN: &'static str;
    const SAVED_MESSAGE: &'static str;

    fn to_form(&self) -> Self::Form;
    fn from_form(form: &Self::Form) -> Result<Self, ValidationError>;

    /// All reasons `from_form` would refuse `form`, empty when it is valid.
    fn problems(form: &Self::Form) -> Vec<ValidationError> {
        Self::from_form(form).err().into_iter().collect()
    }
}

// ===============================================
// thresholds
// ===============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdForm {
    pub ph_min: String,
    pub ph_max: String,
    pub tds_min: String,
    pub tds_max: String,
    pub turbidity_max: String,
    pub temperature_max: String,
    pub water_level_min: String,
}

impl From<&ThresholdSettings> for ThresholdForm {
    fn from(t: &ThresholdSettings) -> Self {
        Self {
            ph_min: t.ph_min.to_string(),
            ph_max: t.ph_max.to_string(),
            tds_min: t.tds_min.to_string(),
            tds_max: t.tds_max.to_string(),
            turbidity_max: t.turbidity_max.to_string(),
            temperature_max: t.temperature_max.to_string(),
            water_level_min: t.water_level_min.to_string(),
        }
    }
}

impl SettingsBundle for ThresholdSettings {
    type Form = ThresholdForm;

    const SETTING_TYPE: SettingType = SettingType::Thresholds;
    const NOUN: &'static str = "thresholds";
    const SAVED_MESSAGE: &'static str = "Threshold settings saved successfully";

    fn to_form(&self) -> Self::Form {
        self.into()
    }

    fn from_form(form: &Self::Form) -> Result<Self, ValidationError> {
        validate::thresholds(form)
    }

    fn problems(form: &Self::Form) -> Vec<ValidationError> {
        validate::threshold_problems(form)
    }
}

// ===============================================
// calibration
// ===============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationForm {
    pub ph_offset: String,
    pub tds_multiplier: String,
    pub turbidity_offset: String,
}

impl From<&CalibrationSettings> for CalibrationForm {
    fn from(c: &CalibrationSettings) -> Self {
        Self {
            ph_offset: c.ph_offset.to_string(),
            tds_multiplier: c.tds_multiplier.to_string(),
            turbidity_offset: c.turbidity_offset.to_string(),
        }
    }
}

impl SettingsBundle for CalibrationSettings {
    type Form = CalibrationForm;

    const SETTING_TYPE: SettingType = SettingType::Calibration;
    const NOUN: &'static str = "calibration";
    const SAVED_MESSAGE: &'static str = "Calibration settings saved";

    fn to_form(&self) -> Self::Form {
        self.into()
    }

    fn from_form(form: &Self::Form) -> Result<Self, ValidationError> {
        validate::calibration(form)
    }
}

// ===============================================
// toggles, edited as is
// ===============================================

impl SettingsBundle for AlertPreferences {
    type Form = Self;

    const SETTING_TYPE: SettingType = SettingType::AlertPreferences;
    const NOUN: &'static str = "preferences";
    const SAVED_MESSAGE: &'static str = "Alert preferences saved";

    fn to_form(&self) -> Self::Form {
        *self
    }

    fn from_form(form: &Self::Form) -> Result<Self, ValidationError> {
        Ok(*form)
    }
}

impl SettingsBundle for NotificationSettings {
    type Form = Self;

    const SETTING_TYPE: SettingType = SettingType::Notifications;
    const NOUN: &'static str = "settings";
    const SAVED_MESSAGE: &'static str = "Notification settings saved";

    fn to_form(&self) -> Self::Form {
        *self
    }

    fn from_form(form: &Self::Form) -> Result<Self, ValidationError> {
        Ok(*form)
    }
}
