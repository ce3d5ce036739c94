//! Client core of the water tank monitor: the settings screens, the device
//! list and the gateway they persist through. UI shells render the forms and
//! alerts these controllers hand out.

pub mod alert;
pub mod components;
pub mod config;
pub mod context;
pub mod gateway;
pub mod request;
pub mod settings;
pub mod validate;

pub use components::{
    devices::{DeviceForm, DeviceRegistry},
    settings::{Phase, SettingsController},
};
pub use gateway::{Fetch, Filter, Gateway, GatewayError, MemoryGateway, Table};
pub use request::HttpGateway;

use common::settings::{AlertPreferences, CalibrationSettings, NotificationSettings, ThresholdSettings};

pub type ThresholdScreen = SettingsController<ThresholdSettings>;
pub type CalibrationScreen = SettingsController<CalibrationSettings>;
pub type AlertPreferencesScreen = SettingsController<AlertPreferences>;
pub type NotificationScreen = SettingsController<NotificationSettings>;
