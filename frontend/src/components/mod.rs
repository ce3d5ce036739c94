pub mod devices;
pub mod settings;
