pub mod req;
pub mod settings;
