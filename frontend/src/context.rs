use common::req::{Device, Scope, ScopeKind, UserProfile};
use log::{debug, warn};
use uuid::Uuid;

/// Signed-in user and selected device, shared by all screens.
///
/// Only sign-in/out and device selection change it; screens read it when they
/// load or save.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AppContext {
    user: Option<UserProfile>,
    selected_device: Option<Device>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.selected_device.as_ref()
    }

    pub fn sign_in(&mut self, user: UserProfile) {
        if self.user.as_ref().map(|u| u.id) != Some(user.id) {
            self.selected_device = None;
        }
        debug!("signed in as {}", user.email);
        self.user = Some(user);
    }

    pub fn sign_out(&mut self) {
        self.user = None;
        self.selected_device = None;
    }

    /// Returns false (and keeps the old selection) for a device the signed-in
    /// user does not own.
    pub fn select_device(&mut self, device: Device) -> bool {
        match &self.user {
            Some(user) if user.id == device.user_id => {
                self.selected_device = Some(device);
                true
            }
            _ => {
                warn!("refusing to select device {} not owned by the current user", device.id);
                false
            }
        }
    }

    /// Drop the selection if it points at `device_id`.
    pub fn forget_device(&mut self, device_id: Uuid) {
        if self.selected_device.as_ref().map(|d| d.id) == Some(device_id) {
            self.selected_device = None;
        }
    }

    /// Refresh the selected device from a freshly fetched list.
    pub fn sync_devices(&mut self, devices: &[Device]) {
        if let Some(selected) = &self.selected_device {
            self.selected_device = devices.iter().find(|d| d.id == selected.id).cloned();
        }
    }

    /// Where settings of the given kind live right now, if anywhere.
    pub fn scope(&self, kind: ScopeKind) -> Option<Scope> {
        match kind {
            ScopeKind::Device => self.selected_device.as_ref().map(|d| Scope::Device {
                device_id: d.id,
                user_id: d.user_id,
            }),
            ScopeKind::User => self.user.as_ref().map(|u| Scope::User { user_id: u.id }),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn user() -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            email: "owner@example.com".to_owned(),
            full_name: Some("Tank Owner".to_owned()),
        }
    }

    pub fn signed_in() -> AppContext {
        let mut ctx = AppContext::new();
        ctx.sign_in(user());
        ctx
    }

    pub fn with_device() -> AppContext {
        let mut ctx = signed_in();
        let owner = ctx.user().map(|u| u.id).unwrap();
        assert!(ctx.select_device(Device::new(owner, "Roof tank", Some("Roof"))));
        ctx
    }
}
