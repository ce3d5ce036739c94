use common::req::{Device, DeviceUpdate};
use log::{info, warn};
use uuid::Uuid;

use crate::{
    alert::{Alert, Blocked, Confirmation, Severity},
    context::AppContext,
    gateway::{Filter, Gateway, GatewayError, Table},
};

/// Name and location as typed into the add/edit dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceForm {
    pub name: String,
    pub location: String,
}

impl DeviceForm {
    fn name(&self) -> Result<&str, Blocked> {
        match self.name.trim() {
            "" => Err(Blocked::Rejected(Alert::error("Please enter a device name"))),
            name => Ok(name),
        }
    }

    fn location(&self) -> Option<&str> {
        Some(self.location.trim()).filter(|l| !l.is_empty())
    }
}

impl From<&Device> for DeviceForm {
    fn from(device: &Device) -> Self {
        Self {
            name: device.device_name.clone(),
            location: device.device_location.clone().unwrap_or_default(),
        }
    }
}

/// Write operation waiting for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    Add(Device),
    Edit { device_id: Uuid, update: DeviceUpdate },
    Delete(Device),
}

/// The signed-in user's devices and the add/edit/delete flows on them.
///
/// One operation (refresh included) may be outstanding at a time; anything
/// requested meanwhile is refused with [`Blocked::InFlight`].
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    busy: bool,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest first.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    fn claim(&mut self) -> Result<(), Blocked> {
        if self.busy {
            return Err(Blocked::InFlight);
        }
        self.busy = true;
        Ok(())
    }

    pub fn begin_add(&mut self, ctx: &AppContext, form: &DeviceForm) -> Result<PendingChange, Blocked> {
        let name = form.name()?;
        let Some(user) = ctx.user() else {
            return Err(Blocked::Rejected(Alert::error("User not authenticated")));
        };
        self.claim()?;
        Ok(PendingChange::Add(Device::new(user.id, name, form.location())))
    }

    pub fn begin_edit(&mut self, device_id: Uuid, form: &DeviceForm) -> Result<PendingChange, Blocked> {
        let update = DeviceUpdate {
            device_name: form.name()?.to_owned(),
            device_location: form.location().map(str::to_owned),
        };
        self.claim()?;
        Ok(PendingChange::Edit { device_id, update })
    }

    /// Deleting cannot be undone, so it starts with a question to the user.
    pub fn request_delete(&self, device: &Device) -> Confirmation<Device> {
        Confirmation {
            title: "Delete Device".to_owned(),
            prompt: format!(
                "Are you sure you want to delete \"{}\"? This action cannot be undone.",
                device.device_name
            ),
            subject: device.clone(),
        }
    }

    pub fn begin_delete(&mut self, confirmation: Confirmation<Device>) -> Result<PendingChange, Blocked> {
        self.claim()?;
        Ok(PendingChange::Delete(confirmation.subject))
    }

    /// Issue the gateway call for a pending change.
    pub async fn send<G: Gateway>(change: &PendingChange, gateway: &G) -> Result<(), GatewayError> {
        match change {
            PendingChange::Add(device) => {
                gateway.insert(Table::Devices, serde_json::to_value(device)?).await
            }
            PendingChange::Edit { device_id, update } => {
                let filter = Filter::new().eq("id", device_id);
                gateway.update(Table::Devices, &filter, serde_json::to_value(update)?).await
            }
            PendingChange::Delete(device) => {
                gateway.delete(Table::Devices, &Filter::new().eq("id", device.id)).await
            }
        }
    }

    /// Apply the gateway's answer. A deleted device is also dropped from the
    /// selection in `ctx`.
    pub fn complete(
        &mut self,
        ctx: &mut AppContext,
        change: PendingChange,
        result: Result<(), GatewayError>,
    ) -> Alert {
        self.busy = false;
        match (change, result) {
            (PendingChange::Add(device), Ok(())) => {
                info!("added device {}", device.id);
                let alert = Alert::new(
                    Severity::Success,
                    "Device Added Successfully!",
                    format!(
                        "Device ID: {}\n\nCopy this ID to your ESP32 config.h file.",
                        device.id
                    ),
                );
                self.devices.insert(0, device);
                alert
            }
            (PendingChange::Edit { device_id, update }, Ok(())) => {
                info!("updated device {device_id}");
                if let Some(device) = self.devices.iter_mut().find(|d| d.id == device_id) {
                    device.device_name = update.device_name;
                    device.device_location = update.device_location;
                }
                Alert::success("Device updated successfully")
            }
            (PendingChange::Delete(device), Ok(())) => {
                info!("deleted device {}", device.id);
                ctx.forget_device(device.id);
                self.devices.retain(|d| d.id != device.id);
                Alert::success("Device deleted successfully")
            }
            (change, Err(err)) => {
                warn!("device change failed: {err}");
                let fallback = match change {
                    PendingChange::Add(_) => "Failed to add device",
                    PendingChange::Edit { .. } => "Failed to update device",
                    PendingChange::Delete(_) => "Failed to delete device",
                };
                Alert::failure(&err, fallback)
            }
        }
    }

    /// Reload the signed-in user's devices. Signed out means an empty list.
    pub async fn refresh<G: Gateway>(&mut self, ctx: &mut AppContext, gateway: &G) -> Option<Alert> {
        let Some(user_id) = ctx.user().map(|u| u.id) else {
            self.devices.clear();
            return None;
        };
        if self.claim().is_err() {
            return None;
        }
        let fetched = gateway
            .fetch_all(Table::Devices, &Filter::new().eq("user_id", user_id))
            .await
            .and_then(|rows| {
                rows.into_iter()
                    .map(|row| serde_json::from_value::<Device>(row).map_err(GatewayError::from))
                    .collect::<Result<Vec<_>, _>>()
            });
        self.busy = false;

        match fetched {
            Ok(mut devices) => {
                devices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                ctx.sync_devices(&devices);
                self.devices = devices;
                None
            }
            Err(err) => {
                warn!("loading devices failed: {err}");
                Some(Alert::failure(&err, "Failed to load devices"))
            }
        }
    }

    /// The change's own alert is what the user sees. A failed refresh
    /// afterwards only leaves the locally patched list in place.
    async fn run<G: Gateway>(
        &mut self,
        ctx: &mut AppContext,
        gateway: &G,
        change: PendingChange,
    ) -> Alert {
        let result = Self::send(&change, gateway).await;
        let succeeded = result.is_ok();
        let alert = self.complete(ctx, change, result);
        if succeeded && self.refresh(ctx, gateway).await.is_some() {
            warn!("device list may be out of date");
        }
        alert
    }

    pub async fn add<G: Gateway>(
        &mut self,
        ctx: &mut AppContext,
        form: &DeviceForm,
        gateway: &G,
    ) -> Option<Alert> {
        match self.begin_add(ctx, form) {
            Ok(change) => Some(self.run(ctx, gateway, change).await),
            Err(blocked) => blocked.into_alert(),
        }
    }

    pub async fn edit<G: Gateway>(
        &mut self,
        ctx: &mut AppContext,
        device_id: Uuid,
        form: &DeviceForm,
        gateway: &G,
    ) -> Option<Alert> {
        match self.begin_edit(device_id, form) {
            Ok(change) => Some(self.run(ctx, gateway, change).await),
            Err(blocked) => blocked.into_alert(),
        }
    }

    pub async fn delete<G: Gateway>(
        &mut self,
        ctx: &mut AppContext,
        confirmation: Confirmation<Device>,
        gateway: &G,
    ) -> Option<Alert> {
        match self.begin_delete(confirmation) {
            Ok(change) => Some(self.run(ctx, gateway, change).await),
            Err(blocked) => blocked.into_alert(),
        }
    }
}
