use common::req::{Scope, ScopeKind, SettingRecord, SettingType};
use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    alert::{Alert, Blocked, Confirmation},
    context::AppContext,
    gateway::{Fetch, Filter, Gateway, GatewayError, Table},
    settings::SettingsBundle,
    validate::ValidationError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Ready,
    LoadFailed,
    Saving,
    SaveSucceeded,
    SaveFailed,
    /// Device-scoped screen without a selected device.
    NoDeviceSelected,
    /// User-scoped screen without a signed-in user.
    SignedOut,
}

/// A fetch the controller is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    scope: Scope,
    setting_type: SettingType,
    generation: u64,
}

impl LoadTicket {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Selects the bundle's row in the `settings` table.
    pub fn filter(&self) -> Filter {
        let filter = match self.scope {
            Scope::Device { device_id, .. } => Filter::new().eq("device_id", device_id),
            Scope::User { user_id } => Filter::new().eq("user_id", user_id),
        };
        filter.eq("setting_type", self.setting_type)
    }
}

/// An upsert the controller is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub record: Value,
}

/// Load/edit/save cycle of one settings screen.
///
/// Every step comes as a synchronous `begin`/`complete` pair so a UI can
/// disable its controls in between, plus an async method that drives a
/// [`Gateway`] through both halves. Only one fetch or upsert is outstanding at
/// a time; requests made meanwhile are refused without side effects.
#[derive(Debug, Clone)]
pub struct SettingsController<T: SettingsBundle> {
    phase: Phase,
    form: T::Form,
    scope: Option<Scope>,
    generation: u64,
    /// The context moved on while a save was outstanding.
    reload_pending: bool,
}

impl<T: SettingsBundle> Default for SettingsController<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SettingsBundle> SettingsController<T> {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            form: T::default().to_form(),
            scope: None,
            generation: 0,
            reload_pending: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn form(&self) -> &T::Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut T::Form {
        &mut self.form
    }

    pub fn scope(&self) -> Option<Scope> {
        self.scope
    }

    /// A fetch or upsert is outstanding, the save control should be disabled.
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Loading | Phase::Saving)
    }

    /// The form belongs to a device or user the context no longer points at.
    /// Call [`Self::begin_load`] again once the save alert is dismissed.
    pub fn needs_reload(&self) -> bool {
        self.reload_pending
    }

    /// Whether the form would pass validation right now.
    pub fn is_valid(&self) -> bool {
        T::from_form(&self.form).is_ok()
    }

    /// Every validation problem of the current form, for inline display.
    pub fn problems(&self) -> Vec<ValidationError> {
        T::problems(&self.form)
    }

    /// Start loading for whatever `ctx` currently points at.
    ///
    /// Returns `None` when there is nothing to fetch: no device/user (the
    /// controller parks in `NoDeviceSelected`/`SignedOut`), a save is
    /// outstanding, or the same scope is already loading. A load for a
    /// different scope supersedes one still in flight. A scope change during
    /// a save is remembered, see [`Self::needs_reload`].
    pub fn begin_load(&mut self, ctx: &AppContext) -> Option<LoadTicket> {
        let kind = T::SETTING_TYPE.scope_kind();
        let current = ctx.scope(kind);
        if self.phase == Phase::Saving {
            if current != self.scope {
                debug!("{} scope changed during save, reload deferred", T::NOUN);
                self.reload_pending = true;
            }
            return None;
        }
        self.reload_pending = false;

        let Some(scope) = current else {
            self.scope = None;
            self.form = T::default().to_form();
            self.phase = match kind {
                ScopeKind::Device => Phase::NoDeviceSelected,
                ScopeKind::User => Phase::SignedOut,
            };
            return None;
        };

        if self.phase == Phase::Loading && self.scope == Some(scope) {
            return None;
        }

        self.generation += 1;
        self.scope = Some(scope);
        self.phase = Phase::Loading;
        debug!("loading {} for {:?}", T::NOUN, scope);
        Some(LoadTicket {
            scope,
            setting_type: T::SETTING_TYPE,
            generation: self.generation,
        })
    }

    /// Apply the outcome of a fetch. "Not found" means the bundle was never
    /// saved and resets the form to defaults silently.
    pub fn complete_load(&mut self, ticket: LoadTicket, fetched: Fetch<Value>) -> Option<Alert> {
        if self.phase != Phase::Loading || ticket.generation != self.generation {
            debug!("discarding stale {} load", T::NOUN);
            return None;
        }

        match fetched.map(decode::<T>) {
            Fetch::Found(Ok(bundle)) => {
                self.form = bundle.to_form();
                self.phase = Phase::Ready;
                None
            }
            Fetch::NotFound => {
                self.form = T::default().to_form();
                self.phase = Phase::Ready;
                None
            }
            Fetch::Found(Err(err)) | Fetch::Error(err) => {
                warn!("loading {} failed: {err}", T::NOUN);
                self.form = T::default().to_form();
                self.phase = Phase::LoadFailed;
                Some(Alert::failure(&err, &format!("Failed to load {}", T::NOUN)))
            }
        }
    }

    /// Validate the form and start an upsert of the whole bundle.
    pub fn request_save(&mut self) -> Result<PendingSave, Blocked> {
        match self.phase {
            Phase::Loading | Phase::Saving => return Err(Blocked::InFlight),
            _ if self.reload_pending => return Err(Blocked::NotReady),
            Phase::Idle => return Err(Blocked::NotReady),
            Phase::NoDeviceSelected => {
                return Err(Blocked::Rejected(Alert::error("No device selected")))
            }
            Phase::SignedOut => return Err(Blocked::Rejected(Alert::error("User not logged in"))),
            Phase::Ready | Phase::LoadFailed | Phase::SaveSucceeded | Phase::SaveFailed => {}
        }
        let Some(scope) = self.scope else {
            return Err(Blocked::NotReady);
        };

        let bundle = T::from_form(&self.form)
            .map_err(|err| Blocked::Rejected(Alert::validation(err.to_string())))?;
        let record = serde_json::to_value(&bundle)
            .and_then(|value| serde_json::to_value(SettingRecord::new(scope, T::SETTING_TYPE, value)))
            .map_err(|err| Blocked::Rejected(Alert::failure(&err, &format!("Failed to save {}", T::NOUN))))?;

        self.phase = Phase::Saving;
        Ok(PendingSave { record })
    }

    /// Apply the outcome of an upsert. The controller stays in
    /// `SaveSucceeded`/`SaveFailed` until [`Self::dismiss`].
    pub fn complete_save(&mut self, result: Result<(), GatewayError>) -> Option<Alert> {
        if self.phase != Phase::Saving {
            return None;
        }
        match result {
            Ok(()) => {
                info!("saved {} for {:?}", T::NOUN, self.scope);
                self.phase = Phase::SaveSucceeded;
                Some(Alert::success(T::SAVED_MESSAGE))
            }
            Err(err) => {
                warn!("saving {} failed: {err}", T::NOUN);
                self.phase = Phase::SaveFailed;
                Some(Alert::failure(&err, &format!("Failed to save {}", T::NOUN)))
            }
        }
    }

    /// The user acknowledged the save alert. With a reload pending the
    /// controller drops back to `Idle` until the next [`Self::begin_load`].
    pub fn dismiss(&mut self) {
        if matches!(self.phase, Phase::SaveSucceeded | Phase::SaveFailed) {
            self.phase = if self.reload_pending {
                Phase::Idle
            } else {
                Phase::Ready
            };
        }
    }

    pub fn request_reset(&self) -> Confirmation<()> {
        Confirmation {
            title: "Reset to Defaults".to_owned(),
            prompt: format!("Are you sure you want to reset all {} to default values?", T::NOUN),
            subject: (),
        }
    }

    /// Put the defaults into the form. Nothing is stored until the next save.
    pub fn confirm_reset(&mut self, _confirmation: Confirmation<()>) {
        self.form = T::default().to_form();
    }

    pub async fn load<G: Gateway>(&mut self, ctx: &AppContext, gateway: &G) -> Option<Alert> {
        let ticket = self.begin_load(ctx)?;
        let fetched = gateway.fetch_one(Table::Settings, &ticket.filter()).await;
        self.complete_load(ticket, fetched)
    }

    pub async fn save<G: Gateway>(&mut self, gateway: &G) -> Option<Alert> {
        match self.request_save() {
            Ok(pending) => {
                let result = gateway.upsert(Table::Settings, pending.record).await;
                self.complete_save(result)
            }
            Err(blocked) => blocked.into_alert(),
        }
    }
}

fn decode<T: SettingsBundle>(row: Value) -> Result<T, GatewayError> {
    let record: SettingRecord = serde_json::from_value(row)?;
    Ok(serde_json::from_value(record.setting_value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alert::Severity,
        context::fixtures,
        gateway::MemoryGateway,
        settings::ThresholdForm,
    };
    use common::settings::{AlertPreferences, CalibrationSettings, ThresholdSettings};
    use serde_json::json;

    type Thresholds = SettingsController<ThresholdSettings>;

    fn stored(gw: &MemoryGateway) -> Vec<SettingRecord> {
        gw.rows(Table::Settings)
            .into_iter()
            .map(|row| serde_json::from_value(row).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn missing_row_loads_defaults_without_alert() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let mut screen = Thresholds::new();
        screen.form_mut().ph_min = "1".to_owned();

        assert_eq!(screen.load(&ctx, &gw).await, None);
        assert_eq!(screen.phase(), Phase::Ready);
        assert_eq!(screen.form(), &ThresholdForm::from(&ThresholdSettings::default()));
    }

    #[tokio::test]
    async fn stored_bundle_fills_form() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let scope = ctx.scope(ScopeKind::Device).unwrap();
        let saved = ThresholdSettings {
            ph_min: 7.0,
            water_level_min: 35.0,
            ..Default::default()
        };
        let record = SettingRecord::new(scope, SettingType::Thresholds, serde_json::to_value(saved).unwrap());
        gw.upsert(Table::Settings, serde_json::to_value(record).unwrap()).await.unwrap();

        let mut screen = Thresholds::new();
        assert_eq!(screen.load(&ctx, &gw).await, None);
        assert_eq!(screen.form().ph_min, "7");
        assert_eq!(screen.form().water_level_min, "35");
    }

    #[tokio::test]
    async fn fetch_error_reports_and_keeps_screen_usable() {
        let gw = MemoryGateway::new();
        gw.set_failure(Some(GatewayError::Transport("network down".into())));
        let ctx = fixtures::with_device();
        let mut screen = Thresholds::new();

        let alert = screen.load(&ctx, &gw).await.unwrap();
        assert_eq!(alert.severity, Severity::Error);
        assert_eq!(alert.message, "network down");
        assert_eq!(screen.phase(), Phase::LoadFailed);

        gw.set_failure(None);
        let alert = screen.save(&gw).await.unwrap();
        assert_eq!(alert, Alert::success("Threshold settings saved successfully"));
        assert_eq!(stored(&gw).len(), 1);
    }

    #[tokio::test]
    async fn undecodable_row_is_a_load_failure() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let scope = ctx.scope(ScopeKind::Device).unwrap();
        let record = SettingRecord::new(scope, SettingType::Thresholds, json!({ "ph_min": "seven" }));
        gw.upsert(Table::Settings, serde_json::to_value(record).unwrap()).await.unwrap();

        let mut screen = Thresholds::new();
        assert!(screen.load(&ctx, &gw).await.is_some());
        assert_eq!(screen.phase(), Phase::LoadFailed);
        assert_eq!(screen.form(), &ThresholdForm::from(&ThresholdSettings::default()));
    }

    #[tokio::test]
    async fn no_device_bypasses_gateway() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::signed_in();
        let mut screen = Thresholds::new();

        assert_eq!(screen.load(&ctx, &gw).await, None);
        assert_eq!(screen.phase(), Phase::NoDeviceSelected);
        assert_eq!(screen.save(&gw).await, Some(Alert::error("No device selected")));
        assert_eq!(gw.calls(), 0);
    }

    #[tokio::test]
    async fn user_screens_need_a_user() {
        let gw = MemoryGateway::new();
        let mut screen = SettingsController::<AlertPreferences>::new();
        assert_eq!(screen.load(&AppContext::new(), &gw).await, None);
        assert_eq!(screen.phase(), Phase::SignedOut);
        assert_eq!(screen.save(&gw).await, Some(Alert::error("User not logged in")));
        assert_eq!(gw.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_form_never_reaches_gateway() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let mut screen = Thresholds::new();
        screen.load(&ctx, &gw).await;
        let calls = gw.calls();

        screen.form_mut().ph_min = "9".to_owned();
        let alert = screen.save(&gw).await.unwrap();
        assert_eq!(alert, Alert::validation("pH minimum must be less than maximum"));
        assert_eq!(screen.phase(), Phase::Ready);
        assert_eq!(gw.calls(), calls);
    }

    #[tokio::test]
    async fn save_writes_whole_bundle_under_device_key() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let device = ctx.selected_device().cloned().unwrap();
        let mut screen = Thresholds::new();
        screen.load(&ctx, &gw).await;

        screen.form_mut().tds_max = "750".to_owned();
        screen.save(&gw).await;
        assert_eq!(screen.phase(), Phase::SaveSucceeded);
        screen.dismiss();
        assert_eq!(screen.phase(), Phase::Ready);

        screen.form_mut().tds_max = "800".to_owned();
        screen.save(&gw).await;

        let rows = stored(&gw);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.device_id, Some(device.id));
        assert_eq!(row.user_id, device.user_id);
        assert_eq!(row.setting_key, "sensor_thresholds");
        let value: ThresholdSettings = serde_json::from_value(row.setting_value.clone()).unwrap();
        assert_eq!(
            value,
            ThresholdSettings {
                tds_max: 800.0,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn save_while_saving_is_a_no_op() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let mut screen = SettingsController::<CalibrationSettings>::new();
        screen.load(&ctx, &gw).await;

        let pending = screen.request_save().unwrap();
        assert!(screen.is_busy());
        assert_eq!(screen.request_save(), Err(Blocked::InFlight));
        assert_eq!(screen.save(&gw).await, None);
        assert!(stored(&gw).is_empty());

        let result = gw.upsert(Table::Settings, pending.record).await;
        assert_eq!(screen.complete_save(result), Some(Alert::success("Calibration settings saved")));
        assert_eq!(stored(&gw).len(), 1);
    }

    #[tokio::test]
    async fn save_failure_is_shown_verbatim() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let mut screen = Thresholds::new();
        screen.load(&ctx, &gw).await;

        gw.set_failure(Some(GatewayError::rejected(403, "forbidden", "permission denied")));
        assert_eq!(screen.save(&gw).await, Some(Alert::error("permission denied")));
        assert_eq!(screen.phase(), Phase::SaveFailed);
    }

    #[test]
    fn device_change_supersedes_inflight_load() {
        let gw = MemoryGateway::new();
        let mut ctx = fixtures::with_device();
        let mut screen = Thresholds::new();

        let first = screen.begin_load(&ctx).unwrap();
        assert_eq!(screen.begin_load(&ctx), None);

        let owner = ctx.user().unwrap().id;
        ctx.select_device(common::req::Device::new(owner, "Cellar tank", None));
        let second = screen.begin_load(&ctx).unwrap();
        assert_ne!(first.scope(), second.scope());

        let stale = Fetch::Error(GatewayError::Transport("late".into()));
        assert_eq!(screen.complete_load(first, stale), None);
        assert_eq!(screen.phase(), Phase::Loading);

        assert_eq!(screen.complete_load(second, Fetch::NotFound), None);
        assert_eq!(screen.phase(), Phase::Ready);
        assert_eq!(screen.scope(), ctx.scope(ScopeKind::Device));
        assert_eq!(gw.calls(), 0);
    }

    #[tokio::test]
    async fn user_scoped_bundles_are_keyed_by_user() {
        let gw = MemoryGateway::new();
        let ctx = fixtures::with_device();
        let mut screen = SettingsController::<AlertPreferences>::new();
        screen.load(&ctx, &gw).await;

        screen.form_mut().email_notifications = true;
        screen.save(&gw).await;

        let rows = stored(&gw);
        assert_eq!(rows[0].device_id, None);
        assert_eq!(rows[0].user_id, ctx.user().unwrap().id);
        assert_eq!(rows[0].setting_type, SettingType::AlertPreferences);

        let mut again = SettingsController::<AlertPreferences>::new();
        again.load(&ctx, &gw).await;
        assert!(again.form().email_notifications);
    }

    #[test]
    fn reset_restores_defaults_after_confirmation() {
        let mut screen = Thresholds::new();
        screen.form_mut().ph_max = "9".to_owned();
        let confirmation = screen.request_reset();
        assert!(confirmation.prompt.contains("thresholds"));
        screen.confirm_reset(confirmation);
        assert_eq!(screen.form().ph_max, "8.5");
    }

    #[tokio::test]
    async fn device_switch_during_save_forces_reload() {
        let gw = MemoryGateway::new();
        let mut ctx = fixtures::with_device();
        let first = ctx.selected_device().cloned().unwrap();
        let mut screen = Thresholds::new();
        screen.load(&ctx, &gw).await;

        let pending = screen.request_save().unwrap();
        let owner = ctx.user().unwrap().id;
        let second = common::req::Device::new(owner, "Cellar tank", None);
        assert!(ctx.select_device(second.clone()));
        assert_eq!(screen.begin_load(&ctx), None);
        assert!(screen.needs_reload());
        assert_eq!(screen.phase(), Phase::Saving);

        let result = gw.upsert(Table::Settings, pending.record).await;
        assert_eq!(
            screen.complete_save(result),
            Some(Alert::success("Threshold settings saved successfully"))
        );
        screen.dismiss();
        assert_eq!(screen.phase(), Phase::Idle);

        // the old device's form must not be written anywhere
        screen.form_mut().ph_min = "5".to_owned();
        assert_eq!(screen.request_save(), Err(Blocked::NotReady));

        assert_eq!(screen.load(&ctx, &gw).await, None);
        assert!(!screen.needs_reload());
        assert_eq!(screen.scope().and_then(|s| s.device_id()), Some(second.id));
        screen.form_mut().ph_min = "5".to_owned();
        screen.save(&gw).await;

        let rows = stored(&gw);
        assert_eq!(rows.len(), 2);
        let ph_min = |device_id| {
            let row = rows.iter().find(|r| r.device_id == Some(device_id)).unwrap();
            serde_json::from_value::<ThresholdSettings>(row.setting_value.clone())
                .unwrap()
                .ph_min
        };
        assert_eq!(ph_min(first.id), 6.5);
        assert_eq!(ph_min(second.id), 5.0);
    }

    #[tokio::test]
    async fn sign_out_during_save_still_reports_result() {
        let gw = MemoryGateway::new();
        let mut ctx = fixtures::with_device();
        let mut screen = Thresholds::new();
        screen.load(&ctx, &gw).await;

        let pending = screen.request_save().unwrap();
        ctx.sign_out();
        assert_eq!(screen.begin_load(&ctx), None);
        assert_eq!(screen.phase(), Phase::Saving);
        assert!(screen.is_busy());

        let result = gw.upsert(Table::Settings, pending.record).await;
        assert_eq!(
            screen.complete_save(result),
            Some(Alert::success("Threshold settings saved successfully"))
        );
        assert_eq!(stored(&gw).len(), 1);

        screen.dismiss();
        assert_eq!(screen.begin_load(&ctx), None);
        assert_eq!(screen.phase(), Phase::NoDeviceSelected);
    }

    #[test]
    fn validity_tracks_form_edits() {
        let mut screen = Thresholds::new();
        assert!(screen.is_valid());
        assert!(screen.problems().is_empty());

        screen.form_mut().tds_min = "900".to_owned();
        screen.form_mut().ph_max = "x".to_owned();
        assert!(!screen.is_valid());
        assert_eq!(
            screen.problems(),
            vec![ValidationError::InvalidNumber { field: "ph_max" }]
        );

        screen.form_mut().ph_max = "8".to_owned();
        assert_eq!(
            screen.problems(),
            vec![ValidationError::InvalidRange(crate::validate::Sensor::Tds)]
        );
    }

    #[test]
    fn save_before_load_is_ignored() {
        let mut screen = Thresholds::new();
        assert_eq!(screen.request_save(), Err(Blocked::NotReady));
        assert_eq!(screen.phase(), Phase::Idle);
    }
}
