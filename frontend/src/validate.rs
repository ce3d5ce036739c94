//! Form validation. Pure functions, no I/O.

use common::settings::{CalibrationSettings, ThresholdSettings};

use crate::settings::{CalibrationForm, ThresholdForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensor {
    Ph,
    Tds,
    Turbidity,
    Temperature,
    WaterLevel,
}

impl Sensor {
    pub fn key(&self) -> &'static str {
        match self {
            Sensor::Ph => "ph",
            Sensor::Tds => "tds",
            Sensor::Turbidity => "turbidity",
            Sensor::Temperature => "temperature",
            Sensor::WaterLevel => "water_level",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Sensor::Ph => "pH",
            Sensor::Tds => "TDS",
            Sensor::Turbidity => "Turbidity",
            Sensor::Temperature => "Temperature",
            Sensor::WaterLevel => "Water level",
        }
    }

    fn bounds_message(&self) -> &'static str {
        match self {
            Sensor::Ph => "pH values must be between 0 and 14",
            Sensor::Turbidity => "Turbidity maximum cannot be negative",
            Sensor::WaterLevel => "Water level minimum must be between 0 and 100",
            Sensor::Tds | Sensor::Temperature => "value out of range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be a valid number")]
    InvalidNumber { field: &'static str },
    #[error("{} minimum must be less than maximum", .0.label())]
    InvalidRange(Sensor),
    #[error("{}", .0.bounds_message())]
    OutOfBounds(Sensor),
}

fn number(field: &'static str, text: &str) -> Result<f64, ValidationError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or(ValidationError::InvalidNumber { field })
}

fn parse_thresholds(form: &ThresholdForm) -> Result<ThresholdSettings, Vec<ValidationError>> {
    let fields = [
        ("ph_min", &form.ph_min),
        ("ph_max", &form.ph_max),
        ("tds_min", &form.tds_min),
        ("tds_max", &form.tds_max),
        ("turbidity_max", &form.turbidity_max),
        ("temperature_max", &form.temperature_max),
        ("water_level_min", &form.water_level_min),
    ];
    let mut values = [0.0; 7];
    let mut errors = Vec::new();
    for (slot, (field, text)) in values.iter_mut().zip(fields) {
        match number(field, text) {
            Ok(v) => *slot = v,
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let [ph_min, ph_max, tds_min, tds_max, turbidity_max, temperature_max, water_level_min] = values;
    Ok(ThresholdSettings {
        ph_min,
        ph_max,
        tds_min,
        tds_max,
        turbidity_max,
        temperature_max,
        water_level_min,
    })
}

/// Constraint violations of a parsed bundle, ordering checks first.
fn threshold_violations(t: &ThresholdSettings) -> impl Iterator<Item = ValidationError> {
    [
        (t.ph_min >= t.ph_max).then_some(ValidationError::InvalidRange(Sensor::Ph)),
        (t.tds_min >= t.tds_max).then_some(ValidationError::InvalidRange(Sensor::Tds)),
        (t.ph_min < 0.0 || t.ph_min > 14.0 || t.ph_max > 14.0)
            .then_some(ValidationError::OutOfBounds(Sensor::Ph)),
        (t.turbidity_max < 0.0).then_some(ValidationError::OutOfBounds(Sensor::Turbidity)),
        (!(0.0..=100.0).contains(&t.water_level_min))
            .then_some(ValidationError::OutOfBounds(Sensor::WaterLevel)),
    ]
    .into_iter()
    .flatten()
}

/// Parse and check a threshold form, stopping at the first problem.
pub fn thresholds(form: &ThresholdForm) -> Result<ThresholdSettings, ValidationError> {
    let parsed = parse_thresholds(form).map_err(|mut errors| errors.remove(0))?;
    match threshold_violations(&parsed).next() {
        Some(err) => Err(err),
        None => Ok(parsed),
    }
}

/// Every problem of a threshold form, in the order [`thresholds`] would
/// report them. Empty when the form is valid.
pub fn threshold_problems(form: &ThresholdForm) -> Vec<ValidationError> {
    match parse_thresholds(form) {
        Ok(parsed) => threshold_violations(&parsed).collect(),
        Err(errors) => errors,
    }
}

pub fn calibration(form: &CalibrationForm) -> Result<CalibrationSettings, ValidationError> {
    Ok(CalibrationSettings {
        ph_offset: number("ph_offset", &form.ph_offset)?,
        tds_multiplier: number("tds_multiplier", &form.tds_multiplier)?,
        turbidity_offset: number("turbidity_offset", &form.turbidity_offset)?,
    })
}

// ===============================================
// password change
// ===============================================

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordForm {
    pub current: String,
    pub new: String,
    pub confirm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("Please fill in all fields")]
    MissingFields,
    #[error("{0}")]
    Weak(&'static str),
    #[error("New passwords do not match")]
    Mismatch,
    #[error("New password must be different from current password")]
    Unchanged,
}

/// Acceptance rule for a new password.
pub fn password(candidate: &str) -> Result<(), PasswordError> {
    if candidate.chars().count() < MIN_PASSWORD_LEN {
        return Err(PasswordError::Weak("Password must be at least 8 characters long"));
    }
    if !candidate.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordError::Weak("Password must contain a lowercase letter"));
    }
    if !candidate.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordError::Weak("Password must contain an uppercase letter"));
    }
    if !candidate.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordError::Weak("Password must contain a number"));
    }
    Ok(())
}

/// Checks a password change form. The current password is only compared with
/// the new one, it is not verified against the stored credential.
pub fn password_change(form: &PasswordForm) -> Result<(), PasswordError> {
    if form.current.is_empty() || form.new.is_empty() || form.confirm.is_empty() {
        return Err(PasswordError::MissingFields);
    }
    password(&form.new)?;
    if form.new != form.confirm {
        return Err(PasswordError::Mismatch);
    }
    if form.current == form.new {
        return Err(PasswordError::Unchanged);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrengthLevel {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordStrength {
    pub score: u8,
    pub level: StrengthLevel,
}

pub fn password_strength(candidate: &str) -> PasswordStrength {
    let len = candidate.chars().count();
    let has = |f: fn(char) -> bool| candidate.chars().any(f);
    let score = [
        len >= 8,
        len >= 12,
        has(|c| c.is_ascii_lowercase()) && has(|c| c.is_ascii_uppercase()),
        has(|c| c.is_ascii_digit()),
        has(|c| !c.is_ascii_alphanumeric()),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count() as u8;

    let level = match score {
        0..=2 => StrengthLevel::Weak,
        3 => StrengthLevel::Medium,
        _ => StrengthLevel::Strong,
    };
    PasswordStrength { score, level }
}
