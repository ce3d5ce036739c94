use std::str::FromStr;

use crate::schema::*;
use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use common::req::{Device, DeviceUpdate, SettingRecord, SettingType};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

const MIGRATION: &str =
    include_str!("../migrations/2024-05-01-000000_create_devices_settings/up.sql");

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = devices)]
#[diesel(treat_none_as_null = true)]
pub struct DeviceRow {
    pub id: String,
    pub user_id: String,
    pub device_name: String,
    pub device_location: Option<String>,
    pub is_online: bool,
    pub created_at: i64, // ms since epoch
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = devices)]
#[diesel(treat_none_as_null = true)]
struct DeviceChanges<'a> {
    device_name: &'a str,
    device_location: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = settings)]
pub struct SettingRow {
    pub id: i32,
    pub device_id: Option<String>,
    pub user_id: String,
    pub setting_type: String,
    pub setting_key: String,
    pub setting_value: String, // json
    pub updated_at: i64,       // ms since epoch
}

#[derive(Debug, Insertable)]
#[diesel(table_name = settings)]
struct NewSettingRow {
    device_id: Option<String>,
    user_id: String,
    setting_type: String,
    setting_key: String,
    setting_value: String,
    updated_at: i64,
}

impl From<&Device> for DeviceRow {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.to_string(),
            user_id: d.user_id.to_string(),
            device_name: d.device_name.clone(),
            device_location: d.device_location.clone(),
            is_online: d.is_online,
            created_at: d.created_at.timestamp_millis(),
        }
    }
}

impl TryFrom<DeviceRow> for Device {
    type Error = anyhow::Error;

    fn try_from(row: DeviceRow) -> Result<Self> {
        Ok(Device {
            id: Uuid::parse_str(&row.id)?,
            user_id: Uuid::parse_str(&row.user_id)?,
            device_name: row.device_name,
            device_location: row.device_location,
            is_online: row.is_online,
            created_at: Utc
                .timestamp_millis_opt(row.created_at)
                .single()
                .with_context(|| format!("bad created_at {}", row.created_at))?,
        })
    }
}

impl TryFrom<SettingRow> for SettingRecord {
    type Error = anyhow::Error;

    fn try_from(row: SettingRow) -> Result<Self> {
        Ok(SettingRecord {
            device_id: row.device_id.as_deref().map(Uuid::parse_str).transpose()?,
            user_id: Uuid::parse_str(&row.user_id)?,
            setting_type: SettingType::from_str(&row.setting_type)?,
            setting_key: row.setting_key,
            setting_value: serde_json::from_str(&row.setting_value)?,
        })
    }
}

impl NewSettingRow {
    fn new(rec: &SettingRecord) -> Result<Self> {
        Ok(Self {
            device_id: rec.device_id.map(|id| id.to_string()),
            user_id: rec.user_id.to_string(),
            setting_type: rec.setting_type.as_ref().to_owned(),
            setting_key: rec.setting_key.clone(),
            setting_value: serde_json::to_string(&rec.setting_value)?,
            updated_at: Utc::now().timestamp_millis(),
        })
    }
}

/// Equality filters on `devices`, all optional.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceFilter {
    pub id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl DeviceFilter {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.user_id.is_none()
    }
}

/// Equality filters on `settings`, all optional.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingFilter {
    pub device_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub setting_type: Option<SettingType>,
    pub setting_key: Option<String>,
}

impl SettingFilter {
    pub fn is_empty(&self) -> bool {
        self.device_id.is_none()
            && self.user_id.is_none()
            && self.setting_type.is_none()
            && self.setting_key.is_none()
    }
}

/// Partial update of settings rows. Only the value is mutable, the rest is key.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SettingPatch {
    pub setting_value: serde_json::Value,
}

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    /// Open (or create) the database at `database_url` and apply the schema.
    pub fn connect(database_url: &str) -> Result<Self> {
        let mut conn = SqliteConnection::establish(database_url)
            .with_context(|| format!("cannot open database {database_url}"))?;
        conn.batch_execute("PRAGMA foreign_keys = ON;")?;
        conn.batch_execute(MIGRATION)?;

        Ok(Self { conn })
    }

    // ===============================================
    // devices
    // ===============================================

    fn device_ids(&mut self, filter: &DeviceFilter) -> Result<Vec<String>> {
        let mut query = devices::table.select(devices::id).into_boxed();
        if let Some(id) = filter.id {
            query = query.filter(devices::id.eq(id.to_string()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(devices::user_id.eq(user_id.to_string()));
        }
        Ok(query.load::<String>(&mut self.conn)?)
    }

    pub fn devices(&mut self, filter: &DeviceFilter) -> Result<Vec<Device>> {
        let mut query = devices::table
            .select(DeviceRow::as_select())
            .order(devices::created_at.desc())
            .into_boxed();
        if let Some(id) = filter.id {
            query = query.filter(devices::id.eq(id.to_string()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(devices::user_id.eq(user_id.to_string()));
        }

        query
            .load::<DeviceRow>(&mut self.conn)?
            .into_iter()
            .map(Device::try_from)
            .collect()
    }

    pub fn insert_device(&mut self, device: &Device) -> Result<()> {
        diesel::insert_into(devices::table)
            .values(DeviceRow::from(device))
            .execute(&mut self.conn)?;

        Ok(())
    }

    pub fn upsert_device(&mut self, device: &Device) -> Result<()> {
        let row = DeviceRow::from(device);
        diesel::insert_into(devices::table)
            .values(&row)
            .on_conflict(devices::id)
            .do_update()
            .set(&row)
            .execute(&mut self.conn)?;

        Ok(())
    }

    /// Returns the number of rows changed.
    pub fn update_devices(&mut self, filter: &DeviceFilter, update: &DeviceUpdate) -> Result<usize> {
        let ids = self.device_ids(filter)?;
        let changes = DeviceChanges {
            device_name: &update.device_name,
            device_location: update.device_location.as_deref(),
        };
        Ok(diesel::update(devices::table.filter(devices::id.eq_any(ids)))
            .set(&changes)
            .execute(&mut self.conn)?)
    }

    /// Settings of the deleted devices go with them.
    pub fn delete_devices(&mut self, filter: &DeviceFilter) -> Result<usize> {
        let ids = self.device_ids(filter)?;
        Ok(diesel::delete(devices::table.filter(devices::id.eq_any(ids))).execute(&mut self.conn)?)
    }

    // ===============================================
    // settings
    // ===============================================

    fn setting_query(filter: &SettingFilter) -> settings::BoxedQuery<'static, diesel::sqlite::Sqlite> {
        let mut query = settings::table.into_boxed();
        if let Some(device_id) = filter.device_id {
            query = query.filter(settings::device_id.eq(device_id.to_string()));
        }
        if let Some(user_id) = filter.user_id {
            query = query.filter(settings::user_id.eq(user_id.to_string()));
        }
        if let Some(setting_type) = filter.setting_type {
            query = query.filter(settings::setting_type.eq(setting_type.as_ref().to_owned()));
        }
        if let Some(setting_key) = &filter.setting_key {
            query = query.filter(settings::setting_key.eq(setting_key.clone()));
        }
        query
    }

    fn setting_ids(&mut self, filter: &SettingFilter) -> Result<Vec<i32>> {
        Ok(Self::setting_query(filter)
            .select(settings::id)
            .load::<i32>(&mut self.conn)?)
    }

    pub fn settings(&mut self, filter: &SettingFilter) -> Result<Vec<SettingRecord>> {
        Self::setting_query(filter)
            .order(settings::id.asc())
            .select(SettingRow::as_select())
            .load::<SettingRow>(&mut self.conn)?
            .into_iter()
            .map(SettingRecord::try_from)
            .collect()
    }

    pub fn insert_setting(&mut self, record: &SettingRecord) -> Result<()> {
        let row = NewSettingRow::new(record)?;
        self.conn.transaction(|conn| {
            if Self::existing_setting(conn, &row)?.is_some() {
                return Err(diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    Box::new(format!("setting {} already exists", row.setting_key)),
                ));
            }
            diesel::insert_into(settings::table).values(&row).execute(conn)?;
            Ok(())
        })?;

        Ok(())
    }

    /// Replace the row with the same (device or user, type, key), or insert it.
    pub fn upsert_setting(&mut self, record: &SettingRecord) -> Result<()> {
        let row = NewSettingRow::new(record)?;
        self.conn.transaction(|conn| {
            match Self::existing_setting(conn, &row)? {
                Some(id) => {
                    diesel::update(settings::table.find(id))
                        .set((
                            settings::setting_value.eq(&row.setting_value),
                            settings::updated_at.eq(row.updated_at),
                        ))
                        .execute(conn)?;
                }
                None => {
                    diesel::insert_into(settings::table).values(&row).execute(conn)?;
                }
            }
            Ok::<_, diesel::result::Error>(())
        })?;

        Ok(())
    }

    // SQLite treats NULLs as distinct in unique indexes, so the natural key is
    // looked up by hand instead of relying on ON CONFLICT.
    fn existing_setting(conn: &mut SqliteConnection, row: &NewSettingRow) -> QueryResult<Option<i32>> {
        let mut query = settings::table
            .select(settings::id)
            .filter(settings::user_id.eq(&row.user_id))
            .filter(settings::setting_type.eq(&row.setting_type))
            .filter(settings::setting_key.eq(&row.setting_key))
            .into_boxed();
        query = match &row.device_id {
            Some(device_id) => query.filter(settings::device_id.eq(device_id.clone())),
            None => query.filter(settings::device_id.is_null()),
        };
        query.first::<i32>(conn).optional()
    }

    pub fn update_settings(&mut self, filter: &SettingFilter, patch: &SettingPatch) -> Result<usize> {
        let ids = self.setting_ids(filter)?;
        let value = serde_json::to_string(&patch.setting_value)?;
        Ok(diesel::update(settings::table.filter(settings::id.eq_any(ids)))
            .set((
                settings::setting_value.eq(value),
                settings::updated_at.eq(Utc::now().timestamp_millis()),
            ))
            .execute(&mut self.conn)?)
    }

    pub fn delete_settings(&mut self, filter: &SettingFilter) -> Result<usize> {
        let ids = self.setting_ids(filter)?;
        Ok(diesel::delete(settings::table.filter(settings::id.eq_any(ids))).execute(&mut self.conn)?)
    }
}
