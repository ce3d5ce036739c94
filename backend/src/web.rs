// keep in sync with request.rs of frontend
use std::sync::{Arc, Mutex, MutexGuard};

use actix_cors::Cors;
use actix_web::{
    delete, get,
    http::{header, StatusCode},
    middleware, patch, post, put,
    web::{self, Data},
    App, HttpResponse, HttpServer, ResponseError,
};
use common::req::{Device, DeviceUpdate, ErrorBody, SettingRecord};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use log::{debug, error};
use serde::Serialize;

use crate::{
    config::Config,
    db::{Db, DeviceFilter, SettingFilter, SettingPatch},
};

type SharedDb = web::Data<Arc<Mutex<Db>>>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("no matching row")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0} rows match, expected one")]
    Ambiguous(usize),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<DieselError>() {
            Some(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation,
                info,
            )) => ApiError::Conflict(info.message().to_owned()),
            _ => ApiError::Internal(err),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Ambiguous(_) => StatusCode::NOT_ACCEPTABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let code = match self {
            ApiError::NotFound => ErrorBody::NOT_FOUND,
            ApiError::Conflict(_) => ErrorBody::CONFLICT,
            ApiError::Ambiguous(_) => ErrorBody::AMBIGUOUS,
            ApiError::BadRequest(_) => ErrorBody::BAD_REQUEST,
            ApiError::Internal(err) => {
                error!("request failed: {err:#}");
                ErrorBody::INTERNAL
            }
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            code: code.to_owned(),
            message: self.to_string(),
        })
    }
}

type ApiResult = Result<HttpResponse, ApiError>;

fn lock(db: &SharedDb) -> Result<MutexGuard<'_, Db>, ApiError> {
    db.lock()
        .map_err(|_| ApiError::Internal(anyhow::anyhow!("database lock poisoned")))
}

fn exactly_one<T: Serialize>(mut rows: Vec<T>) -> ApiResult {
    match rows.len() {
        0 => Err(ApiError::NotFound),
        1 => Ok(HttpResponse::Ok().json(rows.remove(0))),
        n => Err(ApiError::Ambiguous(n)),
    }
}

fn changed(rows: usize) -> ApiResult {
    if rows == 0 {
        Err(ApiError::NotFound)
    } else {
        Ok(HttpResponse::NoContent().finish())
    }
}

fn require_filter(empty: bool) -> Result<(), ApiError> {
    if empty {
        Err(ApiError::BadRequest("refusing to touch every row, add a filter".to_owned()))
    } else {
        Ok(())
    }
}

fn check_scope(record: &SettingRecord) -> Result<(), ApiError> {
    match record.scope() {
        Some(_) => Ok(()),
        None => Err(ApiError::BadRequest(format!(
            "{} settings need a device_id",
            record.setting_type
        ))),
    }
}

// ===============================================
// devices
// ===============================================

#[get("/api/devices")]
async fn api_devices(query: web::Query<DeviceFilter>, db: SharedDb) -> ApiResult {
    let devices = lock(&db)?.devices(&query)?;
    Ok(HttpResponse::Ok().json(devices))
}

#[get("/api/devices/one")]
async fn api_device(query: web::Query<DeviceFilter>, db: SharedDb) -> ApiResult {
    exactly_one(lock(&db)?.devices(&query)?)
}

#[post("/api/devices")]
async fn api_insert_device(device: web::Json<Device>, db: SharedDb) -> ApiResult {
    debug!("insert device {}", device.id);
    lock(&db)?.insert_device(&device)?;
    Ok(HttpResponse::Created().finish())
}

#[put("/api/devices")]
async fn api_upsert_device(device: web::Json<Device>, db: SharedDb) -> ApiResult {
    lock(&db)?.upsert_device(&device)?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/api/devices")]
async fn api_update_devices(
    query: web::Query<DeviceFilter>,
    update: web::Json<DeviceUpdate>,
    db: SharedDb,
) -> ApiResult {
    require_filter(query.is_empty())?;
    changed(lock(&db)?.update_devices(&query, &update)?)
}

#[delete("/api/devices")]
async fn api_delete_devices(query: web::Query<DeviceFilter>, db: SharedDb) -> ApiResult {
    require_filter(query.is_empty())?;
    let removed = lock(&db)?.delete_devices(&query)?;
    debug!("deleted {removed} device(s)");
    Ok(HttpResponse::NoContent().finish())
}

// ===============================================
// settings
// ===============================================

#[get("/api/settings")]
async fn api_settings(query: web::Query<SettingFilter>, db: SharedDb) -> ApiResult {
    let settings = lock(&db)?.settings(&query)?;
    Ok(HttpResponse::Ok().json(settings))
}

#[get("/api/settings/one")]
async fn api_setting(query: web::Query<SettingFilter>, db: SharedDb) -> ApiResult {
    exactly_one(lock(&db)?.settings(&query)?)
}

#[post("/api/settings")]
async fn api_insert_setting(record: web::Json<SettingRecord>, db: SharedDb) -> ApiResult {
    check_scope(&record)?;
    lock(&db)?.insert_setting(&record)?;
    Ok(HttpResponse::Created().finish())
}

#[put("/api/settings")]
async fn api_upsert_setting(record: web::Json<SettingRecord>, db: SharedDb) -> ApiResult {
    check_scope(&record)?;
    debug!("upsert {} for {:?}", record.setting_type, record.scope());
    lock(&db)?.upsert_setting(&record)?;
    Ok(HttpResponse::NoContent().finish())
}

#[patch("/api/settings")]
async fn api_update_settings(
    query: web::Query<SettingFilter>,
    patch: web::Json<SettingPatch>,
    db: SharedDb,
) -> ApiResult {
    require_filter(query.is_empty())?;
    changed(lock(&db)?.update_settings(&query, &patch)?)
}

#[delete("/api/settings")]
async fn api_delete_settings(query: web::Query<SettingFilter>, db: SharedDb) -> ApiResult {
    require_filter(query.is_empty())?;
    lock(&db)?.delete_settings(&query)?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // unknown filter columns are refused instead of dropped
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into());

    cfg.app_data(query_config)
        .service(api_devices)
        .service(api_device)
        .service(api_insert_device)
        .service(api_upsert_device)
        .service(api_update_devices)
        .service(api_delete_devices)
        .service(api_settings)
        .service(api_setting)
        .service(api_insert_setting)
        .service(api_upsert_setting)
        .service(api_update_settings)
        .service(api_delete_settings);
}

pub async fn new_http_server(db: Arc<Mutex<Db>>, config: &Config) -> std::io::Result<()> {
    let cors_origin = config.cors_origin.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(Data::new(db.clone()))
            .configure(configure)
            .wrap(middleware::Logger::default())
            .wrap(
                Cors::default()
                    .allowed_origin(&cors_origin) // frontend
                    .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
                    .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT])
                    .allowed_header(header::CONTENT_TYPE)
                    .supports_credentials()
                    .max_age(3600),
            )
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
