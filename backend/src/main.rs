use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::info;

mod config;
mod db;
mod schema;
mod web;

#[actix_web::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::Config::from_env()?;
    let db = Arc::new(Mutex::new(db::Db::connect(&config.database_url)?));

    info!(
        "serving {} on {}:{}",
        config.database_url, config.bind_address, config.port
    );
    web::new_http_server(db, &config).await?;
    Ok(())
}
