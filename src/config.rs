use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use log::info;

/// Runtime configuration, read from the environment with logged defaults.
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub qr_dir: PathBuf,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("ATTENDANCE_PORT", "9001"),
            database_path: PathBuf::from(var_or("ATTENDANCE_DB", "attendance.db")),
            qr_dir: PathBuf::from(var_or("ATTENDANCE_QR_DIR", "qr")),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var_or(key, default)
        .parse()
        .map_err(|e| {
            log::warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
