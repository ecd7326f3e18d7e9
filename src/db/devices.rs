//! Device token registry
//!
//! Uniqueness is the (address, token, platform) triple. The dispatcher never
//! caches this table; every push looks the devices up again.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{HeraldError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ios => "ios",
            Self::Android => "android",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = HeraldError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Self::Ios),
            "android" => Ok(Self::Android),
            "web" => Ok(Self::Web),
            other => Err(HeraldError::BadRequest(format!("unknown platform: {}", other))),
        }
    }
}

/// A registered push target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub address: String,
    pub token: String,
    pub platform: Platform,
}

/// Register a device; returns false if the triple already existed
pub fn register_device(conn: &Connection, device: &Device) -> Result<bool> {
    let rows = conn
        .execute(
            "INSERT OR IGNORE INTO device_tokens (address, token, platform) VALUES (?, ?, ?)",
            params![device.address, device.token, device.platform.as_str()],
        )
        .map_err(|e| HeraldError::Database(format!("Failed to register device: {}", e)))?;
    Ok(rows > 0)
}

/// Remove a device; returns false if it was not registered
pub fn unregister_device(conn: &Connection, device: &Device) -> Result<bool> {
    let rows = conn
        .execute(
            "DELETE FROM device_tokens WHERE address = ? AND token = ? AND platform = ?",
            params![device.address, device.token, device.platform.as_str()],
        )
        .map_err(|e| HeraldError::Database(format!("Failed to unregister device: {}", e)))?;
    Ok(rows > 0)
}

/// All devices registered for an address
pub fn devices_for(conn: &Connection, address: &str) -> Result<Vec<Device>> {
    let mut stmt = conn
        .prepare("SELECT address, token, platform FROM device_tokens WHERE address = ? ORDER BY id")
        .map_err(|e| HeraldError::Database(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt
        .query_map(params![address], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })
        .map_err(|e| HeraldError::Database(format!("Failed to query devices: {}", e)))?;

    let mut devices = Vec::new();
    for row in rows {
        let (address, token, platform) =
            row.map_err(|e| HeraldError::Database(format!("Failed to read row: {}", e)))?;
        match platform.parse::<Platform>() {
            Ok(platform) => devices.push(Device {
                address,
                token,
                platform,
            }),
            Err(e) => tracing::warn!(address = %address, error = %e, "Skipping device with unknown platform"),
        }
    }
    Ok(devices)
}
