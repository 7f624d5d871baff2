use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{query, query_as, FromRow};
use tracing::{error, info};

use crate::errors::{LicenseError, LicenseResult};

/// Services created for every new license: (name, feature_code, description).
pub const DEFAULT_SERVICES: [(&str, &str, &str); 6] = [
    ("Firewall", "FW", "Sophos Firewall Service"),
    ("IPS", "IPS", "Intrusion Prevention System"),
    ("VPN", "VPN", "Virtual Private Network"),
    ("WAF", "WAF", "Web Application Firewall"),
    ("Sandstorm", "SAND", "Advanced Threat Protection"),
    ("Email", "MAIL", "Email Protection"),
];

/// Device type used when a request does not name one.
pub const DEFAULT_DEVICE_TYPE: &str = "physical";

const SCHEMA: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS licenses (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        license_key TEXT NOT NULL UNIQUE,
        description TEXT,
        status      TEXT NOT NULL DEFAULT 'registered',
        issue_date  TEXT NOT NULL,
        expiry_date TEXT NOT NULL,
        is_active   INTEGER NOT NULL DEFAULT 1,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS devices (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        device_id        TEXT NOT NULL UNIQUE,
        name             TEXT,
        device_type      TEXT NOT NULL DEFAULT 'physical',
        model            TEXT,
        firmware_version TEXT,
        ip_address       TEXT,
        last_seen        TEXT,
        is_active        INTEGER NOT NULL DEFAULT 1,
        license_id       INTEGER NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS services (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        name         TEXT NOT NULL,
        feature_code TEXT NOT NULL,
        description  TEXT,
        status       TEXT NOT NULL DEFAULT 'running',
        license_id   INTEGER NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_devices_license_id ON devices(license_id)",
    "CREATE INDEX IF NOT EXISTS idx_services_license_id ON services(license_id)",
    "CREATE INDEX IF NOT EXISTS idx_services_feature_code ON services(feature_code)",
];

/// A license record. Mirrors the `licenses` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct License {
    pub id: i64,
    pub license_key: String,
    pub description: Option<String>,
    /// Free-text label such as "registered"; compared case-sensitively.
    pub status: String,
    pub issue_date: NaiveDateTime,
    pub expiry_date: NaiveDateTime,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A client installation bound to exactly one license.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: i64,
    pub device_id: String,
    pub name: Option<String>,
    pub device_type: String,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub ip_address: Option<String>,
    pub last_seen: Option<NaiveDateTime>,
    pub is_active: bool,
    pub license_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A licensed feature/module.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub feature_code: String,
    pub description: Option<String>,
    pub status: String,
    pub license_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Fields needed to create a license.
#[derive(Debug, Clone)]
pub struct NewLicense {
    pub license_key: String,
    pub description: Option<String>,
    pub status: String,
    pub expiry_date: NaiveDateTime,
    pub is_active: bool,
}

/// Partial license update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct LicenseChanges {
    pub license_key: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub expiry_date: Option<NaiveDateTime>,
    pub is_active: Option<bool>,
}

/// Device attributes reported by a client. `None` means "not supplied".
#[derive(Debug, Clone, Default)]
pub struct DeviceAttributes {
    pub name: Option<String>,
    pub device_type: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub ip_address: Option<String>,
}

impl DeviceAttributes {
    /// Drop empty strings so they count as "not supplied".
    pub fn supplied(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            name: keep(self.name),
            device_type: keep(self.device_type),
            model: keep(self.model),
            firmware_version: keep(self.firmware_version),
            ip_address: keep(self.ip_address),
        }
    }
}

fn db_error(op: &str, e: sqlx::Error) -> LicenseError {
    error!("SQLite {op} failed: {e}");
    e.into()
}

/// SQLite-backed entity store for licenses, devices and services.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to the database at `url`, creating the file if needed,
    /// and make sure the schema exists.
    pub async fn connect(url: &str) -> LicenseResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| LicenseError::ConfigError(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to SQLite: {e}");
                LicenseError::DatabaseError(format!("failed to connect to SQLite: {e}"))
            })?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// A private in-memory database with the schema applied.
    ///
    /// The pool is pinned to one connection that never expires, because every
    /// SQLite in-memory connection is its own database.
    pub async fn in_memory() -> LicenseResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| LicenseError::ConfigError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("connect", e))?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> LicenseResult<()> {
        for statement in SCHEMA {
            query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("migrate", e))?;
        }
        info!("Database schema ready");
        Ok(())
    }

    /// Cheap connectivity probe for the health endpoint.
    pub async fn ping(&self) -> bool {
        query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    // ------------------------------------------------------------------
    // Licenses
    // ------------------------------------------------------------------

    /// Insert a license together with its six default services.
    ///
    /// Both are committed in one transaction. A duplicate key fails with
    /// `LicenseError::Conflict`.
    pub async fn create_license(
        &self,
        new: NewLicense,
        service_status: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<License> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error("begin", e))?;

        let license = query_as::<_, License>(
            r#"
            INSERT INTO licenses (
                license_key, description, status, issue_date, expiry_date,
                is_active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&new.license_key)
        .bind(&new.description)
        .bind(&new.status)
        .bind(now)
        .bind(new.expiry_date)
        .bind(new.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("create_license", e))?;

        for (name, feature_code, description) in DEFAULT_SERVICES {
            query(
                r#"
                INSERT INTO services (
                    name, feature_code, description, status, license_id, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(name)
            .bind(feature_code)
            .bind(description)
            .bind(service_status)
            .bind(license.id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("create_service", e))?;
        }

        tx.commit().await.map_err(|e| db_error("commit", e))?;
        Ok(license)
    }

    pub async fn get_license(&self, id: i64) -> LicenseResult<Option<License>> {
        query_as::<_, License>("SELECT * FROM licenses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get_license", e))
    }

    pub async fn get_license_by_key(&self, license_key: &str) -> LicenseResult<Option<License>> {
        query_as::<_, License>("SELECT * FROM licenses WHERE license_key = ?")
            .bind(license_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get_license_by_key", e))
    }

    pub async fn license_key_exists(&self, license_key: &str) -> LicenseResult<bool> {
        Ok(self.get_license_by_key(license_key).await?.is_some())
    }

    pub async fn list_licenses(&self) -> LicenseResult<Vec<License>> {
        query_as::<_, License>("SELECT * FROM licenses ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list_licenses", e))
    }

    pub async fn count_licenses(&self) -> LicenseResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM licenses")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count_licenses", e))?;
        Ok(count)
    }

    /// The first active license by id, with no further preference.
    pub async fn first_active_license(&self) -> LicenseResult<Option<License>> {
        query_as::<_, License>("SELECT * FROM licenses WHERE is_active = 1 ORDER BY id LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("first_active_license", e))
    }

    /// Apply `changes` to the license with `id`.
    ///
    /// Returns `Ok(None)` when no such license exists.
    pub async fn update_license(
        &self,
        id: i64,
        changes: LicenseChanges,
        now: NaiveDateTime,
    ) -> LicenseResult<Option<License>> {
        let Some(current) = self.get_license(id).await? else {
            return Ok(None);
        };

        let updated = query_as::<_, License>(
            r#"
            UPDATE licenses
               SET license_key = ?, description = ?, status = ?, expiry_date = ?,
                   is_active = ?, updated_at = ?
             WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(changes.license_key.unwrap_or(current.license_key))
        .bind(changes.description.or(current.description))
        .bind(changes.status.unwrap_or(current.status))
        .bind(changes.expiry_date.unwrap_or(current.expiry_date))
        .bind(changes.is_active.unwrap_or(current.is_active))
        .bind(now)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update_license", e))?;

        Ok(updated)
    }

    /// Delete a license; its devices and services go with it.
    ///
    /// Returns `false` when no such license exists.
    pub async fn delete_license(&self, id: i64) -> LicenseResult<bool> {
        let result = query("DELETE FROM licenses WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete_license", e))?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    pub async fn list_services(&self, license_id: i64) -> LicenseResult<Vec<Service>> {
        query_as::<_, Service>("SELECT * FROM services WHERE license_id = ? ORDER BY id")
            .bind(license_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list_services", e))
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    pub async fn get_device(&self, device_id: &str) -> LicenseResult<Option<Device>> {
        query_as::<_, Device>("SELECT * FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get_device", e))
    }

    /// Fetch a device only if it is bound to `license_id`.
    pub async fn get_device_for_license(
        &self,
        device_id: &str,
        license_id: i64,
    ) -> LicenseResult<Option<Device>> {
        query_as::<_, Device>("SELECT * FROM devices WHERE device_id = ? AND license_id = ?")
            .bind(device_id)
            .bind(license_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get_device_for_license", e))
    }

    pub async fn list_devices(&self, skip: i64, limit: i64) -> LicenseResult<Vec<Device>> {
        query_as::<_, Device>("SELECT * FROM devices ORDER BY id LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(skip)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list_devices", e))
    }

    pub async fn count_devices(&self, license_id: i64) -> LicenseResult<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM devices WHERE license_id = ?")
            .bind(license_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("count_devices", e))?;
        Ok(count)
    }

    /// Create a device bound to `license_id`, seen at `now`.
    ///
    /// A duplicate `device_id` fails with `LicenseError::Conflict`.
    pub async fn create_device(
        &self,
        device_id: &str,
        attrs: &DeviceAttributes,
        license_id: i64,
        now: NaiveDateTime,
    ) -> LicenseResult<Device> {
        query_as::<_, Device>(
            r#"
            INSERT INTO devices (
                device_id, name, device_type, model, firmware_version, ip_address,
                last_seen, is_active, license_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(device_id)
        .bind(&attrs.name)
        .bind(attrs.device_type.as_deref().unwrap_or(DEFAULT_DEVICE_TYPE))
        .bind(&attrs.model)
        .bind(&attrs.firmware_version)
        .bind(&attrs.ip_address)
        .bind(now)
        .bind(license_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create_device", e))
    }

    /// Overwrite the supplied attributes of an existing device, reactivate it
    /// and (re)bind it to `license_id`.
    pub async fn rebind_device(
        &self,
        device: Device,
        attrs: DeviceAttributes,
        license_id: i64,
        now: NaiveDateTime,
    ) -> LicenseResult<Device> {
        query_as::<_, Device>(
            r#"
            UPDATE devices
               SET name = ?, device_type = ?, model = ?, firmware_version = ?, ip_address = ?,
                   last_seen = ?, is_active = 1, license_id = ?, updated_at = ?
             WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(attrs.name.or(device.name))
        .bind(attrs.device_type.unwrap_or(device.device_type))
        .bind(attrs.model.or(device.model))
        .bind(attrs.firmware_version.or(device.firmware_version))
        .bind(attrs.ip_address.or(device.ip_address))
        .bind(now)
        .bind(license_id)
        .bind(now)
        .bind(device.id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("rebind_device", e))
    }

    /// Update `last_seen` of a device.
    ///
    /// Returns the updated device, or `None` if no such device exists.
    pub async fn touch_device(
        &self,
        device_id: &str,
        now: NaiveDateTime,
    ) -> LicenseResult<Option<Device>> {
        query_as::<_, Device>(
            "UPDATE devices SET last_seen = ?, updated_at = ? WHERE device_id = ? RETURNING *",
        )
        .bind(now)
        .bind(now)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("touch_device", e))
    }
}
