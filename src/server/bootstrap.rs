//! First-start seeding.
//!
//! A fresh database gets one demo license so the device-facing endpoints
//! work out of the box. The seed runs only while the database holds no
//! licenses at all; deleting the demo license later does not bring it back
//! unless every other license is gone too.

use chrono::Duration;
use tracing::info;

use crate::config::SufussConfig;
use crate::errors::LicenseResult;
use crate::server::database::{Database, License, NewLicense};
use crate::server::handlers::utc_now;
use crate::server::logging::{log_license_event, LicenseEvent};

/// Description stored on the seeded license.
pub const DEMO_DESCRIPTION: &str = "Demo License";

/// Create the demo license if seeding is enabled and no license exists.
///
/// # Returns
/// - `Ok(Some(license))` - The demo license was created
/// - `Ok(None)` - Seeding is disabled or the database already has licenses
pub async fn seed_demo_license(
    db: &Database,
    config: &SufussConfig,
) -> LicenseResult<Option<License>> {
    let settings = &config.license;
    if !settings.seed_demo {
        return Ok(None);
    }

    if db.count_licenses().await? > 0 {
        info!("Database already contains licenses, skipping demo seed");
        return Ok(None);
    }

    let now = utc_now();
    let license = db
        .create_license(
            NewLicense {
                license_key: settings.demo_key.clone(),
                description: Some(DEMO_DESCRIPTION.to_string()),
                status: settings.default_status.clone(),
                expiry_date: now + Duration::days(settings.default_duration_days),
                is_active: true,
            },
            &settings.default_service_status,
            now,
        )
        .await?;

    log_license_event(LicenseEvent::Created, &license.license_key, Some("demo seed"));
    Ok(Some(license))
}
