use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use danfoss_ally::{AllyClient, Config, Device, ThermostatStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env; a missing file is fine when vars are set externally
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let client = AllyClient::new(&config);

    let token = client
        .acquire_token(&config.client_id, &config.client_secret)
        .await
        .context("Failed to fetch Danfoss access token")?;

    let devices = client
        .list_devices(&token.access_token)
        .await
        .context("Failed to list Danfoss devices")?;

    info!(count = devices.result.len(), "Danfoss Ally devices");
    for device in &devices.result {
        info!(
            device_id = %device.id,
            name = %device.name,
            online = device.online,
            device_type = %device.device_type,
            "Device"
        );
    }

    for device in devices.result.iter().filter(|d| wanted(&config, d)) {
        if let Err(e) = report_status(&client, &token.access_token, device).await {
            warn!(device_id = %device.id, error = %e, "Failed to read device status");
        }
    }

    Ok(())
}

fn wanted(config: &Config, device: &Device) -> bool {
    config.device_ids.is_empty() || config.device_ids.contains(&device.id)
}

async fn report_status(client: &AllyClient, token: &str, device: &Device) -> Result<()> {
    let status = client.query_latest_status(token, &device.id).await?;

    match ThermostatStatus::try_from(status.result.as_slice()) {
        Ok(s) => info!(
            device_id = %device.id,
            temp_current = s.temp_current_celsius(),
            temp_set = s.temp_set_celsius(),
            mode = ?s.mode,
            window_open = s.window_open(),
            battery = ?s.battery_percentage,
            "Thermostat status"
        ),
        Err(e) => info!(
            device_id = %device.id,
            datapoints = status.result.len(),
            reason = %e,
            "Device is not a thermostat"
        ),
    }

    Ok(())
}
