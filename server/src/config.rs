// orderflow_server/src/config.rs

use crate::errors::{AppError, Result};
use chrono::Duration;
use dotenvy::dotenv;
use orderflow::LifecycleConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub db_max_connections: u32,

  /// Shared secret the delivery partner sends in `X-Webhook-Secret`.
  pub webhook_secret: String,

  pub payment_gateway_url: String,
  pub payment_gateway_key: String,
  pub delivery_partner_url: String,
  pub delivery_partner_key: String,
  /// Client-side timeout for every outbound provider call.
  pub provider_timeout: StdDuration,

  pub email_sender: String,

  /// Run the background sweeps in this process.
  pub sweeps_enabled: bool,
  pub lifecycle: LifecycleConfig,
}

fn get_env(var_name: &str) -> Result<String> {
  env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
}

/// Reads `var_name`, falling back to `default` when it is unset.
fn parse_env<T>(var_name: &str, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match env::var(var_name) {
    Ok(raw) => raw
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {}: {}", var_name, e))),
    Err(_) => Ok(default),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = parse_env("SERVER_PORT", 8080u16)?;
    let database_url = get_env("DATABASE_URL")?;
    let db_max_connections = parse_env("DB_MAX_CONNECTIONS", 10u32)?;

    let webhook_secret = get_env("WEBHOOK_SECRET")?;
    if webhook_secret.trim().is_empty() {
      return Err(AppError::Config("WEBHOOK_SECRET must not be blank".to_string()));
    }

    let payment_gateway_url = get_env("PAYMENT_GATEWAY_URL")?;
    let payment_gateway_key = get_env("PAYMENT_GATEWAY_KEY")?;
    let delivery_partner_url = get_env("DELIVERY_PARTNER_URL")?;
    let delivery_partner_key = get_env("DELIVERY_PARTNER_KEY")?;
    let provider_timeout = StdDuration::from_secs(parse_env("PROVIDER_TIMEOUT_SECS", 10u64)?);

    let email_sender = get_env("EMAIL_SENDER").unwrap_or_else(|_| "noreply@orderflow.local".to_string());
    let sweeps_enabled = parse_env("SWEEPS_ENABLED", true)?;

    let defaults = LifecycleConfig::default();
    let lifecycle = LifecycleConfig {
      quiet_period: Duration::minutes(parse_env("QUIET_PERIOD_MINUTES", defaults.quiet_period.num_minutes())?),
      cancelled_window: Duration::minutes(parse_env(
        "CANCELLED_WINDOW_MINUTES",
        defaults.cancelled_window.num_minutes(),
      )?),
      sweep_concurrency: parse_env("SWEEP_CONCURRENCY", defaults.sweep_concurrency)?.max(1),
      sweep_batch_limit: match parse_env("SWEEP_BATCH_LIMIT", defaults.sweep_batch_limit.unwrap_or(0))? {
        0 => None,
        limit => Some(limit),
      },
      sweep_interval: StdDuration::from_secs(parse_env("SWEEP_INTERVAL_SECS", defaults.sweep_interval.as_secs())?),
      secure_return_max_days: parse_env("SECURE_RETURN_MAX_DAYS", defaults.secure_return_max_days)?,
      business_utc_offset_minutes: parse_env("BUSINESS_UTC_OFFSET_MINUTES", defaults.business_utc_offset_minutes)?,
      phone_country_code: get_env("PHONE_COUNTRY_CODE").unwrap_or_else(|_| defaults.phone_country_code.clone()),
      ops_alert_email: get_env("OPS_ALERT_EMAIL").unwrap_or_else(|_| defaults.ops_alert_email.clone()),
      platform_fee_bps: parse_env("PLATFORM_FEE_BPS", defaults.platform_fee_bps)?,
      tax_on_fee_bps: parse_env("TAX_ON_FEE_BPS", defaults.tax_on_fee_bps)?,
      ..defaults
    };

    tracing::info!(
      host = %server_host,
      port = server_port,
      sweeps_enabled,
      sweep_interval_secs = lifecycle.sweep_interval.as_secs(),
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      db_max_connections,
      webhook_secret,
      payment_gateway_url,
      payment_gateway_key,
      delivery_partner_url,
      delivery_partner_key,
      provider_timeout,
      email_sender,
      sweeps_enabled,
      lifecycle,
    })
  }
}
