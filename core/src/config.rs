// orderflow/src/config.rs

//! Tunables for the lifecycle services and sweeps.

use crate::model::TimeSlot;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Offset, Utc};
use std::time::Duration as StdDuration;

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
  /// Orders touched more recently than this are left alone by the sweeps.
  pub quiet_period: Duration,
  /// How far back the cancelled-order fare refresh looks.
  pub cancelled_window: Duration,
  /// Orders processed in parallel within one sweep.
  pub sweep_concurrency: usize,
  /// Upper bound on orders picked up per sweep.
  pub sweep_batch_limit: Option<usize>,
  pub sweep_interval: StdDuration,
  /// Latest return date, counted from the order date.
  pub secure_return_max_days: i64,
  /// Window every requested pickup slot has to fit into.
  pub operating_hours: TimeSlot,
  /// Offset used to decide "today" for dated pickups.
  pub business_utc_offset_minutes: i32,
  pub phone_country_code: String,
  pub ops_alert_email: String,
  pub platform_fee_bps: u32,
  pub tax_on_fee_bps: u32,
  pub handling_instructions: Vec<String>,
}

impl LifecycleConfig {
  pub fn is_within_operating_hours(&self, slot: &TimeSlot) -> bool {
    slot.within(&self.operating_hours)
  }

  /// Out-of-range offsets fall back to UTC.
  pub fn business_offset(&self) -> FixedOffset {
    FixedOffset::east_opt(self.business_utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
  }

  pub fn business_now(&self, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&self.business_offset()).naive_local()
  }
}

impl Default for LifecycleConfig {
  fn default() -> Self {
    LifecycleConfig {
      quiet_period: Duration::minutes(5),
      cancelled_window: Duration::hours(2),
      sweep_concurrency: 8,
      sweep_batch_limit: Some(500),
      sweep_interval: StdDuration::from_secs(60),
      secure_return_max_days: 30,
      operating_hours: TimeSlot {
        start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
        end: NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN),
      },
      business_utc_offset_minutes: 330,
      phone_country_code: "91".to_string(),
      ops_alert_email: "ops@orderflow.local".to_string(),
      platform_fee_bps: 1_000,
      tax_on_fee_bps: 1_800,
      handling_instructions: vec![
        "Handle with care".to_string(),
        "Do not accept if the package seal is broken".to_string(),
      ],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn business_clock_applies_offset() {
    let config = LifecycleConfig::default();
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap();
    let local = config.business_now(now);
    assert_eq!(local.date().to_string(), "2026-03-02");
    assert_eq!(local.time().to_string(), "01:30:00");
  }

  #[test]
  fn operating_hours_bound_slots() {
    let config = LifecycleConfig::default();
    assert!(config.is_within_operating_hours(&TimeSlot::parse("10:00-12:00").unwrap()));
    assert!(!config.is_within_operating_hours(&TimeSlot::parse("20:00-22:00").unwrap()));
  }
}
