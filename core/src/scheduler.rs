// orderflow/src/scheduler.rs

//! Interval-driven background sweeps.
//!
//! A [`SweepJob`] selects the orders it cares about and processes each one on
//! its own. [`run_sweep`] fans the selection out with bounded parallelism and
//! isolates every order: an error or a panic is logged against that order and
//! counted, never propagated to its siblings.

use crate::error::FlowResult;
use crate::model::Order;
use crate::ports::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

#[async_trait]
pub trait SweepJob: Send + Sync {
  fn name(&self) -> &'static str;

  /// Orders due for processing at `now`.
  async fn select(&self, now: DateTime<Utc>) -> FlowResult<Vec<Order>>;

  async fn process(&self, order: Order) -> FlowResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  pub job: &'static str,
  pub matched: usize,
  pub succeeded: usize,
  pub failed: usize,
}

/// Runs one pass of `job`. Only a failing selection is an error; per-order
/// failures end up in the report.
#[instrument(name = "sweep", skip_all, fields(job = job.name()))]
pub async fn run_sweep(job: &dyn SweepJob, now: DateTime<Utc>, concurrency: usize) -> FlowResult<SweepReport> {
  let orders = job.select(now).await?;
  let matched = orders.len();
  if matched == 0 {
    debug!("Nothing to sweep.");
    return Ok(SweepReport { job: job.name(), ..Default::default() });
  }

  let succeeded = AtomicUsize::new(0);
  let failed = AtomicUsize::new(0);
  stream::iter(orders)
    .for_each_concurrent(concurrency.max(1), |order| {
      let (order_id, code) = (order.id, order.code.clone());
      let succeeded = &succeeded;
      let failed = &failed;
      async move {
        match AssertUnwindSafe(job.process(order)).catch_unwind().await {
          Ok(Ok(())) => {
            succeeded.fetch_add(1, Ordering::Relaxed);
          }
          Ok(Err(e)) => {
            failed.fetch_add(1, Ordering::Relaxed);
            if e.is_external() {
              warn!(%order_id, order_code = %code, error = %e, "Provider unavailable, order left for the next pass.");
            } else {
              error!(%order_id, order_code = %code, error = %e, "Order failed during sweep.");
            }
          }
          Err(panic) => {
            failed.fetch_add(1, Ordering::Relaxed);
            let message = panic
              .downcast_ref::<&str>()
              .map(|s| s.to_string())
              .or_else(|| panic.downcast_ref::<String>().cloned())
              .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(%order_id, order_code = %code, panic = %message, "Order panicked during sweep.");
          }
        }
      }
    })
    .await;

  let report = SweepReport {
    job: job.name(),
    matched,
    succeeded: succeeded.into_inner(),
    failed: failed.into_inner(),
  };
  info!(matched = report.matched, succeeded = report.succeeded, failed = report.failed, "Sweep finished.");
  Ok(report)
}

/// Drives a fixed set of jobs on one ticker.
pub struct Sweeper {
  jobs: Vec<Arc<dyn SweepJob>>,
  clock: Arc<dyn Clock>,
  period: Duration,
  concurrency: usize,
}

impl Sweeper {
  pub fn new(clock: Arc<dyn Clock>, period: Duration, concurrency: usize) -> Self {
    Sweeper {
      jobs: Vec::new(),
      clock,
      period,
      concurrency,
    }
  }

  pub fn with_job(mut self, job: Arc<dyn SweepJob>) -> Self {
    self.jobs.push(job);
    self
  }

  pub fn job_names(&self) -> Vec<&'static str> {
    self.jobs.iter().map(|j| j.name()).collect()
  }

  /// One pass over every job, in registration order.
  pub async fn tick(&self) -> Vec<SweepReport> {
    let now = self.clock.now();
    let mut reports = Vec::with_capacity(self.jobs.len());
    for job in &self.jobs {
      match run_sweep(job.as_ref(), now, self.concurrency).await {
        Ok(report) => reports.push(report),
        Err(e) => error!(job = job.name(), error = %e, "Sweep selection failed."),
      }
    }
    reports
  }

  pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
    info!(
      period_secs = self.period.as_secs(),
      jobs = ?self.job_names(),
      concurrency = self.concurrency,
      "Starting sweeper"
    );
    let mut ticker = interval(self.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          self.tick().await;
        }
        changed = shutdown.changed() => {
          if changed.is_err() || *shutdown.borrow() {
            info!("Sweeper shutting down");
            break;
          }
        }
      }
    }
  }

  /// Spawns the loop; sending `true` (or dropping the sender) stops it.
  pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(self.run(rx));
    (handle, tx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FlowError;
  use crate::ports::SystemClock;
  use uuid::Uuid;

  struct Scripted {
    orders: Vec<Order>,
  }

  #[async_trait]
  impl SweepJob for Scripted {
    fn name(&self) -> &'static str {
      "scripted"
    }

    async fn select(&self, _now: DateTime<Utc>) -> FlowResult<Vec<Order>> {
      Ok(self.orders.clone())
    }

    async fn process(&self, order: Order) -> FlowResult<()> {
      match order.code.as_str() {
        "boom" => panic!("scripted panic"),
        "fail" => Err(FlowError::DeliveryPartner("scripted".into())),
        _ => Ok(()),
      }
    }
  }

  fn order(code: &str) -> Order {
    Order::new(code, Uuid::new_v4(), Uuid::new_v4(), 100, Utc::now())
  }

  #[tokio::test]
  async fn one_bad_order_does_not_sink_the_batch() {
    let job = Scripted {
      orders: vec![order("ok-1"), order("boom"), order("fail"), order("ok-2")],
    };
    let report = run_sweep(&job, Utc::now(), 2).await.unwrap();
    assert_eq!(report.matched, 4);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 2);
  }

  #[tokio::test]
  async fn sweeper_stops_on_shutdown_signal() {
    let sweeper = Sweeper::new(Arc::new(SystemClock), Duration::from_millis(5), 1)
      .with_job(Arc::new(Scripted { orders: vec![order("ok")] }));
    let (handle, stop) = sweeper.spawn();
    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
  }
}
