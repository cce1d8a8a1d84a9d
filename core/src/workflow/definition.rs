// orderflow/src/workflow/definition.rs

//! `Workflow<TData, Err>`: construction, handler registration and execution.

use crate::error::WorkflowError;
use crate::workflow::context_data::ContextData;
use crate::workflow::control::{StepControl, WorkflowOutcome};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{event, instrument, span, Instrument, Level};

/// An async step handler. It receives a clone of the shared context.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>> + Send + Sync,
>;

/// Evaluated before a step; `true` skips it.
pub type SkipCondition<TData> = Arc<dyn Fn(&TData) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct StepDef<TData: 'static + Send + Sync> {
  pub name: String,
  pub optional: bool,
  pub skip_if: Option<SkipCondition<TData>>,
}

impl<TData: 'static + Send + Sync> std::fmt::Debug for StepDef<TData> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}

pub struct Workflow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  name: String,
  steps: Vec<StepDef<TData>>,
  handlers: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Workflow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<WorkflowError> + Send + Sync + 'static,
{
  /// `steps` are `(name, optional)` pairs, run in the given order.
  pub fn new(name: &str, steps: &[(&str, bool)]) -> Self {
    Self {
      name: name.to_string(),
      steps: steps
        .iter()
        .map(|(step, optional)| StepDef {
          name: (*step).to_string(),
          optional: *optional,
          skip_if: None,
        })
        .collect(),
      handlers: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  fn step_mut(&mut self, step_name: &str) -> Result<&mut StepDef<TData>, WorkflowError> {
    let workflow = self.name.clone();
    self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .ok_or_else(|| WorkflowError::StepNotFound {
        workflow,
        step_name: step_name.to_string(),
      })
  }

  /// Registers a handler for `step_name`. Handlers of one step run in
  /// registration order.
  pub fn on<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) -> Result<&mut Self, WorkflowError>
  where
    F: Future<Output = Result<StepControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.step_mut(step_name)?;
    let handler: Handler<TData, Err> = Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    });
    self.handlers.entry(step_name.to_string()).or_default().push(handler);
    Ok(self)
  }

  pub fn skip_if(
    &mut self,
    step_name: &str,
    condition: impl Fn(&TData) -> bool + Send + Sync + 'static,
  ) -> Result<&mut Self, WorkflowError> {
    self.step_mut(step_name)?.skip_if = Some(Arc::new(condition));
    Ok(self)
  }

  /// Runs every step in order against `ctx_data`.
  #[instrument(
    name = "Workflow::run",
    skip_all,
    fields(workflow = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<WorkflowOutcome, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "workflow_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx
      );

      if let Some(skip) = &step_def.skip_if {
        let skipped = {
          let guard = ctx_data.read();
          skip(&*guard)
        };
        if skipped {
          event!(parent: &step_span, Level::DEBUG, "Step skipped by condition.");
          continue;
        }
      }

      let handlers = match self.handlers.get(&step_def.name) {
        Some(handlers) if !handlers.is_empty() => handlers,
        _ if step_def.optional => {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        _ => {
          event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
          return Err(Err::from(WorkflowError::HandlerMissing {
            workflow: self.name.clone(),
            step_name: step_def.name.clone(),
          }));
        }
      };

      for handler_fn in handlers {
        match handler_fn(ctx_data.clone()).instrument(step_span.clone()).await {
          Ok(StepControl::Continue) => {}
          Ok(StepControl::Stop) => {
            event!(parent: &step_span, Level::INFO, "Workflow stopped by handler.");
            return Ok(WorkflowOutcome::Stopped);
          }
          Err(e) => {
            event!(parent: &step_span, Level::ERROR, error = %e, "Step handler failed.");
            return Err(e);
          }
        }
      }
    }
    Ok(WorkflowOutcome::Completed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::FlowError;

  #[derive(Default)]
  struct Trail {
    steps: Vec<&'static str>,
    stop_at: Option<&'static str>,
  }

  fn recording(step: &'static str) -> impl Fn(ContextData<Trail>) -> Pin<Box<dyn Future<Output = Result<StepControl, FlowError>> + Send>> {
    move |ctx: ContextData<Trail>| {
      Box::pin(async move {
        let mut guard = ctx.write();
        guard.steps.push(step);
        if guard.stop_at == Some(step) {
          return Ok(StepControl::Stop);
        }
        Ok(StepControl::Continue)
      })
    }
  }

  #[tokio::test]
  async fn runs_steps_in_order_and_honours_skip() {
    let mut wf = Workflow::<Trail, FlowError>::new("t", &[("a", false), ("b", false), ("c", false)]);
    wf.on("a", recording("a")).unwrap();
    wf.on("b", recording("b")).unwrap();
    wf.on("c", recording("c")).unwrap();
    wf.skip_if("b", |t: &Trail| t.steps.contains(&"a")).unwrap();

    let ctx = ContextData::new(Trail::default());
    assert_eq!(wf.run(ctx.clone()).await.unwrap(), WorkflowOutcome::Completed);
    assert_eq!(ctx.read().steps, vec!["a", "c"]);
  }

  #[tokio::test]
  async fn stop_halts_remaining_steps() {
    let mut wf = Workflow::<Trail, FlowError>::new("t", &[("a", false), ("b", false)]);
    wf.on("a", recording("a")).unwrap();
    wf.on("b", recording("b")).unwrap();
    let ctx = ContextData::new(Trail {
      stop_at: Some("a"),
      ..Default::default()
    });
    assert_eq!(wf.run(ctx.clone()).await.unwrap(), WorkflowOutcome::Stopped);
    assert_eq!(ctx.read().steps, vec!["a"]);
  }

  #[tokio::test]
  async fn missing_handler_on_required_step_is_an_error() {
    let mut wf = Workflow::<Trail, FlowError>::new("t", &[("a", true), ("b", false)]);
    wf.on("a", recording("a")).unwrap();
    let result = wf.run(ContextData::new(Trail::default())).await;
    assert!(matches!(
      result,
      Err(FlowError::Workflow(WorkflowError::HandlerMissing { ref step_name, .. })) if step_name == "b"
    ));
  }

  #[test]
  fn registering_on_unknown_step_fails() {
    let mut wf = Workflow::<Trail, FlowError>::new("t", &[("a", false)]);
    assert!(matches!(wf.on("zzz", recording("zzz")), Err(WorkflowError::StepNotFound { .. })));
  }
}
