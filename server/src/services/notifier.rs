// orderflow_server/src/services/notifier.rs
use async_trait::async_trait;
use orderflow::error::FlowResult;
use orderflow::ports::{Email, Notifier};
use tracing::info;

/// Stands in for the mail queue: every email is logged with a message id
/// and counted as queued.
pub struct LogNotifier {
  sender: String,
}

impl LogNotifier {
  pub fn new(sender: impl Into<String>) -> Self {
    Self { sender: sender.into() }
  }
}

#[async_trait]
impl Notifier for LogNotifier {
  async fn enqueue(&self, email: Email) -> FlowResult<()> {
    let body_preview = email.body.chars().take(50).collect::<String>() + "...";
    let message_id = format!("email_{}", uuid::Uuid::new_v4());
    info!(
      to = %email.to,
      from = %self.sender,
      subject = %email.subject,
      body_preview = %body_preview,
      message_id = %message_id,
      "Email queued."
    );
    Ok(())
  }
}
