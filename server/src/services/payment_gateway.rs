// orderflow_server/src/services/payment_gateway.rs

use async_trait::async_trait;
use orderflow::error::{FlowError, FlowResult};
use orderflow::ports::{CheckoutResponse, PaymentGateway, PaymentStatusResponse, RefundResponse};
use orderflow::Amount;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

/// REST client for the payment gateway. Every failure, including timeouts,
/// surfaces as `GatewayUnavailable`.
pub struct HttpPaymentGateway {
  client: Client,
  base_url: String,
  api_key: String,
}

impl HttpPaymentGateway {
  pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key: api_key.to_string(),
    })
  }

  fn unavailable(err: impl std::fmt::Display) -> FlowError {
    FlowError::GatewayUnavailable(err.to_string())
  }

  /// Decodes a JSON body; an empty body is `None`.
  async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> FlowResult<Option<T>> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(Self::unavailable(format!("HTTP {}: {}", status, body)));
    }
    if status == StatusCode::NO_CONTENT {
      return Ok(None);
    }
    let bytes = response.bytes().await.map_err(Self::unavailable)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(None);
    }
    serde_json::from_slice(&bytes).map(Some).map_err(Self::unavailable)
  }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
  #[instrument(name = "gateway::create_order", skip(self), err(Display))]
  async fn create_order(&self, order_code: &str, amount: Amount) -> FlowResult<CheckoutResponse> {
    let response = self
      .client
      .post(format!("{}/orders", self.base_url))
      .bearer_auth(&self.api_key)
      .json(&json!({ "order_code": order_code, "amount": amount }))
      .send()
      .await
      .map_err(Self::unavailable)?;
    Self::decode(response)
      .await?
      .ok_or_else(|| Self::unavailable("empty checkout response"))
  }

  #[instrument(name = "gateway::order_status", skip(self), err(Display))]
  async fn order_status(&self, order_code: &str) -> FlowResult<Option<PaymentStatusResponse>> {
    let response = self
      .client
      .get(format!("{}/orders/{}/status", self.base_url, order_code))
      .bearer_auth(&self.api_key)
      .send()
      .await
      .map_err(Self::unavailable)?;
    let status = Self::decode::<PaymentStatusResponse>(response).await?;
    debug!(attempts = status.as_ref().map_or(0, |s| s.payment_attempts.len()), "Gateway status received.");
    Ok(status)
  }

  #[instrument(name = "gateway::refund", skip(self), err(Display))]
  async fn refund(&self, refund_id: &str, order_code: &str, amount: Amount) -> FlowResult<Option<RefundResponse>> {
    let response = self
      .client
      .post(format!("{}/refunds", self.base_url))
      .bearer_auth(&self.api_key)
      .json(&json!({ "refund_id": refund_id, "order_code": order_code, "amount": amount }))
      .send()
      .await
      .map_err(Self::unavailable)?;
    Self::decode(response).await
  }
}
