// orderflow_server/src/services/delivery_partner.rs

use async_trait::async_trait;
use orderflow::error::{FlowError, FlowResult};
use orderflow::ports::{DeliveryPartner, ShipmentCreated, ShipmentRequest, ShipmentStatus};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;

pub struct HttpDeliveryPartner {
  client: Client,
  base_url: String,
  api_key: String,
}

impl HttpDeliveryPartner {
  pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key: api_key.to_string(),
    })
  }

  fn partner_error(err: impl std::fmt::Display) -> FlowError {
    FlowError::DeliveryPartner(err.to_string())
  }

  async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> FlowResult<T> {
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(Self::partner_error(format!("HTTP {}: {}", status, body)));
    }
    response.json::<T>().await.map_err(Self::partner_error)
  }
}

#[async_trait]
impl DeliveryPartner for HttpDeliveryPartner {
  #[instrument(name = "partner::create_shipment", skip_all, fields(request_id = %request.request_id), err(Display))]
  async fn create_shipment(&self, request: &ShipmentRequest) -> FlowResult<ShipmentCreated> {
    let response = self
      .client
      .post(format!("{}/shipments", self.base_url))
      .bearer_auth(&self.api_key)
      .json(request)
      .send()
      .await
      .map_err(Self::partner_error)?;
    Self::decode(response).await
  }

  #[instrument(name = "partner::shipment", skip(self), err(Display))]
  async fn shipment(&self, shipment_id: &str) -> FlowResult<ShipmentStatus> {
    let response = self
      .client
      .get(format!("{}/shipments/{}", self.base_url, shipment_id))
      .bearer_auth(&self.api_key)
      .send()
      .await
      .map_err(Self::partner_error)?;
    Self::decode(response).await
  }
}
