//! Upload transports for health data batches.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::health::{DataPoint, HealthDataBatch};

/// Server verdict for one uploaded batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResponse {
  pub success: bool,
  #[serde(default)]
  pub message: Option<String>,
}

impl UploadResponse {
  pub fn accepted() -> Self {
    Self {
      success: true,
      message: None,
    }
  }

  pub fn rejected(message: impl Into<String>) -> Self {
    Self {
      success: false,
      message: Some(message.into()),
    }
  }
}

/// Delivers one batch to the remote service.
///
/// `Err` means the request itself failed; `Ok` with `success == false` means
/// the service refused it. The transport owns its request timeout.
pub trait UploadTransport: Send + Sync {
  fn upload<'a>(
    &'a self,
    batch: &'a HealthDataBatch,
    owner_id: &'a str,
  ) -> BoxFuture<'a, Result<UploadResponse>>;
}

/// Wire body of an upload request
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
  user_id: &'a str,
  data_points: &'a [DataPoint],
}

/// JSON-over-HTTPS transport.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  endpoint: Url,
  token: Option<String>,
}

impl HttpTransport {
  pub fn new(endpoint: Url, token: Option<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("vitalsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      endpoint,
      token,
    })
  }

  async fn post_batch(&self, batch: &HealthDataBatch, owner_id: &str) -> Result<UploadResponse> {
    let body = UploadRequest {
      user_id: owner_id,
      data_points: &batch.data_points,
    };

    let mut request = self.client.post(self.endpoint.clone()).json(&body);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to upload batch: {}", e))?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(eyre!("Upload rejected with {}: {}", status, text.trim()));
    }

    response
      .json::<UploadResponse>()
      .await
      .map_err(|e| eyre!("Failed to parse upload response: {}", e))
  }
}

impl UploadTransport for HttpTransport {
  fn upload<'a>(
    &'a self,
    batch: &'a HealthDataBatch,
    owner_id: &'a str,
  ) -> BoxFuture<'a, Result<UploadResponse>> {
    Box::pin(self.post_batch(batch, owner_id))
  }
}
