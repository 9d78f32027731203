use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;
use url::Url;

use super::{
    CompleteTransferRequest, FinalizationReceipt, Finalizer, RelayerError, TransferFinalization,
};

const COMPLETE_TRANSFER_PATH: &str = "api/cctp/completeTransfer";

/// Finalizes transfers through another server's completeTransfer endpoint.
#[derive(Debug, Clone)]
pub struct HttpFinalizer {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl HttpFinalizer {
    pub fn new(base_url: &Url) -> Result<Self, RelayerError> {
        let endpoint = base_url
            .join(COMPLETE_TRANSFER_PATH)
            .map_err(|_| RelayerError::InvalidRequest("invalid relayer URL"))?;

        // Finalization waits on two confirmed transactions plus the balance
        // window, so the timeout is generous.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Finalizer for HttpFinalizer {
    async fn complete_transfer(
        &self,
        transfer: TransferFinalization,
    ) -> Result<FinalizationReceipt, RelayerError> {
        info!(endpoint = %self.endpoint, destination = %transfer.destination, "Requesting remote finalization");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&CompleteTransferRequest::from(&transfer))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|err| match (err.error, err.message) {
                    (Some(error), Some(message)) => Some(format!("{error}: {message}")),
                    (error, message) => error.or(message),
                })
                .unwrap_or(body);

            return Err(RelayerError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }
}
