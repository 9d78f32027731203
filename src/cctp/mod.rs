//! Circle CCTP V2 integration for cross-chain USDC purchases.
//!
//! A cross-chain purchase moves USDC from the buyer's chain to the
//! destination chain with burn-and-mint, minting to a hook executor contract
//! that forwards the funds to the seller:
//!
//! 1. **Burn**: `TokenMessengerV2.depositForBurnWithHook()` on the source
//!    chain, with `hookData = abi.encode(seller, amount)`.
//! 2. **Attest**: poll Circle's Iris API for the signed message.
//! 3. **Receive**: `MessageTransmitterV2.receiveMessage()` on the
//!    destination chain, then `HookExecutor.executeHook(hookData)`.
//!
//! Steps 1 and 2 live here. Step 3 is performed by the relayer.
//!
//! Fast transfers are requested with `minFinalityThreshold = 1000`. The
//! `maxFee` is estimated from Circle's fee endpoint and falls back to a
//! 1 basis point heuristic when the endpoint is unavailable.

mod evm;
mod hook;

pub(crate) use evm::{CctpPayer, confirm_burn, receive_message};
pub use hook::{HookData, HookDataError};

use std::mem::size_of;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, FixedBytes, TxHash, U256};
use backon::{ConstantBuilder, Retryable};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::evm::EvmError;

pub(crate) const CIRCLE_SANDBOX_API_BASE: &str = "https://iris-api-sandbox.circle.com";

/// Minimum finality threshold for CCTP V2 fast transfer.
pub(crate) const FAST_TRANSFER_THRESHOLD: u32 = 1000;

const BASIS_POINTS: u64 = 10_000;

/// Errors that can occur during CCTP operations.
#[derive(Debug, thiserror::Error)]
pub enum CctpError {
    #[error("EVM error: {0}")]
    Evm(#[from] EvmError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Attestation timeout after {attempts} attempts: {source}")]
    AttestationTimeout {
        attempts: usize,
        source: AttestationError,
    },
    #[error("Attestation failed: {0}")]
    Attestation(AttestationError),
    #[error("no RPC endpoint configured for {0}")]
    RpcNotConfigured(Chain),
    #[error("MessageSent event not found in transaction receipt")]
    MessageSentEventNotFound,
    #[error("Message too short for nonce extraction: got {length} bytes, need at least 44")]
    MessageTooShort { length: usize },
    #[error("Message too short for a burn message body: got {length} bytes, need at least 376")]
    BurnMessageTooShort { length: usize },
    #[error("Fee calculation overflow")]
    FeeCalculationOverflow,
    #[error("Fast transfer fee not available for domain {source_domain} -> {destination_domain}")]
    FastTransferFeeNotAvailable {
        source_domain: u32,
        destination_domain: u32,
    },
    #[error("Invalid hex encoding: {0}")]
    HexDecode(#[from] alloy::hex::FromHexError),
}

/// Errors specific to attestation polling from Circle's API.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid hex encoding: {0}")]
    HexDecode(#[from] alloy::hex::FromHexError),
    #[error("Attestation not yet available (HTTP {status})")]
    NotYetAvailable { status: u16 },
    #[error("Attestation pending: {status}")]
    Pending { status: String },
    #[error("Iris API error (HTTP {status})")]
    Api { status: u16 },
}

impl AttestationError {
    /// Whether polling again may succeed.
    const fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotYetAvailable { .. } | Self::Pending { .. })
    }
}

/// Signed CCTP message ready for `receiveMessage()` on the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub message: Bytes,
    pub attestation: Bytes,
    /// Nonce taken from the attested message. The `MessageSent` event only
    /// carries a placeholder in CCTP V2.
    pub nonce: FixedBytes<32>,
}

// CCTP V2 message layout:
// - Bytes 0-3: version
// - Bytes 4-7: source domain
// - Bytes 8-11: destination domain
// - Bytes 12-43: nonce
// - Bytes 44+: remaining message data
const NONCE_INDEX: usize = 12;
const NONCE_SIZE: usize = size_of::<FixedBytes<32>>();
const MIN_MESSAGE_LENGTH: usize = NONCE_INDEX + NONCE_SIZE;

/// Extracts the 32-byte nonce from an attested CCTP V2 message.
pub fn extract_nonce_from_message(message: &[u8]) -> Result<FixedBytes<32>, CctpError> {
    if message.len() < MIN_MESSAGE_LENGTH {
        return Err(CctpError::MessageTooShort {
            length: message.len(),
        });
    }

    Ok(FixedBytes::<32>::from_slice(
        &message[NONCE_INDEX..MIN_MESSAGE_LENGTH],
    ))
}

// The 148-byte message header is followed by the BurnMessageV2 body:
// - Body bytes 0-3: version
// - Body bytes 4-35: burn token
// - Body bytes 36-67: mint recipient
// - Body bytes 68-99: amount
// - Body bytes 100-131: message sender
// - Body bytes 132-163: max fee
// - Body bytes 164-195: fee executed
// - Body bytes 196-227: expiration block
// - Body bytes 228+: hook data
const MESSAGE_BODY_INDEX: usize = 148;
const MINT_RECIPIENT_OFFSET: usize = 36;
const AMOUNT_OFFSET: usize = 68;
const HOOK_DATA_OFFSET: usize = 228;
const MIN_BURN_MESSAGE_LENGTH: usize = MESSAGE_BODY_INDEX + HOOK_DATA_OFFSET;

/// The parts of an attested burn the destination side acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnMessage {
    pub mint_recipient: Address,
    /// Amount burned on the source chain, before the fast-transfer fee.
    pub amount: U256,
    pub hook_data: Bytes,
}

/// Decodes the BurnMessageV2 body of an attested CCTP V2 message.
pub fn decode_burn_message(message: &[u8]) -> Result<BurnMessage, CctpError> {
    if message.len() < MIN_BURN_MESSAGE_LENGTH {
        return Err(CctpError::BurnMessageTooShort {
            length: message.len(),
        });
    }

    let body = &message[MESSAGE_BODY_INDEX..];
    let word = |offset: usize| FixedBytes::<32>::from_slice(&body[offset..offset + 32]);

    Ok(BurnMessage {
        mint_recipient: Address::from_word(word(MINT_RECIPIENT_OFFSET)),
        amount: U256::from_be_bytes(word(AMOUNT_OFFSET).0),
        hook_data: Bytes::copy_from_slice(&body[HOOK_DATA_OFFSET..]),
    })
}

/// Fee entry from Circle's `/v2/burn/USDC/fees/{source}/{dest}` API.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FeeEntry {
    /// 1000 = fast transfer, 2000 = standard transfer
    finality_threshold: u32,
    /// Minimum fee in basis points
    minimum_fee: Decimal,
}

#[derive(Deserialize, Debug)]
struct MessageEntry {
    attestation: Option<String>,
    message: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<MessageEntry>,
}

/// Polling behavior for the attestation API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationPolling {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl Default for AttestationPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 600,
        }
    }
}

/// Client for Circle's Iris attestation and fee APIs.
#[derive(Debug, Clone)]
pub struct CircleClient {
    http_client: reqwest::Client,
    api_base: String,
    polling: AttestationPolling,
}

impl CircleClient {
    pub fn new(api_base: impl Into<String>, polling: AttestationPolling) -> Result<Self, CctpError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            polling,
        })
    }

    /// Longest a single [`Self::poll_attestation`] call can wait.
    pub(crate) fn max_poll_duration(&self) -> Duration {
        self.polling
            .interval
            .saturating_mul(u32::try_from(self.polling.max_attempts).unwrap_or(u32::MAX))
    }

    /// Computes `maxFee` for a fast burn of `amount`.
    ///
    /// Never fails: when the fee endpoint cannot be used the fee falls back
    /// to `amount / 10000 + 1`.
    pub async fn max_fee(&self, amount: U256, source: Chain, destination: Chain) -> U256 {
        match self.query_fast_transfer_fee(amount, source, destination).await {
            Ok(fee) => fee,
            Err(err) => {
                let fallback = fallback_max_fee(amount);
                warn!(%err, %fallback, "Fee estimation failed, using basis-point heuristic");
                fallback
            }
        }
    }

    async fn query_fast_transfer_fee(
        &self,
        amount: U256,
        source: Chain,
        destination: Chain,
    ) -> Result<U256, CctpError> {
        let url = format!(
            "{}/v2/burn/USDC/fees/{}/{}",
            self.api_base,
            source.domain(),
            destination.domain()
        );
        let response = self.http_client.get(&url).send().await?;

        let unavailable = CctpError::FastTransferFeeNotAvailable {
            source_domain: source.domain(),
            destination_domain: destination.domain(),
        };

        if !response.status().is_success() {
            warn!(
                url,
                status = response.status().as_u16(),
                "Fee endpoint failed"
            );
            return Err(unavailable);
        }

        let fee_entries: Vec<FeeEntry> = response.json().await?;

        let fast_fee = fee_entries
            .iter()
            .find(|e| e.finality_threshold == FAST_TRANSFER_THRESHOLD)
            .ok_or(unavailable)?
            .minimum_fee;

        // Fractional bps are rounded down, with a floor of 1 bp.
        let fee_bps = fast_fee.floor().to_u64().unwrap_or(0).max(1);

        debug!(%source, %destination, fee_bps, "Retrieved fast transfer fee");

        let max_fee = amount
            .checked_mul(U256::from(fee_bps))
            .ok_or(CctpError::FeeCalculationOverflow)?
            / U256::from(BASIS_POINTS);

        Ok(max_fee.max(U256::from(1)))
    }

    /// Polls the Iris API until the burn in `burn_tx` has a complete
    /// attestation.
    ///
    /// 404s and pending entries are retried at the configured interval up to
    /// the configured number of attempts. Any other non-success status is
    /// returned immediately.
    #[tracing::instrument(skip(self), level = tracing::Level::INFO)]
    pub async fn poll_attestation(
        &self,
        source: Chain,
        burn_tx: TxHash,
    ) -> Result<Attestation, CctpError> {
        let url = format!(
            "{}/v2/messages/{}?transactionHash={burn_tx}",
            self.api_base,
            source.domain()
        );

        info!(%url, "Polling attestation API");

        let backoff = ConstantBuilder::default()
            .with_delay(self.polling.interval)
            .with_max_times(self.polling.max_attempts);

        let fetch_attestation = || async { self.fetch_attestation(&url).await };

        let (message, attestation) = fetch_attestation
            .retry(backoff)
            .when(AttestationError::is_not_ready)
            .notify(|err, dur| match err {
                AttestationError::Pending { status } => {
                    info!(%status, ?dur, "Attestation pending, retrying");
                }
                err => debug!(%err, ?dur, "Attestation not yet available, retrying"),
            })
            .await
            .map_err(|err| {
                if err.is_not_ready() {
                    CctpError::AttestationTimeout {
                        attempts: self.polling.max_attempts,
                        source: err,
                    }
                } else {
                    CctpError::Attestation(err)
                }
            })?;

        let nonce = extract_nonce_from_message(&message)?;

        info!(%nonce, "Attestation received");

        Ok(Attestation {
            message,
            attestation,
            nonce,
        })
    }

    async fn fetch_attestation(&self, url: &str) -> Result<(Bytes, Bytes), AttestationError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AttestationError::NotYetAvailable {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(AttestationError::Api {
                status: status.as_u16(),
            });
        }

        let body: MessagesResponse = response.json().await?;

        let Some(entry) = body.messages.into_iter().next() else {
            return Err(AttestationError::Pending {
                status: "no messages".to_string(),
            });
        };

        match entry.status.as_deref() {
            Some("complete") | None => {}
            Some(status) => {
                return Err(AttestationError::Pending {
                    status: status.to_string(),
                });
            }
        }

        match (entry.message, entry.attestation) {
            (Some(message), Some(attestation))
                if message.starts_with("0x") && attestation.starts_with("0x") =>
            {
                Ok((
                    Bytes::from(alloy::hex::decode(&message)?),
                    Bytes::from(alloy::hex::decode(&attestation)?),
                ))
            }
            (message, attestation) => Err(AttestationError::Pending {
                status: not_ready_reason(message.as_deref(), attestation.as_deref()).to_string(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api_base: String) -> Self {
        Self::new(
            api_base,
            AttestationPolling {
                interval: Duration::from_millis(10),
                max_attempts: 3,
            },
        )
        .unwrap()
    }
}

/// Why an otherwise complete entry cannot be used yet. Iris reports
/// `"PENDING"` in place of the attestation until it is signed.
fn not_ready_reason(message: Option<&str>, attestation: Option<&str>) -> &'static str {
    match (message, attestation) {
        (None, _) => "message missing",
        (Some(message), _) if !message.starts_with("0x") => "message not yet 0x-prefixed",
        (_, None) => "attestation missing",
        _ => "attestation not yet 0x-prefixed",
    }
}

fn fallback_max_fee(amount: U256) -> U256 {
    amount / U256::from(BASIS_POINTS) + U256::from(1)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};
    use httpmock::prelude::*;
    use proptest::prelude::*;

    use super::*;
    use crate::test_utils::burn_message;

    const BURN_TX: TxHash =
        b256!("0x1234567890123456789012345678901234567890123456789012345678901234");

    fn attested_message(nonce: [u8; 32]) -> Vec<u8> {
        let mut message = vec![0u8; NONCE_INDEX];
        message.extend_from_slice(&nonce);
        message.extend_from_slice(&[0xAA; 100]);
        message
    }

    #[tokio::test]
    async fn fast_transfer_fee_uses_fast_entry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v2/burn/USDC/fees/3/6");
            then.status(200).json_body(serde_json::json!([
                {"finalityThreshold": 1000, "minimumFee": 2},
                {"finalityThreshold": 2000, "minimumFee": 0}
            ]));
        });

        let client = CircleClient::for_tests(server.base_url());
        let fee = client
            .max_fee(
                U256::from(10_000_000u64),
                Chain::ArbitrumSepolia,
                Chain::BaseSepolia,
            )
            .await;

        mock.assert();
        assert_eq!(fee, U256::from(2_000u64));
    }

    #[tokio::test]
    async fn fractional_fee_rounds_down_with_one_bp_floor() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/burn/USDC/fees/0/6");
            then.status(200).json_body(serde_json::json!([
                {"finalityThreshold": 1000, "minimumFee": 0.5}
            ]));
        });

        let client = CircleClient::for_tests(server.base_url());
        let fee = client
            .max_fee(
                U256::from(10_000_000u64),
                Chain::EthereumSepolia,
                Chain::BaseSepolia,
            )
            .await;

        assert_eq!(fee, U256::from(1_000u64));
    }

    #[tokio::test]
    async fn tiny_amounts_still_pay_one_unit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/burn/USDC/fees/0/6");
            then.status(200).json_body(serde_json::json!([
                {"finalityThreshold": 1000, "minimumFee": 1}
            ]));
        });

        let client = CircleClient::for_tests(server.base_url());
        let fee = client
            .max_fee(U256::from(5u64), Chain::EthereumSepolia, Chain::BaseSepolia)
            .await;

        assert_eq!(fee, U256::from(1u64));
    }

    #[tokio::test]
    async fn fee_falls_back_when_endpoint_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/burn/USDC/fees/0/6");
            then.status(500);
        });

        let client = CircleClient::for_tests(server.base_url());
        let fee = client
            .max_fee(
                U256::from(10_000_000u64),
                Chain::EthereumSepolia,
                Chain::BaseSepolia,
            )
            .await;

        assert_eq!(fee, U256::from(1_001u64));
    }

    #[tokio::test]
    async fn fee_falls_back_without_fast_entry() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/burn/USDC/fees/0/6");
            then.status(200).json_body(serde_json::json!([
                {"finalityThreshold": 2000, "minimumFee": 0}
            ]));
        });

        let client = CircleClient::for_tests(server.base_url());
        let fee = client
            .max_fee(
                U256::from(20_000u64),
                Chain::EthereumSepolia,
                Chain::BaseSepolia,
            )
            .await;

        assert_eq!(fee, U256::from(3u64));
    }

    #[tokio::test]
    async fn attestation_returned_when_complete() {
        let server = MockServer::start();
        let nonce = [0x42; 32];
        let message = attested_message(nonce);

        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v2/messages/3")
                .query_param("transactionHash", BURN_TX.to_string());
            then.status(200).json_body(serde_json::json!({
                "messages": [{
                    "message": alloy::hex::encode_prefixed(&message),
                    "attestation": "0xdeadbeef",
                    "status": "complete"
                }]
            }));
        });

        let client = CircleClient::for_tests(server.base_url());
        let attestation = client
            .poll_attestation(Chain::ArbitrumSepolia, BURN_TX)
            .await
            .unwrap();

        mock.assert_hits(1);
        assert_eq!(attestation.message, Bytes::from(message));
        assert_eq!(attestation.attestation, Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(attestation.nonce, FixedBytes::from(nonce));
    }

    #[tokio::test]
    async fn attestation_times_out_while_not_found() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v2/messages/0");
            then.status(404);
        });

        let client = CircleClient::for_tests(server.base_url());
        let err = client
            .poll_attestation(Chain::EthereumSepolia, BURN_TX)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CctpError::AttestationTimeout {
                    attempts: 3,
                    source: AttestationError::NotYetAvailable { status: 404 }
                }
            ),
            "got: {err:?}"
        );
        assert_eq!(mock.hits(), 4, "initial attempt plus three retries");
    }

    #[tokio::test]
    async fn pending_attestation_is_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v2/messages/0");
            then.status(200).json_body(serde_json::json!({
                "messages": [{
                    "message": "0x",
                    "attestation": "PENDING",
                    "status": "pending_confirmations"
                }]
            }));
        });

        let client = CircleClient::for_tests(server.base_url());
        let err = client
            .poll_attestation(Chain::EthereumSepolia, BURN_TX)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CctpError::AttestationTimeout {
                    source: AttestationError::Pending { .. },
                    ..
                }
            ),
            "got: {err:?}"
        );
        assert!(mock.hits() > 1);
    }

    #[tokio::test]
    async fn unsigned_attestation_reports_descriptive_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/messages/0");
            then.status(200).json_body(serde_json::json!({
                "messages": [{
                    "message": alloy::hex::encode_prefixed(attested_message([0x11; 32])),
                    "attestation": "PENDING"
                }]
            }));
        });

        let client = CircleClient::for_tests(server.base_url());
        let url = format!("{}/v2/messages/0", server.base_url());
        let err = client.fetch_attestation(&url).await.unwrap_err();

        let AttestationError::Pending { status } = err else {
            panic!("expected Pending, got: {err:?}");
        };
        assert_eq!(status, "attestation not yet 0x-prefixed");
    }

    #[test]
    fn not_ready_reason_names_the_unusable_field() {
        assert_eq!(not_ready_reason(None, Some("0x01")), "message missing");
        assert_eq!(
            not_ready_reason(Some("PENDING"), Some("0x01")),
            "message not yet 0x-prefixed"
        );
        assert_eq!(not_ready_reason(Some("0x01"), None), "attestation missing");
    }

    #[tokio::test]
    async fn server_errors_abort_polling() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v2/messages/0");
            then.status(500);
        });

        let client = CircleClient::for_tests(server.base_url());
        let err = client
            .poll_attestation(Chain::EthereumSepolia, BURN_TX)
            .await
            .unwrap_err();

        assert!(
            matches!(
                err,
                CctpError::Attestation(AttestationError::Api { status: 500 })
            ),
            "got: {err:?}"
        );
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn short_attested_message_is_rejected() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v2/messages/0");
            then.status(200).json_body(serde_json::json!({
                "messages": [{
                    "message": "0x0102",
                    "attestation": "0x0304",
                    "status": "complete"
                }]
            }));
        });

        let client = CircleClient::for_tests(server.base_url());
        let err = client
            .poll_attestation(Chain::EthereumSepolia, BURN_TX)
            .await
            .unwrap_err();

        assert!(
            matches!(err, CctpError::MessageTooShort { length: 2 }),
            "got: {err:?}"
        );
    }

    #[test]
    fn burn_message_body_is_decoded() {
        let hook_executor = address!("0x8AE4bb6B48C211072D3DEe6Cd9734a906450623C");
        let hook_data = Bytes::from(vec![0x5a; 64]);
        let message = burn_message([0x42; 32], hook_executor, U256::from(2_500_000u64), &hook_data);

        let burn = decode_burn_message(&message).unwrap();

        assert_eq!(
            burn,
            BurnMessage {
                mint_recipient: hook_executor,
                amount: U256::from(2_500_000u64),
                hook_data,
            }
        );
        assert_eq!(
            extract_nonce_from_message(&message).unwrap(),
            FixedBytes::from([0x42; 32])
        );
    }

    #[test]
    fn header_only_message_has_no_burn_body() {
        let err = decode_burn_message(&attested_message([0x01; 32])).unwrap_err();

        assert!(
            matches!(err, CctpError::BurnMessageTooShort { length: 144 }),
            "got: {err:?}"
        );
    }

    #[test]
    fn extract_nonce_from_short_message_returns_message_too_short() {
        let err = extract_nonce_from_message(&[0u8; 43]).unwrap_err();

        assert!(
            matches!(err, CctpError::MessageTooShort { length: 43 }),
            "got: {err:?}"
        );
    }

    #[test]
    fn fallback_fee_is_one_bp_plus_one() {
        assert_eq!(fallback_max_fee(U256::ZERO), U256::from(1));
        assert_eq!(fallback_max_fee(U256::from(1_000_000u64)), U256::from(101));
    }

    proptest! {
        #[test]
        fn valid_messages_always_extract_correct_nonce(
            header in prop::collection::vec(any::<u8>(), NONCE_INDEX),
            nonce in any::<[u8; 32]>(),
            trailer_len in 0usize..100,
        ) {
            let mut message = header;
            message.extend_from_slice(&nonce);
            message.extend(std::iter::repeat_n(0u8, trailer_len));

            let extracted = extract_nonce_from_message(&message).unwrap();

            prop_assert_eq!(extracted, FixedBytes::from(nonce));
        }
    }
}
