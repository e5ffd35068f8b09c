//! Document registration client.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::transport::{ApiResponse, HttpTransport, Transport, TransportRequest};
use crate::config::CrptConfig;
use crate::document::{encode_payload, CreateDocumentRequest, Document};
use crate::error::Result;
use crate::gate::{AdmissionGate, CancelToken};

/// Client that registers documents while throttling its call rate.
///
/// Every call passes through a shared [`AdmissionGate`] before anything is
/// sent, so concurrent callers on one client jointly respect the limit.
pub struct CrptApi<T: Transport = HttpTransport> {
    /// Throttles outbound calls
    gate: AdmissionGate,
    /// Sends encoded payloads
    transport: Arc<T>,
    /// Document creation endpoint
    endpoint: String,
    /// Aborts pending admissions on shutdown
    cancel: CancelToken,
}

impl CrptApi<HttpTransport> {
    /// Create a client that talks HTTP to the configured endpoint.
    pub fn new(config: &CrptConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.api.timeout())?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> CrptApi<T> {
    /// Create a client with a custom transport.
    pub fn with_transport(config: &CrptConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let gate = config.rate_limit.build_gate()?;
        Ok(Self::with_gate(gate, transport, config.api.endpoint.clone()))
    }

    /// Create a client from an existing gate, which may be shared with other clients.
    pub fn with_gate(gate: AdmissionGate, transport: T, endpoint: impl Into<String>) -> Self {
        Self {
            gate,
            transport: Arc::new(transport),
            endpoint: endpoint.into(),
            cancel: CancelToken::new(),
        }
    }

    /// The gate throttling this client.
    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Register a signed document.
    ///
    /// Waits for admission first. Fails with a cancelled gate error if the
    /// client is shut down before admission; in that case nothing is sent.
    #[instrument(skip_all, fields(doc_id = %document.doc_id))]
    pub async fn create_document(&self, document: &Document, signature: &str) -> Result<ApiResponse> {
        self.gate.acquire_async(&self.cancel).await?;

        let body = encode_payload(&CreateDocumentRequest::new(document, signature))?;
        let request = TransportRequest {
            url: self.endpoint.clone(),
            body,
        };

        info!(endpoint = %self.endpoint, "Creating document");
        let response = self.transport.send(request).await?;

        if response.is_success() {
            info!(status = response.status, "Document accepted");
        } else {
            warn!(status = response.status, body = %response.body, "Document rejected");
        }
        Ok(response)
    }

    /// Abort all pending and future calls.
    pub fn shutdown(&self) {
        info!("Shutting down client");
        self.cancel.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<T: Transport> std::fmt::Debug for CrptApi<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrptApi")
            .field("gate", &self.gate)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
