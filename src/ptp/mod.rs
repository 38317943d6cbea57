//! Imaging-device (PTP) session layer
//!
//! Only the pieces the capture path needs are modelled: request/response
//! containers, the data phase of a request, event polling, and object
//! download/delete. Device discovery and opening the session belong to the
//! embedding application, which hands over an opened [`PtpTransport`].

use crate::error::CaptureResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

pub mod mock;
pub mod script;

pub use mock::MockPtpTransport;
pub use script::{ScriptLanguage, ScriptProtocol, ScriptStatus};

/// Standard response codes
pub mod response_code {
    /// Operation completed
    pub const OK: u16 = 0x2001;
    /// Unspecified failure
    pub const GENERAL_ERROR: u16 = 0x2002;
    /// A parameter is not supported
    pub const PARAMETER_NOT_SUPPORTED: u16 = 0x2006;
    /// A parameter value is invalid
    pub const INVALID_PARAMETER: u16 = 0x201D;
}

/// Standard event codes
pub mod event_code {
    /// A new object was stored on the device
    pub const OBJECT_ADDED: u16 = 0x4002;
}

/// Operation request container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpRequest {
    /// Operation code
    pub opcode: u16,
    /// Session the request belongs to
    pub session_id: u32,
    /// Transaction id pairing request and response
    pub transaction_id: u32,
    /// Up to five request parameters
    pub params: Vec<u32>,
}

/// Operation response container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpResponse {
    /// Response code
    pub code: u16,
    /// Transaction the response answers
    pub transaction_id: u32,
    /// Response parameters
    pub params: Vec<u32>,
}

/// Asynchronous event raised by the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtpEvent {
    /// Event code
    pub code: u16,
    /// Event parameters; for `OBJECT_ADDED` the first is the object id
    pub params: Vec<u32>,
}

/// Descriptive data about the connected camera, for logs only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Vendor extension id reported by the device
    pub vendor_extension_id: u32,
    /// Model name
    pub model: String,
    /// Serial number
    pub serial_number: String,
}

/// Opened transport to an imaging device.
///
/// Implementations must report a read that ran out of time as
/// `CaptureError::TransportTimeout` so callers can retry the read alone.
#[async_trait]
pub trait PtpTransport: Send {
    /// Send the command phase of a request.
    async fn send_request(&mut self, request: &PtpRequest) -> CaptureResult<()>;

    /// Send the data phase of a request.
    async fn send_data(&mut self, request: &PtpRequest, data: &[u8]) -> CaptureResult<()>;

    /// Read the response to a previously sent request.
    async fn get_response(&mut self, request: &PtpRequest) -> CaptureResult<PtpResponse>;

    /// Next pending event, or `None` when the device has no more events.
    async fn check_for_event(&mut self) -> CaptureResult<Option<PtpEvent>>;

    /// Stream an object's bytes into `sink`.
    async fn get_object(
        &mut self,
        object_id: u32,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CaptureResult<u64>;

    /// Remove an object from device storage.
    async fn delete_object(&mut self, object_id: u32) -> CaptureResult<()>;
}

/// An opened session: transport plus session id and transaction counter.
pub struct PtpSession<T: PtpTransport> {
    transport: T,
    session_id: u32,
    last_transaction: u32,
}

impl<T: PtpTransport> PtpSession<T> {
    /// Wrap an already opened session.
    pub fn new(transport: T, session_id: u32) -> Self {
        Self {
            transport,
            session_id,
            last_transaction: 0,
        }
    }

    /// Session id
    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    /// Allocate the next transaction id.
    pub fn new_transaction(&mut self) -> u32 {
        self.last_transaction = self.last_transaction.wrapping_add(1);
        self.last_transaction
    }

    /// Build a request with a fresh transaction id.
    pub fn request(&mut self, opcode: u16, params: Vec<u32>) -> PtpRequest {
        PtpRequest {
            opcode,
            session_id: self.session_id,
            transaction_id: self.new_transaction(),
            params,
        }
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Release the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }
}
