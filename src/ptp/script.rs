//! Script execution over the camera's PTP vendor extension
//!
//! Protocol Overview:
//! - Opcode: `0x9999` (vendor extension)
//! - EXECUTE: params `(7, language)`, followed by a data phase carrying the
//!   script text terminated by a single NUL byte
//! - STATUS: params `(8)`, no data phase; response param 0 is a bitmask
//!   (bit 0 = script running, bit 1 = message waiting)
//!
//! The response to EXECUTE only arrives once the camera has accepted the
//! script, which can outlast one transport read. A timed-out read is retried
//! on its own; the request is never re-sent, since a second request would
//! leave an unanswered transaction and pair every later response with the
//! wrong request.

use super::{response_code, PtpRequest, PtpResponse, PtpSession, PtpTransport};
use crate::error::{CaptureError, CaptureResult};
use crate::error_recovery::RetryPolicy;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Vendor opcode for script commands
pub const SCRIPT_OPCODE: u16 = 0x9999;

/// Status bit: a script is running
pub const STATUS_RUN: u32 = 0x1;
/// Status bit: the script left a message
pub const STATUS_MSG: u32 = 0x2;

/// Script sub-command carried in request parameter 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Run a script
    Execute,
    /// Query script state
    Status,
}

impl ScriptCommand {
    /// Wire value
    pub fn id(self) -> u32 {
        match self {
            ScriptCommand::Execute => 7,
            ScriptCommand::Status => 8,
        }
    }
}

/// Scripting language understood by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptLanguage {
    /// Lua
    #[default]
    Lua,
    /// uBASIC
    UBasic,
}

impl ScriptLanguage {
    /// Wire value
    pub fn tag(self) -> u32 {
        match self {
            ScriptLanguage::Lua => 0,
            ScriptLanguage::UBasic => 1,
        }
    }
}

/// Decoded response code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// 0x2001
    Ok,
    /// 0x2002
    GeneralError,
    /// 0x2006
    ParameterNotSupported,
    /// 0x201D
    InvalidParameter,
    /// Anything else
    Other(u16),
}

impl ResponseCode {
    /// Decode a raw response code.
    pub fn from_raw(code: u16) -> Self {
        match code {
            response_code::OK => ResponseCode::Ok,
            response_code::GENERAL_ERROR => ResponseCode::GeneralError,
            response_code::PARAMETER_NOT_SUPPORTED => ResponseCode::ParameterNotSupported,
            response_code::INVALID_PARAMETER => ResponseCode::InvalidParameter,
            other => ResponseCode::Other(other),
        }
    }
}

/// One script request, built per call and dropped once answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptRequest {
    command: ScriptCommand,
    language: ScriptLanguage,
    payload: Option<Vec<u8>>,
}

impl ScriptRequest {
    /// EXECUTE request; the payload is the script text plus a NUL byte.
    pub fn execute(script: &str, language: ScriptLanguage) -> Self {
        let mut payload = Vec::with_capacity(script.len() + 1);
        payload.extend_from_slice(script.as_bytes());
        payload.push(0);
        Self {
            command: ScriptCommand::Execute,
            language,
            payload: Some(payload),
        }
    }

    /// STATUS request
    pub fn status() -> Self {
        Self {
            command: ScriptCommand::Status,
            language: ScriptLanguage::default(),
            payload: None,
        }
    }

    /// Sub-command
    pub fn command(&self) -> ScriptCommand {
        self.command
    }

    /// Request parameters as sent on the wire
    pub fn params(&self) -> Vec<u32> {
        match self.command {
            ScriptCommand::Execute => vec![self.command.id(), self.language.tag()],
            ScriptCommand::Status => vec![self.command.id()],
        }
    }

    /// Data phase, if any
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

/// Response to a script request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResponse {
    /// Decoded response code
    pub code: ResponseCode,
    /// Response parameters
    pub params: Vec<u32>,
}

impl From<PtpResponse> for ScriptResponse {
    fn from(response: PtpResponse) -> Self {
        Self {
            code: ResponseCode::from_raw(response.code),
            params: response.params,
        }
    }
}

/// Script state decoded from a STATUS response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptStatus {
    /// A script is still running
    pub running: bool,
    /// The script posted a message
    pub message_waiting: bool,
}

impl ScriptStatus {
    /// Decode the status bitmask.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            running: bits & STATUS_RUN != 0,
            message_waiting: bits & STATUS_MSG != 0,
        }
    }
}

/// Script request/response layer over an opened session
pub struct ScriptProtocol<T: PtpTransport> {
    session: PtpSession<T>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl<T: PtpTransport> ScriptProtocol<T> {
    /// Create the protocol layer.
    ///
    /// # Arguments
    /// * `session` - Opened session, owned from here on
    /// * `retry` - Budget for late responses
    /// * `poll_interval` - Pause between status polls while waiting for a
    ///   script to finish
    pub fn new(session: PtpSession<T>, retry: RetryPolicy, poll_interval: Duration) -> Self {
        Self {
            session,
            retry,
            poll_interval,
        }
    }

    /// Run a script on the camera.
    ///
    /// With `wait`, returns only after the script has stopped running.
    ///
    /// # Errors
    /// - `CaptureError::Protocol` for a non-OK response code
    /// - `CaptureError::ResponseTimeout` when the retry budget runs out
    /// - transport errors from the session
    pub async fn execute(
        &mut self,
        script: &str,
        language: ScriptLanguage,
        wait: bool,
    ) -> CaptureResult<ScriptResponse> {
        trace!("Executing script: {}", script.trim());
        let response = self.transact(ScriptRequest::execute(script, language)).await?;
        if wait {
            self.wait_for_finish().await?;
        }
        Ok(response)
    }

    /// Query whether a script is running and whether it left a message.
    pub async fn query_status(&mut self) -> CaptureResult<ScriptStatus> {
        let response = self.transact(ScriptRequest::status()).await?;
        let bits = response.params.first().copied().ok_or_else(|| {
            CaptureError::Transport("Script status response carried no parameters".to_string())
        })?;
        Ok(ScriptStatus::from_bits(bits))
    }

    /// Poll status until the running flag clears.
    pub async fn wait_for_finish(&mut self) -> CaptureResult<()> {
        loop {
            let status = self.query_status().await?;
            if !status.running {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Session, for non-script operations such as object transfer.
    pub fn session_mut(&mut self) -> &mut PtpSession<T> {
        &mut self.session
    }

    /// Session
    pub fn session(&self) -> &PtpSession<T> {
        &self.session
    }

    async fn transact(&mut self, request: ScriptRequest) -> CaptureResult<ScriptResponse> {
        let ptp_request = self.session.request(SCRIPT_OPCODE, request.params());
        let transport = self.session.transport_mut();

        transport.send_request(&ptp_request).await?;
        if let Some(payload) = request.payload() {
            transport.send_data(&ptp_request, payload).await?;
        }

        let response = self.await_response(&ptp_request).await?;
        if response.code != response_code::OK {
            return Err(CaptureError::Protocol {
                code: response.code,
            });
        }
        Ok(response.into())
    }

    async fn await_response(&mut self, request: &PtpRequest) -> CaptureResult<PtpResponse> {
        let started = Instant::now();
        let mut timeouts = 0u32;

        loop {
            match self.session.transport_mut().get_response(request).await {
                Ok(response) => {
                    if response.transaction_id != request.transaction_id {
                        return Err(CaptureError::Transport(format!(
                            "Response for transaction {} arrived while waiting for {}",
                            response.transaction_id, request.transaction_id
                        )));
                    }
                    if timeouts > 0 {
                        debug!(
                            "Script response arrived after {} timed-out reads ({:?})",
                            timeouts,
                            started.elapsed()
                        );
                    }
                    return Ok(response);
                }
                Err(CaptureError::TransportTimeout) => {
                    timeouts += 1;
                    let elapsed = started.elapsed();
                    if !self.retry.allows_retry(timeouts, elapsed) {
                        warn!(
                            "Giving up on transaction {} after {} timed-out reads",
                            request.transaction_id, timeouts
                        );
                        return Err(CaptureError::ResponseTimeout {
                            attempts: timeouts,
                            elapsed,
                        });
                    }
                    trace!("Script response not ready (attempt {}), retrying read", timeouts);
                    tokio::time::sleep(self.retry.backoff(timeouts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
