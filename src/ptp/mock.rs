//! Simulated scripting camera behind a PTP transport
//!
//! Interprets the handful of Lua calls the capture path sends
//! (`switch_mode_usb`, `set_prop`, `set_aflock`, `press('shoot_half')`,
//! `shoot()`), keeps an in-memory card of captured objects, and lets tests
//! inject read timeouts, error codes and missing capture events.

use super::script::{ScriptCommand, STATUS_RUN};
use super::{event_code, response_code, PtpEvent, PtpRequest, PtpResponse, PtpTransport};
use crate::error::{CaptureError, CaptureResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// First object id handed out by the simulated camera
pub const FIRST_OBJECT_ID: u32 = 0x1000_0001;

/// One call made against the mock transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// Command phase, with its parameters
    Request(Vec<u32>),
    /// Data phase, with its bytes
    Data(Vec<u8>),
    /// Response read for a transaction id
    ResponseRead(u32),
    /// Event poll
    EventPoll,
    /// Object download
    GetObject(u32),
    /// Object deletion
    DeleteObject(u32),
}

#[derive(Default)]
struct CameraState {
    calls: Vec<TransportCall>,
    scripts: Vec<String>,
    pending_timeouts: u32,
    forced_codes: VecDeque<u16>,
    forced_status: VecDeque<u32>,
    failing_scripts: Vec<String>,
    runtime_polls: u32,
    remaining_run_polls: u32,
    current: Option<(PtpRequest, Option<Vec<u8>>)>,
    events: VecDeque<PtpEvent>,
    suppress_capture_events: bool,
    failing_deletes: Vec<u32>,
    objects: BTreeMap<u32, Vec<u8>>,
    next_object: u32,
    record_mode: bool,
    focus_locked: bool,
    half_presses: u32,
    properties: HashMap<u16, i32>,
}

/// Mock PTP transport simulating a scripting camera.
///
/// Clones share state, so tests keep a clone for inspection after handing one clone to
/// the session.
#[derive(Clone, Default)]
pub struct MockPtpTransport {
    state: Arc<Mutex<CameraState>>,
}

impl MockPtpTransport {
    /// Camera with an empty card, in playback mode.
    pub fn new() -> Self {
        let transport = Self::default();
        transport.lock().next_object = FIRST_OBJECT_ID;
        transport
    }

    /// The next `count` response reads time out.
    pub fn push_read_timeouts(&self, count: u32) {
        self.lock().pending_timeouts += count;
    }

    /// The next answered request gets this response code.
    pub fn push_response_code(&self, code: u16) {
        self.lock().forced_codes.push_back(code);
    }

    /// The next STATUS request reports this bitmask.
    pub fn push_status(&self, bits: u32) {
        self.lock().forced_status.push_back(bits);
    }

    /// Every script containing `needle` is answered with GeneralError.
    pub fn fail_scripts_containing(&self, needle: &str) {
        self.lock().failing_scripts.push(needle.to_string());
    }

    /// Each script keeps running for this many status polls.
    pub fn set_script_runtime_polls(&self, polls: u32) {
        self.lock().runtime_polls = polls;
    }

    /// `shoot()` stores an object but raises no ObjectAdded event.
    pub fn suppress_capture_events(&self) {
        self.lock().suppress_capture_events = true;
    }

    /// Queue an unrelated event ahead of later events.
    pub fn push_event(&self, event: PtpEvent) {
        self.lock().events.push_back(event);
    }

    /// Deleting this object id fails.
    pub fn fail_delete(&self, object_id: u32) {
        self.lock().failing_deletes.push(object_id);
    }

    /// Calls seen so far, in order
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Script texts executed so far, without the trailing NUL
    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    /// Object ids still stored on the card
    pub fn objects(&self) -> Vec<u32> {
        self.lock().objects.keys().copied().collect()
    }

    /// Whether the camera is in shooting mode
    pub fn record_mode(&self) -> bool {
        self.lock().record_mode
    }

    /// Whether focus is locked on the camera side
    pub fn focus_locked(&self) -> bool {
        self.lock().focus_locked
    }

    /// Number of half-press focus triggers seen
    pub fn half_presses(&self) -> u32 {
        self.lock().half_presses
    }

    /// Current value of a camera property
    pub fn property(&self, id: u16) -> Option<i32> {
        self.lock().properties.get(&id).copied()
    }

    fn lock(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CameraState {
    fn run_script(&mut self, script: &str) -> u16 {
        self.scripts.push(script.to_string());
        if self.failing_scripts.iter().any(|n| script.contains(n.as_str())) {
            return response_code::GENERAL_ERROR;
        }

        for line in script.lines().map(str::trim) {
            if line.starts_with("switch_mode_usb(1)") {
                self.record_mode = true;
            } else if let Some(args) = call_args(line, "set_aflock") {
                self.focus_locked = args.trim() == "1";
            } else if let Some(args) = call_args(line, "set_prop") {
                let mut parts = args.split(',').map(str::trim);
                if let (Some(Ok(id)), Some(Ok(value))) = (
                    parts.next().map(str::parse::<u16>),
                    parts.next().map(str::parse::<i32>),
                ) {
                    self.properties.insert(id, value);
                }
            } else if line.starts_with("press('shoot_half')") {
                self.half_presses += 1;
            } else if line.starts_with("shoot()") {
                if !self.record_mode {
                    return response_code::GENERAL_ERROR;
                }
                let id = self.next_object;
                self.next_object += 1;
                self.objects
                    .insert(id, format!("JPEG object {:08X}", id).into_bytes());
                if !self.suppress_capture_events {
                    self.events.push_back(PtpEvent {
                        code: event_code::OBJECT_ADDED,
                        params: vec![id],
                    });
                }
            }
        }

        self.remaining_run_polls = self.runtime_polls;
        response_code::OK
    }

    fn answer(&mut self, request: &PtpRequest, data: Option<Vec<u8>>) -> PtpResponse {
        let mut params = Vec::new();
        let mut code = response_code::OK;

        if request.params.first() == Some(&ScriptCommand::Execute.id()) {
            let text = data
                .as_deref()
                .map(|bytes| bytes.strip_suffix(&[0u8]).unwrap_or(bytes))
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_default();
            code = self.run_script(&text);
        } else if request.params.first() == Some(&ScriptCommand::Status.id()) {
            let bits = match self.forced_status.pop_front() {
                Some(bits) => bits,
                None if self.remaining_run_polls > 0 => {
                    self.remaining_run_polls -= 1;
                    STATUS_RUN
                }
                None => 0,
            };
            params.push(bits);
        }

        if let Some(forced) = self.forced_codes.pop_front() {
            code = forced;
        }

        PtpResponse {
            code,
            transaction_id: request.transaction_id,
            params,
        }
    }
}

fn call_args<'a>(line: &'a str, function: &str) -> Option<&'a str> {
    line.strip_prefix(function)?
        .strip_prefix('(')?
        .split(')')
        .next()
}

#[async_trait]
impl PtpTransport for MockPtpTransport {
    async fn send_request(&mut self, request: &PtpRequest) -> CaptureResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Request(request.params.clone()));
        state.current = Some((request.clone(), None));
        Ok(())
    }

    async fn send_data(&mut self, request: &PtpRequest, data: &[u8]) -> CaptureResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Data(data.to_vec()));
        match state.current.as_mut() {
            Some((current, payload)) if current.transaction_id == request.transaction_id => {
                *payload = Some(data.to_vec());
                Ok(())
            }
            _ => Err(CaptureError::Transport(
                "Data phase without a matching request".to_string(),
            )),
        }
    }

    async fn get_response(&mut self, request: &PtpRequest) -> CaptureResult<PtpResponse> {
        let mut state = self.lock();
        state
            .calls
            .push(TransportCall::ResponseRead(request.transaction_id));
        if state.pending_timeouts > 0 {
            state.pending_timeouts -= 1;
            return Err(CaptureError::TransportTimeout);
        }
        let (current, data) = state
            .current
            .take()
            .ok_or_else(|| CaptureError::Transport("No request awaiting a response".to_string()))?;
        Ok(state.answer(&current, data))
    }

    async fn check_for_event(&mut self) -> CaptureResult<Option<PtpEvent>> {
        let mut state = self.lock();
        state.calls.push(TransportCall::EventPoll);
        Ok(state.events.pop_front())
    }

    async fn get_object(
        &mut self,
        object_id: u32,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> CaptureResult<u64> {
        let bytes = {
            let mut state = self.lock();
            state.calls.push(TransportCall::GetObject(object_id));
            state
                .objects
                .get(&object_id)
                .cloned()
                .ok_or_else(|| CaptureError::Storage {
                    handle: object_id,
                    reason: "no such object".to_string(),
                })?
        };
        sink.write_all(&bytes).await?;
        sink.flush().await?;
        Ok(bytes.len() as u64)
    }

    async fn delete_object(&mut self, object_id: u32) -> CaptureResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::DeleteObject(object_id));
        if state.failing_deletes.contains(&object_id) {
            return Err(CaptureError::Storage {
                handle: object_id,
                reason: "delete rejected".to_string(),
            });
        }
        state
            .objects
            .remove(&object_id)
            .map(|_| ())
            .ok_or_else(|| CaptureError::Storage {
                handle: object_id,
                reason: "no such object".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_interpretation() {
        let mut state = CameraState {
            next_object: FIRST_OBJECT_ID,
            ..Default::default()
        };
        assert_eq!(state.run_script("shoot()"), response_code::GENERAL_ERROR);
        assert_eq!(state.run_script("switch_mode_usb(1)"), response_code::OK);
        state.run_script("set_prop(143,2) -- flash off");
        state.run_script("set_aflock(1)");
        state.run_script("shoot()");

        assert_eq!(state.properties.get(&143), Some(&2));
        assert!(state.focus_locked);
        assert_eq!(state.objects.len(), 1);
        assert_eq!(state.events.len(), 1);
    }

    #[test]
    fn test_call_args() {
        assert_eq!(call_args("set_prop(143, 1)", "set_prop"), Some("143, 1"));
        assert_eq!(call_args("set_aflock(0)", "set_prop"), None);
    }
}
