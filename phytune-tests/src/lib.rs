//! Test doubles for the [`Transport`] trait.
//!
//! - [`ScriptedTransport`] replays a fixed list of replies and records every request.
//! - [`SimulatedController`] decodes requests and keeps parameter and eye scan state
//!   the way the management controller does.
use std::{cell::RefCell, collections::VecDeque, io::Cursor};

use phytune_client::{Transport, error::RpcError};
use phytune_protocol::{
    Lane, MC_CMD_KR_TUNE, Namespace, ParameterSetting, Request, error::ReadError,
};

/// A request as seen by a fake transport
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Recorded {
    pub device: String,
    pub command: u32,
    pub request: Vec<u8>,
    pub max_response: usize,
}

impl Recorded {
    /// Decodes the recorded payload.
    pub fn decode(&self) -> Result<Request, ReadError> {
        Request::from_reader(&mut Cursor::new(&self.request))
    }
}

/// Replies with pre-recorded responses in order.
/// Panics if more requests arrive than replies were scripted.
pub struct ScriptedTransport {
    max_payload: usize,
    replies: RefCell<VecDeque<Result<Vec<u8>, RpcError>>>,
    requests: RefCell<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Result<Vec<u8>, RpcError>>) -> ScriptedTransport {
        ScriptedTransport {
            max_payload: 1020,
            replies: RefCell::new(replies.into_iter().collect()),
            requests: RefCell::default(),
        }
    }

    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.borrow().clone()
    }

    /// The decoded requests in the order they were received
    pub fn decoded_requests(&self) -> Vec<Request> {
        self.requests
            .borrow()
            .iter()
            .map(|r| r.decode().expect("requests should be well formed"))
            .collect()
    }

    pub fn remaining_replies(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Transport for ScriptedTransport {
    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn execute(
        &self,
        device: &str,
        command: u32,
        request: &[u8],
        max_response: usize,
    ) -> Result<Box<[u8]>, RpcError> {
        self.requests.borrow_mut().push(Recorded {
            device: device.to_owned(),
            command,
            request: request.to_vec(),
            max_response,
        });
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .expect("more requests than scripted replies");
        reply.map(Vec::into_boxed_slice)
    }
}

/// Builds a little-endian buffer from words.
pub fn words(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    autocal: bool,
    initial: u8,
    current: u8,
}

/// A controller holding all parameters of a number of lanes.
///
/// With autocal enabled, the current value of a parameter is the initial value plus
/// `autocal_offset` (after a recalibration). Eye scans return the configured batches in order,
/// followed by an empty response.
pub struct SimulatedController {
    lanes: u8,
    rxeq: RefCell<Vec<Slot>>,
    txeq: RefCell<Vec<Slot>>,
    autocal_offset: u8,
    eye_batches: Vec<Vec<u8>>,
    scan: RefCell<Option<(Lane, usize)>>,
    pub active_lane: u8,
}

impl SimulatedController {
    pub fn new(lanes: u8) -> SimulatedController {
        let slots = |ns: Namespace| vec![Slot::default(); lanes as usize * ns.names().len()];
        SimulatedController {
            lanes,
            rxeq: RefCell::new(slots(Namespace::RxEq)),
            txeq: RefCell::new(slots(Namespace::TxEq)),
            autocal_offset: 3,
            eye_batches: Vec::new(),
            scan: RefCell::default(),
            active_lane: 0,
        }
    }

    pub fn with_eye_batches(mut self, batches: Vec<Vec<u8>>) -> Self {
        self.eye_batches = batches;
        self
    }

    /// The lane that the last eye scan was started on
    pub fn scanned_lane(&self) -> Option<Lane> {
        self.scan.borrow().map(|(lane, _)| lane)
    }

    fn table(&self, namespace: Namespace) -> &RefCell<Vec<Slot>> {
        match namespace {
            Namespace::RxEq => &self.rxeq,
            Namespace::TxEq => &self.txeq,
        }
    }

    /// Lists all parameters, starting with the active lane.
    fn get(&self, namespace: Namespace) -> Vec<u8> {
        let count = namespace.names().len();
        let table = self.table(namespace).borrow();
        let lanes = (0..self.lanes).map(|i| (i + self.active_lane) % self.lanes);
        let mut entries = Vec::new();
        for lane in lanes {
            for ordinal in 0..count {
                let slot = table[lane as usize * count + ordinal];
                entries.push(
                    ordinal as u32
                        | u32::from(lane) << 8
                        | u32::from(slot.autocal) << 11
                        | u32::from(slot.initial) << 16
                        | u32::from(slot.current) << 24,
                );
            }
        }
        words(&entries)
    }

    fn set(&self, setting: &ParameterSetting) -> Result<(), RpcError> {
        if setting.lane.index() >= self.lanes {
            return Err(RpcError::ControllerRejected(22));
        }
        let namespace = setting.parameter.namespace();
        let count = namespace.names().len();
        let index = setting.lane.index() as usize * count + setting.parameter.ordinal() as usize;
        self.table(namespace).borrow_mut()[index] = Slot {
            autocal: setting.autocal,
            initial: setting.value,
            current: setting.value,
        };
        Ok(())
    }

    fn recalibrate(&self) {
        for table in [&self.rxeq, &self.txeq] {
            for slot in table.borrow_mut().iter_mut().filter(|s| s.autocal) {
                slot.current = slot.initial.wrapping_add(self.autocal_offset);
            }
        }
    }
}

impl Transport for SimulatedController {
    fn max_payload(&self) -> usize {
        1020
    }

    fn execute(
        &self,
        _device: &str,
        command: u32,
        request: &[u8],
        max_response: usize,
    ) -> Result<Box<[u8]>, RpcError> {
        if command != MC_CMD_KR_TUNE {
            return Err(RpcError::ControllerRejected(38));
        }
        let request = Request::from_reader(&mut Cursor::new(request))
            .map_err(|_| RpcError::ControllerRejected(22))?;
        log::debug!("Simulated controller received {:?}", request);
        let response = match request {
            Request::GetRxEq => self.get(Namespace::RxEq),
            Request::GetTxEq => self.get(Namespace::TxEq),
            Request::SetRxEq(setting) | Request::SetTxEq(setting) => {
                self.set(&setting)?;
                Vec::new()
            }
            Request::Recalibrate => {
                self.recalibrate();
                Vec::new()
            }
            Request::StartEyeScan { lane } => {
                *self.scan.borrow_mut() = Some((lane, 0));
                Vec::new()
            }
            Request::PollEyeScan => {
                let mut scan = self.scan.borrow_mut();
                // Polling without a started scan is an error on real hardware
                let (_, next) = scan.as_mut().ok_or(RpcError::ControllerRejected(1))?;
                let batch = self.eye_batches.get(*next).cloned().unwrap_or_default();
                *next += 1;
                batch
            }
        };
        if response.len() > max_response {
            return Err(RpcError::ControllerRejected(90));
        }
        Ok(response.into_boxed_slice())
    }
}
