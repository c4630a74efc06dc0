//! # Eye Scan Session
//!
//! An eye scan is acquired in several steps:
//!
//! 1. The lane to scan is determined (see [`TuneClient::active_lane`])
//! 2. The acquisition is started on that lane
//! 3. The controller is polled for batches of samples until it returns an empty response
//!
//! [`EyeScan`] performs these steps lazily as an iterator over batches. The controller keeps
//! the scan state itself, keyed by nothing but the device. Therefore, a session cannot be
//! restarted, and two sessions must never run against the same device at the same time.
//!
//! ## Example Usage
//!
//! ```ignore
//! for batch in client.eye_scan() {
//!     let samples = batch?;
//!     println!("{:?}", samples);
//! }
//! ```
use std::{
    iter::FusedIterator,
    time::{Duration, Instant},
};

use phytune_protocol::{EyeSamplePair, Lane};

use crate::{Transport, client::TuneClient, error::RpcError};

/// Progress of an [EyeScan]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScanState {
    /// Nothing was sent yet
    Idle,
    LaneResolved(Lane),
    /// The scan was started but not polled yet
    Acquiring(Lane),
    /// At least one batch was received
    PollingBatch(Lane),
    /// The controller returned an empty response
    Complete,
    Failed,
}

/// A single eye scan acquisition.
///
/// Yields one item per non-empty poll response, even if it is too short to hold a sample pair. After the first error or after the controller
/// signals completion, the iterator yields nothing further.
/// Batches already yielded stay valid when a later poll fails.
pub struct EyeScan<'a, T: Transport> {
    client: &'a TuneClient<T>,
    state: ScanState,
    lane: Option<Lane>,
    deadline: Option<Instant>,
    batches: usize,
    failed_in: Option<ScanState>,
}

impl<'a, T: Transport> EyeScan<'a, T> {
    pub fn new(client: &'a TuneClient<T>) -> EyeScan<'a, T> {
        EyeScan {
            client,
            state: ScanState::Idle,
            lane: None,
            deadline: None,
            batches: 0,
            failed_in: None,
        }
    }

    /// Scans `lane` instead of querying the controller for the active lane.
    pub fn with_lane(mut self, lane: Lane) -> Self {
        self.lane = Some(lane);
        self
    }

    /// Abandons the scan if it is not complete at `deadline`.
    /// The deadline is checked before every request. The controller has no abort command,
    /// so an abandoned scan may still be running on the device.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Like [EyeScan::with_deadline], counting from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// The number of batches yielded so far
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// The state the session was in when it failed.
    /// `Idle` means the lane query failed, `LaneResolved` the start request, anything else a poll.
    pub fn failed_in(&self) -> Option<ScanState> {
        self.failed_in
    }

    fn check_deadline(&self) -> Result<(), RpcError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                log::debug!(
                    "Eye scan on {} exceeded its deadline after {} batches",
                    self.client.device(),
                    self.batches
                );
                Err(RpcError::DeadlineExceeded)
            }
            _ => Ok(()),
        }
    }

    fn resolve_lane(&self) -> Result<Lane, RpcError> {
        self.check_deadline()?;
        match self.lane {
            Some(lane) => Ok(lane),
            None => self.client.active_lane(),
        }
    }

    fn start(&self, lane: Lane) -> Result<(), RpcError> {
        self.check_deadline()?;
        self.client.start_eye_scan(lane)
    }

    fn poll(&self) -> Result<Option<Vec<EyeSamplePair>>, RpcError> {
        self.check_deadline()?;
        self.client.poll_eye_scan()
    }

    fn fail(&mut self, error: RpcError) -> Option<Result<Vec<EyeSamplePair>, RpcError>> {
        log::debug!("Eye scan failed in state {:?}: {}", self.state, error);
        self.failed_in = Some(self.state);
        self.state = ScanState::Failed;
        Some(Err(error))
    }
}

impl<T: Transport> Iterator for EyeScan<'_, T> {
    type Item = Result<Vec<EyeSamplePair>, RpcError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                ScanState::Complete | ScanState::Failed => return None,
                ScanState::Idle => match self.resolve_lane() {
                    Ok(lane) => self.state = ScanState::LaneResolved(lane),
                    Err(e) => return self.fail(e),
                },
                ScanState::LaneResolved(lane) => match self.start(lane) {
                    Ok(()) => self.state = ScanState::Acquiring(lane),
                    Err(e) => return self.fail(e),
                },
                ScanState::Acquiring(lane) | ScanState::PollingBatch(lane) => {
                    return match self.poll() {
                        Ok(None) => {
                            log::info!(
                                "Eye scan on {} lane {} complete after {} batches",
                                self.client.device(),
                                lane,
                                self.batches
                            );
                            self.state = ScanState::Complete;
                            None
                        }
                        Ok(Some(batch)) => {
                            self.state = ScanState::PollingBatch(lane);
                            self.batches += 1;
                            log::debug!("Eye scan batch {}: {} samples", self.batches, batch.len());
                            Some(Ok(batch))
                        }
                        Err(e) => self.fail(e),
                    };
                }
            }
        }
    }
}

impl<T: Transport> FusedIterator for EyeScan<'_, T> {}
