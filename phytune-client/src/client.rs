use std::time::Duration;

use phytune_protocol::{
    EyeSamplePair, KR_TUNE_OUT_LEN_MAX, Lane, MC_CMD_KR_TUNE, Namespace, ParameterSetting,
    Request, TunedParameter,
    codec::{decode_eye_samples, decode_parameters, first_lane},
    error::DecodeError,
};

use crate::{Transport, error::RpcError, eye_scan::EyeScan};

#[derive(Debug, Clone)]
pub struct Config {
    /// Response buffer size offered for requests that return data
    pub max_response_len: usize,
    /// Upper bound for a complete eye scan. `None` polls until the controller is done.
    pub eye_scan_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_response_len: KR_TUNE_OUT_LEN_MAX,
            eye_scan_timeout: None,
        }
    }
}

/// Builder to create a [TuneClient] instance and modify configuration options
///
/// # Example
///
/// ```ignore
/// use phytune_client::client::Builder;
/// use std::time::Duration;
///
/// let client = Builder::new()
///     .eye_scan_timeout(Duration::from_secs(60))
///     .build(my_transport, "eth2");
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the response buffer size offered to the controller.
    pub fn max_response_len(mut self, len: usize) -> Self {
        self.config.max_response_len = len;
        self
    }

    /// Set the time after which an eye scan is abandoned
    pub fn eye_scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.eye_scan_timeout = Some(timeout);
        self
    }

    /// Build and return the client
    pub fn build<T: Transport>(self, transport: T, device: impl Into<String>) -> TuneClient<T> {
        TuneClient::new(transport, device, self.config)
    }
}

/// Executes `KR_TUNE` requests on a single device.
#[derive(Debug)]
pub struct TuneClient<T: Transport> {
    transport: T,
    device: String,
    config: Config,
}

impl<T: Transport> TuneClient<T> {
    pub fn new(transport: T, device: impl Into<String>, config: Config) -> TuneClient<T> {
        TuneClient {
            transport,
            device: device.into(),
            config,
        }
    }

    /// The name of the device that requests are sent to
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a request and returns the raw response.
    /// Fails without touching the transport if either direction exceeds its capacity.
    fn rpc(&self, request: &Request) -> Result<Box<[u8]>, RpcError> {
        let payload = request.to_bytes();
        let response_len = if request.response_len_max() > 0 {
            self.config.max_response_len
        } else {
            0
        };

        let max = self.transport.max_payload();
        for got in [payload.len(), response_len] {
            if got > max {
                log::debug!(
                    "{} exceeds transport capacity: max={}, got={}",
                    request.op(),
                    max,
                    got
                );
                return Err(RpcError::ResourceLimitExceeded { max, got });
            }
        }

        log::debug!(
            "Sending {} to {}: request_len={}, response_len={}",
            request.op(),
            self.device,
            payload.len(),
            response_len
        );
        log::trace!("{} request: {:02x?}", request.op(), payload);

        match self
            .transport
            .execute(&self.device, MC_CMD_KR_TUNE, &payload, response_len)
        {
            Ok(response) => {
                log::debug!("{} returned {} bytes", request.op(), response.len());
                log::trace!("{} response: {:02x?}", request.op(), &response[..]);
                Ok(response)
            }
            Err(e) => {
                log::debug!("{} failed: {}", request.op(), e);
                Err(e)
            }
        }
    }

    /// Reads all parameters of `namespace`.
    ///
    /// Entries with an unknown ordinal are returned as errors in place,
    /// they do not fail the whole request.
    pub fn get_parameters(
        &self,
        namespace: Namespace,
    ) -> Result<Vec<Result<TunedParameter, DecodeError>>, RpcError> {
        let request = match namespace {
            Namespace::RxEq => Request::GetRxEq,
            Namespace::TxEq => Request::GetTxEq,
        };
        let response = self.rpc(&request)?;
        let entries = decode_parameters(&response, namespace);
        for entry in &entries {
            if let Err(e) = entry {
                log::debug!("Skipping {} entry: {}", namespace, e);
            }
        }
        Ok(entries)
    }

    pub fn get_rxeq(&self) -> Result<Vec<Result<TunedParameter, DecodeError>>, RpcError> {
        self.get_parameters(Namespace::RxEq)
    }

    pub fn get_txeq(&self) -> Result<Vec<Result<TunedParameter, DecodeError>>, RpcError> {
        self.get_parameters(Namespace::TxEq)
    }

    /// Writes a single parameter. The namespace of the parameter selects
    /// between the receive and the transmit set request.
    pub fn set_parameter(&self, setting: &ParameterSetting) -> Result<(), RpcError> {
        let request = match setting.parameter.namespace() {
            Namespace::RxEq => Request::SetRxEq(*setting),
            Namespace::TxEq => Request::SetTxEq(*setting),
        };
        log::info!(
            "Setting Lane{}.{}={}{} on {}",
            setting.lane,
            setting.parameter.name(),
            setting.value,
            if setting.autocal { " (autocal)" } else { "" },
            self.device
        );
        self.rpc(&request).map(|_| ())
    }

    /// Restarts calibration of all parameters with autocal enabled.
    pub fn recalibrate(&self) -> Result<(), RpcError> {
        self.rpc(&Request::Recalibrate).map(|_| ())
    }

    /// Determines the lane that an eye scan should run on.
    ///
    /// The controller offers no request for this. Instead, the lane of the first
    /// receive equalization entry is used, relying on the firmware listing the
    /// active lane first.
    pub fn active_lane(&self) -> Result<Lane, RpcError> {
        let response = self.rpc(&Request::GetRxEq)?;
        let lane = first_lane(&response).ok_or(RpcError::MissingLane)?;
        log::debug!("Active lane of {} is {}", self.device, lane);
        Ok(lane)
    }

    pub fn start_eye_scan(&self, lane: Lane) -> Result<(), RpcError> {
        log::info!("Starting eye scan on {} lane {}", self.device, lane);
        self.rpc(&Request::StartEyeScan { lane }).map(|_| ())
    }

    /// Fetches the next batch of eye samples.
    ///
    /// Returns `None` once the controller answers with an empty response, which marks the scan
    /// as complete. A response too short to hold a single pair yields an empty batch.
    pub fn poll_eye_scan(&self) -> Result<Option<Vec<EyeSamplePair>>, RpcError> {
        let response = self.rpc(&Request::PollEyeScan)?;
        if response.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode_eye_samples(&response)))
    }

    /// Creates an eye scan session using the configured timeout.
    /// Nothing is sent to the controller until the session is iterated.
    pub fn eye_scan(&self) -> EyeScan<'_, T> {
        let scan = EyeScan::new(self);
        match self.config.eye_scan_timeout {
            Some(timeout) => scan.with_timeout(timeout),
            None => scan,
        }
    }
}
