//! # KR_TUNE Client
//!
//! A client library for tuning the SERDES equalization of Solarflare network adapters
//! and acquiring eye diagrams through the adapter's management controller.
//!
//! ## Architecture
//!
//! The crate is built around two main components:
//!
//! - **[`Transport`] Trait**: Defines how a raw request reaches the management controller.
//!   Implementations own the privileged control channel, e.g. the `SIOCEFX` ioctl of the
//!   `sfc` driver found in the `phytune-efx` crate.
//! - **[`client::TuneClient`]**: Encodes the `KR_TUNE` requests, applies the size limits of
//!   the transport and decodes the responses.
//!
//! ## Operations
//!
//! - **Get / set receive equalization**
//! - **Get / set transmit equalization**
//! - **Recalibrate**: Restart calibration of all parameters that have autocal enabled
//! - **Eye scan**: Acquire an eye diagram, see [`eye_scan::EyeScan`]
//!
//! For the wire formats see the [`phytune_protocol`] crate.
//!
//! ## Basic Usage
//!
//! ```ignore
//! use phytune_client::client::Builder;
//! use phytune_protocol::{Namespace, ParameterSetting};
//!
//! let client = Builder::new().build(my_transport, "eth2");
//!
//! for entry in client.get_rxeq()? {
//!     match entry {
//!         Ok(param) => println!("{}", param),
//!         Err(unknown) => println!("{}", unknown),
//!     }
//! }
//!
//! let setting = ParameterSetting::parse("Lane0.CTLE_Boost=3+", Namespace::RxEq)?;
//! client.set_parameter(&setting)?;
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::RpcError`]. Transport faults and controller rejections are
//! reported separately; nothing is retried.
//!
//! ## Logging
//!
//! This crate uses the `log` crate. Every request is logged at debug level, payloads at trace level.
//!
//! ## Thread Model
//!
//! All operations block until the controller responds. The controller keeps the eye scan
//! state implicitly, so only one client may talk to a device at a time.
pub mod client;
pub mod error;
pub mod eye_scan;

use error::RpcError;

/// A channel that carries `MCDI` requests to the management controller of a device.
///
/// Implementations must not keep state between calls. Each call opens and releases
/// whatever handle it needs.
pub trait Transport {
    /// The largest request or response payload in bytes that the transport can carry.
    fn max_payload(&self) -> usize;

    /// Executes a single `MCDI` command on the device named `device`.
    ///
    /// # Arguments
    ///
    /// * `device` - The name of the network interface
    /// * `command` - The `MCDI` command number
    /// * `request` - The request payload, at most [Transport::max_payload] bytes
    /// * `max_response` - The size of the response buffer offered to the controller
    ///
    /// # Returns
    ///
    /// The bytes written by the controller. This may be less than `max_response`.
    fn execute(
        &self,
        device: &str,
        command: u32,
        request: &[u8],
        max_response: usize,
    ) -> Result<Box<[u8]>, RpcError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn max_payload(&self) -> usize {
        (**self).max_payload()
    }

    fn execute(
        &self,
        device: &str,
        command: u32,
        request: &[u8],
        max_response: usize,
    ) -> Result<Box<[u8]>, RpcError> {
        (**self).execute(device, command, request, max_response)
    }
}
