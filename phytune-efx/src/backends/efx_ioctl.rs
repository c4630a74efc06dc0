//! # sfc Driver Backend
//!
//! Sends `MCDI` requests through the private `SIOCEFX` socket ioctl of the Linux `sfc` driver.
//! The request is addressed by network interface name. Using this ioctl requires
//! `CAP_NET_ADMIN`.
//!
//! ## Example Usage
//!
//! ```ignore
//! use phytune_client::client::Builder;
//!
//! let client = Builder::new().build(EfxIoctlTransport::new(), "eth2");
//! client.recalibrate()?;
//! ```
use nix::{
    errno::Errno,
    ioctl_readwrite_bad,
    libc::{IFNAMSIZ, c_char, ifreq},
    sys::socket::{AddressFamily, SockFlag, SockType, socket},
};
use std::{io, mem::MaybeUninit, os::fd::AsRawFd};

use phytune_client::{Transport, error::RpcError};

/// Size of the payload area of an `efx_mcdi_request2`, 255 words
pub const MCDI_PAYLOAD_LEN: usize = 255 * 4;

const EFX_MCDI_REQUEST2: u16 = 0xef21;
const EFX_MCDI_REQUEST_ERROR: u16 = 0x1;

/// Internal struct used to communicate with the driver, `struct efx_mcdi_request2`
#[repr(C)]
struct EfxMcdiRequest2 {
    cmd: u16,
    inlen: u16,
    outlen: u16,
    flags: u16,
    host_errno: u32,
    payload: [u8; MCDI_PAYLOAD_LEN],
}

/// `struct efx_sock_ioctl`, restricted to the member of the union that is used here
#[repr(C)]
struct EfxSockIoctl {
    cmd: u16,
    reserved: u16,
    mcdi_request2: EfxMcdiRequest2,
}

// SIOCDEVPRIVATE + 3
const SIOCEFX: u32 = 0x89F3;

// Perform a private sfc driver operation on an interface
ioctl_readwrite_bad!(efx_sock_ioctl, SIOCEFX, ifreq);

/// Errors that mean the interface cannot be reached at all, as opposed to a failing request.
fn is_unavailable(errno: Errno) -> bool {
    matches!(
        errno,
        Errno::ENODEV | Errno::ENXIO | Errno::EOPNOTSUPP | Errno::ENOTTY | Errno::EPERM
    )
}

fn interface_request(device: &str) -> Result<ifreq, RpcError> {
    let name = device.as_bytes();
    // Leaves room for the terminating NUL
    if name.len() >= IFNAMSIZ || name.contains(&0) {
        log::debug!("Invalid interface name '{}'", device);
        return Err(RpcError::TransportUnavailable(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("'{}' is not a valid interface name", device),
        )));
    }
    // SAFETY: ifreq is plain old data, all zeroes is a valid value.
    let mut ifr: ifreq = unsafe { MaybeUninit::zeroed().assume_init() };
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name) {
        *dst = *src as c_char;
    }
    Ok(ifr)
}

/// A transport using the `sfc` driver. A socket is opened for each request.
#[derive(Debug, Default, Clone, Copy)]
pub struct EfxIoctlTransport;

impl EfxIoctlTransport {
    pub fn new() -> EfxIoctlTransport {
        EfxIoctlTransport
    }
}

impl Transport for EfxIoctlTransport {
    fn max_payload(&self) -> usize {
        MCDI_PAYLOAD_LEN
    }

    fn execute(
        &self,
        device: &str,
        command: u32,
        request: &[u8],
        max_response: usize,
    ) -> Result<Box<[u8]>, RpcError> {
        for got in [request.len(), max_response] {
            if got > MCDI_PAYLOAD_LEN {
                return Err(RpcError::ResourceLimitExceeded {
                    max: MCDI_PAYLOAD_LEN,
                    got,
                });
            }
        }
        let cmd = u16::try_from(command).map_err(|_| {
            RpcError::TransportIoFailure(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("MCDI command 0x{:x} out of range", command),
            ))
        })?;

        let mut ifr = interface_request(device)?;

        log::debug!(
            "Opening control socket for {}: cmd=0x{:x}, inlen={}, outlen={}",
            device,
            command,
            request.len(),
            max_response
        );
        let sock = socket(
            AddressFamily::Inet,
            SockType::Datagram,
            SockFlag::SOCK_CLOEXEC,
            None,
        )
        .map_err(|errno| RpcError::TransportUnavailable(errno.into()))?;

        let mut efx = EfxSockIoctl {
            cmd: EFX_MCDI_REQUEST2,
            reserved: 0,
            mcdi_request2: EfxMcdiRequest2 {
                cmd,
                // Both lengths are bounded by MCDI_PAYLOAD_LEN above
                inlen: request.len() as u16,
                outlen: max_response as u16,
                flags: 0,
                host_errno: 0,
                payload: [0; MCDI_PAYLOAD_LEN],
            },
        };
        efx.mcdi_request2.payload[..request.len()].copy_from_slice(request);
        ifr.ifr_ifru.ifru_data = (&mut efx as *mut EfxSockIoctl).cast();

        // SAFETY: The ioctl call is safe because:
        // - File descriptor is valid (sock is open until the end of this function)
        // - ifr points to efx, which outlives the call and has the layout the driver expects
        let result = unsafe { efx_sock_ioctl(sock.as_raw_fd(), &mut ifr) };
        if let Err(errno) = result {
            log::debug!("SIOCEFX on {} failed: {}", device, errno);
            return Err(if is_unavailable(errno) {
                RpcError::TransportUnavailable(errno.into())
            } else {
                RpcError::TransportIoFailure(errno.into())
            });
        }

        let reply = &efx.mcdi_request2;
        if reply.flags & EFX_MCDI_REQUEST_ERROR != 0 {
            log::debug!(
                "MCDI command 0x{:x} on {} failed with errno {}",
                command,
                device,
                reply.host_errno
            );
            return Err(RpcError::ControllerRejected(reply.host_errno as i32));
        }

        let len = usize::from(reply.outlen).min(MCDI_PAYLOAD_LEN);
        log::trace!("SIOCEFX on {} returned {} bytes", device, len);
        Ok(reply.payload[..len].into())
    }
}
