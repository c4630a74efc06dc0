//! Transports that reach the management controller of a device.
pub mod efx_ioctl;
