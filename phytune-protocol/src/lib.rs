//! # KR_TUNE Protocol Library
//!
//! This crate implements the `KR_TUNE` command of the Solarflare management controller
//! interface (MCDI). `KR_TUNE` reads and writes the analog equalization parameters of the
//! SERDES lanes of a network adapter and acquires eye diagrams.
//!
//! ## Overview
//!
//! The crate knows nothing about how requests reach the controller. It provides:
//!
//! - The two parameter namespaces, receive equalization and transmit equalization
//! - Encoding and decoding of the 32-bit parameter word
//! - Parsing of textual parameter settings such as `Lane2.DFE_Tap1=12+`
//! - Serialization of the seven `KR_TUNE` requests and decoding of their responses
//!
//! ## Basic Usage
//!
//! ### Decoding a Get Response
//!
//! ```
//! use phytune_protocol::{Namespace, codec::decode_parameters};
//!
//! // Lane 1, DFE_Tap1, autocal off, value 5, followed by an unknown entry
//! let response = [0x02, 0x01, 0x05, 0x00, 0xff, 0x00, 0x00, 0x00];
//! let entries = decode_parameters(&response, Namespace::RxEq);
//! assert_eq!(entries[0].unwrap().to_string(), "Lane1.DFE_Tap1=5");
//! assert_eq!(entries[1].unwrap_err().to_string(), "unknown parameter 255");
//! ```
//!
//! ### Writing a Set Request
//!
//! ```
//! use phytune_protocol::{Namespace, ParameterSetting, Request};
//!
//! let setting = ParameterSetting::parse("Lane0.Amplitude=0x20", Namespace::TxEq).unwrap();
//! let mut buffer = Vec::new();
//! Request::SetTxEq(setting).write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer, b"\x03\x00\x00\x00\x00\x00\x20\x00");
//! ```
//!
//! ## Parameter Word
//!
//! Parameters are transferred as little-endian 32-bit words:
//!
//! | Bits  | Content                                   |
//! |-------|-------------------------------------------|
//! | 0-7   | Parameter ordinal within its namespace    |
//! | 8-10  | Lane                                      |
//! | 11    | Autocal                                   |
//! | 16-23 | Initial value                             |
//! | 24-31 | Current value (only meaningful if autocal)|
//!
//! ## Error Handling
//!
//! Malformed settings fail with [`error::ParseError`]. Unknown entries in a response
//! are reported per entry as [`error::DecodeError`].

pub mod protocol;
pub use protocol::*;
pub mod codec;
pub mod error;
