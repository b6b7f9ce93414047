// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A Modbus RTU master (client) for serial lines.
//!
//! The crate is split into three layers, leaf first:
//!
//! - CRC-16/IBM, the table-driven frame checksum ([`rtu::Crc16`]);
//! - the RTU framer ([`rtu::RtuTransport`]), which owns the serial port,
//!   wraps a PDU with the slave address and CRC, and reassembles the reply
//!   byte by byte under an inter-byte idle window;
//! - the application codec ([`Client`]), one request builder and response
//!   validator per supported function code.
//!
//! The codec reaches the wire only through the [`Transport`] capability.
//! Alternate transports implement the same capability; the codec never
//! learns which one it is using.
//!
//! Modbus is strictly half-duplex: one transaction at a time per port.
//! Broadcasts (slave address `0`) are issued by passing a zero timeout,
//! which sends the request and reports [`Error::Timeout`] without reading.

pub mod client;
pub mod error;
pub mod frame;
pub mod port;
pub mod rtu;
pub mod transport;
mod util;

pub use self::{
    client::{Client, ReadFileGroup, WriteFileGroup},
    error::{Error, Exception},
    frame::FunctionCode,
    port::{Parity, Port, StopBits, SystemPort},
    rtu::RtuTransport,
    transport::Transport,
};

/// A Modbus slave address is represented by an unsigned 8 bit integer.
///
/// `1..=247` address a single slave; [`BROADCAST_SLAVE_ID`] addresses all
/// slaves at once (no response expected).
pub type SlaveId = u8;

/// A Modbus address is represented by 16 bit (from `0` to `65535`).
pub type Address = u16;

/// A Coil represents a single bit.
///
/// - `true` is equivalent to `ON`, `1` and `0xFF00`.
/// - `false` is equivalent to `OFF`, `0` and `0x0000`.
pub type Coil = bool;

/// Modbus uses 16 bit for its data items (big-endian representation).
pub type Word = u16;

/// Number of items to process (`0` - `65535`).
pub type Quantity = u16;

/// The broadcast slave address (`0`).
pub const BROADCAST_SLAVE_ID: SlaveId = 0;
