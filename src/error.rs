// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The typed error surface.

/// A slave (server) exception.
///
/// The numeric value of each variant is the exception code transmitted on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Exception {
    #[error("illegal function")]
    IllegalFunction = 0x01,
    #[error("illegal data address")]
    IllegalDataAddress = 0x02,
    #[error("illegal data value")]
    IllegalDataValue = 0x03,
    #[error("slave device failure")]
    SlaveDeviceFailure = 0x04,
    #[error("acknowledge")]
    Acknowledge = 0x05,
    #[error("slave device busy")]
    SlaveDeviceBusy = 0x06,
    #[error("negative acknowledge")]
    NegativeAcknowledge = 0x07,
    #[error("memory parity error")]
    MemoryParityError = 0x08,
    #[error("gateway path unavailable")]
    GatewayPathUnavailable = 0x0A,
    #[error("gateway no response")]
    GatewayNoResponse = 0x0B,
}

impl TryFrom<u8> for Exception {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, u8> {
        use Exception::*;
        let ex = match code {
            0x01 => IllegalFunction,
            0x02 => IllegalDataAddress,
            0x03 => IllegalDataValue,
            0x04 => SlaveDeviceFailure,
            0x05 => Acknowledge,
            0x06 => SlaveDeviceBusy,
            0x07 => NegativeAcknowledge,
            0x08 => MemoryParityError,
            0x0A => GatewayPathUnavailable,
            0x0B => GatewayNoResponse,
            _ => {
                return Err(code);
            }
        };
        Ok(ex)
    }
}

/// The error type for master transactions.
///
/// Every protocol failure maps to exactly one kind. Slave exceptions keep
/// their wire code, local kinds use fixed codes above `0xFF`
/// ([`Error::code`]), and transport errors propagate unchanged. Nothing is
/// retried; retry policy is the caller's concern.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The slave answered with an exception response.
    #[error("modbus exception: {0}")]
    Exception(#[from] Exception),

    /// No byte arrived within the caller's timeout.
    ///
    /// Also the documented result of a zero-timeout (broadcast) request.
    #[error("timeout")]
    Timeout,

    /// The encoded request would exceed the function's size limits.
    ///
    /// Reported before anything is written to the port.
    #[error("request too large")]
    RequestTooLarge,

    /// The received frame was shorter than any valid Modbus message, or
    /// longer than an RTU frame may be.
    #[error("bad frame")]
    BadFrame,

    /// The CRC over the received frame did not verify.
    #[error("bad crc")]
    BadCrc,

    /// The CRC was ok, but the frame does not match the expected response
    /// shape.
    #[error("invalid response")]
    InvalidResponse,

    /// A transport error, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The numeric code of the error kind.
    ///
    /// Slave exceptions keep their wire code (`0x01..=0x0B`); local kinds
    /// use `0x100` (timeout), `0x200` (request too large) and `0x301..`
    /// (framing). Transport errors carry no code.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Error::Exception(ex) => Some(*ex as u16),
            Error::Timeout => Some(0x100),
            Error::RequestTooLarge => Some(0x200),
            Error::BadFrame => Some(0x301),
            Error::BadCrc => Some(0x302),
            Error::InvalidResponse => Some(0x303),
            Error::Io(_) => None,
        }
    }
}
