// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Modbus serial RTU

use std::time::Duration;

use log::{debug, trace};

use crate::{
    error::{Error, Exception},
    frame::FunctionCode,
    port::Port,
    transport::Transport,
    SlaveId,
};

mod crc;

pub use self::crc::{crc16, Crc16};

// [MODBUS over Serial Line Specification and Implementation Guide V1.02](http://modbus.org/docs/Modbus_over_serial_line_V1_02.pdf), page 13
// "The maximum size of a MODBUS RTU frame is 256 bytes."
pub const MAX_FRAME_LEN: usize = 256;

/// The default idle window that ends a frame.
///
/// The serial line spec mandates a 3.5 character inter-frame gap; 2 ms is
/// a conservative floor for lines at 9600 baud and above. Lower baud
/// rates need [`RtuTransport::set_inter_byte_timeout`].
pub const DEFAULT_INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(2);

/// A Modbus RTU master over a serial port.
///
/// One transaction at a time: the framer writes
/// `[address, function, payload.., crc_lo, crc_hi]`, then consumes the
/// reply byte by byte until the line goes idle and classifies it into a
/// payload, an exception or one of the framing failures.
///
/// Whether the reply is an exception response (5 bytes, one code byte)
/// or a normal response (variable, consumed into the caller's buffer)
/// is decided while byte 1 is read, before the length is known.
#[derive(Debug)]
pub struct RtuTransport<P> {
    port: P,
    inter_byte_timeout: Duration,
}

impl<P: Port> RtuTransport<P> {
    /// Create a new RTU master owning `port`.
    pub fn new(port: P) -> Self {
        Self {
            port,
            inter_byte_timeout: DEFAULT_INTER_BYTE_TIMEOUT,
        }
    }

    /// Access the owned port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Override the inter-byte idle window that ends a frame.
    pub fn set_inter_byte_timeout(&mut self, timeout: Duration) {
        self.inter_byte_timeout = timeout;
    }
}

impl<P: Port> Transport for RtuTransport<P> {
    fn raw_command(
        &mut self,
        slave_id: SlaveId,
        function: FunctionCode,
        buf: &mut [u8],
        request_len: usize,
        response_len: usize,
        timeout: Duration,
    ) -> Result<usize, Error> {
        debug_assert!(request_len <= buf.len());
        debug_assert!(response_len <= buf.len());

        let function_code = function.value();
        trace!(
            "--> slave {slave_id} fn {function} request {:02X?}",
            &buf[..request_len]
        );

        {
            let mut crc = Crc16::new();
            crc.update(slave_id);
            crc.update(function_code);
            crc.update_slice(&buf[..request_len]);
            let crc = crc.value();

            self.port.write(slave_id)?;
            self.port.write(function_code)?;
            for &byte in &buf[..request_len] {
                self.port.write(byte)?;
            }
            self.port.write((crc & 0xFF) as u8)?;
            self.port.write((crc >> 8) as u8)?;
        }

        if timeout.is_zero() {
            // No response is expected at all, e.g. for a broadcast.
            return Err(Error::Timeout);
        }

        let mut crc = Crc16::new();
        let mut invalid = false;
        let mut exception = false;
        let mut exception_code = 0u8;

        // The first byte gets the caller's timeout; afterwards the first
        // idle gap ends the frame.
        let mut i = 0;
        let mut next = self.port.read(timeout)?;
        while let Some(byte) = next {
            crc.update(byte);
            if i == 0 {
                if byte != slave_id {
                    invalid = true;
                }
            } else if i == 1 {
                if byte == (function_code | 0x80) {
                    exception = true;
                } else if byte != function_code {
                    invalid = true;
                }
            } else if exception {
                // The byte after the exception marker is the exception
                // code. It has its own destination and never reaches the
                // response buffer.
                if i == 2 {
                    exception_code = byte;
                } else if i >= MAX_FRAME_LEN {
                    return Err(Error::BadFrame);
                } else if i >= 5 {
                    invalid = true;
                }
            } else if i - 2 < response_len {
                buf[i - 2] = byte;
            } else if i >= MAX_FRAME_LEN {
                // 1 byte slave id, 253 bytes PDU and 2 bytes crc.
                return Err(Error::BadFrame);
            } else if i >= 4 + response_len {
                // Response larger than what the caller expects.
                invalid = true;
            }
            i += 1;
            next = self.port.read(self.inter_byte_timeout)?;
        }

        let n = i;

        if n == 0 {
            // No bytes were read before the first timeout.
            return Err(Error::Timeout);
        }

        if n < 4 {
            // Any valid modbus message is at least four bytes.
            debug!("<-- slave {slave_id} fn {function}: short frame ({n} bytes)");
            return Err(Error::BadFrame);
        }

        if crc.value() != 0 {
            debug!("<-- slave {slave_id} fn {function}: crc mismatch");
            return Err(Error::BadCrc);
        }

        if invalid || (exception && n != 5) {
            debug!("<-- slave {slave_id} fn {function}: unexpected response shape");
            return Err(Error::InvalidResponse);
        }

        if exception {
            let Ok(exception) = Exception::try_from(exception_code) else {
                debug!(
                    "<-- slave {slave_id} fn {function}: unknown exception code {exception_code:#04X}"
                );
                return Err(Error::InvalidResponse);
            };
            return Err(exception.into());
        }

        trace!(
            "<-- slave {slave_id} fn {function} response {:02X?}",
            &buf[..n - 4]
        );
        Ok(n - 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Parity, StopBits};
    use std::collections::VecDeque;
    use std::io;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct ScriptedPort {
        written: Vec<u8>,
        replay: VecDeque<u8>,
        reads: usize,
    }

    impl ScriptedPort {
        fn replaying(frame: &[u8]) -> Self {
            Self {
                replay: frame.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl Port for ScriptedPort {
        fn write(&mut self, byte: u8) -> io::Result<()> {
            self.written.push(byte);
            Ok(())
        }

        fn read(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
            self.reads += 1;
            Ok(self.replay.pop_front())
        }

        fn configure(&mut self, _: u32, _: Parity, _: StopBits) -> io::Result<()> {
            Ok(())
        }
    }

    fn with_crc(body: &[u8]) -> Vec<u8> {
        let crc = crc16(body);
        let mut frame = body.to_vec();
        frame.push((crc & 0xFF) as u8);
        frame.push((crc >> 8) as u8);
        frame
    }

    fn command(
        rtu: &mut RtuTransport<ScriptedPort>,
        request: &[u8],
        response_len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        let mut buf = [0u8; 251];
        buf[..request.len()].copy_from_slice(request);
        let n = rtu.raw_command(
            0x11,
            FunctionCode::ReadHoldingRegisters,
            &mut buf,
            request.len(),
            response_len,
            timeout,
        )?;
        Ok(buf[..n].to_vec())
    }

    #[test]
    fn frames_the_request() {
        let mut rtu = RtuTransport::new(ScriptedPort::replaying(&with_crc(&[
            0x11, 0x03, 0x02, 0x02, 0x2B,
        ])));
        let payload = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, TIMEOUT).unwrap();
        assert_eq!(payload, [0x02, 0x02, 0x2B]);
        assert_eq!(
            rtu.port_mut().written,
            with_crc(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x01])
        );
    }

    #[test]
    fn broadcast_skips_the_read() {
        let mut rtu = RtuTransport::new(ScriptedPort::default());
        let err = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, Duration::ZERO).unwrap_err();
        assert!(matches!(err, Error::Timeout));
        let port = rtu.port_mut();
        assert_eq!(port.reads, 0);
        assert_eq!(port.written.len(), 8);
    }

    #[test]
    fn wrong_slave_address_is_invalid() {
        let mut rtu = RtuTransport::new(ScriptedPort::replaying(&with_crc(&[
            0x12, 0x03, 0x02, 0x02, 0x2B,
        ])));
        let err = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse));
    }

    #[test]
    fn exception_frame_with_extra_bytes_is_invalid() {
        let mut rtu = RtuTransport::new(ScriptedPort::replaying(&with_crc(&[
            0x11, 0x83, 0x02, 0x00,
        ])));
        let err = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse));
    }

    #[test]
    fn unknown_exception_code_is_invalid() {
        let mut rtu = RtuTransport::new(ScriptedPort::replaying(&with_crc(&[0x11, 0x83, 0x09])));
        let err = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse));
    }

    #[test]
    fn overlong_frame_is_bad() {
        // 300 bytes with no idle gap exceed the 256 byte frame limit.
        let mut rtu = RtuTransport::new(ScriptedPort::replaying(&[0x11; 300]));
        let err = command(&mut rtu, &[0x00, 0x6B, 0x00, 0x01], 3, TIMEOUT).unwrap_err();
        assert!(matches!(err, Error::BadFrame));
    }
}
