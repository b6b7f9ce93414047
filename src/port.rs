// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The serial port capability.

use std::io::{self, Read, Write};
use std::str::FromStr;
use std::time::Duration;

use serialport::SerialPort;

/// Parity bit of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

impl FromStr for Parity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "even" | "e" => Ok(Self::Even),
            "odd" | "o" => Ok(Self::Odd),
            _ => Err(()),
        }
    }
}

/// Number of stop bits of the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// One stop bit
    #[default]
    One,
    /// Two stop bits
    Two,
}

impl FromStr for StopBits {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "one" => Ok(Self::One),
            "2" | "two" => Ok(Self::Two),
            _ => Err(()),
        }
    }
}

/// Byte-level access to a half-duplex serial line.
///
/// The RTU framer drives this capability exclusively: one byte out at a
/// time, one byte in at a time. `read` returning `Ok(None)` means the
/// line stayed idle for the whole timeout, which is how a frame ends; it
/// is not an error.
pub trait Port {
    /// Write a single byte.
    fn write(&mut self, byte: u8) -> io::Result<()>;

    /// Read a single byte, waiting at most `timeout` for it.
    fn read(&mut self, timeout: Duration) -> io::Result<Option<u8>>;

    /// Reconfigure the line parameters.
    fn configure(&mut self, baud_rate: u32, parity: Parity, stop_bits: StopBits)
        -> io::Result<()>;
}

/// A [`Port`] over an operating system serial device.
pub struct SystemPort {
    port: Box<dyn SerialPort>,
}

impl SystemPort {
    /// Open the serial device at `path` with the default line parameters
    /// (9600 baud, 8 data bits, no parity, one stop bit).
    pub fn open(path: &str) -> io::Result<Self> {
        let port = serialport::new(path, 9600)
            .data_bits(serialport::DataBits::Eight)
            .open()
            .map_err(io::Error::from)?;
        Ok(Self { port })
    }
}

impl Port for SystemPort {
    fn write(&mut self, byte: u8) -> io::Result<()> {
        self.port.write_all(&[byte])
    }

    fn read(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        self.port.set_timeout(timeout).map_err(io::Error::from)?;
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn configure(
        &mut self,
        baud_rate: u32,
        parity: Parity,
        stop_bits: StopBits,
    ) -> io::Result<()> {
        self.port.set_baud_rate(baud_rate).map_err(io::Error::from)?;
        self.port
            .set_parity(match parity {
                Parity::None => serialport::Parity::None,
                Parity::Even => serialport::Parity::Even,
                Parity::Odd => serialport::Parity::Odd,
            })
            .map_err(io::Error::from)?;
        self.port
            .set_stop_bits(match stop_bits {
                StopBits::One => serialport::StopBits::One,
                StopBits::Two => serialport::StopBits::Two,
            })
            .map_err(io::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_from_str() {
        assert_eq!("n".parse(), Ok(Parity::None));
        assert_eq!("E".parse(), Ok(Parity::Even));
        assert_eq!("odd".parse(), Ok(Parity::Odd));
        assert_eq!("x".parse::<Parity>(), Err(()));
    }

    #[test]
    fn stop_bits_from_str() {
        assert_eq!("1".parse(), Ok(StopBits::One));
        assert_eq!("2".parse(), Ok(StopBits::Two));
        assert_eq!("3".parse::<StopBits>(), Err(()));
    }
}
