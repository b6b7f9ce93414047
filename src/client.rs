// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The application codec: one request builder and response validator per
//! supported function code.

use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use crate::{
    error::Error,
    frame::FunctionCode,
    transport::Transport,
    util::{bool_to_u16_coil, pack_coils, packed_coils_len, unpack_coils},
    Address, Coil, Quantity, SlaveId, Word,
};

/// The scratch buffer shared by request encoding and response decoding.
///
/// A PDU is at most 253 bytes. Minus the function code, and with the
/// payloads capped by the per-function count limits, 251 bytes cover
/// every supported request and response.
const SCRATCH_LEN: usize = 251;

/// One group of a read-file-record transaction (function code `0x14`).
///
/// Receives `data.len()` record words from file `file_number`, starting
/// at record `address`.
#[derive(Debug)]
pub struct ReadFileGroup<'a> {
    pub file_number: u16,
    pub address: Address,
    pub data: &'a mut [Word],
}

/// One group of a write-file-record transaction (function code `0x15`).
#[derive(Debug)]
pub struct WriteFileGroup<'a> {
    pub file_number: u16,
    pub address: Address,
    pub data: &'a [Word],
}

/// A Modbus master.
///
/// `Client` encodes requests, drives one transaction at a time through
/// its [`Transport`] and validates the decoded response against the
/// function-code-specific shape. All data goes into caller-provided
/// slices; the codec itself works out of a fixed stack scratch buffer and
/// never allocates.
#[derive(Debug)]
pub struct Client<T> {
    transport: T,
}

impl<T> Client<T> {
    /// Create a client on top of `transport`.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Access the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the client and return the transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: Transport> Client<T> {
    /// Read `values.len()` coils starting at `address` (function code
    /// `0x01`).
    ///
    /// The destination element type may be `bool`, `u8` or `u16`; bits
    /// arrive as `false`/`true` or `0`/`1` accordingly.
    pub fn read_coils<V: From<bool>>(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &mut [V],
        timeout: Duration,
    ) -> Result<(), Error> {
        self.read_bits(FunctionCode::ReadCoils, slave_id, address, values, timeout)
    }

    /// Read `values.len()` discrete inputs starting at `address`
    /// (function code `0x02`).
    pub fn read_discrete_inputs<V: From<bool>>(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &mut [V],
        timeout: Duration,
    ) -> Result<(), Error> {
        self.read_bits(
            FunctionCode::ReadDiscreteInputs,
            slave_id,
            address,
            values,
            timeout,
        )
    }

    fn read_bits<V: From<bool>>(
        &mut self,
        function: FunctionCode,
        slave_id: SlaveId,
        address: Address,
        values: &mut [V],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() > 2000 {
            return Err(Error::RequestTooLarge);
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        BigEndian::write_u16(&mut buffer[0..], address);
        BigEndian::write_u16(&mut buffer[2..], values.len() as Quantity);
        let n_expected = packed_coils_len(values.len()) + 1;
        let n = self
            .transport
            .raw_command(slave_id, function, &mut buffer, 4, n_expected, timeout)?;
        if n != n_expected || buffer[0] as usize != n_expected - 1 {
            return Err(Error::InvalidResponse);
        }
        unpack_coils(&buffer[1..n], values);
        Ok(())
    }

    /// Read `values.len()` holding registers starting at `address`
    /// (function code `0x03`).
    pub fn read_holding_registers(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &mut [Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        self.read_words(
            FunctionCode::ReadHoldingRegisters,
            slave_id,
            address,
            values,
            timeout,
        )
    }

    /// Read `values.len()` input registers starting at `address`
    /// (function code `0x04`).
    pub fn read_input_registers(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &mut [Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        self.read_words(
            FunctionCode::ReadInputRegisters,
            slave_id,
            address,
            values,
            timeout,
        )
    }

    fn read_words(
        &mut self,
        function: FunctionCode,
        slave_id: SlaveId,
        address: Address,
        values: &mut [Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() > 125 {
            return Err(Error::RequestTooLarge);
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        BigEndian::write_u16(&mut buffer[0..], address);
        BigEndian::write_u16(&mut buffer[2..], values.len() as Quantity);
        let n_expected = values.len() * 2 + 1;
        let n = self
            .transport
            .raw_command(slave_id, function, &mut buffer, 4, n_expected, timeout)?;
        if n != n_expected || buffer[0] as usize != n_expected - 1 {
            return Err(Error::InvalidResponse);
        }
        for (i, value) in values.iter_mut().enumerate() {
            *value = BigEndian::read_u16(&buffer[1 + i * 2..]);
        }
        Ok(())
    }

    /// Switch the coil at `address` on or off (function code `0x05`).
    pub fn write_single_coil(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        value: Coil,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut request = [0u8; 4];
        BigEndian::write_u16(&mut request[0..], address);
        BigEndian::write_u16(&mut request[2..], bool_to_u16_coil(value));
        self.write_echo(FunctionCode::WriteSingleCoil, slave_id, &request, timeout)
    }

    /// Write `value` into the holding register at `address` (function
    /// code `0x06`).
    pub fn write_single_register(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        value: Word,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut request = [0u8; 4];
        BigEndian::write_u16(&mut request[0..], address);
        BigEndian::write_u16(&mut request[2..], value);
        self.write_echo(
            FunctionCode::WriteSingleRegister,
            slave_id,
            &request,
            timeout,
        )
    }

    /// Update the holding register at `address` to
    /// `(current & and_mask) | (or_mask & !and_mask)` (function code
    /// `0x16`).
    pub fn mask_write_register(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        and_mask: Word,
        or_mask: Word,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut request = [0u8; 6];
        BigEndian::write_u16(&mut request[0..], address);
        BigEndian::write_u16(&mut request[2..], and_mask);
        BigEndian::write_u16(&mut request[4..], or_mask);
        self.write_echo(FunctionCode::MaskWriteRegister, slave_id, &request, timeout)
    }

    /// Send `request` and require the response to echo it byte for byte.
    fn write_echo(
        &mut self,
        function: FunctionCode,
        slave_id: SlaveId,
        request: &[u8],
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut buffer = [0u8; SCRATCH_LEN];
        buffer[..request.len()].copy_from_slice(request);
        let n = self.transport.raw_command(
            slave_id,
            function,
            &mut buffer,
            request.len(),
            request.len(),
            timeout,
        )?;
        if buffer[..n] != *request {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// Write a run of coils starting at `address` (function code `0x0F`).
    pub fn write_multiple_coils(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &[Coil],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() > 1968 {
            return Err(Error::RequestTooLarge);
        }
        let n_data_bytes = packed_coils_len(values.len());
        let mut buffer = [0u8; SCRATCH_LEN];
        BigEndian::write_u16(&mut buffer[0..], address);
        BigEndian::write_u16(&mut buffer[2..], values.len() as Quantity);
        buffer[4] = n_data_bytes as u8;
        pack_coils(values, &mut buffer[5..5 + n_data_bytes]);
        self.write_multiple(
            FunctionCode::WriteMultipleCoils,
            slave_id,
            &mut buffer,
            5 + n_data_bytes,
            timeout,
        )
    }

    /// Write a run of holding registers starting at `address` (function
    /// code `0x10`).
    pub fn write_multiple_registers(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &[Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() > 123 {
            return Err(Error::RequestTooLarge);
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        BigEndian::write_u16(&mut buffer[0..], address);
        BigEndian::write_u16(&mut buffer[2..], values.len() as Quantity);
        buffer[4] = (values.len() * 2) as u8;
        for (i, value) in values.iter().enumerate() {
            BigEndian::write_u16(&mut buffer[5 + i * 2..], *value);
        }
        self.write_multiple(
            FunctionCode::WriteMultipleRegisters,
            slave_id,
            &mut buffer,
            5 + values.len() * 2,
            timeout,
        )
    }

    /// Send a multi-value write and require the response to echo the
    /// address and count fields of the request.
    fn write_multiple(
        &mut self,
        function: FunctionCode,
        slave_id: SlaveId,
        buffer: &mut [u8; SCRATCH_LEN],
        request_len: usize,
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut head = [0u8; 4];
        head.copy_from_slice(&buffer[0..4]);
        let n = self
            .transport
            .raw_command(slave_id, function, buffer, request_len, 4, timeout)?;
        if buffer[..n] != head {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// Write coils, choosing the single-coil form (`0x05`) when there is
    /// exactly one value and the multi-coil form (`0x0F`) otherwise.
    pub fn write_coils(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &[Coil],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() == 1 {
            self.write_single_coil(slave_id, address, values[0], timeout)
        } else {
            self.write_multiple_coils(slave_id, address, values, timeout)
        }
    }

    /// Write registers, choosing the single-register form (`0x06`) when
    /// there is exactly one value and the multi-register form (`0x10`)
    /// otherwise.
    pub fn write_registers(
        &mut self,
        slave_id: SlaveId,
        address: Address,
        values: &[Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        if values.len() == 1 {
            self.write_single_register(slave_id, address, values[0], timeout)
        } else {
            self.write_multiple_registers(slave_id, address, values, timeout)
        }
    }

    /// Read record words from one or more files (function code `0x14`).
    pub fn read_file_record(
        &mut self,
        slave_id: SlaveId,
        groups: &mut [ReadFileGroup<'_>],
        timeout: Duration,
    ) -> Result<(), Error> {
        if groups.len() > 35 {
            return Err(Error::RequestTooLarge);
        }
        let mut n_expected = 1;
        for group in groups.iter() {
            n_expected += group.data.len() * 2 + 2;
            if n_expected > SCRATCH_LEN {
                return Err(Error::RequestTooLarge);
            }
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        buffer[0] = (groups.len() * 7) as u8;
        let mut p = 1;
        for group in groups.iter() {
            buffer[p] = 0x06;
            BigEndian::write_u16(&mut buffer[p + 1..], group.file_number);
            BigEndian::write_u16(&mut buffer[p + 3..], group.address);
            BigEndian::write_u16(&mut buffer[p + 5..], group.data.len() as Quantity);
            p += 7;
        }
        let n = self.transport.raw_command(
            slave_id,
            FunctionCode::ReadFileRecord,
            &mut buffer,
            p,
            n_expected,
            timeout,
        )?;
        if n != n_expected || buffer[0] as usize != n_expected - 1 {
            return Err(Error::InvalidResponse);
        }
        let mut p = 1;
        for group in groups.iter_mut() {
            // Each group answers with its own length and the constant
            // reference type 0x06.
            if buffer[p] as usize != 1 + group.data.len() * 2 || buffer[p + 1] != 0x06 {
                return Err(Error::InvalidResponse);
            }
            p += 2;
            for value in group.data.iter_mut() {
                *value = BigEndian::read_u16(&buffer[p..]);
                p += 2;
            }
        }
        Ok(())
    }

    /// Write record words into one or more files (function code `0x15`).
    pub fn write_file_record(
        &mut self,
        slave_id: SlaveId,
        groups: &[WriteFileGroup<'_>],
        timeout: Duration,
    ) -> Result<(), Error> {
        let mut n_bytes = 1;
        for group in groups {
            n_bytes += group.data.len() * 2 + 7;
            if n_bytes > SCRATCH_LEN {
                return Err(Error::RequestTooLarge);
            }
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        buffer[0] = (n_bytes - 1) as u8;
        let mut p = 1;
        for group in groups {
            buffer[p] = 0x06;
            BigEndian::write_u16(&mut buffer[p + 1..], group.file_number);
            BigEndian::write_u16(&mut buffer[p + 3..], group.address);
            BigEndian::write_u16(&mut buffer[p + 5..], group.data.len() as Quantity);
            p += 7;
            for value in group.data {
                BigEndian::write_u16(&mut buffer[p..], *value);
                p += 2;
            }
        }
        // The response must echo the whole request, which the shared
        // scratch no longer holds once the reply lands in it.
        let request = buffer;
        let n = self.transport.raw_command(
            slave_id,
            FunctionCode::WriteFileRecord,
            &mut buffer,
            p,
            p,
            timeout,
        )?;
        if buffer[..n] != request[..p] {
            return Err(Error::InvalidResponse);
        }
        Ok(())
    }

    /// Write one run of holding registers and read another in a single
    /// transaction (function code `0x17`). The write is performed before
    /// the read.
    pub fn read_write_registers(
        &mut self,
        slave_id: SlaveId,
        write_address: Address,
        write_values: &[Word],
        read_address: Address,
        read_values: &mut [Word],
        timeout: Duration,
    ) -> Result<(), Error> {
        if read_values.len() > 125 || write_values.len() > 121 {
            return Err(Error::RequestTooLarge);
        }
        let mut buffer = [0u8; SCRATCH_LEN];
        BigEndian::write_u16(&mut buffer[0..], read_address);
        BigEndian::write_u16(&mut buffer[2..], read_values.len() as Quantity);
        BigEndian::write_u16(&mut buffer[4..], write_address);
        BigEndian::write_u16(&mut buffer[6..], write_values.len() as Quantity);
        buffer[8] = (write_values.len() * 2) as u8;
        let mut p = 9;
        for value in write_values {
            BigEndian::write_u16(&mut buffer[p..], *value);
            p += 2;
        }
        let n_expected = read_values.len() * 2 + 1;
        let n = self.transport.raw_command(
            slave_id,
            FunctionCode::ReadWriteMultipleRegisters,
            &mut buffer,
            p,
            n_expected,
            timeout,
        )?;
        if n != n_expected || buffer[0] as usize != n_expected - 1 {
            return Err(Error::InvalidResponse);
        }
        for (i, value) in read_values.iter_mut().enumerate() {
            *value = BigEndian::read_u16(&buffer[1 + i * 2..]);
        }
        Ok(())
    }
}
