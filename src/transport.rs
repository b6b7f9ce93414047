// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport capability between the codec and the wire.

use std::time::Duration;

use crate::{error::Error, frame::FunctionCode, SlaveId};

/// A transport that can carry one Modbus transaction.
///
/// This is the codec's only view of the wire. The request payload and the
/// response payload share `buf`: on entry `buf[..request_len]` holds the
/// request PDU tail (function code excluded), on success the response
/// payload (function code and frame trailer stripped) occupies the
/// returned prefix of `buf`. Sharing one buffer is safe because a Modbus
/// transaction is strictly send-then-receive.
///
/// Contract for implementations:
///
/// - `buf` must not be written before the request has been fully
///   transmitted;
/// - `request_len` and `response_len` never exceed `buf.len()`;
/// - at most `response_len` payload bytes may be stored; a longer
///   response is a structural error ([`Error::InvalidResponse`]);
/// - `timeout` bounds the wait for the first response byte only; the full
///   response may take slightly longer. With a zero `timeout` the request
///   is sent and [`Error::Timeout`] is returned without reading, which is
///   the broadcast path.
pub trait Transport {
    /// Send one request and receive at most one response.
    ///
    /// Returns the length of the response payload in `buf`.
    fn raw_command(
        &mut self,
        slave_id: SlaveId,
        function: FunctionCode,
        buf: &mut [u8],
        request_len: usize,
        response_len: usize,
        timeout: Duration,
    ) -> Result<usize, Error>;
}
