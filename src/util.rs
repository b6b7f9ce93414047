// SPDX-FileCopyrightText: Copyright (c) 2018-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common helpers

use crate::Coil;

/// Turn a bool into a u16 coil value
pub fn bool_to_u16_coil(state: bool) -> u16 {
    if state {
        0xFF00
    } else {
        0x0000
    }
}

/// Calculate the number of bytes required for a given number of coils.
pub const fn packed_coils_len(bitcount: usize) -> usize {
    (bitcount + 7) / 8
}

/// Pack coils into a byte array, LSB first.
///
/// `bytes` must be zero-initialized and hold at least
/// [`packed_coils_len`] bytes.
pub fn pack_coils(coils: &[Coil], bytes: &mut [u8]) {
    debug_assert!(bytes.len() >= packed_coils_len(coils.len()));
    coils.iter().enumerate().for_each(|(i, b)| {
        let v = u8::from(*b);
        bytes[i / 8] |= v << (i % 8);
    });
}

/// Unpack coils from a byte array.
///
/// The destination element type may be anything a bit converts into,
/// in particular `bool`, `u8` and `u16`.
pub fn unpack_coils<V: From<bool>>(bytes: &[u8], values: &mut [V]) {
    debug_assert!(bytes.len() >= packed_coils_len(values.len()));
    for (i, value) in values.iter_mut().enumerate() {
        *value = V::from((bytes[i / 8] >> (i % 8)) & 0b1 > 0);
    }
}
