//! Utility module
//!
//! Small helpers shared by the node and the command-line tools.

use std::fmt::Write;

/// Bytes shown when a malformed datagram is logged
pub const HEX_PREFIX_LEN: usize = 10;

/// Renders up to the first ten bytes of `data` as space separated hex,
/// with a trailing `..` when the datagram was longer
pub fn hex_prefix(data: &[u8]) -> String {
    let shown = &data[..data.len().min(HEX_PREFIX_LEN)];
    let mut out = String::with_capacity(shown.len() * 3 + 2);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    if data.len() > HEX_PREFIX_LEN {
        out.push_str(" ..");
    }
    out
}
