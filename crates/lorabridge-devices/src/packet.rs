/*!
 * Wire-level helpers shared by the field codec and the gateway.
 *
 * A packet is a run of `(symbol, payload...)` pairs with no delimiters. Bit 7
 * of a symbol distinguishes a set command (downlink) from a report (uplink).
 */
use std::fmt;

/// Bit set on a symbol to mark a set command
pub const WRITE_FLAG: u8 = 0x80;

/// Default largest packet the radio link carries
pub const DEFAULT_MAX_PACKET_LEN: usize = 50;

/// The set-command form of a field symbol
pub const fn write_symbol(symbol: u8) -> u8 {
    symbol | WRITE_FLAG
}

/// Whether a symbol carries the set-command bit
pub const fn is_write_symbol(symbol: u8) -> bool {
    symbol & WRITE_FLAG != 0
}

/// Displays bytes as a brace-delimited decimal list, e.g. `{80, 26, 0}`
pub struct PacketBytes<'a>(pub &'a [u8]);

impl fmt::Display for PacketBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", byte)?;
        }
        f.write_str("}")
    }
}
