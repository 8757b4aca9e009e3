//! Telnet option-sequence scrubbing for the inbound byte stream.
//!
//! Telnet clients interleave out-of-band option negotiation with line data:
//! an IAC marker byte (0xFF) followed by a command byte and usually an option
//! byte. The scrubber strips these so the session sees clean text.
//!
//! This is deliberately not a negotiation state machine: every IAC is treated
//! as a fixed 3-byte sequence (marker + 2), so a 2-byte `IAC <cmd>` form or a
//! longer subnegotiation will be mis-skipped. That simplification is part of
//! the protocol contract and must not be "fixed" here.

/// Interpret As Command: marks the start of an out-of-band sequence.
pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;

/// ECHO option: we advertise `IAC WILL ECHO` so the client leaves echoing to us.
pub const ECHO: u8 = 1;
pub const SUPPRESS_GO_AHEAD: u8 = 3;

/// Build one outbound 3-byte option sequence.
pub fn iac(command: u8, option: u8) -> [u8; 3] {
    [IAC, command, option]
}

/// Strip option sequences from one raw chunk. Pure transform: data bytes pass
/// through in their original relative order; each IAC skips exactly itself
/// plus the next two bytes, truncated at the chunk boundary if fewer remain.
pub fn scrub(raw: &[u8]) -> Vec<u8> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == IAC {
            i += 3;
        } else {
            cleaned.push(raw[i]);
            i += 1;
        }
    }
    cleaned
}
