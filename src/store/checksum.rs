//! CRC32 line framing for the JSONL store
//!
//! Each stored document is one line: `<crc32 as 8 hex digits>\t<json>\n`.
//! The checksum covers the JSON bytes only.

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Frame a JSON payload as a checksummed line, newline included
pub fn encode_line(json: &str) -> String {
    format!("{:08x}\t{}\n", compute_checksum(json.as_bytes()), json)
}

/// Split a framed line (without its newline) and verify the checksum.
///
/// Returns the JSON payload, or the reason the line is unusable.
pub fn decode_line(line: &str) -> Result<&str, String> {
    let (crc, json) = line
        .split_once('\t')
        .ok_or_else(|| "missing checksum separator".to_string())?;
    let expected =
        u32::from_str_radix(crc, 16).map_err(|_| format!("invalid checksum field '{}'", crc))?;
    let actual = compute_checksum(json.as_bytes());
    if actual != expected {
        return Err(format!(
            "checksum mismatch (expected {:08x}, computed {:08x})",
            expected, actual
        ));
    }
    Ok(json)
}
