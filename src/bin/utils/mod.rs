use std::fs;
use std::path::Path;

/// Reads a tape file. With `hex`, the file holds hex digits; whitespace and `#` comments are
/// ignored.
pub fn read_tape(path: &Path, hex: bool) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let bytes = fs::read(path).map_err(|e| format!("Failed to read tape file {:?}: {}", path, e))?;
    if !hex {
        return Ok(bytes);
    }
    let text = String::from_utf8(bytes).map_err(|_| "Hex tape file is not valid UTF-8")?;
    decode_hex(&text)
}

pub fn decode_hex(text: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let digits: String = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
        .collect();
    Ok(hex::decode(digits).map_err(|e| format!("Invalid hex tape: {}", e))?)
}

/// Reads an optional string segment.
pub fn read_segment(path: Option<&Path>) -> Result<Option<Vec<u8>>, Box<dyn std::error::Error>> {
    match path {
        Some(p) => Ok(Some(fs::read(p).map_err(|e| format!("Failed to read segment {:?}: {}", p, e))?)),
        None => Ok(None),
    }
}
