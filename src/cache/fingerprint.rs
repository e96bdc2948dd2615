/*!
 * Content fingerprints.
 *
 * A fingerprint is the lowercase hex SHA-256 digest of a byte sequence. It is
 * the only cache-validity signal: two inputs with the same bytes always share
 * a fingerprint, whatever their origin or timestamp.
 */

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Length of a hex-encoded fingerprint
pub const FINGERPRINT_LEN: usize = 64;

/// Fingerprint a narration text by its UTF-8 bytes
pub fn fingerprint(text: &str) -> String {
    fingerprint_bytes(text.as_bytes())
}

/// Fingerprint an arbitrary byte slice
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a file's contents without loading it whole
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint an ordered list of fingerprints.
///
/// Parts are newline-separated before hashing so `["ab", "c"]` and
/// `["a", "bc"]` never collide.
pub fn combine<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Whether a string has the shape of a fingerprint
pub fn is_fingerprint(value: &str) -> bool {
    value.len() == FINGERPRINT_LEN && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
