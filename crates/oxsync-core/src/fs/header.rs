//! Ciphertext file format.
//!
//! A ciphertext file is two newline-terminated JSON documents:
//!
//! ```text
//! {"v":1,"encrypted_name":"…","name_hmac":"…","key_id":"did:key:u…"}
//! {"from":"did:key:u…","to":"did:key:u…","salt":"…","nonce":"…","ciphertext":"…"}
//! ```
//!
//! The first line is the header. Its exact bytes are the AEAD associated data of
//! the envelope on the second line, so the header cannot be swapped between
//! files. The sealed payload is itself JSON: `{"file_name":"…","file_data":"…"}`.

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};
use thiserror::Error;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Extension of ciphertext files in the encrypted tree.
pub const CIPHERTEXT_EXTENSION: &str = "oxs";

/// Errors from parsing or producing the ciphertext file format.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Ciphertext file is missing its {0} line")]
    MissingSection(&'static str),

    #[error("Malformed {section}: {source}")]
    Json {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported ciphertext format version {0}")]
    UnsupportedVersion(u32),
}

impl FormatError {
    fn json(section: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| FormatError::Json { section, source }
    }
}

/// Plaintext metadata stored ahead of the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextHeader {
    pub v: u32,
    /// AES-SIV encrypted relative name (base64url)
    pub encrypted_name: String,
    /// HMAC of the relative name; also the ciphertext file stem
    pub name_hmac: String,
    /// DID whose name keys were used
    pub key_id: String,
}

impl CiphertextHeader {
    pub fn new(encrypted_name: String, name_hmac: String, key_id: impl Into<String>) -> Self {
        Self {
            v: FORMAT_VERSION,
            encrypted_name,
            name_hmac,
            key_id: key_id.into(),
        }
    }

    /// Serialized header line (without the trailing newline).
    pub fn to_line(&self) -> Result<Vec<u8>, FormatError> {
        serde_json::to_vec(self).map_err(FormatError::json("header"))
    }
}

/// Sealed content addressed from one DID to another.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: String,
    pub to: String,
    #[serde_as(as = "Base64")]
    pub salt: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub nonce: Vec<u8>,
    #[serde_as(as = "Base64")]
    pub ciphertext: Vec<u8>,
}

/// The plaintext sealed inside an [`Envelope`].
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub file_name: String,
    #[serde_as(as = "Base64")]
    pub file_data: Vec<u8>,
}

impl FilePayload {
    pub fn to_json(&self) -> Result<Vec<u8>, FormatError> {
        serde_json::to_vec(self).map_err(FormatError::json("payload"))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, FormatError> {
        serde_json::from_slice(bytes).map_err(FormatError::json("payload"))
    }
}

/// A parsed ciphertext file.
#[derive(Debug, Clone)]
pub struct CiphertextFile {
    pub header: CiphertextHeader,
    /// Header bytes exactly as stored, used as associated data
    pub header_line: Vec<u8>,
    pub envelope: Envelope,
}

/// Assemble the on-disk bytes from a serialized header line and an envelope.
pub fn encode_ciphertext_file(
    header_line: &[u8],
    envelope: &Envelope,
) -> Result<Vec<u8>, FormatError> {
    let envelope_line = serde_json::to_vec(envelope).map_err(FormatError::json("envelope"))?;
    let mut out = Vec::with_capacity(header_line.len() + envelope_line.len() + 2);
    out.extend_from_slice(header_line);
    out.push(b'\n');
    out.extend_from_slice(&envelope_line);
    out.push(b'\n');
    Ok(out)
}

fn split_header(bytes: &[u8]) -> Result<(&[u8], &[u8]), FormatError> {
    let end = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(FormatError::MissingSection("envelope"))?;
    if end == 0 {
        return Err(FormatError::MissingSection("header"));
    }
    Ok((&bytes[..end], &bytes[end + 1..]))
}

fn decode_header(line: &[u8]) -> Result<CiphertextHeader, FormatError> {
    let header: CiphertextHeader =
        serde_json::from_slice(line).map_err(FormatError::json("header"))?;
    if header.v != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(header.v));
    }
    Ok(header)
}

/// Parse only the header line.
pub fn parse_header(bytes: &[u8]) -> Result<CiphertextHeader, FormatError> {
    let (line, _) = split_header(bytes)?;
    decode_header(line)
}

/// Parse a complete ciphertext file.
pub fn parse_ciphertext_file(bytes: &[u8]) -> Result<CiphertextFile, FormatError> {
    let (line, rest) = split_header(bytes)?;
    let header = decode_header(line)?;

    let envelope_line = rest.strip_suffix(b"\n").unwrap_or(rest);
    if envelope_line.is_empty() {
        return Err(FormatError::MissingSection("envelope"));
    }
    let envelope = serde_json::from_slice(envelope_line).map_err(FormatError::json("envelope"))?;

    Ok(CiphertextFile {
        header,
        header_line: line.to_vec(),
        envelope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> CiphertextHeader {
        CiphertextHeader::new("ZW5j".into(), "HMAC".into(), "did:key:uexample")
    }

    fn sample_envelope() -> Envelope {
        Envelope {
            from: "did:key:ua".into(),
            to: "did:key:ub".into(),
            salt: vec![1; 32],
            nonce: vec![2; 12],
            ciphertext: vec![3, 4, 5],
        }
    }

    #[test]
    fn test_encode_then_parse() {
        let header = sample_header();
        let line = header.to_line().unwrap();
        let bytes = encode_ciphertext_file(&line, &sample_envelope()).unwrap();

        let parsed = parse_ciphertext_file(&bytes).unwrap();
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.header_line, line);
        assert_eq!(parsed.envelope, sample_envelope());
        assert_eq!(parse_header(&bytes).unwrap(), header);
    }

    #[test]
    fn test_missing_envelope() {
        let line = sample_header().to_line().unwrap();
        assert!(matches!(
            parse_ciphertext_file(&line),
            Err(FormatError::MissingSection("envelope"))
        ));
        let mut with_newline = line.clone();
        with_newline.push(b'\n');
        assert!(matches!(
            parse_ciphertext_file(&with_newline),
            Err(FormatError::MissingSection("envelope"))
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let mut header = sample_header();
        header.v = 7;
        let bytes = encode_ciphertext_file(&header.to_line().unwrap(), &sample_envelope()).unwrap();
        assert!(matches!(parse_header(&bytes), Err(FormatError::UnsupportedVersion(7))));
    }

    #[test]
    fn test_plain_text_is_not_a_ciphertext() {
        assert!(parse_header(b"hello world\nsecond line\n").is_err());
        assert!(parse_header(b"").is_err());
    }

    #[test]
    fn test_payload_is_base64_in_json() {
        let payload = FilePayload {
            file_name: "a.txt".into(),
            file_data: b"hi".to_vec(),
        };
        let json = String::from_utf8(payload.to_json().unwrap()).unwrap();
        assert!(json.contains("\"aGk=\""));
        assert_eq!(FilePayload::from_json(json.as_bytes()).unwrap(), payload);
    }
}
