//! Fuzz target for the two-line ciphertext file format
//!
//! Arbitrary bytes go through the header parser, the full file parser and,
//! when parsing succeeds, an open attempt with a fixed identity. None of
//! these may panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use oxsync_core::fs::{FilePayload, open, parse_ciphertext_file, parse_header};
use oxsync_core::{CryptoIdentity, REFERENCE_SEED};
use std::sync::OnceLock;

fn identity() -> &'static CryptoIdentity {
    static IDENTITY: OnceLock<CryptoIdentity> = OnceLock::new();
    IDENTITY.get_or_init(|| CryptoIdentity::from_seed(REFERENCE_SEED).expect("seeded identity"))
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let header = parse_header(data);
    let file = parse_ciphertext_file(data);

    // A full parse implies a header parse
    if file.is_ok() {
        assert!(header.is_ok(), "file parsed but header did not");
    }

    if let Ok(file) = file {
        let me = identity();
        if let Ok(payload) =
            open(&file.envelope, me.private_key(), me.public_key(), &file.header_line)
        {
            let _ = FilePayload::from_json(&payload);
        }
    }

    let _ = FilePayload::from_json(data);
});
