//! On-disk representation of synchronized files

pub mod envelope;
pub mod header;
pub mod mtime;
pub mod name;

// Re-export commonly used types
pub use envelope::{open, seal};
pub use header::{
    CIPHERTEXT_EXTENSION, CiphertextFile, CiphertextHeader, Envelope, FilePayload, FormatError,
    encode_ciphertext_file, parse_ciphertext_file, parse_header,
};
pub use mtime::{is_newer, mirror_modification_time};
pub use name::{
    ciphertext_file_name, decrypt_relative_name, encrypt_relative_name, hash_relative_name,
    relative_name,
};
