//! Object content is encrypted with AES-SIV.
//!
//! Every object gets its own key, derived from the account's shared secret, the bucket
//! and the object index:
//!
//! - bucket key = SHA-512(label, secret, bucket)
//! - object key = SHA-512(label, bucket key, index), used as the AES-256-SIV key
//! - IV = first 16 bytes of SHA-256(label, bucket key, index)
//!
//! The same source, secret and object context therefore always produce the same
//! ciphertext, and two objects never share a key.
//!
//! The content is split into blocks of [`BLOCK_SIZE`] bytes. The nonce of a block is the
//! IV with the block number XOR-ed into its last 8 bytes, so blocks cannot be reordered
//! without detection. The encrypted object has the following layout (little endian):
//!
//! - magic number (32 bits)
//! - plaintext size (64 bits)
//! - for every block: length of the encrypted block (32 bits), then the encrypted
//!   block (plaintext + 128-bit tag)
//!
//! The total length is known in advance (see [`encrypted_size`]), which lets the
//! ciphertext be streamed with a declared content length.

mod cipher;
mod io;

pub use cipher::ObjectCipher;
pub use io::{BLOCK_SIZE, CiphertextStream, DecryptingWriter, encrypt, encrypted_size};
