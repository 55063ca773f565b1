use {
    crate::error::UploadError,
    aes_siv::{Aes256SivAead, Key, KeyInit, Nonce, aead::Aead},
    sealdrop_protocol::{ObjectContext, SharedSecret},
    sha2::{Digest, Sha256, Sha512},
};

const BUCKET_KEY_LABEL: &[u8] = b"sealdrop-bucket-key";
const OBJECT_KEY_LABEL: &[u8] = b"sealdrop-object-key";
const OBJECT_IV_LABEL: &[u8] = b"sealdrop-object-iv";

const KEY_LENGTH: usize = 64;
const IV_LENGTH: usize = 16;

/// Key material of a single object.
///
/// Derived from the account secret and the object context, so two objects never
/// share a key and the same object always gets the same one.
pub struct ObjectCipher {
    inner: Aes256SivAead,
    iv: [u8; IV_LENGTH],
}

impl ObjectCipher {
    #[inline]
    pub fn derive(secret: &SharedSecret, context: &ObjectContext) -> Result<Self, UploadError> {
        if secret.is_empty() {
            return Err(UploadError::CipherContext("shared secret is empty".into()));
        }
        if context.bucket.is_empty() {
            return Err(UploadError::CipherContext("bucket id is empty".into()));
        }

        let bucket_key = Sha512::new()
            .chain_update(BUCKET_KEY_LABEL)
            .chain_update(secret.as_bytes())
            .chain_update(context.bucket.as_str().as_bytes())
            .finalize();
        let object_key = Sha512::new()
            .chain_update(OBJECT_KEY_LABEL)
            .chain_update(&bucket_key)
            .chain_update(context.index.as_bytes())
            .finalize();
        let iv_source = Sha256::new()
            .chain_update(OBJECT_IV_LABEL)
            .chain_update(&bucket_key)
            .chain_update(context.index.as_bytes())
            .finalize();

        let key = <[u8; KEY_LENGTH]>::try_from(object_key.as_slice())
            .map_err(|err| UploadError::CipherContext(format!("invalid key length: {err}")))?;
        let iv = iv_source
            .get(..IV_LENGTH)
            .and_then(|iv| <[u8; IV_LENGTH]>::try_from(iv).ok())
            .ok_or_else(|| UploadError::CipherContext("invalid iv length".into()))?;

        Ok(Self {
            inner: Aes256SivAead::new(&Key::<Aes256SivAead>::from(key)),
            iv,
        })
    }

    /// The IV with the block counter mixed into its lower half.
    fn block_nonce(&self, block_index: u64) -> Nonce {
        let mut nonce = self.iv;
        for (byte, counter) in nonce.iter_mut().skip(8).zip(block_index.to_be_bytes()) {
            *byte ^= counter;
        }
        Nonce::from(nonce)
    }

    #[inline]
    pub fn encrypt_block(&self, block_index: u64, plaintext: &[u8]) -> Result<Vec<u8>, UploadError> {
        self.inner
            .encrypt(&self.block_nonce(block_index), plaintext)
            .map_err(|err| UploadError::CipherContext(format!("block encryption failed: {err}")))
    }

    #[inline]
    pub fn decrypt_block(&self, block_index: u64, ciphertext: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.inner
            .decrypt(&self.block_nonce(block_index), ciphertext)
            .map_err(|err| anyhow::format_err!("decryption failed for block {block_index}: {err}"))
    }
}
