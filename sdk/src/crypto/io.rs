use {
    crate::{crypto::ObjectCipher, error::UploadError},
    anyhow::{bail, ensure},
    byteorder::{ByteOrder, LE},
    cadd::{ops::Cadd, prelude::IntoType},
    bytes::{BufMut, Bytes, BytesMut},
    futures::{StreamExt, stream::BoxStream},
    sealdrop_protocol::{ObjectContext, SharedSecret},
    sha2::{Digest, Sha256},
    std::io::{self, Write},
    stream_generator::generate_try_stream,
    tokio::io::{AsyncRead, AsyncReadExt},
};

/// Max length of a plaintext block that is encrypted at once.
pub const BLOCK_SIZE: usize = 1024 * 1024;
const BLOCK_SIZE_U64: u64 = 1024 * 1024;

/// File type marker that is stored at the beginning of every encrypted object.
const MAGIC_NUMBER: u32 = 0x5ea1_d809;

/// Magic number and plaintext length.
const HEADER_LENGTH: u64 = 4 + 8;

/// Authentication tag appended to every block by AES-SIV.
const TAG_LENGTH: usize = 16;

/// Frame length prefix and tag.
const FRAME_OVERHEAD: u64 = 4 + 16;

pub type CiphertextStream = BoxStream<'static, Result<Bytes, UploadError>>;

/// Size of the ciphertext produced for a source of `source_len` bytes.
#[inline]
pub fn encrypted_size(source_len: u64) -> Result<u64, UploadError> {
    source_len
        .div_ceil(BLOCK_SIZE_U64)
        .checked_mul(FRAME_OVERHEAD)
        .and_then(|overhead| overhead.checked_add(HEADER_LENGTH))
        .and_then(|overhead| overhead.checked_add(source_len))
        .ok_or_else(|| UploadError::CipherContext(format!("source is too large: {source_len}")))
}

/// Encrypts `source_len` bytes of `source` with the key of the specified object.
///
/// The source is read lazily, one block at a time, as the returned stream is polled.
#[inline]
pub fn encrypt<R>(
    source: R,
    source_len: u64,
    secret: &SharedSecret,
    context: &ObjectContext,
) -> Result<CiphertextStream, UploadError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let cipher = ObjectCipher::derive(secret, context)?;
    Ok(cipher.encrypt_stream(source, source_len))
}

impl ObjectCipher {
    /// Consumes the cipher; its block counter only moves forward.
    #[inline]
    pub fn encrypt_stream<R>(self, mut source: R, source_len: u64) -> CiphertextStream
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        generate_try_stream(move |mut y| async move {
            let mut header = BytesMut::with_capacity(12);
            header.put_u32_le(MAGIC_NUMBER);
            header.put_u64_le(source_len);
            y.send(Ok(header.freeze())).await;

            let mut buf = vec![0u8; BLOCK_SIZE];
            let mut remaining = source_len;
            let mut block_index = 0u64;
            while remaining > 0 {
                let block_len = remaining.min(BLOCK_SIZE_U64);
                let block = usize::try_from(block_len)
                    .ok()
                    .and_then(|len| buf.get_mut(..len))
                    .ok_or_else(|| UploadError::CipherContext("invalid block length".into()))?;
                source
                    .read_exact(block)
                    .await
                    .map_err(UploadError::StreamRead)?;

                let ciphertext = self.encrypt_block(block_index, block)?;
                let frame_len = u32::try_from(ciphertext.len())
                    .map_err(|err| UploadError::CipherContext(err.to_string()))?;
                let mut frame = BytesMut::with_capacity(ciphertext.len().saturating_add(4));
                frame.put_u32_le(frame_len);
                frame.extend_from_slice(&ciphertext);
                y.send(Ok(frame.freeze())).await;

                remaining = remaining.saturating_sub(block_len);
                block_index = block_index.saturating_add(1);
            }
            Ok::<(), UploadError>(())
        })
        .boxed()
    }
}

/// Passes through any writes and calculates Sha256 hash and size of the written data.
struct HashingWriter<W> {
    hasher: Sha256,
    size: u64,
    inner: W,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            hasher: Sha256::new(),
            inner,
            size: 0,
        }
    }

    fn finish(mut self) -> io::Result<(W, String, u64)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize()), self.size))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.inner.write(buf)?;
        let written = buf.get(..len).unwrap_or(buf);
        self.hasher.update(written);
        self.size = self.size.saturating_add(u64::try_from(len).map_err(io::Error::other)?);
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts an encrypted object written into it.
pub struct DecryptingWriter<'a, W: Write> {
    cipher: &'a ObjectCipher,
    // Plaintext length declared in the header, once it's been read.
    declared_size: Option<u64>,
    // Input data that is not yet decrypted.
    buf: Vec<u8>,
    block_index: u64,
    output: HashingWriter<W>,
}

impl<'a, W: Write> DecryptingWriter<'a, W> {
    #[inline]
    pub fn new(cipher: &'a ObjectCipher, output: W) -> Self {
        Self {
            cipher,
            declared_size: None,
            buf: Vec::new(),
            block_index: 0,
            output: HashingWriter::new(output),
        }
    }

    /// Returns the output, the hex Sha256 of the plaintext and its size.
    #[inline]
    pub fn finish(mut self) -> anyhow::Result<(W, String, u64)> {
        while self.process_block()? {}
        ensure!(self.buf.is_empty(), "trailing data found");
        let declared_size = self
            .declared_size
            .ok_or_else(|| anyhow::format_err!("missing header"))?;
        let (output, hash, size) = self.output.finish()?;
        ensure!(
            size == declared_size,
            "plaintext size mismatch; actual {size}, declared {declared_size}"
        );
        Ok((output, hash, size))
    }

    /// Returns `true` if a complete block has been consumed.
    fn process_block(&mut self) -> anyhow::Result<bool> {
        if self.declared_size.is_none() {
            let Some(header) = self.buf.get(..12) else {
                return Ok(false);
            };
            let (magic, size) = header.split_at(4);
            if LE::read_u32(magic) != MAGIC_NUMBER {
                bail!("magic number mismatch");
            }
            self.declared_size = Some(LE::read_u64(size));
            self.buf.drain(..12);
        }
        let Some(len) = self.buf.get(..4).map(LE::read_u32) else {
            return Ok(false);
        };
        let len = len.try_into_type::<usize>()?;
        let max_frame_len = BLOCK_SIZE.cadd(TAG_LENGTH)?;
        ensure!(
            len <= max_frame_len,
            "block size is too large (expected at most {max_frame_len}, got {len})"
        );
        let end = len.cadd(4_usize)?;
        let Some(frame) = self.buf.get(4..end) else {
            return Ok(false);
        };
        let plaintext = self.cipher.decrypt_block(self.block_index, frame)?;
        self.output.write_all(&plaintext)?;
        self.buf.drain(..end);
        self.block_index = self.block_index.cadd(1_u64)?;
        Ok(true)
    }
}

impl<W: Write> Write for DecryptingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        while self.process_block().map_err(io::Error::other)? {}
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

#[cfg(test)]
#[expect(clippy::indexing_slicing, reason = "test")]
mod tests {
    use {
        super::*,
        futures::TryStreamExt,
        sealdrop_protocol::ObjectIndex,
        std::{
            pin::Pin,
            task::{Context, Poll},
        },
        tokio::io::ReadBuf,
    };

    fn secret() -> SharedSecret {
        SharedSecret::from_bytes(b"test shared secret".to_vec())
    }

    fn object(index: u8) -> ObjectContext {
        ObjectContext {
            bucket: "bucket1".parse().unwrap(),
            index: ObjectIndex::from_bytes([index; 32]),
        }
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|_| rand::random::<u8>()).collect()
    }

    async fn encrypt_all(data: &[u8], context: &ObjectContext) -> Result<Vec<u8>, UploadError> {
        let chunks: Vec<Bytes> = encrypt(
            io::Cursor::new(data.to_vec()),
            data.len() as u64,
            &secret(),
            context,
        )?
        .try_collect()
        .await?;
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn deterministic() {
        let data = random_bytes(BLOCK_SIZE * 2 + 1000);
        let first = encrypt_all(&data, &object(1)).await.unwrap();
        let second = encrypt_all(&data, &object(1)).await.unwrap();
        assert_eq!(first, second);

        let other = encrypt_all(&data, &object(2)).await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn size_matches_prediction() {
        for len in [1, 1000, BLOCK_SIZE, BLOCK_SIZE + 1, BLOCK_SIZE * 3] {
            let ciphertext = encrypt_all(&random_bytes(len), &object(1)).await.unwrap();
            assert_eq!(
                ciphertext.len() as u64,
                encrypted_size(len as u64).unwrap(),
                "len = {len}"
            );
        }
        assert_eq!(encrypted_size(0).unwrap(), 12);
        encrypted_size(u64::MAX).unwrap_err();
    }

    #[tokio::test]
    async fn decrypts_back() {
        let data = random_bytes(BLOCK_SIZE * 2 + 17);
        let ciphertext = encrypt_all(&data, &object(5)).await.unwrap();

        let cipher = ObjectCipher::derive(&secret(), &object(5)).unwrap();
        let mut decryptor = DecryptingWriter::new(&cipher, Vec::new());
        // Feed in odd-sized pieces to cross frame boundaries.
        for piece in ciphertext.chunks(77_777) {
            decryptor.write_all(piece).unwrap();
        }
        let (plaintext, hash, size) = decryptor.finish().unwrap();
        assert_eq!(plaintext, data);
        assert_eq!(size, data.len() as u64);
        assert_eq!(hash, hex::encode(Sha256::digest(&data)));
    }

    #[tokio::test]
    async fn detects_tampering() {
        let data = random_bytes(3000);
        let cipher = ObjectCipher::derive(&secret(), &object(5)).unwrap();

        let mut ciphertext = encrypt_all(&data, &object(5)).await.unwrap();
        ciphertext[100] ^= 1;
        let mut decryptor = DecryptingWriter::new(&cipher, Vec::new());
        decryptor.write_all(&ciphertext).unwrap_err();

        let ciphertext = encrypt_all(&data, &object(5)).await.unwrap();
        let mut decryptor = DecryptingWriter::new(&cipher, Vec::new());
        decryptor.write_all(&ciphertext[..ciphertext.len() - 1]).unwrap();
        decryptor.finish().unwrap_err();

        let wrong_key = ObjectCipher::derive(&secret(), &object(6)).unwrap();
        let mut decryptor = DecryptingWriter::new(&wrong_key, Vec::new());
        decryptor.write_all(&ciphertext).unwrap_err();
    }

    #[tokio::test]
    async fn short_source_is_an_error() {
        let data = random_bytes(100);
        let chunks: Result<Vec<Bytes>, _> =
            encrypt(io::Cursor::new(data), 200, &secret(), &object(1))
                .unwrap()
                .try_collect()
                .await;
        assert!(matches!(chunks, Err(UploadError::StreamRead(_))));
    }

    struct FailingReader {
        remaining_ok: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining_ok == 0 {
                return Poll::Ready(Err(io::Error::other("disk on fire")));
            }
            let len = self.remaining_ok.min(buf.remaining());
            buf.put_slice(&vec![1; len]);
            self.remaining_ok -= len;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn read_error_is_propagated() {
        let mut stream = encrypt(
            FailingReader {
                remaining_ok: BLOCK_SIZE + 10,
            },
            BLOCK_SIZE as u64 * 2,
            &secret(),
            &object(1),
        )
        .unwrap();
        // header and the first block are produced before the failure
        stream.try_next().await.unwrap().unwrap();
        stream.try_next().await.unwrap().unwrap();
        let err = stream.try_next().await.unwrap_err();
        match err {
            UploadError::StreamRead(err) => assert_eq!(err.to_string(), "disk on fire"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
