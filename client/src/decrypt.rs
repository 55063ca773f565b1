use {
    crate::Ctx,
    anyhow::Result,
    fs_err::{File, remove_file},
    sealdrop_protocol::{BucketId, ObjectContext, ObjectIndex},
    sealdrop_sdk::crypto::{DecryptingWriter, ObjectCipher},
    std::{io, path::Path},
    tracing::{info, warn},
};

/// Decrypts a stored object into `output`. Nothing is left at `output` on failure.
pub fn decrypt(
    ctx: &Ctx,
    encrypted: &Path,
    output: &Path,
    index: ObjectIndex,
    bucket: Option<BucketId>,
) -> Result<()> {
    let context = ObjectContext {
        bucket: bucket.unwrap_or_else(|| ctx.config.bucket.clone()),
        index,
    };
    let cipher = ObjectCipher::derive(&ctx.config.shared_secret, &context)?;
    match decrypt_file(&cipher, encrypted, output) {
        Ok((hash, size)) => {
            info!(size, sha256 = %hash, "decrypted {encrypted:?} into {output:?}");
            Ok(())
        }
        Err(err) => {
            if let Err(err) = remove_file(output) {
                warn!(%err, "failed to remove incomplete output");
            }
            Err(err)
        }
    }
}

fn decrypt_file(cipher: &ObjectCipher, encrypted: &Path, output: &Path) -> Result<(String, u64)> {
    let mut input = File::open(encrypted)?;
    let mut writer = DecryptingWriter::new(cipher, File::create(output)?);
    io::copy(&mut input, &mut writer)?;
    let (file, hash, size) = writer.finish()?;
    file.sync_all()?;
    Ok((hash, size))
}
