use {
    anyhow::{Result, bail},
    fs_err::{File, create_dir_all, remove_file, rename},
    sealdrop_protocol::{BucketId, RemoteObjectId},
    sha2::{Digest, Sha256},
    std::{
        io::{self, Write},
        path::{Path, PathBuf},
    },
    tempfile::NamedTempFile,
};

/// Objects stored as `{root}/buckets/{bucket}/{object id}`.
#[derive(Debug)]
pub struct Storage {
    root: PathBuf,
    tmp: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Result<Self> {
        if !root.try_exists()? {
            bail!("storage root doesn't exist");
        }

        let tmp = root.join("tmp");
        create_dir_all(&tmp)?;

        Ok(Self { root, tmp })
    }

    fn bucket_dir(&self, bucket: &BucketId) -> PathBuf {
        self.root.join("buckets").join(bucket.as_str())
    }

    #[must_use]
    pub fn object_path(&self, bucket: &BucketId, object_id: &RemoteObjectId) -> PathBuf {
        self.bucket_dir(bucket).join(object_id.as_str())
    }

    pub fn create_file(&self) -> Result<HashingFile> {
        Ok(HashingFile {
            file: NamedTempFile::new_in(&self.tmp)?,
            hasher: Sha256::new(),
            size: 0,
        })
    }

    /// Moves a completely received object into place, replacing a previous version.
    /// Returns the hex SHA-256 of the content.
    pub fn commit_file(
        &self,
        file: HashingFile,
        bucket: &BucketId,
        object_id: &RemoteObjectId,
    ) -> Result<String> {
        let HashingFile {
            mut file, hasher, ..
        } = file;
        file.flush()?;
        create_dir_all(self.bucket_dir(bucket))?;
        let (_, old_path) = file.keep()?;
        if let Err(err) = rename(&old_path, self.object_path(bucket, object_id)) {
            let _ = remove_file(&old_path);
            return Err(err.into());
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Returns `false` if there was no such object.
    pub fn remove_object(&self, bucket: &BucketId, object_id: &RemoteObjectId) -> Result<bool> {
        match remove_file(self.object_path(bucket, object_id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Hex SHA-256 of a stored object, or `None` if it doesn't exist.
    pub fn fingerprint(
        &self,
        bucket: &BucketId,
        object_id: &RemoteObjectId,
    ) -> Result<Option<String>> {
        let path = self.object_path(bucket, object_id);
        if !path.try_exists()? {
            return Ok(None);
        }
        hash_file(&path).map(Some)
    }
}

fn hash_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Temporary file of an object that is being received.
#[derive(Debug)]
pub struct HashingFile {
    file: NamedTempFile,
    hasher: Sha256,
    size: u64,
}

impl HashingFile {
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Write for HashingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = self.file.write(buf)?;
        let written = buf.get(..len).unwrap_or(buf);
        self.hasher.update(written);
        self.size = self.size.saturating_add(u64::try_from(len).unwrap_or(u64::MAX));
        Ok(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
