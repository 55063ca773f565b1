pub mod credentials;
pub mod endpoints;

use {
    anyhow::{Error, Result, anyhow, bail, ensure},
    chrono::Utc,
    derive_more::{Display, From, Into},
    rand::{TryRngCore, rngs::OsRng},
    serde::{Deserialize, Deserializer, Serialize, de},
    sha2::{Digest, Sha256},
    std::{
        fmt::{self, Debug},
        path::Path,
        str::FromStr,
    },
};

pub use crate::credentials::{AccessToken, SharedSecret};

pub type DateTimeUtc = chrono::DateTime<Utc>;

const MAX_BUCKET_ID_LENGTH: usize = 64;

/// Storage bucket that owns uploaded objects.
///
/// Any string is accepted by `From<String>` so that configuration errors surface
/// while resolving an upload target; use [`BucketId::validate`] to check it.
/// Deserialization always validates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display, From, Into)]
pub struct BucketId(String);

impl BucketId {
    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that the id can be used as a single URL path segment and directory name.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.0.is_empty(), "bucket id is empty");
        ensure!(
            self.0.len() <= MAX_BUCKET_ID_LENGTH,
            "bucket id is too long; got {}, max {MAX_BUCKET_ID_LENGTH}",
            self.0.len(),
        );
        if let Some(c) = self
            .0
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            bail!("bucket id contains invalid character `{c}`");
        }
        Ok(())
    }
}

impl FromStr for BucketId {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self(s.to_owned());
        id.validate()?;
        Ok(id)
    }
}

impl<'de> Deserialize<'de> for BucketId {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let id = Self(Deserialize::deserialize(deserializer)?);
        id.validate().map_err(de::Error::custom)?;
        Ok(id)
    }
}

const OBJECT_INDEX_LENGTH: usize = 32;

/// Random per-object value that makes key derivation unique within a bucket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIndex([u8; OBJECT_INDEX_LENGTH]);

impl ObjectIndex {
    #[inline]
    pub fn generate() -> Result<Self> {
        let mut bytes = [0; OBJECT_INDEX_LENGTH];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| anyhow!("failed to generate object index: {err}"))?;
        Ok(Self(bytes))
    }

    #[must_use]
    #[inline]
    pub fn from_bytes(bytes: [u8; OBJECT_INDEX_LENGTH]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    pub fn as_bytes(&self) -> &[u8; OBJECT_INDEX_LENGTH] {
        &self.0
    }
}

impl fmt::Display for ObjectIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Debug for ObjectIndex {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectIndex({self})")
    }
}

impl FromStr for ObjectIndex {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let array = <[u8; OBJECT_INDEX_LENGTH]>::try_from(bytes).map_err(|bytes| {
            anyhow!(
                "invalid object index length; got {}, expected {OBJECT_INDEX_LENGTH}",
                bytes.len()
            )
        })?;
        Ok(Self(array))
    }
}

/// Identifies one object: the bucket it belongs to and its index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectContext {
    pub bucket: BucketId,
    pub index: ObjectIndex,
}

impl ObjectContext {
    #[inline]
    pub fn generate(bucket: BucketId) -> Result<Self> {
        Ok(Self {
            bucket,
            index: ObjectIndex::generate()?,
        })
    }
}

const REMOTE_OBJECT_ID_BYTES: usize = 12;

/// Name of the object on the storage endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Display)]
pub struct RemoteObjectId(String);

impl RemoteObjectId {
    /// Derives the id from the object context; equal contexts always map to the same id.
    #[must_use]
    #[inline]
    pub fn derive(context: &ObjectContext) -> Self {
        let digest = Sha256::new()
            .chain_update(b"sealdrop-object")
            .chain_update(context.bucket.as_str().as_bytes())
            .chain_update([0])
            .chain_update(context.index.as_bytes())
            .finalize();
        let prefix = digest
            .iter()
            .take(REMOTE_OBJECT_ID_BYTES)
            .copied()
            .collect::<Vec<u8>>();
        Self(hex::encode(prefix))
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RemoteObjectId {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ensure!(
            s.len() == REMOTE_OBJECT_ID_BYTES.saturating_mul(2),
            "invalid object id length: {}",
            s.len(),
        );
        ensure!(
            s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)),
            "object id must be lowercase hex",
        );
        Ok(Self(s.to_owned()))
    }
}

impl<'de> Deserialize<'de> for RemoteObjectId {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Content acknowledgement returned by the storage endpoint (the `ETag` value).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses a raw header value. Returns `None` if the quotes are unbalanced or
    /// nothing remains after removing the weak prefix and the quotes.
    #[must_use]
    #[inline]
    pub fn from_header_value(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value.strip_prefix("W/").unwrap_or(value);
        let value = match (value.strip_prefix('"'), value.ends_with('"')) {
            (Some(quoted), true) => quoted.strip_suffix('"')?,
            (None, false) => value,
            _ => return None,
        };
        if value.is_empty() || value.contains('"') {
            None
        } else {
            Some(Self(value.to_owned()))
        }
    }

    #[must_use]
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
pub struct FolderId(pub u64);

impl FromStr for FolderId {
    type Err = Error;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
pub struct FileId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub extension: Option<String>,
    pub size: u64,
    pub folder_id: FolderId,
}

impl FileMetadata {
    /// Takes the name and extension from the last component of `path`.
    #[inline]
    pub fn from_path(path: &Path, size: u64, folder_id: FolderId) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| anyhow!("unsupported file name: {path:?}"))?;
        let extension = path
            .extension()
            .map(|ext| {
                ext.to_str()
                    .map(str::to_owned)
                    .ok_or_else(|| anyhow!("unsupported file extension: {path:?}"))
            })
            .transpose()?;
        Ok(Self {
            name: name.to_owned(),
            extension,
            size,
            folder_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub bucket: BucketId,
    pub object_id: RemoteObjectId,
    pub fingerprint: Fingerprint,
    pub metadata: FileMetadata,
    pub created_at: DateTimeUtc,
}
