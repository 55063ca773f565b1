use {
    crate::storage::Storage,
    anyhow::{Result, bail, ensure},
    chrono::Utc,
    parking_lot::Mutex,
    sealdrop_protocol::{
        FileId, FileRecord, ObjectContext, RemoteObjectId, endpoints::RegisterFile,
    },
    std::sync::Arc,
    tokio::task::block_in_place,
    tracing::info,
};

#[derive(Debug, Clone)]
pub struct Context {
    pub storage: Arc<Storage>,
    pub files: Arc<FileCatalog>,
}

/// File records of uploaded objects.
#[derive(Debug, Default)]
pub struct FileCatalog {
    records: Mutex<Vec<FileRecord>>,
}

impl FileCatalog {
    #[must_use]
    pub fn records(&self) -> Vec<FileRecord> {
        self.records.lock().clone()
    }

    fn insert(&self, request: RegisterFile) -> Result<FileRecord> {
        let mut records = self.records.lock();
        if records
            .iter()
            .any(|record| record.bucket == request.bucket && record.object_id == request.object_id)
        {
            bail!("object {} is already registered", request.object_id);
        }
        let id = u64::try_from(records.len())?.saturating_add(1);
        let record = FileRecord {
            id: FileId(id),
            bucket: request.bucket,
            object_id: request.object_id,
            fingerprint: request.fingerprint,
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        records.push(record.clone());
        Ok(record)
    }
}

pub async fn register_file(ctx: Context, request: RegisterFile) -> Result<FileRecord> {
    let context = ObjectContext {
        bucket: request.bucket.clone(),
        index: request.index,
    };
    ensure!(
        RemoteObjectId::derive(&context) == request.object_id,
        "object id doesn't match the object context"
    );
    let Some(stored) =
        block_in_place(|| ctx.storage.fingerprint(&request.bucket, &request.object_id))?
    else {
        bail!("object {} is not uploaded", request.object_id);
    };
    ensure!(
        stored == request.fingerprint.as_str(),
        "fingerprint mismatch: stored object has {stored}"
    );
    let record = ctx.files.insert(request)?;
    info!(id = %record.id, object_id = %record.object_id, name = %record.metadata.name, "registered file");
    Ok(record)
}
