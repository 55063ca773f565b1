use {
    crate::{Ctx, term::set_status},
    anyhow::{Context as _, Result, ensure},
    byte_unit::{Byte, UnitType},
    futures::FutureExt,
    sealdrop_protocol::{FileMetadata, FolderId, ObjectContext},
    sealdrop_sdk::{Catalog, InterruptGuard, interrupted},
    std::{future::Future, path::Path, sync::Arc},
    tracing::{info, warn},
};

/// The user interrupted the command after the upload itself had finished.
#[derive(Debug, thiserror::Error)]
#[error("interrupted before the upload was registered")]
pub struct Interrupted;

/// Uploads the file at `path` and registers it in `folder`.
pub async fn upload(ctx: &Ctx, path: &Path, folder: FolderId) -> Result<()> {
    upload_until(ctx, path, folder, interrupted()).await
}

/// Like [`upload`], but stops when `interrupt` resolves.
async fn upload_until(
    ctx: &Ctx,
    path: &Path,
    folder: FolderId,
    interrupt: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let interrupt = interrupt.shared();
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {path:?}"))?;
    let metadata = file.metadata().await?;
    ensure!(metadata.is_file(), "{path:?} is not a file");
    let size = metadata.len();
    if size > ctx.config.warn_about_files_larger_than.as_u64() {
        warn!(
            "{path:?} is large ({:.2}), uploading it may take a while",
            Byte::from_u64(size).get_appropriate_unit(UnitType::Binary)
        );
    }
    let file_metadata = FileMetadata::from_path(path, size, folder)?;

    let context = ObjectContext::generate(ctx.config.bucket.clone())?;
    let status = Arc::new(set_status(format!("Uploading {path:?}")));
    let (handle, abort) = ctx.facade.upload_from_stream(
        context.clone(),
        file,
        size,
        Box::new({
            let status = Arc::clone(&status);
            let path = path.to_owned();
            move |percent| status.set(format!("Uploading {path:?}: {percent}%"))
        }),
    );
    let guard = InterruptGuard::with_trigger(abort, interrupt.clone());
    let result = handle.await;
    drop(guard);
    drop(status);
    let result = result?;
    info!(
        object_id = %result.remote_object_id,
        index = %context.index,
        fingerprint = %result.fingerprint,
        "uploaded {path:?}"
    );

    let registration = unless_interrupted(
        ctx.catalog.register(&context, &result, file_metadata),
        interrupt,
    )
    .await
    .inspect_err(|_| warn!("{path:?} was uploaded, but it is not registered in the catalog"))?;
    let record = registration.with_context(|| {
        format!("upload of {path:?} succeeded, but registering it in the catalog failed")
    })?;
    info!(id = %record.id, folder = %record.metadata.folder_id, "registered {path:?}");
    Ok(())
}

async fn unless_interrupted<T>(
    task: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
) -> Result<T, Interrupted> {
    tokio::select! {
        biased;
        () = interrupt => Err(Interrupted),
        value = task => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        sealdrop_sdk::AbortHandle,
        std::future::{pending, ready},
        tokio::sync::oneshot,
    };

    #[tokio::test]
    async fn interrupt_after_upload_stops_registration() {
        let (sender, receiver) = oneshot::channel::<()>();
        let interrupt = async move {
            let _ = receiver.await;
        }
        .shared();
        let abort = AbortHandle::new();
        let guard = InterruptGuard::with_trigger(abort.clone(), interrupt.clone());
        drop(guard);
        sender.send(()).unwrap();

        let err = unless_interrupted(pending::<()>(), interrupt)
            .await
            .unwrap_err();
        assert!(!abort.is_aborted());
        assert!(crate::is_interrupted(&anyhow::Error::new(err)));
    }

    #[tokio::test]
    async fn registration_completes_without_interrupt() {
        let value = unless_interrupted(ready(5), pending::<()>()).await.unwrap();
        assert_eq!(value, 5);
    }
}
