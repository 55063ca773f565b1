use {
    crate::{
        abort::AbortHandle,
        crypto::{ObjectCipher, encrypted_size},
        error::UploadError,
        progress::{Phase, ProgressCallback, ProgressReporter, ProgressWeights},
        transfer::{TransferClient, TransferDescriptor, TransferOptions},
    },
    derive_more::Display,
    futures::{FutureExt, future::BoxFuture},
    parking_lot::Mutex,
    sealdrop_protocol::{AccessToken, Fingerprint, ObjectContext, RemoteObjectId, SharedSecret},
    std::{
        fmt::Debug,
        future::Future,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    },
    tokio::io::AsyncRead,
    tracing::{Instrument, info, info_span, warn},
    url::Url,
};

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub remote_object_id: RemoteObjectId,
    /// Never empty.
    pub fingerprint: Fingerprint,
    pub encrypted_size: u64,
}

/// Chooses where the object of an upload attempt is sent.
pub trait TargetResolver: Debug + Send + Sync {
    fn resolve(
        &self,
        context: &ObjectContext,
        content_length: u64,
    ) -> Result<TransferDescriptor, UploadError>;
}

/// Sends every object to `{server}/buckets/{bucket}/objects/{object id}`.
#[derive(Debug, Clone)]
pub struct BucketEndpoint {
    server_url: Url,
    access_token: Option<AccessToken>,
}

impl BucketEndpoint {
    #[must_use]
    #[inline]
    pub fn new(server_url: Url, access_token: Option<AccessToken>) -> Self {
        Self {
            server_url,
            access_token,
        }
    }
}

impl TargetResolver for BucketEndpoint {
    #[inline]
    fn resolve(
        &self,
        context: &ObjectContext,
        content_length: u64,
    ) -> Result<TransferDescriptor, UploadError> {
        context
            .bucket
            .validate()
            .map_err(|err| UploadError::TargetResolution(err.to_string()))?;
        let remote_object_id = RemoteObjectId::derive(context);
        let mut url = self.server_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                UploadError::TargetResolution(format!("unsupported server url: {}", self.server_url))
            })?
            .pop_if_empty()
            .extend([
                "buckets",
                context.bucket.as_str(),
                "objects",
                remote_object_id.as_str(),
            ]);
        Ok(TransferDescriptor {
            url,
            content_length,
            access_token: self.access_token.clone(),
            remote_object_id,
        })
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Preparing,
    Transferring,
    Succeeded,
    Failed,
    Aborted,
}

impl UploadState {
    #[must_use]
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Long-lived entry point for uploads.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct NetworkFacade {
    transfer: TransferClient,
    resolver: Arc<dyn TargetResolver>,
    secret: Arc<SharedSecret>,
    weights: ProgressWeights,
}

impl NetworkFacade {
    #[must_use]
    #[inline]
    pub fn new(
        transfer: TransferClient,
        resolver: Arc<dyn TargetResolver>,
        secret: SharedSecret,
        weights: ProgressWeights,
    ) -> Self {
        Self {
            transfer,
            resolver,
            secret: Arc::new(secret),
            weights,
        }
    }

    #[must_use]
    #[inline]
    pub fn weights(&self) -> ProgressWeights {
        self.weights
    }

    /// Builds a pipeline for a single upload attempt.
    #[must_use]
    #[inline]
    pub fn pipeline(&self) -> UploadPipeline {
        UploadPipeline {
            transfer: self.transfer.clone(),
            resolver: Arc::clone(&self.resolver),
            secret: Arc::clone(&self.secret),
            weights: self.weights,
            abort: AbortHandle::new(),
        }
    }

    /// Starts uploading `source_len` bytes of `source`. Returns immediately.
    ///
    /// The upload makes progress while the returned handle is polled.
    #[inline]
    pub fn upload_from_stream<R>(
        &self,
        context: ObjectContext,
        source: R,
        source_len: u64,
        callback: ProgressCallback,
    ) -> (UploadHandle, AbortHandle)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.pipeline()
            .upload_from_stream(context, source, source_len, callback)
    }
}

/// Every collaborator of one upload attempt. Can't be reused.
#[derive(Debug)]
pub struct UploadPipeline {
    transfer: TransferClient,
    resolver: Arc<dyn TargetResolver>,
    secret: Arc<SharedSecret>,
    weights: ProgressWeights,
    abort: AbortHandle,
}

impl UploadPipeline {
    #[must_use]
    #[inline]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    #[inline]
    pub fn upload_from_stream<R>(
        self,
        context: ObjectContext,
        source: R,
        source_len: u64,
        callback: ProgressCallback,
    ) -> (UploadHandle, AbortHandle)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let abort = self.abort.clone();
        let state = Arc::new(Mutex::new(UploadState::Idle));
        let progress = ProgressReporter::new(self.weights, callback);
        let span = info_span!("upload", bucket = %context.bucket, index = %context.index);
        let future = {
            let state = Arc::clone(&state);
            async move {
                let result = self
                    .run(context, source, source_len, progress.clone(), &state)
                    .await;
                progress.close();
                let final_state = match &result {
                    Ok(result) => {
                        info!(object_id = %result.remote_object_id, "upload succeeded");
                        UploadState::Succeeded
                    }
                    Err(err) if err.is_aborted() => {
                        info!("upload aborted");
                        UploadState::Aborted
                    }
                    Err(err) => {
                        warn!(?err, "upload failed");
                        UploadState::Failed
                    }
                };
                *state.lock() = final_state;
                result
            }
            .instrument(span)
            .boxed()
        };
        (UploadHandle { future, state }, abort)
    }

    async fn run<R>(
        self,
        context: ObjectContext,
        source: R,
        source_len: u64,
        progress: ProgressReporter,
        state: &Mutex<UploadState>,
    ) -> Result<UploadResult, UploadError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        *state.lock() = UploadState::Preparing;
        if source_len == 0 {
            return Err(UploadError::EmptySource);
        }
        let encrypted_size = encrypted_size(source_len)?;
        let descriptor = self.resolver.resolve(&context, encrypted_size)?;
        let cipher = ObjectCipher::derive(&self.secret, &context)?;
        progress.report(Phase::Preparing, 1, 1);
        if self.abort.is_aborted() {
            return Err(UploadError::Aborted);
        }

        *state.lock() = UploadState::Transferring;
        info!(
            object_id = %descriptor.remote_object_id,
            source_len,
            encrypted_size,
            "uploading"
        );
        let body = cipher.encrypt_stream(source, source_len);
        let options = TransferOptions {
            progress,
            abort: self.abort.clone(),
        };
        let fingerprint = self.transfer.put(&descriptor, body, &options).await?;
        Ok(UploadResult {
            remote_object_id: descriptor.remote_object_id,
            fingerprint,
            encrypted_size,
        })
    }
}

/// Pending result of an upload.
pub struct UploadHandle {
    future: BoxFuture<'static, Result<UploadResult, UploadError>>,
    state: Arc<Mutex<UploadState>>,
}

impl UploadHandle {
    #[must_use]
    #[inline]
    pub fn state(&self) -> UploadState {
        *self.state.lock()
    }
}

impl Future for UploadHandle {
    type Output = Result<UploadResult, UploadError>;

    #[inline]
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.poll_unpin(cx)
    }
}

impl Debug for UploadHandle {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
