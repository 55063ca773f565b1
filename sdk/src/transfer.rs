use {
    crate::{
        abort::AbortHandle,
        crypto::CiphertextStream,
        error::UploadError,
        progress::{Phase, ProgressReporter},
    },
    futures::StreamExt,
    parking_lot::Mutex,
    reqwest::{
        Body, Url,
        header::{CONTENT_LENGTH, ETAG},
    },
    sealdrop_protocol::{AccessToken, Fingerprint, RemoteObjectId},
    std::{io, sync::Arc, time::Duration},
    tokio::select,
    tracing::{debug, instrument, warn},
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Time allowed for the abandon notification after an abort.
const ABANDON_TIMEOUT: Duration = Duration::from_secs(10);

#[must_use]
#[inline]
pub fn upload_timeout(upload_size: u64) -> Duration {
    // Assuming upload speed above 1 MB/s.
    DEFAULT_CONNECT_TIMEOUT.saturating_add(Duration::from_micros(upload_size))
}

/// Where and how one upload attempt sends its bytes.
#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    pub url: Url,
    pub content_length: u64,
    pub access_token: Option<AccessToken>,
    pub remote_object_id: RemoteObjectId,
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub progress: ProgressReporter,
    pub abort: AbortHandle,
}

/// Sends a body to the storage endpoint with a single PUT request.
///
/// Reuse created client or clone it in order to reuse a connection pool.
#[derive(Debug, Clone)]
pub struct TransferClient {
    reqwest: reqwest::Client,
}

impl TransferClient {
    #[inline]
    pub fn new(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            reqwest: reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()?,
        })
    }

    /// Uploads `body` and returns the fingerprint acknowledged by the endpoint.
    ///
    /// Progress of the transfer phase is reported as chunks are handed to the
    /// transport; 100 is reported only after a valid acknowledgement.
    #[instrument(skip_all, fields(url = %descriptor.url, len = descriptor.content_length))]
    #[inline(never)]
    pub async fn put(
        &self,
        descriptor: &TransferDescriptor,
        body: CiphertextStream,
        options: &TransferOptions,
    ) -> Result<Fingerprint, UploadError> {
        let TransferOptions { progress, abort } = options;
        let total = descriptor.content_length;
        // The transport only sees an opaque body error, so the original one is kept here.
        let body_error = Arc::new(Mutex::new(None::<UploadError>));

        let body = body.map({
            let progress = progress.clone();
            let abort = abort.clone();
            let body_error = Arc::clone(&body_error);
            let mut sent = 0u64;
            move |chunk| {
                let failure = match chunk {
                    Ok(chunk) if !abort.is_aborted() => {
                        sent = sent.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
                        progress.report(Phase::Transfer, sent, total);
                        return Ok(chunk);
                    }
                    Ok(_) => UploadError::Aborted,
                    Err(err) => err,
                };
                let message = failure.to_string();
                body_error.lock().get_or_insert(failure);
                Err(io::Error::other(message))
            }
        });

        let mut request = self
            .reqwest
            .put(descriptor.url.clone())
            .timeout(upload_timeout(total))
            .header(CONTENT_LENGTH, total)
            .body(Body::wrap_stream(body));
        if let Some(token) = &descriptor.access_token {
            request = request.bearer_auth(token.as_unmasked_str());
        }

        let response = select! {
            biased;
            () = abort.aborted() => None,
            response = request.send() => Some(response),
        };
        let Some(response) = response else {
            progress.close();
            self.abandon(descriptor);
            return Err(UploadError::Aborted);
        };

        let response = match response.and_then(reqwest::Response::error_for_status) {
            Ok(response) => response,
            Err(err) => {
                progress.close();
                let body_error = body_error.lock().take();
                if let Some(body_error) = body_error.filter(|err| !err.is_aborted()) {
                    return Err(body_error);
                }
                if abort.is_aborted() {
                    self.abandon(descriptor);
                    return Err(UploadError::Aborted);
                }
                return Err(UploadError::Transfer(err));
            }
        };

        let fingerprint = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .and_then(Fingerprint::from_header_value);
        if abort.is_aborted() {
            progress.close();
            self.abandon(descriptor);
            return Err(UploadError::Aborted);
        }
        let Some(fingerprint) = fingerprint else {
            progress.close();
            warn!(status = %response.status(), "response has no fingerprint");
            return Err(UploadError::MissingFingerprint);
        };
        progress.complete();
        debug!(%fingerprint, "transfer acknowledged");
        Ok(fingerprint)
    }

    /// Tells the endpoint that the object won't be completed. Best effort.
    fn abandon(&self, descriptor: &TransferDescriptor) {
        let mut request = self
            .reqwest
            .delete(descriptor.url.clone())
            .timeout(ABANDON_TIMEOUT);
        if let Some(token) = &descriptor.access_token {
            request = request.bearer_auth(token.as_unmasked_str());
        }
        let object_id = descriptor.remote_object_id.clone();
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) => debug!(%object_id, status = %response.status(), "upload abandoned"),
                Err(err) => debug!(%object_id, %err, "failed to notify endpoint about abandoned upload"),
            }
        });
    }
}
