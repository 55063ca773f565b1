use {
    crate::upload::UploadResult,
    reqwest::{Method, Url},
    sealdrop_protocol::{
        AccessToken, FileMetadata, FileRecord, ObjectContext,
        endpoints::{self, ApiResult, RegisterFile, RequestToResponse},
    },
    serde::{Serialize, de::DeserializeOwned},
    std::{future::Future, time::Duration},
    tokio::time::sleep,
    tracing::{instrument, warn},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NUM_RETRIES: usize = 5;
const RETRY_PERIOD: Duration = Duration::from_secs(10);

/// Failure to record an uploaded object. The object itself stays uploaded.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("catalog is unreachable")]
    Transport(#[source] reqwest::Error),

    #[error("catalog request failed")]
    Status(#[source] reqwest::Error),

    #[error("catalog rejected the file: {0}")]
    Rejected(String),

    #[error("failed to encode catalog request")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("failed to decode catalog response")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("invalid catalog url")]
    Url(#[from] url::ParseError),
}

/// Stores file entries for uploaded objects.
pub trait Catalog: Send + Sync {
    fn register(
        &self,
        context: &ObjectContext,
        upload: &UploadResult,
        metadata: FileMetadata,
    ) -> impl Future<Output = Result<FileRecord, RegistrationError>> + Send;
}

/// Catalog API of the storage server.
///
/// Reuse created client or clone it in order to reuse a connection pool.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    reqwest: reqwest::Client,
    server_url: Url,
    token: AccessToken,
}

impl HttpCatalog {
    #[inline]
    pub fn new(server_url: Url, token: AccessToken) -> Result<Self, reqwest::Error> {
        Ok(Self {
            server_url,
            token,
            reqwest: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()?,
        })
    }

    #[instrument(skip_all, fields(path = R::PATH))]
    #[inline(never)]
    pub async fn request<R>(&self, request: &R) -> Result<R::Response, RegistrationError>
    where
        R: RequestToResponse + Serialize + Send + Sync,
        R::Response: DeserializeOwned + Send + Sync,
    {
        let url = self.server_url.join(R::PATH)?;
        let body = endpoints::encode(request)?;
        let bytes = ok_or_retry(|| async {
            self.reqwest
                .request(Method::POST, url.clone())
                .bearer_auth(self.token.as_unmasked_str())
                .body(body.clone())
                .send()
                .await
                .map_err(|err| RequestError::Transport(RegistrationError::Transport(err)))?
                .error_for_status()
                .map_err(|err| RequestError::Application(RegistrationError::Status(err)))?
                .bytes()
                .await
                .map_err(|err| RequestError::Transport(RegistrationError::Transport(err)))
        })
        .await?;
        endpoints::decode::<ApiResult<R::Response>>(&bytes)?.map_err(RegistrationError::Rejected)
    }
}

impl Catalog for HttpCatalog {
    #[inline]
    async fn register(
        &self,
        context: &ObjectContext,
        upload: &UploadResult,
        metadata: FileMetadata,
    ) -> Result<FileRecord, RegistrationError> {
        self.request(&RegisterFile {
            bucket: context.bucket.clone(),
            object_id: upload.remote_object_id.clone(),
            index: context.index,
            fingerprint: upload.fingerprint.clone(),
            metadata,
        })
        .await
    }
}

/// Retries the request if an error arises due to the transport.
async fn ok_or_retry<T, F, Fut>(mut f: F) -> Result<T, RegistrationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut attempt: usize = 0;
    loop {
        attempt = attempt.saturating_add(1_usize);
        let transport_err = match f().await {
            Ok(x) => break Ok(x),
            Err(RequestError::Application(err)) => break Err(err),
            Err(RequestError::Transport(err)) => err,
        };
        if attempt >= NUM_RETRIES {
            break Err(transport_err);
        }
        warn!(error = %transport_err, attempt, "transport failed, will retry");
        sleep(RETRY_PERIOD).await;
    }
}

enum RequestError {
    Transport(RegistrationError),
    Application(RegistrationError),
}
