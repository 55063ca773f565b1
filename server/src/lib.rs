//! Reference storage endpoint and catalog.
//!
//! Objects are stored as plain files, file records are kept in memory.

mod content_streaming;
pub mod handler;
pub mod storage;

use {
    crate::{handler::FileCatalog, storage::Storage},
    anyhow::{Result, anyhow},
    http_body_util::{BodyExt, Full, combinators::BoxBody},
    hyper::{
        Method, Request, Response, StatusCode,
        body::{Bytes, Incoming},
        header::AUTHORIZATION,
    },
    sealdrop_protocol::{
        AccessToken, BucketId, RemoteObjectId,
        endpoints::{self, RegisterFile, RequestToResponse},
    },
    sealdrop_sdk::server::serve,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    std::{
        collections::HashSet, convert::Infallible, future::Future, net::SocketAddr,
        path::PathBuf, sync::Arc,
    },
    tokio::net::TcpListener,
    tracing::{info, warn},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub storage_path: PathBuf,
    pub access_tokens: Vec<AccessToken>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone)]
struct Context {
    storage: Arc<Storage>,
    files: Arc<FileCatalog>,
    access_tokens: Arc<HashSet<String>>,
}

pub async fn run(config: Config) -> Result<()> {
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on: {}", config.bind_addr);
    run_with_listener(listener, config).await
}

/// Serves requests accepted by `listener` until accepting fails.
pub async fn run_with_listener(listener: TcpListener, config: Config) -> Result<()> {
    let ctx = Context {
        storage: Arc::new(Storage::new(config.storage_path)?),
        files: Arc::default(),
        access_tokens: Arc::new(
            config
                .access_tokens
                .iter()
                .map(|token| token.as_unmasked_str().to_owned())
                .collect(),
        ),
    };
    serve(listener, move |request| handle_request(ctx.clone(), request)).await?;
    Ok(())
}

async fn handle_request(
    ctx: Context,
    request: Request<Incoming>,
) -> Result<Response<BoxBody<Bytes, Infallible>>, Infallible> {
    Ok(try_handle_request(ctx, request).await.unwrap_or_else(|code| {
        let mut response = Response::new(
            Full::new(Bytes::from(code.as_str().to_owned())).boxed(),
        );
        *response.status_mut() = code;
        response
    }))
}

async fn try_handle_request(
    ctx: Context,
    request: Request<Incoming>,
) -> Result<Response<BoxBody<Bytes, Infallible>>, StatusCode> {
    auth(&ctx, &request).map_err(|err| {
        warn!(?err, "auth error");
        StatusCode::UNAUTHORIZED
    })?;

    let handler_ctx = handler::Context {
        storage: ctx.storage,
        files: ctx.files,
    };

    let path = request.uri().path().to_owned();
    if let Some(object_path) = path.strip_prefix("/buckets/") {
        let (bucket, object_id) = parse_object_path(object_path).map_err(|err| {
            warn!(?err, %path, "invalid object path");
            StatusCode::NOT_FOUND
        })?;
        if request.method() == Method::PUT {
            content_streaming::upload(handler_ctx, request, &bucket, &object_id).await
        } else if request.method() == Method::DELETE {
            content_streaming::remove(&handler_ctx, &bucket, &object_id)
        } else {
            Err(StatusCode::METHOD_NOT_ALLOWED)
        }
    } else if request.method() != Method::POST {
        Err(StatusCode::NOT_FOUND)
    } else if path == RegisterFile::PATH {
        wrap_request(handler_ctx, request, handler::register_file).await
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// Parses `{bucket}/objects/{object id}`.
fn parse_object_path(path: &str) -> Result<(BucketId, RemoteObjectId)> {
    let (bucket, object_id) = path
        .split_once("/objects/")
        .ok_or_else(|| anyhow!("missing object id"))?;
    Ok((bucket.parse()?, object_id.parse()?))
}

async fn wrap_request<T, F, Fut>(
    ctx: handler::Context,
    request: Request<Incoming>,
    f: F,
) -> Result<Response<BoxBody<Bytes, Infallible>>, StatusCode>
where
    T: RequestToResponse + DeserializeOwned,
    <T as RequestToResponse>::Response: Serialize,
    F: FnOnce(handler::Context, T) -> Fut,
    Fut: Future<Output = Result<<T as RequestToResponse>::Response>>,
{
    let request = parse_request(request).await?;
    let response = f(ctx, request).await;
    Ok(Response::new(Full::new(serialize_response(response)?).boxed()))
}

async fn parse_request<T: DeserializeOwned>(request: Request<Incoming>) -> Result<T, StatusCode> {
    let bytes = request
        .into_body()
        .collect()
        .await
        .map_err(|err| {
            warn!(?err, "failed to read request body");
            StatusCode::BAD_REQUEST
        })?
        .to_bytes();
    endpoints::decode(&bytes).map_err(|err| {
        warn!(?err, "failed to deserialize request body");
        StatusCode::BAD_REQUEST
    })
}

fn serialize_response<T: Serialize>(data: Result<T>) -> Result<Bytes, StatusCode> {
    let data = data.map_err(|err| {
        warn!(?err, "handler error");
        format!("{err:#}")
    });
    endpoints::encode(&data).map(Bytes::from).map_err(|err| {
        warn!(?err, "failed to serialize response");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

fn auth(ctx: &Context, request: &Request<Incoming>) -> Result<()> {
    let auth = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| anyhow!("missing authorization header"))?
        .to_str()?;
    let token = auth
        .strip_prefix("Bearer ")
        .ok_or_else(|| anyhow!("authorization header is not Bearer"))?;
    if ctx.access_tokens.contains(token) {
        Ok(())
    } else {
        Err(anyhow!("invalid bearer token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths() {
        let (bucket, object_id) =
            parse_object_path("photos/objects/00112233445566778899aabb").unwrap();
        assert_eq!(bucket.as_str(), "photos");
        assert_eq!(object_id.as_str(), "00112233445566778899aabb");

        parse_object_path("photos/00112233445566778899aabb").unwrap_err();
        parse_object_path("pho.tos/objects/00112233445566778899aabb").unwrap_err();
        parse_object_path("photos/objects/../../etc").unwrap_err();
    }
}
