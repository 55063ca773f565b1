use {
    crate::handler,
    http_body_util::{BodyExt, Empty, combinators::BoxBody},
    hyper::{
        Request, Response, StatusCode,
        body::{Bytes, Incoming},
        header::{CONTENT_LENGTH, ETAG, HeaderValue},
    },
    sealdrop_protocol::{BucketId, RemoteObjectId},
    std::{convert::Infallible, io::Write},
    tokio::task::block_in_place,
    tracing::{debug, info, warn},
};

/// Receives an object and answers with its SHA-256 as the `ETag`.
///
/// The object only becomes visible once the whole declared length has been received.
pub async fn upload(
    ctx: handler::Context,
    mut request: Request<Incoming>,
    bucket: &BucketId,
    object_id: &RemoteObjectId,
) -> Result<Response<BoxBody<Bytes, Infallible>>, StatusCode> {
    let content_length: u64 = request
        .headers()
        .get(CONTENT_LENGTH)
        .ok_or_else(|| {
            warn!("missing content length in request");
            StatusCode::LENGTH_REQUIRED
        })?
        .to_str()
        .map_err(|err| {
            warn!(%err, "invalid content length in request");
            StatusCode::BAD_REQUEST
        })?
        .parse()
        .map_err(|err| {
            warn!(%err, "invalid content length in request");
            StatusCode::BAD_REQUEST
        })?;

    let mut file = block_in_place(|| ctx.storage.create_file()).map_err(|err| {
        warn!(%err, "failed to create file");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    while let Some(frame) = request.body_mut().frame().await {
        let frame = frame.map_err(|err| {
            debug!(%err, %object_id, "upload interrupted");
            StatusCode::BAD_REQUEST
        })?;
        let Some(data) = frame.data_ref() else {
            warn!("unexpected trailer frame in request");
            return Err(StatusCode::BAD_REQUEST);
        };
        block_in_place(|| file.write_all(data)).map_err(|err| {
            warn!(%err, "failed to write to content file");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    }

    let received_length = file.size();
    if content_length != received_length {
        warn!(content_length, received_length, "content length mismatch");
        return Err(StatusCode::BAD_REQUEST);
    }

    let hash = block_in_place(|| ctx.storage.commit_file(file, bucket, object_id)).map_err(
        |err| {
            warn!(%err, "failed to commit content file");
            StatusCode::INTERNAL_SERVER_ERROR
        },
    )?;
    info!(%bucket, %object_id, size = received_length, "stored object");

    let mut response = Response::new(Empty::new().boxed());
    *response.status_mut() = StatusCode::CREATED;
    let etag = format!("\"{hash}\"").parse::<HeaderValue>().map_err(|err| {
        warn!(%err, "invalid etag");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    response.headers_mut().insert(ETAG, etag);
    Ok(response)
}

/// Drops an object, e.g. after the client abandoned its upload.
pub fn remove(
    ctx: &handler::Context,
    bucket: &BucketId,
    object_id: &RemoteObjectId,
) -> Result<Response<BoxBody<Bytes, Infallible>>, StatusCode> {
    let removed = block_in_place(|| ctx.storage.remove_object(bucket, object_id)).map_err(|err| {
        warn!(%err, "failed to remove content file");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    if !removed {
        debug!(%bucket, %object_id, "nothing to remove");
        return Err(StatusCode::NOT_FOUND);
    }
    info!(%bucket, %object_id, "removed object");
    let mut response = Response::new(Empty::new().boxed());
    *response.status_mut() = StatusCode::NO_CONTENT;
    Ok(response)
}
