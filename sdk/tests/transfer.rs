#![allow(clippy::unwrap_used, reason = "tests")]

use {
    http_body_util::{BodyExt, Full},
    hyper::{
        Method, Request, Response, StatusCode,
        body::{Bytes, Incoming},
        header::{ETAG, HeaderValue},
    },
    parking_lot::Mutex,
    sealdrop_protocol::{ObjectContext, ObjectIndex, SharedSecret},
    sealdrop_sdk::{
        BucketEndpoint, NetworkFacade, ProgressCallback, ProgressWeights, TransferClient,
        UploadError, UploadState, crypto::encrypted_size, server::serve,
    },
    std::{
        convert::Infallible,
        io,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
        time::Duration,
    },
    tokio::{
        io::{AsyncRead, ReadBuf},
        net::TcpListener,
        time::{sleep, timeout},
    },
    url::Url,
};

#[derive(Debug, Clone, Copy)]
enum Reply {
    Etag(&'static str),
    NoEtag,
    Status(StatusCode),
    Hang,
}

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    body_len: Option<usize>,
}

type Requests = Arc<Mutex<Vec<Recorded>>>;

async fn handle(
    requests: Requests,
    reply: Reply,
    request: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let body_len = request
        .into_body()
        .collect()
        .await
        .ok()
        .map(|body| body.to_bytes().len());
    requests.lock().push(Recorded {
        method: method.clone(),
        path,
        body_len,
    });

    let mut response = Response::new(Full::default());
    if method == Method::DELETE {
        *response.status_mut() = StatusCode::NO_CONTENT;
        return Ok(response);
    }
    match reply {
        Reply::Etag(value) => {
            response
                .headers_mut()
                .insert(ETAG, HeaderValue::from_static(value));
        }
        Reply::NoEtag => {}
        Reply::Status(status) => *response.status_mut() = status,
        Reply::Hang => std::future::pending::<()>().await,
    }
    Ok(response)
}

async fn start_endpoint(reply: Reply) -> (Url, Requests) {
    let requests = Requests::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, {
        let requests = Arc::clone(&requests);
        move |request| handle(Arc::clone(&requests), reply, request)
    }));
    (format!("http://{addr}").parse().unwrap(), requests)
}

fn facade(url: Url) -> NetworkFacade {
    NetworkFacade::new(
        TransferClient::new(Duration::from_secs(5)).unwrap(),
        Arc::new(BucketEndpoint::new(url, None)),
        SharedSecret::from_bytes(vec![1; 64]),
        ProgressWeights::default(),
    )
}

fn context() -> ObjectContext {
    ObjectContext {
        bucket: "tests".parse().unwrap(),
        index: ObjectIndex::from_bytes([9; 32]),
    }
}

fn data(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i % 251).unwrap()).collect()
}

fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<u8>>>) {
    let values = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&values);
    (Box::new(move |value| sink.lock().push(value)), values)
}

#[tokio::test(flavor = "multi_thread")]
async fn fingerprint_is_taken_from_etag() {
    let (url, requests) = start_endpoint(Reply::Etag("test-etag")).await;
    let source = data(3 * 1024 * 1024 + 17);
    let source_len = u64::try_from(source.len()).unwrap();
    let (callback, progress) = recorder();

    let (mut handle, _abort) =
        facade(url).upload_from_stream(context(), io::Cursor::new(source), source_len, callback);
    let result = (&mut handle).await.unwrap();

    assert_eq!(result.fingerprint.as_str(), "test-etag");
    assert_eq!(result.encrypted_size, encrypted_size(source_len).unwrap());
    assert_eq!(handle.state(), UploadState::Succeeded);

    let progress = progress.lock().clone();
    assert!(progress.windows(2).all(|pair| pair[0] < pair[1]), "{progress:?}");
    assert_eq!(progress.last(), Some(&100));
    assert!(!progress.contains(&0));

    let requests = requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PUT);
    assert_eq!(
        requests[0].path,
        format!("/buckets/tests/objects/{}", result.remote_object_id)
    );
    assert_eq!(
        requests[0].body_len,
        Some(usize::try_from(result.encrypted_size).unwrap())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_fingerprint_fails() {
    let (url, _requests) = start_endpoint(Reply::NoEtag).await;
    let (callback, progress) = recorder();

    let (mut handle, _abort) =
        facade(url).upload_from_stream(context(), io::Cursor::new(data(1000)), 1000, callback);
    let err = (&mut handle).await.unwrap_err();

    assert!(matches!(err, UploadError::MissingFingerprint), "{err:?}");
    assert!(err.to_string().contains("fingerprint"));
    assert_eq!(handle.state(), UploadState::Failed);
    assert!(!progress.lock().contains(&100));
}

#[tokio::test(flavor = "multi_thread")]
async fn error_status_fails() {
    let (url, _requests) = start_endpoint(Reply::Status(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let (handle, _abort) = facade(url).upload_from_stream(
        context(),
        io::Cursor::new(data(10)),
        10,
        Box::new(|_| {}),
    );
    let err = handle.await.unwrap_err();
    let UploadError::Transfer(err) = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
}

#[tokio::test(flavor = "multi_thread")]
async fn abort_before_response() {
    let (url, requests) = start_endpoint(Reply::Hang).await;
    let pipeline = facade(url).pipeline();
    let abort = pipeline.abort_handle();
    let progress = Arc::new(Mutex::new(Vec::new()));
    let callback: ProgressCallback = Box::new({
        let progress = Arc::clone(&progress);
        move |value| {
            progress.lock().push(value);
            // The whole body has been handed to the transport.
            if value == 90 {
                abort.abort();
            }
        }
    });

    let (mut handle, abort) =
        pipeline.upload_from_stream(context(), io::Cursor::new(data(5000)), 5000, callback);
    let err = timeout(Duration::from_secs(10), &mut handle)
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_aborted(), "{err:?}");
    assert!(abort.is_aborted());
    assert_eq!(handle.state(), UploadState::Aborted);
    assert_eq!(progress.lock().last(), Some(&90));

    // The endpoint is told that the object was abandoned.
    timeout(Duration::from_secs(10), async {
        while !requests
            .lock()
            .iter()
            .any(|request| request.method == Method::DELETE)
        {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_makes_no_requests() {
    let (url, requests) = start_endpoint(Reply::Etag("unused")).await;
    let (handle, _abort) = facade(url).upload_from_stream(
        context(),
        io::Cursor::new(Vec::new()),
        0,
        Box::new(|_| {}),
    );
    let err = handle.await.unwrap_err();
    assert!(matches!(err, UploadError::EmptySource), "{err:?}");
    sleep(Duration::from_millis(50)).await;
    assert!(requests.lock().is_empty());
}

struct BrokenReader {
    remaining: usize,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.remaining == 0 {
            return Poll::Ready(Err(io::Error::other("disk is gone")));
        }
        let len = self.remaining.min(buf.remaining());
        buf.put_slice(&vec![7; len]);
        self.remaining -= len;
        Poll::Ready(Ok(()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn source_failure_is_not_a_transfer_error() {
    let (url, _requests) = start_endpoint(Reply::Etag("unused")).await;
    let (mut handle, _abort) = facade(url).upload_from_stream(
        context(),
        BrokenReader {
            remaining: 2 * 1024 * 1024,
        },
        4 * 1024 * 1024,
        Box::new(|_| {}),
    );
    let err = (&mut handle).await.unwrap_err();
    let UploadError::StreamRead(err) = err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(err.to_string(), "disk is gone");
    assert_eq!(handle.state(), UploadState::Failed);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_uploads_are_independent() {
    let (url, requests) = start_endpoint(Reply::Etag("\"shared\"")).await;
    let facade = facade(url);
    let uploads = (0..4u8).map(|i| {
        let context = ObjectContext {
            bucket: "tests".parse().unwrap(),
            index: ObjectIndex::from_bytes([i; 32]),
        };
        let (handle, _abort) = facade.upload_from_stream(
            context,
            io::Cursor::new(data(100_000)),
            100_000,
            Box::new(|_| {}),
        );
        handle
    });
    let results = futures::future::join_all(uploads).await;
    let mut ids = results
        .into_iter()
        .map(|result| {
            let result = result.unwrap();
            assert_eq!(result.fingerprint.as_str(), "shared");
            result.remote_object_id
        })
        .collect::<Vec<_>>();
    ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(requests.lock().len(), 4);
}
