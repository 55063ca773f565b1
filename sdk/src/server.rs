use {
    hyper::{
        Request, Response,
        body::{Body, Incoming},
        server::conn::http1,
        service::service_fn,
    },
    hyper_util::rt::TokioIo,
    std::{convert::Infallible, error::Error, future::Future, io},
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::TcpListener,
    },
    tracing::{Instrument, debug, info_span, warn},
};

/// Serves HTTP/1 requests of a single connection until it is closed.
///
/// Clients dropping an unfinished request (e.g. an aborted upload) are logged at debug level.
pub async fn serve_connection<C, H, Fut, B>(io: C, handler: H)
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Fn(Request<Incoming>) -> Fut,
    Fut: Future<Output = Result<Response<B>, Infallible>>,
    B: Body + 'static,
    <B as Body>::Error: Error + Send + Sync,
{
    let serving = http1::Builder::new()
        .keep_alive(true)
        .serve_connection(TokioIo::new(io), service_fn(handler))
        .await;
    if let Err(err) = serving {
        if let Some(err) = err.source().and_then(|err| err.downcast_ref::<io::Error>()) {
            match err.kind() {
                io::ErrorKind::NotConnected
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::BrokenPipe => {
                    debug!(error = ?err, "canceled request");
                }
                _ => warn!(error = ?err, "error while serving"),
            }
        } else if err.is_incomplete_message() {
            debug!(error = ?err, "interrupted request");
        } else {
            warn!(error = ?err, "failed to serve HTTP");
        }
    }
}

/// Accepts connections and serves each of them on its own task.
///
/// Returns only if accepting a connection fails.
pub async fn serve<H, Fut, B>(listener: TcpListener, handler: H) -> io::Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Response<B>, Infallible>> + Send + 'static,
    B: Body + Send + 'static,
    <B as Body>::Data: Send,
    <B as Body>::Error: Error + Send + Sync,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = handler.clone();
        tokio::spawn(
            serve_connection(stream, handler).instrument(info_span!("connection", %peer)),
        );
    }
}
