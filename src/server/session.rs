//! Per-connection frame loop.
//!
//! Each accepted socket runs one of these loops: assemble a frame,
//! classify it, dispatch requests through the broker, and write exactly
//! one response frame per request, in request order. Individual request
//! failures never terminate the connection; only peer close, socket
//! errors, and oversized frames do.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::frame::{FrameError, Inbound, Outbound, ServerCodec};
use crate::handler::Broker;
use crate::protocol;

pub(crate) async fn serve(
    broker: Arc<Broker>,
    socket: TcpStream,
    peer: SocketAddr,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), FrameError> {
    let mut framed = Framed::new(socket, ServerCodec);
    loop {
        tokio::select! {
            frame = framed.next() => match frame {
                None => break, // peer closed the connection
                Some(Ok(Inbound::Ping(bytes))) => {
                    debug!("echoing {} byte no-op frame from {peer}", bytes.len());
                    framed.send(Outbound::Raw(bytes)).await?;
                }
                Some(Ok(Inbound::Invalid)) => {
                    debug!("invalid bson received from {peer}; returning not bson message");
                    framed.send(Outbound::Document(protocol::not_bson())).await?;
                }
                Some(Ok(Inbound::Request { document, size })) => {
                    let response = broker.handle(document, size).await;
                    framed.send(Outbound::Document(response)).await?;
                }
                Some(Err(FrameError::PayloadTooLarge(advertised))) => {
                    warn!("oversized frame of {advertised} bytes from {peer}; closing connection");
                    framed
                        .send(Outbound::Document(protocol::payload_too_large()))
                        .await?;
                    break;
                }
                Some(Err(error)) => return Err(error),
            },
            _ = shutdown.changed() => break,
        }
    }
    Ok(())
}
