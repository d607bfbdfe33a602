// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket server and connection handling.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error};
use wp_engine::Update;

use crate::lifecycle::DaemonService;
use crate::protocol::{self, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};

/// State shared by all connections
pub struct ServerContext {
    pub service: Arc<DaemonService>,
    pub start_time: Instant,
    /// Signalled when a client requests shutdown
    pub shutdown: Arc<Notify>,
}

/// Handle a single client connection
///
/// A connection carries one request. `Subscribe` keeps it open as an update
/// stream until either side hangs up.
pub async fn handle_connection(
    ctx: Arc<ServerContext>,
    stream: UnixStream,
) -> Result<(), ServerError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = match protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await {
        Ok(req) => req,
        Err(protocol::ProtocolError::Timeout) => {
            error!("Request read timeout");
            return Err(ServerError::Timeout);
        }
        Err(protocol::ProtocolError::ConnectionClosed) => {
            debug!("Client disconnected before sending request");
            return Ok(());
        }
        Err(e) => {
            error!("Failed to read request: {}", e);
            return Err(ServerError::Protocol(e));
        }
    };

    debug!("Received request: {:?}", request);

    if request == Request::Subscribe {
        return subscribe(&ctx, &mut reader, &mut writer).await;
    }

    let response = handle_request(&ctx, request);

    debug!("Sending response: {:?}", response);

    protocol::write_response(&mut writer, &response, DEFAULT_TIMEOUT)
        .await
        .map_err(ServerError::Protocol)?;

    Ok(())
}

/// Handle a single request and return a response
fn handle_request(ctx: &ServerContext, request: Request) -> Response {
    let service = &ctx.service;
    let result = match request {
        Request::Ping => Ok(Response::Pong),

        Request::Hello { version: _ } => Ok(Response::Hello {
            version: PROTOCOL_VERSION.to_string(),
        }),

        Request::Status => service.list().map(|instances| Response::Status {
            uptime_secs: ctx.start_time.elapsed().as_secs(),
            instances: instances.len(),
            live_runs: service.live_runs(),
        }),

        Request::Shutdown => {
            ctx.shutdown.notify_one();
            Ok(Response::ShuttingDown)
        }

        Request::CreateInstance => service.create().map(|record| Response::Instance {
            instance: Box::new(record),
        }),

        Request::GetInstance { id } => service.get(&id).map(|record| Response::Instance {
            instance: Box::new(record),
        }),

        Request::ListInstances => service
            .list()
            .map(|instances| Response::Instances { instances }),

        Request::PostEvent { id, event } => service.post_event(&id, event).map(|()| Response::Ok),

        Request::ClearAll => service
            .clear_all()
            .map(|cleared| Response::Cleared {
                count: cleared.len(),
            }),

        // Streams are set up by handle_connection
        Request::Subscribe => Ok(Response::Error {
            message: "subscribe must be the first request".to_string(),
        }),
    };

    result.unwrap_or_else(|e| Response::Error {
        message: e.to_string(),
    })
}

async fn subscribe<R, W>(
    ctx: &ServerContext,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // Subscribe before listing so no update falls between the two
    let (observer, mut updates) = ctx.service.subscribe();
    debug!(%observer, "observer connected");
    let result = stream_updates(ctx, reader, writer, &mut updates).await;
    ctx.service.unsubscribe(observer);
    debug!(%observer, "observer disconnected");
    result
}

async fn stream_updates<R, W>(
    ctx: &ServerContext,
    reader: &mut R,
    writer: &mut W,
    updates: &mut mpsc::Receiver<Update>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let initial = match ctx.service.list() {
        Ok(instances) => Response::Instances { instances },
        Err(e) => Response::Error {
            message: e.to_string(),
        },
    };
    protocol::write_response(writer, &initial, DEFAULT_TIMEOUT).await?;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else {
                    return Ok(());
                };
                let response = Response::Update { update: Box::new(update) };
                protocol::write_response(writer, &response, DEFAULT_TIMEOUT).await?;
            }
            // Observers are passive; any read result means the client is done
            _ = protocol::read_message(reader) => return Ok(()),
        }
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
