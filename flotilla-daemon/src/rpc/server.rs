// Copyright 2024-2025 Golem Cloud
//
// Licensed under the Golem Source License v1.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://license.golem.cloud/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::rpc::dispatcher::Dispatcher;
use crate::rpc::protocol::{RpcErrorKind, RpcRequest, RpcResponse};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket {0} is already in use by another daemon")]
    InUse(PathBuf),
    #[error("failed to bind socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Local RPC endpoint: one unix socket per daemon, mode 0600, one task per
/// accepted connection, every frame forwarded to the dispatcher.
pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
}

impl SocketServer {
    pub async fn bind(path: &Path, dispatcher: Arc<Dispatcher>) -> Result<Self, SocketError> {
        if path.exists() {
            // a live daemon answers on the socket; a stale file from a crash
            // does not and can be replaced
            match UnixStream::connect(path).await {
                Ok(_) => return Err(SocketError::InUse(path.to_path_buf())),
                Err(_) => {
                    warn!(path = %path.display(), "removing stale socket file");
                    let _ = std::fs::remove_file(path);
                }
            }
        }

        let listener = UnixListener::bind(path).map_err(|source| SocketError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(err) =
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        {
            warn!(path = %path.display(), error = %err, "failed to restrict socket permissions");
        }

        info!(path = %path.display(), "socket server listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
            dispatcher,
        })
    }

    pub async fn run(self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let dispatcher = self.dispatcher.clone();
                        let conn_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            serve_connection(stream, dispatcher, conn_cancel).await;
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "accept failed");
                    }
                }
            }
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to unlink socket");
            }
        }
        info!("socket server stopped");
    }
}

async fn serve_connection(
    stream: UnixStream,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = framed.next() => frame,
        };
        let bytes = match frame {
            Some(Ok(bytes)) => bytes,
            Some(Err(err)) => {
                debug!(error = %err, "connection frame error");
                break;
            }
            None => break,
        };

        let response = match serde_json::from_slice::<RpcRequest>(&bytes) {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(err) => RpcResponse::error(
                RpcErrorKind::BadRequest,
                format!("malformed request: {err}"),
            ),
        };

        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to serialize response");
                break;
            }
        };
        if framed.send(Bytes::from(payload)).await.is_err() {
            break;
        }
    }
}
