// DM Bridge - Dispatch Server
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Endpoint lifecycle and per-call routing.
//!
//! ```text
//! Unconfigured --setup()--> Bound --listen()--> Listening --stop()--> Stopped
//! ```
//!
//! Every call passes the endpoint descriptor at accept time, then the
//! descriptor of the interface it targets, before reaching a handler on the
//! blocking pool.

mod endpoint;
mod protocol;

use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::BufReader;
use tokio::net::{UnixListener, UnixStream};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::context::BridgeContext;
use crate::error::{BridgeError, BridgeResult};
use crate::interfaces::{build_interface, resolve_enabled, CommandGroup, Interface};
use crate::security::{CallerIdentity, SecurityDescriptor};

pub use endpoint::{default_socket_path, RUNTIME_DIRECTORY, RUNTIME_DIRECTORY_MODE};
use protocol::{Frame, Request, Response, MAX_REQUEST_BYTES};

/// An interface exposed on the endpoint together with the descriptor guarding it.
#[derive(Clone)]
pub struct Registration {
    pub interface: Arc<dyn Interface>,
    pub descriptor: Arc<SecurityDescriptor>,
}

/// Interfaces registered on the endpoint, keyed by group.
#[derive(Clone, Default)]
pub struct Registry {
    entries: BTreeMap<CommandGroup, Registration>,
}

impl Registry {
    fn register(
        &mut self,
        interface: Arc<dyn Interface>,
        descriptor: Arc<SecurityDescriptor>,
    ) -> BridgeResult<()> {
        let group = interface.group();
        if self.entries.contains_key(&group) {
            return Err(BridgeError::Listen(format!(
                "interface {} is already registered",
                group
            )));
        }

        info!("Registering interface: {}", group);
        self.entries.insert(group, Registration { interface, descriptor });
        Ok(())
    }

    pub fn get(&self, group: CommandGroup) -> Option<&Registration> {
        self.entries.get(&group)
    }

    #[cfg(test)]
    fn groups(&self) -> Vec<CommandGroup> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum ServerState {
    Unconfigured,
    Bound {
        listener: StdUnixListener,
        descriptor: Arc<SecurityDescriptor>,
        registry: Arc<Registry>,
    },
    Listening {
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    },
    Stopped,
}

impl ServerState {
    fn name(&self) -> &'static str {
        match self {
            ServerState::Unconfigured => "unconfigured",
            ServerState::Bound { .. } => "bound",
            ServerState::Listening { .. } => "listening",
            ServerState::Stopped => "stopped",
        }
    }
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owns the endpoint from binding to teardown.
pub struct DispatchServer {
    ctx: Arc<BridgeContext>,
    state: ServerState,
}

impl DispatchServer {
    pub fn new(ctx: Arc<BridgeContext>) -> Self {
        Self {
            ctx,
            state: ServerState::Unconfigured,
        }
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    #[cfg(test)]
    fn bound_registry(&self) -> Option<&Registry> {
        match &self.state {
            ServerState::Bound { registry, .. } => Some(registry),
            _ => None,
        }
    }

    /// Build the descriptor, bind the socket and register the enabled interfaces.
    pub fn setup(&mut self) -> BridgeResult<()> {
        if !matches!(self.state, ServerState::Unconfigured) {
            return Err(BridgeError::Listen(format!(
                "cannot set up while {}",
                self.state.name()
            )));
        }

        let Some(config) = self.ctx.config.as_ref() else {
            warn!("No configuration loaded, refusing to expose any interface");
            return Err(BridgeError::NotConfigured);
        };

        let groups: Vec<CommandGroup> = resolve_enabled(config).into_iter().collect();
        self.setup_groups(&groups)
    }

    fn setup_groups(&mut self, groups: &[CommandGroup]) -> BridgeResult<()> {
        let descriptor = Arc::new(SecurityDescriptor::build(
            &self.ctx.capability,
            self.ctx.principals.as_ref(),
        )?);

        let path = &self.ctx.endpoint.socket_path;
        let listener = endpoint::bind(path)?;

        if let Err(e) = descriptor.apply_to_socket(path) {
            endpoint::remove_socket(path);
            return Err(e);
        }

        let mut registry = Registry::default();
        for group in groups {
            let interface = build_interface(*group, &self.ctx);
            if let Err(e) = registry.register(interface, descriptor.clone()) {
                error!("Failed to register interface {}: {}", group, e);
                endpoint::remove_socket(path);
                return Err(e);
            }
        }

        if registry.is_empty() {
            warn!("No interfaces enabled, every privileged call will be refused");
        }

        info!(
            "Endpoint {} ready with {} interface(s)",
            path.display(),
            registry.len()
        );
        self.state = ServerState::Bound {
            listener,
            descriptor,
            registry: Arc::new(registry),
        };
        Ok(())
    }

    /// Start accepting connections. Must be called inside a tokio runtime.
    pub fn listen(&mut self) -> BridgeResult<()> {
        let handle = Handle::try_current()
            .map_err(|e| BridgeError::Listen(format!("no async runtime: {}", e)))?;

        let (listener, descriptor, registry) = match mem::replace(&mut self.state, ServerState::Stopped) {
            ServerState::Bound {
                listener,
                descriptor,
                registry,
            } => (listener, descriptor, registry),
            other => {
                let state = other.name();
                self.state = other;
                return Err(BridgeError::Listen(format!("cannot listen while {}", state)));
            }
        };

        let path = &self.ctx.endpoint.socket_path;
        let listener = {
            let _guard = handle.enter();
            listener
                .set_nonblocking(true)
                .and_then(|()| UnixListener::from_std(listener))
        };
        let listener = match listener {
            Ok(listener) => listener,
            Err(e) => {
                endpoint::remove_socket(path);
                return Err(BridgeError::Listen(format!(
                    "failed to listen on {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let limit = Arc::new(Semaphore::new(self.ctx.endpoint.max_connections));
        let task = handle.spawn(accept_loop(
            listener,
            descriptor,
            registry,
            limit,
            shutdown_rx,
        ));

        info!("Listening on {}", path.display());
        self.state = ServerState::Listening { shutdown, task };
        Ok(())
    }

    /// Stop accepting, wait for the accept loop and remove the socket.
    pub async fn stop(&mut self) -> BridgeResult<()> {
        let (shutdown, task) = match mem::replace(&mut self.state, ServerState::Stopped) {
            ServerState::Listening { shutdown, task, .. } => (shutdown, task),
            other => {
                let state = other.name();
                self.state = other;
                return Err(BridgeError::Listen(format!("cannot stop while {}", state)));
            }
        };

        let _ = shutdown.send(true);
        let joined = task.await;
        endpoint::remove_socket(&self.ctx.endpoint.socket_path);

        joined.map_err(|e| BridgeError::Listen(format!("accept loop failed: {}", e)))?;
        info!("Endpoint stopped");
        Ok(())
    }
}

impl Drop for DispatchServer {
    fn drop(&mut self) {
        match mem::replace(&mut self.state, ServerState::Stopped) {
            ServerState::Listening { shutdown, task, .. } => {
                let _ = shutdown.send(true);
                task.abort();
                endpoint::remove_socket(&self.ctx.endpoint.socket_path);
            }
            ServerState::Bound { .. } => endpoint::remove_socket(&self.ctx.endpoint.socket_path),
            ServerState::Unconfigured | ServerState::Stopped => {}
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    descriptor: Arc<SecurityDescriptor>,
    registry: Arc<Registry>,
    limit: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        connections.spawn(serve_connection(
            stream,
            descriptor.clone(),
            registry.clone(),
            shutdown.clone(),
            permit,
        ));
    }

    debug!("Accept loop stopping, waiting for {} connection(s)", connections.len());
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: UnixStream,
    descriptor: Arc<SecurityDescriptor>,
    registry: Arc<Registry>,
    mut shutdown: watch::Receiver<bool>,
    _permit: tokio::sync::OwnedSemaphorePermit,
) {
    let caller = match CallerIdentity::from_stream(&stream).await {
        Ok(caller) => caller,
        Err(e) => {
            warn!("Failed to read peer credentials: {}", e);
            return;
        }
    };

    let (read_half, mut write_half) = stream.into_split();

    if let Err(e) = descriptor.authorize(&caller) {
        warn!(target: "eventlog", "Refused connection: {}", e);
        let _ = protocol::write_response(&mut write_half, &Response::error(&e)).await;
        return;
    }
    debug!("Accepted connection from uid {} pid {:?}", caller.uid, caller.pid);

    let mut reader = BufReader::new(read_half);
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = protocol::read_frame(&mut reader) => frame,
        };

        let (response, keep_open) = match frame {
            Ok(Frame::Request(request)) => (route(&registry, &caller, request).await, true),
            Ok(Frame::Malformed(e)) => (Response::error(&e), true),
            Ok(Frame::Oversized) => {
                let e = BridgeError::InvalidArgument(format!(
                    "request exceeds {} bytes",
                    MAX_REQUEST_BYTES
                ));
                (Response::error(&e), false)
            }
            Ok(Frame::Eof) => break,
            Err(e) => {
                debug!("Connection read failed: {}", e);
                break;
            }
        };

        if let Err(e) = protocol::write_response(&mut write_half, &response).await {
            debug!("Connection write failed: {}", e);
            break;
        }
        if !keep_open {
            break;
        }
    }
}

async fn route(registry: &Registry, caller: &CallerIdentity, request: Request) -> Response {
    let interface = request.interface.clone();
    let method = request.method.clone();

    match dispatch(registry, caller, request).await {
        Ok(result) => Response::ok(result),
        Err(e) => {
            debug!("{}.{} failed: {}", interface, method, e);
            Response::error(&e)
        }
    }
}

async fn dispatch(
    registry: &Registry,
    caller: &CallerIdentity,
    request: Request,
) -> BridgeResult<Value> {
    let registration = CommandGroup::from_name(&request.interface)
        .and_then(|group| registry.get(group))
        .ok_or_else(|| BridgeError::InterfaceNotRegistered(request.interface.clone()))?;

    registration.descriptor.authorize(caller)?;

    let interface = registration.interface.clone();
    let Request { method, params, .. } = request;
    tokio::task::spawn_blocking(move || interface.dispatch(&method, params))
        .await
        .map_err(|e| BridgeError::Unknown(format!("handler did not complete: {}", e)))?
}
