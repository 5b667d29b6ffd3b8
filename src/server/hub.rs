//! The hub's lifecycle and connection loop.
//!
//! A [`Hub`] goes through `Created → Initialized → Running → ShuttingDown →
//! Stopped`. Initialization builds the transport, storage and metrics
//! backends from their DSNs; running accepts TCP connections until an
//! interrupt signal arrives or a backend reports a fatal failure.
//!
//! Each connection is served by hyper on its own task. When the connection
//! ends, for whatever reason, its subscriber's subscriptions are closed and
//! the user counter is decremented.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::client::Client;
use crate::config::Settings;
use crate::metrics::{MetricsHandler, create_metrics};
use crate::persistence::create_storage;
use crate::security::CorsPolicy;
use crate::server::controller::HubContext;
use crate::server::handler::{RequestHandler, router};
use crate::transport::create_transport;
use crate::utils::error::{HubError, HubResult};

/// How often the number of connected users is logged.
pub const USERS_LOG_INTERVAL: Duration = Duration::from_secs(15);

/// How long open connections may take to wind down after shutdown starts.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Created,
    Initialized,
    Running,
    ShuttingDown,
    Stopped,
}

/// What made a running hub stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// The transport or storage lost its backend.
    BackendFailure,
    /// Stopped programmatically.
    Requested,
}

#[derive(Clone)]
struct HubServices {
    broker: Broker,
    metrics: Arc<dyn MetricsHandler>,
    handler: Arc<RequestHandler>,
}

pub struct Hub {
    settings: Settings,
    state: HubState,
    fatal: CancellationToken,
    services: Option<HubServices>,
    stop_signal: Option<ShutdownSignal>,
}

impl Hub {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: HubState::Created,
            fatal: CancellationToken::new(),
            services: None,
            stop_signal: None,
        }
    }

    pub fn state(&self) -> HubState {
        self.state
    }

    /// The signal that stopped the hub, once `Stopped`.
    pub fn stop_signal(&self) -> Option<ShutdownSignal> {
        self.stop_signal
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validates the settings and binds the transport, storage and metrics backends.
    pub async fn initialize(&mut self) -> HubResult<()> {
        if self.state != HubState::Created {
            return Ok(());
        }
        self.settings.validate()?;

        let hub = &self.settings.hub;
        let transport = create_transport(&hub.transport_url, self.fatal.clone()).await?;
        let storage = create_storage(hub.storage_dsn(), self.fatal.clone()).await?;
        let metrics = create_metrics(hub.metrics_dsn()).await?;

        let broker = Broker::new(transport, storage);
        let context = HubContext::from_settings(&self.settings, broker.clone())?;
        let cors = CorsPolicy::new(
            &self.settings.server.cors_allowed_origins,
            &self.settings.server.publish_allowed_origins,
        );

        self.services = Some(HubServices {
            broker,
            metrics,
            handler: Arc::new(RequestHandler::new(context, cors)),
        });
        self.state = HubState::Initialized;
        Ok(())
    }

    /// Binds the configured address and serves until SIGINT, SIGTERM or a backend failure.
    pub async fn run(&mut self) -> HubResult<ShutdownSignal> {
        let listener = TcpListener::bind(self.settings.socket_addr()?).await?;
        self.serve(listener, wait_for_signal()).await
    }

    /// Serves connections from `listener` until `signal` resolves or a backend fails.
    pub async fn serve<F>(&mut self, listener: TcpListener, signal: F) -> HubResult<ShutdownSignal>
    where
        F: Future<Output = ShutdownSignal> + Send,
    {
        self.initialize().await?;
        let services = self
            .services
            .clone()
            .ok_or_else(|| HubError::Config("hub is not initialized".to_string()))?;

        let addr = listener.local_addr()?.to_string();
        if let Err(e) = services.metrics.reset_users(&addr).await {
            warn!("Unable to reset the users counter: {}", e);
        }

        self.state = HubState::Running;
        info!("Hub listening on http://{}", addr);

        let router = router(services.handler.clone());
        let connections = CancellationToken::new();
        let tracker = TaskTracker::new();
        let fatal = self.fatal.clone();
        let mut ticker = interval(USERS_LOG_INTERVAL);
        tokio::pin!(signal);

        let stop = loop {
            tokio::select! {
                received = &mut signal => break received,
                _ = fatal.cancelled() => {
                    error!("A backend connection was lost, stopping the hub");
                    break ShutdownSignal::BackendFailure;
                }
                _ = ticker.tick() => match services.metrics.nb_users().await {
                    Ok(users) => info!("Users: {}", users),
                    Err(e) => warn!("Unable to count users: {}", e),
                },
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracker.spawn(serve_connection(
                            stream,
                            peer,
                            router.clone(),
                            services.clone(),
                            addr.clone(),
                            connections.clone(),
                        ));
                    }
                    Err(e) => warn!("Failed to accept a connection: {}", e),
                },
            }
        };

        self.state = HubState::ShuttingDown;
        info!("Shutting down ({:?})", stop);
        drop(listener);
        connections.cancel();
        tracker.close();
        if timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
            warn!("Some connections did not close in time");
        }

        self.state = HubState::Stopped;
        self.stop_signal = Some(stop);
        Ok(stop)
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    services: HubServices,
    addr: String,
    shutdown: CancellationToken,
) {
    if let Err(e) = services.metrics.increment_users(&addr).await {
        warn!("Unable to count a new user: {}", e);
    }

    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().oneshot(request)
    });
    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);

    tokio::select! {
        result = connection => {
            if let Err(e) = result {
                debug!("Connection from {} ended with an error: {}", peer, e);
            }
        }
        _ = shutdown.cancelled() => debug!("Closing connection from {}", peer),
    }

    if let Err(e) = services.metrics.decrement_users(&addr).await {
        warn!("Unable to count a leaving user: {}", e);
    }

    let client = Client::from_addr(peer);
    if let Err(e) = services.broker.handle_connection_closed(&client.id).await {
        warn!("Unable to close the subscriptions of {}: {}", client.id, e);
    }
}

/// Resolves on SIGINT or, on Unix, SIGTERM.
pub async fn wait_for_signal() -> ShutdownSignal {
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => tokio::select! {
                _ = interrupt => ShutdownSignal::Interrupt,
                _ = terminate.recv() => ShutdownSignal::Terminate,
            },
            Err(_) => {
                interrupt.await;
                ShutdownSignal::Interrupt
            }
        }
    }

    #[cfg(not(unix))]
    {
        interrupt.await;
        ShutdownSignal::Interrupt
    }
}
