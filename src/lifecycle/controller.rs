//! Listener ownership and the restart protocol.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum_server::Handle;
use tokio::task::JoinHandle;

use crate::config::ConfigStore;
use crate::error::{Error, Result};
use crate::gateway::{build_router, redirect_router, Snapshot};
use crate::tls::AcmeManager;

/// Drain deadline per listener during a restart. In-flight requests past
/// the deadline are cut; tunnels that already upgraded are unaffected.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

/// Controller-wide options that do not live in the config document.
pub struct LifecycleOptions {
    /// Certificate disk cache.
    pub cert_dir: PathBuf,
    /// Use the production ACME directory (staging otherwise).
    pub acme_production: bool,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            cert_dir: PathBuf::from("/certs"),
            acme_production: true,
        }
    }
}

/// Owns the serving listener pair and the active snapshot.
///
/// The admin listener is deliberately *not* owned here: it stays up across
/// restarts so the editor that triggered a reload can read the outcome.
pub struct Lifecycle {
    store: ConfigStore,
    options: LifecycleOptions,
    snapshot: ArcSwap<Snapshot>,
    serving: tokio::sync::Mutex<Option<Serving>>,
}

/// One generation of listeners.
struct Serving {
    https: Handle,
    http: Handle,
    tasks: Vec<JoinHandle<()>>,
    _acme: Option<AcmeManager>,
}

impl Serving {
    /// Graceful stop with deadline, then the wait barrier: both serve
    /// tasks must have fully returned before the controller proceeds.
    async fn shutdown(self) {
        tracing::info!("shutting down serving listeners");
        self.https.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
        self.http.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "listener task failed");
            }
        }
        tracing::info!("serving listeners stopped");
    }
}

impl Lifecycle {
    /// Load the configuration, build the first snapshot and start serving.
    /// Errors here are startup-fatal for the caller.
    pub async fn start(store: ConfigStore, options: LifecycleOptions) -> Result<Arc<Self>> {
        let config = store.load()?;
        let snapshot = Snapshot::build(config)?;

        let controller = Arc::new(Self {
            store,
            options,
            snapshot: ArcSwap::new(snapshot.clone()),
            serving: tokio::sync::Mutex::new(None),
        });

        let serving = controller.spawn_listeners(snapshot).await?;
        *controller.serving.lock().await = Some(serving);
        Ok(controller)
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The active snapshot.
    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Bound address of the serving listener.
    pub async fn https_addr(&self) -> Option<SocketAddr> {
        match self.serving.lock().await.as_ref() {
            Some(serving) => serving.https.listening().await,
            None => None,
        }
    }

    /// Restart protocol, triggered after a new document is persisted:
    /// reload and rebuild first, so a document that fails to load leaves
    /// the old listeners serving; then drain the old generation, swap the
    /// snapshot and start fresh listeners with a fresh ACME whitelist.
    pub async fn restart(&self) -> Result<()> {
        let config = self.store.load()?;
        let snapshot = Snapshot::build(config)?;

        let mut serving = self.serving.lock().await;
        if let Some(current) = serving.take() {
            current.shutdown().await;
        }

        self.snapshot.store(snapshot.clone());
        *serving = Some(self.spawn_listeners(snapshot).await?);

        tracing::info!("restart complete");
        Ok(())
    }

    /// Stop serving without restarting (process shutdown).
    pub async fn stop(&self) {
        if let Some(current) = self.serving.lock().await.take() {
            current.shutdown().await;
        }
    }

    async fn spawn_listeners(&self, snapshot: Arc<Snapshot>) -> Result<Serving> {
        let listen = snapshot.config.listen.clone();
        let (https_addr, http_addr, tls) = (listen.https_addr, listen.http_addr, listen.tls);
        let proxy =
            build_router(snapshot.clone()).into_make_service_with_connect_info::<SocketAddr>();
        let redirect = redirect_router().into_make_service_with_connect_info::<SocketAddr>();

        let https = Handle::new();
        let http = Handle::new();
        let mut tasks = Vec::with_capacity(2);

        let acme = tls.then(|| {
            AcmeManager::new(
                snapshot.routes.certificate_domains(),
                &self.options.cert_dir,
                self.options.acme_production,
            )
        });

        match &acme {
            Some(manager) => {
                let acceptor = manager.acceptor();
                let handle = https.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = axum_server::bind(https_addr)
                        .acceptor(acceptor)
                        .handle(handle)
                        .serve(proxy)
                        .await
                    {
                        tracing::error!(error = %e, "proxy listener failed");
                    }
                }));
            }
            None => {
                let handle = https.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = axum_server::bind(https_addr)
                        .handle(handle)
                        .serve(proxy)
                        .await
                    {
                        tracing::error!(error = %e, "proxy listener failed");
                    }
                }));
            }
        }

        let redirect_handle = http.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axum_server::bind(http_addr)
                .handle(redirect_handle)
                .serve(redirect)
                .await
            {
                tracing::error!(error = %e, "redirect listener failed");
            }
        }));

        // Don't report this generation up before its sockets are bound.
        match https.listening().await {
            Some(addr) => {
                tracing::info!(address = %addr, tls, "proxy listener started")
            }
            None => return Err(Error::Listener("proxy listener failed to bind".to_string())),
        }
        match http.listening().await {
            Some(addr) => tracing::info!(address = %addr, "redirect listener started"),
            None => {
                return Err(Error::Listener(
                    "redirect listener failed to bind".to_string(),
                ))
            }
        }

        Ok(Serving {
            https,
            http,
            tasks,
            _acme: acme,
        })
    }
}
