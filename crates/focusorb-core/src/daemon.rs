use crate::{
    background::{BackgroundHandler, TabRegistry},
    break_session::BreakState,
    clock::{Clock, SystemClock},
    config::OrbConfig,
    ipc::{listen, DaemonIpcHandler},
    notify::LogNotifier,
};
use anyhow::Result;
use focusorb_ai::HttpOracle;
use focusorb_storage::{Database, SettingsStore};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::interval;

pub const SOCKET_FILE: &str = "focusorb.sock";

/// Background process: owns the store and serves the message bus over IPC
pub struct Daemon {
    handler: Arc<BackgroundHandler>,
    clock: Arc<dyn Clock>,
    ipc_handler: Arc<DaemonIpcHandler>,
    shutdown_signal: Arc<AtomicBool>,
    sock_path: PathBuf,
    tick_interval: Duration,
    reported_lapse: Option<u64>,
}

impl Daemon {
    /// Wire the production handler against `db` and the configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the store cannot
    /// be seeded
    pub fn new(db: Database, config: &OrbConfig, sock_path: PathBuf) -> Result<Self> {
        let oracle = HttpOracle::new(Some(&config.backend_url), config.request_timeout())?;
        log::info!("Decision backend at {}", oracle.base_url());

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let handler = Arc::new(BackgroundHandler::new(
            SettingsStore::new(Arc::new(db)),
            Arc::new(oracle),
            Arc::new(LogNotifier),
            Arc::new(TabRegistry::new()),
            clock.clone(),
        ));
        handler.install()?;

        Ok(Self::with_handler(
            handler,
            clock,
            sock_path,
            config.page_timings().expiry,
        ))
    }

    #[must_use]
    pub fn with_handler(
        handler: Arc<BackgroundHandler>,
        clock: Arc<dyn Clock>,
        sock_path: PathBuf,
        tick_interval: Duration,
    ) -> Self {
        let shutdown_signal = Arc::new(AtomicBool::new(false));
        Self {
            ipc_handler: Arc::new(DaemonIpcHandler::new(handler.clone(), shutdown_signal.clone())),
            handler,
            clock,
            shutdown_signal,
            sock_path,
            tick_interval,
            reported_lapse: None,
        }
    }

    /// Serve IPC until Ctrl-C or a shutdown request
    ///
    /// # Errors
    ///
    /// Returns an error if the socket file cannot be cleaned up on exit
    pub async fn run_with_signals(&mut self) -> Result<()> {
        let sock_path = self.sock_path.clone();
        let ipc_handler = self.ipc_handler.clone();

        let listener = tokio::spawn(async move {
            if let Err(e) = listen(ipc_handler, &sock_path).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        let mut interval = interval(self.tick_interval.max(Duration::from_millis(1)));
        log::info!(
            "Daemon started with signal handling and IPC on {}",
            self.sock_path.display()
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        log::error!("Daemon tick failed: {e:#}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    self.shutdown_signal.store(true, Ordering::SeqCst);
                }
            }

            if self.shutdown_signal.load(Ordering::SeqCst) {
                break;
            }
        }

        listener.abort();
        if self.sock_path.exists() {
            std::fs::remove_file(&self.sock_path)?;
        }
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }

    /// Report a break that has just run out; each lapse is reported once
    fn tick(&mut self) -> Result<Option<BreakState>> {
        let state = self.handler.breaks().get_break()?;
        let now = self.clock.now_ms();

        let lapsed = !state.break_host.is_empty()
            && !state.is_active_for(&state.break_host, now)
            && self.reported_lapse != Some(state.break_until);
        if !lapsed {
            return Ok(None);
        }

        log::info!(
            "Break on {} ran out; open pages on it will be closed",
            state.break_host
        );
        self.reported_lapse = Some(state.break_until);
        Ok(Some(state))
    }
}
