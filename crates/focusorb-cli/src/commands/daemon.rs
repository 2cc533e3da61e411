/// Daemon lifecycle management commands
use anyhow::Result;
use focusorb_core::{
    config::{get_data_dir, OrbConfig},
    daemon::SOCKET_FILE,
    ipc::IpcClient,
    Daemon,
};
use focusorb_storage::Database;
use std::{env, fs, io, path::Path, process::Command, thread::sleep, time};
use sysinfo::{Pid, System};

const PID_FILE: &str = "focusorb.pid";
const LOG_FILE: &str = "focusorb.log";

/// PID recorded in `pid_file`, if that process is still alive
fn running_pid(pid_file: &Path) -> Option<usize> {
    let pid = fs::read_to_string(pid_file).ok()?.trim().parse::<usize>().ok()?;
    let mut sys = System::new();
    sys.refresh_process(Pid::from(pid)).then_some(pid)
}

/// Kill `pid` if it is still alive; returns whether a kill was sent
fn kill_if_running(pid: usize) -> bool {
    let mut sys = System::new();
    if !sys.refresh_process(Pid::from(pid)) {
        return false;
    }
    sys.process(Pid::from(pid)).is_some_and(sysinfo::Process::kill)
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

pub fn start_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join(PID_FILE);
    let sock_path = data_dir.join(SOCKET_FILE);

    if let Some(pid) = running_pid(&pid_file_path) {
        log::info!("Daemon is already running (PID: {pid}).");
        return Ok(());
    }
    if pid_file_path.exists() {
        log::warn!("Removing stale PID file.");
        remove_if_present(&pid_file_path)?;
    }
    if sock_path.exists() {
        log::warn!("Removing stale socket file.");
        remove_if_present(&sock_path)?;
    }

    fs::create_dir_all(data_dir)?;
    log::info!("Starting FocusOrb daemon...");

    let child = Command::new(env::current_exe()?)
        .arg("daemon-internal-start")
        .current_dir(env::current_dir()?)
        .spawn()?;

    log::info!("Daemon process started with PID: {}", child.id());
    fs::write(&pid_file_path, child.id().to_string())?;

    Ok(())
}

pub async fn run_daemon_process() -> Result<()> {
    // New process: logging goes to the data directory
    if let Err(e) = setup_daemon_logging() {
        eprintln!("Failed to set up daemon logging: {e:#}");
        return Err(e);
    }
    log::info!("Daemon process started internally.");

    if let Err(e) = serve().await {
        log::error!("Daemon main logic exited with a fatal error: {e:#}");
        return Err(e);
    }

    Ok(())
}

/// Run the daemon in the foreground
pub async fn serve() -> Result<()> {
    let data_dir = get_data_dir()?;
    let config = OrbConfig::load(&data_dir)?;
    let db = Database::new(None)?;

    let mut daemon = Daemon::new(db, &config, data_dir.join(SOCKET_FILE))?;
    daemon.run_with_signals().await
}

pub async fn stop_daemon(data_dir: &Path) -> Result<()> {
    let pid_file_path = data_dir.join(PID_FILE);
    let sock_path = data_dir.join(SOCKET_FILE);

    if !pid_file_path.exists() {
        log::info!("Daemon is not running (no PID file).");
        remove_if_present(&sock_path)?;
        return Ok(());
    }

    let pid = fs::read_to_string(&pid_file_path)?
        .trim()
        .parse::<usize>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    log::info!("Stopping FocusOrb daemon (PID: {pid})...");

    match IpcClient::new(&sock_path).shutdown().await {
        Ok(()) => {
            log::info!("Shutdown requested. Waiting for the daemon to exit...");
            sleep(time::Duration::from_secs(2));
            if kill_if_running(pid) {
                log::warn!("Daemon did not stop gracefully and was killed.");
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Err(e) => {
            log::error!("Failed to request shutdown: {e:#}. Forcing cleanup.");
            if kill_if_running(pid) {
                log::info!("Process killed.");
            }
        }
    }

    remove_if_present(&pid_file_path)?;
    remove_if_present(&sock_path)?;
    Ok(())
}

fn setup_daemon_logging() -> Result<()> {
    use std::fs::{create_dir_all, OpenOptions};

    let log_path = get_data_dir()?.join(LOG_FILE);

    if let Some(parent) = log_path.parent() {
        create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .init();

    Ok(())
}
