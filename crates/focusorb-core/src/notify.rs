/// User-visible notifications (desktop toasts in a browser host)
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Writes notifications to the log; used by the headless daemon
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        log::info!("[notification] {title}: {message}");
    }
}
