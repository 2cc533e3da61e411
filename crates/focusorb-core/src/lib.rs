pub mod background;
pub mod break_session;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod dwell;
pub mod enforcement;
pub mod ipc;
pub mod messages;
pub mod navigation;
pub mod notify;
pub mod overlay;
pub mod page;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use background::{BackgroundHandler, PageBus, TabControl, TabRegistry};
pub use break_session::{BreakSessionManager, BreakState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use daemon::Daemon;
pub use dwell::{DwellDecision, DwellTimer};
pub use enforcement::{OverlayAction, PageSession};
pub use messages::{BusError, MessageBus, Request, Response};
pub use navigation::NavigationWatcher;
pub use notify::{LogNotifier, Notifier};
pub use overlay::OverlayCommand;
pub use page::{MediaState, OverlayView, PageId, PageProbe, PageSnapshot};
pub use scheduler::{ManualScheduler, RepeatingTask, Scheduler, TaskId, TokioScheduler};
