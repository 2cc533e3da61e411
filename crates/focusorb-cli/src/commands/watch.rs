//! Terminal-driven page session
//!
//! Simulates one monitored page in this process: enforcement runs on real
//! timers, the overlay is printed to the terminal and overlay actions are
//! typed on stdin.

use anyhow::Result;
use focusorb_core::{
    config::OrbConfig, Clock, MediaState, OverlayCommand, OverlayView, PageBus, PageId, PageProbe,
    PageSession, PageSnapshot, Scheduler, SystemClock, TabRegistry, TokioScheduler,
};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::focus::local_handler;

/// A page whose playback is toggled from the terminal
struct TerminalPage {
    snapshot: Mutex<PageSnapshot>,
}

impl TerminalPage {
    fn new(url: &str, title: &str, playing: bool) -> Self {
        let mut snapshot = PageSnapshot::new(url).with_media(if playing {
            MediaState::playing()
        } else {
            MediaState::paused()
        });
        snapshot.title = title.to_string();
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    fn set_playing(&self, playing: bool) {
        let mut snapshot = match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshot.media = Some(if playing {
            MediaState::playing()
        } else {
            MediaState::paused()
        });
    }

    fn navigate(&self, url: &str) {
        let mut snapshot = match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshot.url = url.to_string();
    }
}

impl PageProbe for TerminalPage {
    fn snapshot(&self) -> PageSnapshot {
        match self.snapshot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

struct TerminalOverlay;

impl OverlayView for TerminalOverlay {
    fn show(&self) {
        println!("[FocusOrb] Still watching? Explain why you're here, or take a break.");
        println!("           ai <reason> | break <n> min | close | dismiss");
    }

    fn remove(&self) {
        println!("[FocusOrb] Overlay dismissed.");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    Command(OverlayCommand),
    Play,
    Pause,
    Navigate(String),
}

/// Parse one line typed while watching
pub fn parse_watch_input(line: &str) -> Option<WatchInput> {
    let line = line.trim();
    let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match word.to_ascii_lowercase().as_str() {
        "ai" => Some(WatchInput::Command(OverlayCommand::CheckWithAi {
            reason: rest.to_string(),
        })),
        "break" => Some(WatchInput::Command(OverlayCommand::TakeBreak {
            text: line.to_string(),
        })),
        "close" => Some(WatchInput::Command(OverlayCommand::CloseNow)),
        "dismiss" => Some(WatchInput::Command(OverlayCommand::Dismiss)),
        "play" => Some(WatchInput::Play),
        "pause" => Some(WatchInput::Pause),
        "open" if !rest.is_empty() => Some(WatchInput::Navigate(rest.to_string())),
        _ => None,
    }
}

pub async fn watch_page(config: &OrbConfig, url: &str, title: &str, paused: bool) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tabs = Arc::new(TabRegistry::new());
    let handler = local_handler(config, tabs.clone())?;

    let id = PageId::new();
    let mut closed = tabs.register(&id)?;
    let page = Arc::new(TerminalPage::new(url, title, !paused));
    let session = PageSession::new(
        id.clone(),
        Arc::new(PageBus::new(handler, id)),
        page.clone(),
        Arc::new(TerminalOverlay),
        clock,
        config.page_timings(),
    );

    let mut scheduler = TokioScheduler::new();
    session.start(&mut scheduler);
    println!("Watching {url} as page {}.", session.id());
    println!("Commands: play, pause, open <url>, ai <reason>, break <n> min, close, dismiss");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = closed.changed() => {
                println!("Page closed by FocusOrb.");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_watch_input(&line) {
                    Some(WatchInput::Command(command)) => {
                        if let Err(e) = session.submit(command).await {
                            println!("{e:#}");
                        }
                    }
                    Some(WatchInput::Play) => page.set_playing(true),
                    Some(WatchInput::Pause) => page.set_playing(false),
                    Some(WatchInput::Navigate(url)) => page.navigate(&url),
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command: {}", line.trim()),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Stopped watching.");
                break;
            }
        }
    }

    scheduler.stop_all();
    Ok(())
}
