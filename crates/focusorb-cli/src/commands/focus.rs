//! Commands that talk to the background handler over the message bus
//!
//! With a daemon running, requests go over its socket; otherwise they are
//! handled in-process against the same database.

use anyhow::{Context, Result};
use focusorb_ai::{ChatReply, DecisionOracle, HttpOracle, Verdict};
use focusorb_core::{
    config::OrbConfig, daemon::SOCKET_FILE, ipc::IpcClient, BackgroundHandler, BreakState,
    LogNotifier, MessageBus, PageSnapshot, Request, SystemClock, TabControl, TabRegistry,
};
use focusorb_storage::{Database, Settings, SettingsStore};
use serde_json::{json, Map, Value};
use std::{path::Path, sync::Arc};
use tabled::{Table, Tabled};

use super::helpers::{format_remaining, now_ms, truncate_str};

pub struct Connection {
    pub bus: Arc<dyn MessageBus>,
    pub via_daemon: bool,
}

/// Build a handler on the local database
pub fn local_handler(config: &OrbConfig, tabs: Arc<dyn TabControl>) -> Result<Arc<BackgroundHandler>> {
    let oracle = HttpOracle::new(Some(&config.backend_url), config.request_timeout())?;
    let handler = BackgroundHandler::new(
        SettingsStore::new(Arc::new(Database::new(None)?)),
        Arc::new(oracle),
        Arc::new(LogNotifier),
        tabs,
        Arc::new(SystemClock),
    );
    handler.install()?;
    Ok(Arc::new(handler))
}

pub async fn connect(data_dir: &Path, config: &OrbConfig) -> Result<Connection> {
    let sock_path = data_dir.join(SOCKET_FILE);
    if sock_path.exists() {
        let client = IpcClient::new(&sock_path);
        match client.send(&Request::GetBreak).await {
            Ok(_) => {
                log::debug!("Using daemon at {}", sock_path.display());
                return Ok(Connection {
                    bus: Arc::new(client),
                    via_daemon: true,
                });
            }
            Err(e) => log::warn!("Daemon not responding ({e:#}), handling request locally"),
        }
    }

    let handler = local_handler(config, Arc::new(TabRegistry::new()))?;
    Ok(Connection {
        bus: handler,
        via_daemon: false,
    })
}

#[derive(Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn on_off(flag: bool) -> String {
    if flag { "on" } else { "off" }.to_string()
}

fn settings_rows(settings: &Settings, now: u64) -> Vec<SettingRow> {
    let state = BreakState::from_settings(settings);
    let break_value = if state.break_host.is_empty() {
        "none".to_string()
    } else if state.is_active_for(&state.break_host, now) {
        format!(
            "{} ({} left)",
            state.break_host,
            format_remaining(state.break_until, now)
        )
    } else {
        format!("{} (over)", state.break_host)
    };

    let focus_value = if settings.focus_topic.is_empty() {
        "none".to_string()
    } else {
        truncate_str(&settings.focus_topic, 40)
    };

    let blocklist: Vec<&str> = settings.blocklist.iter().map(String::as_str).collect();

    vec![
        SettingRow {
            name: "Enforcement",
            value: on_off(settings.enabled),
        },
        SettingRow {
            name: "Watch pages",
            value: on_off(settings.youtube_enabled),
        },
        SettingRow {
            name: "Overlay after",
            value: format!("{}s", settings.show_after_seconds),
        },
        SettingRow {
            name: "Blocklist",
            value: blocklist.join(", "),
        },
        SettingRow {
            name: "Break",
            value: break_value,
        },
        SettingRow {
            name: "Focus",
            value: focus_value,
        },
    ]
}

pub async fn show_status(data_dir: &Path, config: &OrbConfig) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    println!(
        "Daemon Status: {}",
        if connection.via_daemon {
            "Running"
        } else {
            "Not running"
        }
    );

    let settings: Settings = connection.bus.request(Request::GetSettings).await.data_as()?;
    println!("\n{}", Table::new(settings_rows(&settings, now_ms())));

    if let Some(decision) = settings.last_decision {
        let verdict: Verdict = serde_json::from_value(decision.output).unwrap_or(Verdict {
            allowed: true,
            reason: String::new(),
            score: None,
        });
        println!(
            "\nLast decision: {} ({})",
            if verdict.allowed { "allowed" } else { "blocked" },
            verdict.summary()
        );
    }
    Ok(())
}

pub async fn start_break(
    data_dir: &Path,
    config: &OrbConfig,
    host: &str,
    minutes: f64,
    reason: &str,
) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    let response = connection
        .bus
        .request(Request::StartBreak {
            minutes,
            host: host.to_string(),
            reason: reason.to_string(),
        })
        .await
        .into_result()?;

    let until = response.break_until.unwrap_or_default();
    println!(
        "Break on {} until {} ({} left)",
        response.break_host.unwrap_or_default(),
        chrono::DateTime::from_timestamp_millis(i64::try_from(until).unwrap_or(i64::MAX))
            .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
            .unwrap_or_default(),
        format_remaining(until, now_ms())
    );
    Ok(())
}

pub async fn end_break(data_dir: &Path, config: &OrbConfig) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    connection.bus.request(Request::EndBreak).await.into_result()?;
    println!("Break ended.");
    Ok(())
}

pub async fn set_focus(data_dir: &Path, config: &OrbConfig, topic: &str) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    connection
        .bus
        .request(Request::SetFocus {
            topic: topic.to_string(),
        })
        .await
        .into_result()?;

    let topic = topic.trim();
    if topic.is_empty() {
        println!("Focus cleared.");
    } else {
        println!("Focusing on: {topic}");
    }
    Ok(())
}

/// Payload for `EVAL_WITH_AI` built from command-line fields
pub fn evaluation_payload(url: &str, title: &str, reason: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("url".to_string(), json!(url));
    payload.insert("title".to_string(), json!(title));
    payload.insert("reason".to_string(), json!(reason));
    if let Some(host) = PageSnapshot::new(url).host() {
        payload.insert("host".to_string(), json!(host));
    }
    Value::Object(payload)
}

pub async fn evaluate(
    data_dir: &Path,
    config: &OrbConfig,
    url: &str,
    title: &str,
    reason: &str,
) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    let verdict: Verdict = connection
        .bus
        .request(Request::EvalWithAi {
            payload: evaluation_payload(url, title, reason),
        })
        .await
        .data_as()
        .context("Evaluation failed")?;

    println!("Allowed: {}", if verdict.allowed { "yes" } else { "no" });
    println!("Reason:  {}", verdict.summary());
    if let Some(score) = verdict.score {
        println!("Score:   {score:.2}");
    }
    Ok(())
}

pub async fn chat(data_dir: &Path, config: &OrbConfig, message: &str) -> Result<()> {
    let connection = connect(data_dir, config).await?;
    let reply: ChatReply = connection
        .bus
        .request(Request::Chat {
            payload: json!({ "message": message }),
        })
        .await
        .data_as()
        .context("Chat failed")?;

    println!("{}", reply.reply);
    Ok(())
}

pub async fn check_health(config: &OrbConfig) -> Result<()> {
    let oracle = HttpOracle::new(Some(&config.backend_url), config.request_timeout())?;
    if oracle.is_available().await {
        println!("Backend at {} is reachable.", oracle.base_url());
    } else {
        println!("Backend at {} is not reachable.", oracle.base_url());
    }
    Ok(())
}
