//! Vultus console host.
//!
//! Runs an [`AvatarSession`] against a console rig: microphone uplink,
//! playback and the full animation loop, with subtitles and typed chat on
//! stdin. A renderer embeds `vultus-core` the same way and swaps in its
//! own [`Rig`](vultus_core::Rig).

mod console_rig;
mod settings;

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use console_rig::ConsoleRig;
use settings::{default_settings_path, load_settings};
use tokio::sync::mpsc;
use tracing::{info, warn};
use vultus_core::dispatch::{EmotionTable, MotionMap};
use vultus_core::{AvatarSession, ConnectionState, Speaker};

/// Animation frame period, roughly 30 fps.
const TICK: Duration = Duration::from_millis(33);

fn load_emotion_table(path: Option<&Path>) -> EmotionTable {
    let Some(path) = path else {
        return EmotionTable::default();
    };
    match fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|raw| {
        EmotionTable::from_json(&raw).context("parse emotion table")
    }) {
        Ok(table) => table,
        Err(e) => {
            warn!(path = %path.display(), "emotion table unusable, continuing without: {e}");
            EmotionTable::default()
        }
    }
}

fn load_motion_map(path: Option<&Path>) -> MotionMap {
    let Some(path) = path else {
        return MotionMap::default();
    };
    match fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|raw| {
        MotionMap::from_json(&raw).context("parse motion map")
    }) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), "motion map unusable, continuing without: {e}");
            MotionMap::default()
        }
    }
}

/// Forward stdin lines over a channel so the main loop can select on them.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() && tx.blocking_send(trimmed.to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vultus=info".parse().unwrap()),
        )
        .init();

    info!("Vultus starting");

    let settings_path = default_settings_path();
    let app_settings = load_settings(&settings_path);
    info!(
        settings_path = ?settings_path,
        server_url = %app_settings.server_url,
        "runtime settings loaded"
    );

    let emotions = load_emotion_table(app_settings.emotion_table_path.as_deref());
    let motions = load_motion_map(app_settings.motion_map_path.as_deref());

    let mut session = AvatarSession::new(
        app_settings.session_config(),
        Box::new(ConsoleRig::new()),
        emotions,
        motions,
    )
    .context("wire session")?;

    // Subtitles and capture activity go to the log; a GUI host renders them.
    let mut subtitles = session.subscribe_subtitles();
    tokio::spawn(async move {
        while let Ok(event) = subtitles.recv().await {
            let who = match event.speaker {
                Speaker::Avatar => "avatar",
                Speaker::User => "you",
            };
            if event.complete {
                info!(target: "vultus::subtitles", "[{who}] {}", event.text);
            }
        }
    });
    let mut connection = session.subscribe_connection();
    tokio::spawn(async move {
        while let Ok(event) = connection.recv().await {
            match event.detail {
                Some(detail) => {
                    info!(target: "vultus::connection", state = ?event.state, detail = %detail)
                }
                None => info!(target: "vultus::connection", state = ?event.state),
            }
        }
    });

    session.connect();

    let mut stdin_rx = spawn_stdin_reader();
    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_tick = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64();
                last_tick = now;
                session.tick(dt);

                if session.connection_state() == ConnectionState::Exhausted {
                    warn!("connection exhausted, exiting");
                    break;
                }
            }
            line = stdin_rx.recv() => {
                match line {
                    Some(text) => session.send_text(&text),
                    None => break,
                }
            }
            _ = &mut ctrl_c => {
                info!("interrupt received");
                break;
            }
        }
    }

    session.dispose();
    info!("Vultus stopped");
    Ok(())
}
