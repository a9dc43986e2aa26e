//! `AvatarSession` — top-level wiring of transport, audio and animation.
//!
//! ## Lifecycle
//!
//! ```text
//! AvatarSession::new()
//!     └─► connect()        → transport dialing, events flowing
//!         └─► tick(dt)     → called every frame by the host
//!             └─► dispose() → capture stopped, socket closed cleanly
//! ```
//!
//! Everything that touches the rig happens inside `tick` on the caller's
//! thread: network events are queued by the transport task and drained
//! here, so the animation layer never needs a lock.

use rand::{rngs::SmallRng, SeedableRng};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::{
    animation::{AvatarAnimator, LipSync},
    audio::{capture::CapturePipeline, playback::PlaybackScheduler},
    config::SessionConfig,
    dispatch::{resolve_current_motion, Emotion, EmotionTable, MotionMap},
    error::Result,
    events::{ActivityEvent, ConnectionEvent, Speaker, SubtitleEvent},
    net::{ClientMessage, ConnectionState, NetEvent, ServerMessage, TransportSession},
    rig::Rig,
};

/// Broadcast capacity for subtitle events.
const BROADCAST_CAP: usize = 256;

/// Mouth parameters driven when the character declares none of its own.
fn default_mouth_params() -> Vec<String> {
    vec![crate::rig::params::MOUTH_OPEN_Y.to_string()]
}

/// What the avatar is currently doing, fed into motion resolution.
#[derive(Debug, Clone, Copy)]
struct BotState {
    is_user_speaking: bool,
    is_bot_thinking: bool,
    emotion: Emotion,
}

impl BotState {
    fn new() -> Self {
        Self {
            is_user_speaking: false,
            is_bot_thinking: false,
            emotion: Emotion::Neutral,
        }
    }
}

/// One live conversation with the voice-character service.
///
/// Explicitly constructed and explicitly wired — every collaborator comes
/// in through the constructor, nothing is process-global. Not `Send`
/// once playback has opened an output stream; construct and tick on one
/// thread.
pub struct AvatarSession {
    config: SessionConfig,
    rig: Box<dyn Rig>,
    transport: Arc<TransportSession>,
    net_rx: Option<mpsc::Receiver<NetEvent>>,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    animator: AvatarAnimator,
    emotions: EmotionTable,
    motions: MotionMap,
    state: BotState,
    rng: SmallRng,
    subtitle_tx: broadcast::Sender<SubtitleEvent>,
    subtitle_seq: u64,
}

impl AvatarSession {
    /// Wire a session. Does not dial — call `connect()`.
    pub fn new(
        config: SessionConfig,
        rig: Box<dyn Rig>,
        emotions: EmotionTable,
        motions: MotionMap,
    ) -> Result<Self> {
        let transport = Arc::new(TransportSession::new(
            &config.server_url,
            config.reconnect.clone(),
        )?);
        let capture = CapturePipeline::new(config.capture.clone());
        let playback = PlaybackScheduler::new(config.playback.clone());

        let lipsync = match config.lipsync_wav_path.as_deref() {
            Some(path) => LipSync::with_wav(path)?,
            None => LipSync::new(),
        };
        let animator = AvatarAnimator::new(
            rig.as_ref(),
            config.transition_rate,
            &default_mouth_params(),
            lipsync,
        );

        let (subtitle_tx, _) = broadcast::channel(BROADCAST_CAP);

        Ok(Self {
            config,
            rig,
            transport,
            net_rx: None,
            capture,
            playback,
            animator,
            emotions,
            motions,
            state: BotState::new(),
            rng: SmallRng::from_entropy(),
            subtitle_tx,
            subtitle_seq: 0,
        })
    }

    /// Start dialing the service. Duplicate calls are logged no-ops.
    pub fn connect(&mut self) {
        if let Some(rx) = self.transport.initialize() {
            info!(url = %self.config.server_url, "session connecting");
            self.net_rx = Some(rx);
        }
    }

    /// Advance the session by one frame of `dt` seconds.
    ///
    /// Drains queued network events, feeds playback level into lip sync,
    /// runs the animator and keeps an appropriate motion playing.
    pub fn tick(&mut self, dt: f64) {
        self.drain_net_events();

        let lip_external = if self.playback.is_playing() {
            Some(self.playback.rms())
        } else {
            None
        };
        self.animator.tick(dt, self.rig.as_mut(), lip_external);

        if self.rig.motion_finished() {
            let key = resolve_current_motion(
                self.playback.is_playing(),
                self.state.is_user_speaking,
                self.state.is_bot_thinking,
                self.state.emotion,
                &mut self.rng,
            );
            self.motions.play(key, self.rig.as_mut());
        }
    }

    /// Send typed chat input. Dropped silently while not connected.
    pub fn send_text(&self, text: &str) {
        self.transport.send_message(&ClientMessage::TextMessage {
            text: text.to_string(),
        });
    }

    /// Update the drag-follow point from the host's pointer.
    pub fn set_drag(&mut self, x: f32, y: f32) {
        self.animator.set_drag(x, y);
    }

    /// Retune the uplink VAD/noise gate. `None` leaves a field unchanged;
    /// a running capture loop applies the change on its next block.
    pub fn set_filter_config(
        &self,
        vad_threshold: Option<f32>,
        noise_gate: Option<f32>,
        gate_enabled: Option<bool>,
    ) {
        self.capture
            .set_filter_config(vad_threshold, noise_gate, gate_enabled);
    }

    /// Swap in a new character's tables and rig. Transition state from
    /// the old character is dropped instantly — its handles are dead.
    pub fn switch_character(
        &mut self,
        rig: Box<dyn Rig>,
        emotions: EmotionTable,
        motions: MotionMap,
    ) {
        self.animator.transitions_mut().hard_reset();
        let lipsync = match self.config.lipsync_wav_path.as_deref() {
            Some(path) => LipSync::with_wav(path).unwrap_or_else(|_| LipSync::new()),
            None => LipSync::new(),
        };
        self.animator = AvatarAnimator::new(
            rig.as_ref(),
            self.config.transition_rate,
            &default_mouth_params(),
            lipsync,
        );
        self.rig = rig;
        self.emotions = emotions;
        self.motions = motions;
        self.state = BotState::new();
        info!("character switched");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn is_audio_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn subscribe_subtitles(&self) -> broadcast::Receiver<SubtitleEvent> {
        self.subtitle_tx.subscribe()
    }

    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.transport.subscribe_connection()
    }

    pub fn subscribe_activity(&self) -> broadcast::Receiver<ActivityEvent> {
        self.capture.subscribe_activity()
    }

    /// Stop capture, close the socket cleanly and drop playback. Safe to
    /// call twice.
    pub fn dispose(&mut self) {
        self.capture.stop();
        self.transport.dispose();
        self.playback.dispose();
        info!("session disposed");
    }

    // ── Internal ────────────────────────────────────────────────────────

    fn drain_net_events(&mut self) {
        loop {
            // Re-borrow per iteration so handlers below can take &mut self.
            let Some(rx) = self.net_rx.as_mut() else {
                return;
            };
            let event = match rx.try_recv() {
                Ok(ev) => ev,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.net_rx = None;
                    break;
                }
            };
            match event {
                NetEvent::Connected => {
                    debug!("transport open");
                }
                NetEvent::Message(msg) => self.handle_server_message(msg),
                NetEvent::Audio(buf) => self.playback.handle_received_audio(&buf),
                NetEvent::Disconnected => {
                    // Uplink frames drop silently until the transport
                    // reconnects; capture keeps running.
                    debug!("transport lost");
                }
                NetEvent::Exhausted => {
                    error!("reconnect budget spent, stopping uplink");
                    self.capture.stop();
                }
            }
        }
    }

    fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::ServerReady => {
                info!("server ready");
                self.start_uplink();
            }
            ServerMessage::Subtitle { text } => {
                self.emit_subtitle(Speaker::Avatar, text, false);
            }
            ServerMessage::UserSubtitleChunk { text } => {
                self.state.is_user_speaking = true;
                self.emit_subtitle(Speaker::User, text, false);
            }
            ServerMessage::UserSubtitleComplete { text } => {
                self.state.is_user_speaking = false;
                self.state.is_bot_thinking = true;
                self.emit_subtitle(Speaker::User, text, true);
            }
            ServerMessage::TurnComplete => {
                self.state.is_bot_thinking = false;
            }
            ServerMessage::Emotion { emotion } => {
                self.state.emotion = Emotion::from_name(&emotion);
                self.emotions.apply(
                    &emotion,
                    self.animator.transitions_mut(),
                    self.rig.as_ref(),
                );
            }
            ServerMessage::Interrupted => {
                info!("interrupted, flushing playback");
                self.playback.dispose();
                self.state.is_bot_thinking = false;
            }
            ServerMessage::Error { message } => {
                error!(message = %message, "server reported an error");
            }
            ServerMessage::Unknown => {
                debug!("ignoring unknown server message");
            }
        }
    }

    /// Open the microphone and forward gated frames to the socket. Never
    /// waits on the device — the open confirmation is awaited off-thread
    /// so `tick` keeps its frame budget.
    fn start_uplink(&mut self) {
        if self.capture.is_running() {
            return;
        }
        match self.capture.start() {
            Ok((mut frame_rx, open_rx)) => {
                let transport = Arc::clone(&self.transport);
                tokio::spawn(async move {
                    while let Some(frame) = frame_rx.recv().await {
                        transport.send_binary(frame);
                    }
                    debug!("uplink forwarder finished");
                });
                tokio::spawn(async move {
                    // The session stays useful for playback and text chat
                    // when the mic cannot open.
                    match open_rx.await {
                        Ok(Ok(rate)) => info!(capture_rate = rate, "microphone open"),
                        Ok(Err(e)) => error!("microphone unavailable: {e}"),
                        Err(_) => error!("capture task died before confirming device open"),
                    }
                });
            }
            Err(e) => {
                error!("capture start rejected: {e}");
            }
        }
    }

    fn emit_subtitle(&mut self, speaker: Speaker, text: String, complete: bool) {
        let event = SubtitleEvent {
            seq: self.subtitle_seq,
            speaker,
            text,
            complete,
        };
        self.subtitle_seq += 1;
        let _ = self.subtitle_tx.send(event);
    }
}

impl Drop for AvatarSession {
    fn drop(&mut self) {
        self.capture.stop();
        self.transport.dispose();
    }
}
