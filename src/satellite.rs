//! Satellite runtime
//!
//! Owns the turn controller and the channels around it. Every input, from
//! wake activations to backend replies, is funnelled into one loop so state
//! transitions never interleave. Slow work (requests, playback) runs in
//! spawned tasks that post exactly one completion event back.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::backend::{Backend, TurnInput};
use crate::config::Config;
use crate::console::UserCommand;
use crate::history::{ConversationLog, LogEntry};
use crate::turn::{Action, ChimeId, TurnController, TurnEvent, TurnId, TurnReport, TurnState};
use crate::voice::{
    ActivationEvent, AudioFrame, CaptureStreams, Player, StopHandle, Utterance, VadChannel,
    WakeChannel,
};

/// Something the front end may want to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A line was added to the conversation log
    Log(LogEntry),
    /// A turn hit a problem
    Report(TurnReport),
    /// The turn state changed
    State(TurnState),
}

/// External sources feeding a running satellite; any may be absent
#[derive(Default)]
pub struct Inputs {
    /// Microphone streams
    pub capture: Option<CaptureStreams>,
    /// Wake word connection the captured frames go to
    pub wake: Option<WakeChannel>,
    /// Activations reported by the wake connection
    pub activations: Option<mpsc::UnboundedReceiver<ActivationEvent>>,
    /// Terminal commands
    pub commands: Option<mpsc::UnboundedReceiver<UserCommand>>,
}

enum Input {
    Shutdown,
    Event(TurnEvent),
    Activation(Option<ActivationEvent>),
    Frame(Option<AudioFrame>),
    Samples(Option<Vec<f32>>),
    Command(Option<UserCommand>),
}

/// The voice satellite
pub struct Satellite<B, P, L> {
    controller: TurnController,
    vad: VadChannel,
    backend: Arc<B>,
    player: Arc<P>,
    log: L,
    chime: Vec<u8>,
    events_tx: mpsc::UnboundedSender<TurnEvent>,
    events_rx: mpsc::UnboundedReceiver<TurnEvent>,
    utterances_rx: mpsc::UnboundedReceiver<Utterance>,
    reply_stop: Option<StopHandle>,
    notices: Option<mpsc::UnboundedSender<Notice>>,
}

impl<B, P, L> Satellite<B, P, L>
where
    B: Backend,
    P: Player,
    L: ConversationLog,
{
    /// Assemble a satellite from its collaborators
    #[must_use]
    pub fn new(config: &Config, backend: B, player: P, log: L, chime: Vec<u8>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (utterances_tx, utterances_rx) = mpsc::unbounded_channel();

        Self {
            controller: TurnController::from_config(&config.wake),
            vad: VadChannel::new(config.vad, utterances_tx),
            backend: Arc::new(backend),
            player: Arc::new(player),
            log,
            chime,
            events_tx,
            events_rx,
            utterances_rx,
            reply_stop: None,
            notices: None,
        }
    }

    /// Send notices for the front end to `notices`
    #[must_use]
    pub fn with_notices(mut self, notices: mpsc::UnboundedSender<Notice>) -> Self {
        self.notices = Some(notices);
        self
    }

    /// Current turn state
    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.controller.state()
    }

    /// Whether continuous listening is on
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.controller.is_listening()
    }

    /// Whether the VAD is armed
    #[must_use]
    pub const fn is_vad_running(&self) -> bool {
        self.vad.is_running()
    }

    /// The conversation log
    #[must_use]
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Feed one event through the controller and execute its actions
    pub fn handle_event(&mut self, event: TurnEvent) {
        let before = self.controller.state();
        let actions = self.controller.handle(event, Instant::now());
        for action in actions {
            self.apply(action);
        }

        let after = self.controller.state();
        if before != after {
            self.notify(Notice::State(after));
        }
    }

    /// Feed captured microphone samples to the VAD
    pub fn feed_audio(&mut self, samples: &[f32], sample_rate: u32) {
        self.vad.feed(samples, sample_rate);
    }

    /// Wait for the next internal completion or utterance and handle it
    ///
    /// Returns false once nothing can arrive any more.
    pub async fn process_next(&mut self) -> bool {
        let event = tokio::select! {
            Some(event) = self.events_rx.recv() => event,
            Some(utterance) = self.utterances_rx.recv() => TurnEvent::Utterance(utterance),
            else => return false,
        };
        self.handle_event(event);
        true
    }

    /// Run until `shutdown` resolves or the user quits
    pub async fn run(mut self, inputs: Inputs, shutdown: impl Future<Output = ()>) {
        let Inputs {
            capture,
            mut wake,
            activations,
            commands,
        } = inputs;

        let (sample_rate, mut frames, mut samples) = match capture {
            Some(streams) => (streams.sample_rate, Some(streams.frames), Some(streams.samples)),
            None => (0, None, None),
        };
        let mut activations = activations;
        let mut commands = commands;

        if let Some(wake) = wake.as_mut()
            && sample_rate > 0
        {
            wake.send_sample_rate(sample_rate);
        }

        tokio::pin!(shutdown);
        tracing::info!("satellite running");

        loop {
            let input = tokio::select! {
                () = &mut shutdown => Input::Shutdown,
                Some(event) = self.events_rx.recv() => Input::Event(event),
                Some(utterance) = self.utterances_rx.recv() => {
                    Input::Event(TurnEvent::Utterance(utterance))
                }
                msg = recv_opt(&mut activations), if activations.is_some() => Input::Activation(msg),
                msg = recv_opt(&mut frames), if frames.is_some() => Input::Frame(msg),
                msg = recv_opt(&mut samples), if samples.is_some() => Input::Samples(msg),
                msg = recv_opt(&mut commands), if commands.is_some() => Input::Command(msg),
            };

            match input {
                Input::Shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Input::Event(event) => self.handle_event(event),
                Input::Activation(Some(activation)) => {
                    self.handle_event(TurnEvent::Activation(activation));
                }
                Input::Activation(None) => {
                    tracing::warn!("wake word connection lost");
                    activations = None;
                }
                Input::Frame(Some(frame)) => {
                    if let Some(wake) = wake.as_mut() {
                        wake.send_frame(&frame);
                    }
                }
                Input::Frame(None) => frames = None,
                Input::Samples(Some(block)) => self.feed_audio(&block, sample_rate),
                Input::Samples(None) => {
                    tracing::warn!("microphone stream ended");
                    samples = None;
                }
                Input::Command(Some(UserCommand::Quit)) => break,
                Input::Command(Some(command)) => self.command(command),
                Input::Command(None) => commands = None,
            }
        }

        if let Some(stop) = self.reply_stop.take() {
            stop.stop();
        }
        tracing::info!("satellite stopped");
    }

    fn command(&mut self, command: UserCommand) {
        let event = match command {
            UserCommand::Say(text) => TurnEvent::TypedText(text),
            UserCommand::ToggleListening => TurnEvent::SetListening(!self.controller.is_listening()),
            UserCommand::Listen(on) => TurnEvent::SetListening(on),
            UserCommand::Quit => return,
        };
        self.handle_event(event);
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::PlayChime(chime) => self.play_chime(chime),
            Action::StartVad => self.vad.start(),
            Action::PauseVad => self.vad.pause(),
            Action::SendTurn { turn, input } => self.send_turn(turn, input),
            Action::AppendLog(entry) => {
                if let Err(e) = self.log.append(entry.clone()) {
                    tracing::warn!(error = %e, "failed to write conversation log");
                }
                self.notify(Notice::Log(entry));
            }
            Action::PlayReply { turn, wav } => self.play_reply(turn, wav),
            Action::StopPlayback => {
                if let Some(stop) = self.reply_stop.take() {
                    stop.stop();
                }
            }
            Action::Report(report) => {
                tracing::warn!(%report, "turn problem");
                self.notify(Notice::Report(report));
            }
        }
    }

    fn send_turn(&self, turn: TurnId, input: TurnInput) {
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let event = match backend.converse(input).await {
                Ok(reply) => TurnEvent::ReplyReceived { turn, reply },
                Err(e) => TurnEvent::RequestFailed {
                    turn,
                    error: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn play_chime(&self, chime: ChimeId) {
        let playback = self.player.play(self.chime.clone());
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let error = playback.finished().await.err().map(|e| e.to_string());
            let _ = events.send(TurnEvent::ChimeFinished { chime, error });
        });
    }

    fn play_reply(&mut self, turn: TurnId, wav: Vec<u8>) {
        let playback = self.player.play(wav);
        self.reply_stop = Some(playback.stopper());
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let error = playback.finished().await.err().map(|e| e.to_string());
            let _ = events.send(TurnEvent::PlaybackFinished { turn, error });
        });
    }

    fn notify(&self, notice: Notice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }
}

/// Receive from an optional channel; absent channels never yield
async fn recv_opt<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
