//! Satellite runtime tests with a scripted backend and a silent player

mod common;

use std::time::Duration;

use beacon_satellite::codec::decode_base64;
use beacon_satellite::config::DEFAULT_ACTIVATION_LABEL;
use beacon_satellite::voice::{ActivationEvent, Player, synthesized_chime};
use beacon_satellite::{
    Backend, Config, ConversationLog, LogEntry, MemoryLog, Notice, Satellite, TurnEvent,
    TurnInput, TurnReply, TurnReport, TurnState,
};
use common::{FakeBackend, FakePlayer, reply_audio, silence, tone};
use tokio::sync::mpsc;

fn satellite(
    backend: &FakeBackend,
    player: &FakePlayer,
) -> Satellite<FakeBackend, FakePlayer, MemoryLog> {
    Satellite::new(
        &Config::default(),
        backend.clone(),
        player.clone(),
        MemoryLog::new(),
        synthesized_chime().unwrap(),
    )
}

async fn step<B: Backend, P: Player, L: ConversationLog>(sat: &mut Satellite<B, P, L>) {
    let handled = tokio::time::timeout(Duration::from_secs(5), sat.process_next())
        .await
        .expect("event in time");
    assert!(handled);
}

#[tokio::test]
async fn test_typed_turn_round_trip() {
    let backend = FakeBackend::default();
    backend.reply(TurnReply {
        transcription: "hi there".to_string(),
        audio_output: Some(reply_audio()),
        ..TurnReply::default()
    });
    let player = FakePlayer::default();
    let mut sat = satellite(&backend, &player);

    sat.handle_event(TurnEvent::TypedText("hello".to_string()));
    assert!(matches!(sat.state(), TurnState::Pending { spoken: false, .. }));

    step(&mut sat).await;
    assert!(matches!(sat.state(), TurnState::Playing(_)));
    assert_eq!(backend.received(), vec![TurnInput::Text("hello".to_string())]);
    assert_eq!(
        sat.log().entries().unwrap(),
        vec![LogEntry::user("hello"), LogEntry::ai("hi there")]
    );
    assert_eq!(player.played(), vec![decode_base64(&reply_audio()).unwrap()]);

    step(&mut sat).await;
    assert_eq!(sat.state(), TurnState::Idle);
    assert!(!sat.is_vad_running());
}

#[tokio::test]
async fn test_request_failure_returns_to_idle() {
    let backend = FakeBackend::default();
    backend.fail("connection refused");
    let player = FakePlayer::default();
    let (tx, mut notices) = mpsc::unbounded_channel();
    let mut sat = satellite(&backend, &player).with_notices(tx);

    sat.handle_event(TurnEvent::TypedText("hello".to_string()));
    step(&mut sat).await;

    assert_eq!(sat.state(), TurnState::Idle);
    assert!(player.played().is_empty());
    // Only the typed line was logged
    assert_eq!(sat.log().entries().unwrap(), vec![LogEntry::user("hello")]);

    let mut reports = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        if let Notice::Report(report) = notice {
            reports.push(report);
        }
    }
    assert!(matches!(
        reports.as_slice(),
        [TurnReport::RequestFailed { error }] if error.contains("connection refused")
    ));
}

#[tokio::test]
async fn test_typed_text_while_pending_is_rejected() {
    let backend = FakeBackend::default();
    backend.reply(TurnReply {
        transcription: "first".to_string(),
        ..TurnReply::default()
    });
    let player = FakePlayer::default();
    let (tx, mut notices) = mpsc::unbounded_channel();
    let mut sat = satellite(&backend, &player).with_notices(tx);

    sat.handle_event(TurnEvent::TypedText("one".to_string()));
    sat.handle_event(TurnEvent::TypedText("two".to_string()));

    let busy = std::iter::from_fn(|| notices.try_recv().ok())
        .any(|n| n == Notice::Report(TurnReport::Busy { text: "two".to_string() }));
    assert!(busy);

    step(&mut sat).await;
    // Text-only reply settles right away
    assert_eq!(sat.state(), TurnState::Idle);
    assert_eq!(backend.received(), vec![TurnInput::Text("one".to_string())]);
    assert!(player.played().is_empty());
}

#[tokio::test]
async fn test_spoken_turn() {
    let backend = FakeBackend::default();
    backend.reply(TurnReply {
        transcription: "it is sunny".to_string(),
        utterance: Some("what's the weather".to_string()),
        audio_output: Some(reply_audio()),
        ..TurnReply::default()
    });
    let player = FakePlayer::default();
    let mut sat = satellite(&backend, &player);

    sat.handle_event(TurnEvent::Activation(ActivationEvent::new([
        DEFAULT_ACTIVATION_LABEL,
    ])));
    assert!(matches!(sat.state(), TurnState::Acknowledging(_)));
    assert!(!sat.is_vad_running());

    // Chime completes
    step(&mut sat).await;
    assert_eq!(sat.state(), TurnState::Armed);
    assert!(sat.is_vad_running());
    assert_eq!(player.played().len(), 1);

    let rate = 16000;
    let speech = tone(300.0, 0.6, 0.5, rate);
    for block in speech.chunks(1600) {
        sat.feed_audio(block, rate);
    }
    let quiet = silence(1.0, rate);
    for block in quiet.chunks(1600) {
        sat.feed_audio(block, rate);
    }

    // Utterance closes and is sent
    step(&mut sat).await;
    assert!(matches!(sat.state(), TurnState::Pending { spoken: true, .. }));
    assert!(!sat.is_vad_running());

    step(&mut sat).await;
    assert!(matches!(sat.state(), TurnState::Playing(_)));
    let received = backend.received();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_audio());
    assert_eq!(
        sat.log().entries().unwrap(),
        vec![
            LogEntry::user("what's the weather"),
            LogEntry::ai("it is sunny")
        ]
    );

    step(&mut sat).await;
    assert_eq!(sat.state(), TurnState::Idle);
    assert_eq!(player.played().len(), 2);
}

#[tokio::test]
async fn test_run_quits_on_command() {
    let backend = FakeBackend::default();
    let player = FakePlayer::default();
    let sat = satellite(&backend, &player);

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(beacon_satellite::console::UserCommand::Quit).unwrap();

    let inputs = beacon_satellite::Inputs {
        commands: Some(rx),
        ..Default::default()
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        sat.run(inputs, std::future::pending()),
    )
    .await
    .expect("run returns after quit");
}
