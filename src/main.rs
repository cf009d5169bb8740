use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_satellite::console;
use beacon_satellite::voice::{
    AudioCapture, AudioPlayback, Player, WakeChannel, load_chime, rms_energy,
};
use beacon_satellite::{
    Config, ConversationLog, HttpBackend, Inputs, JsonFileLog, MemoryLog, Satellite, TurnEvent,
};

/// Beacon Satellite - voice front end for a conversational assistant
#[derive(Parser)]
#[command(name = "satellite", version, about)]
struct Cli {
    /// Conversation backend base URL
    #[arg(long, env = "SATELLITE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Wake word WebSocket URL
    #[arg(long, env = "SATELLITE_WAKE_URL")]
    wake_url: Option<String>,

    /// Don't connect to the wake word server (typed input and /listen only)
    #[arg(long)]
    no_wake: bool,

    /// Keep the conversation log in memory only
    #[arg(long)]
    no_history: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output with the chime and a tone
    TestSpeaker,
    /// Send one typed turn, play the reply, and exit
    Say {
        /// Text to send
        text: String,
    },
    /// Print the conversation log
    History,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_satellite=info",
        1 => "info,beacon_satellite=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if let Some(url) = cli.backend_url {
        config.backend.url = url;
    }
    if let Some(url) = cli.wake_url {
        config.wake.url = url;
    }
    if cli.no_wake {
        config.wake.enabled = false;
    }
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(&config, duration).await,
            Command::TestSpeaker => test_speaker(&config).await,
            Command::Say { text } => {
                if cli.no_history {
                    say(&config, MemoryLog::new(), text).await
                } else {
                    say(&config, JsonFileLog::new(config.history_path()), text).await
                }
            }
            Command::History => history(&config),
        };
    }

    if cli.no_history {
        run_satellite(&config, MemoryLog::new()).await
    } else {
        run_satellite(&config, JsonFileLog::new(config.history_path())).await
    }
}

/// Run the satellite until interrupted
#[allow(clippy::future_not_send)]
async fn run_satellite<L: ConversationLog>(config: &Config, log: L) -> anyhow::Result<()> {
    tracing::info!(
        backend = %config.backend.url,
        wake = %config.wake.url,
        wake_enabled = config.wake.enabled,
        "starting satellite"
    );

    let backend = HttpBackend::new(&config.backend)?;
    let chime = load_chime(config.chime_path.as_deref())?;

    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    console::spawn_notice_printer(notices_rx);

    let satellite = Satellite::new(config, backend, AudioPlayback::new(), log, chime)
        .with_notices(notices_tx);

    let mut capture = AudioCapture::new(config.capture);
    let streams = match capture.start() {
        Ok(streams) => Some(streams),
        Err(e) => {
            tracing::warn!(error = %e, "microphone unavailable, typed input only");
            None
        }
    };

    let (activations_tx, activations_rx) = mpsc::unbounded_channel();
    let wake = if config.wake.enabled && streams.is_some() {
        match WakeChannel::connect(&config.wake.url, activations_tx).await {
            Ok(wake) => Some(wake),
            Err(e) => {
                tracing::warn!(error = %e, url = %config.wake.url, "wake word server unavailable");
                None
            }
        }
    } else {
        None
    };

    let inputs = Inputs {
        activations: wake.is_some().then_some(activations_rx),
        capture: streams,
        wake,
        commands: Some(console::spawn_stdin_reader()),
    };

    if inputs.wake.is_some() {
        println!("Say \"hey neon\" or type a message. /listen toggles listening, /quit exits.");
    } else {
        println!("Type a message. /listen toggles listening, /quit exits.");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    satellite.run(inputs, shutdown).await;

    capture.stop();
    Ok(())
}

/// Send one typed turn and wait for its reply to finish playing
async fn say<L: ConversationLog>(config: &Config, log: L, text: String) -> anyhow::Result<()> {
    let backend = HttpBackend::new(&config.backend)?;
    let (notices_tx, mut notices_rx) = mpsc::unbounded_channel();

    let mut satellite = Satellite::new(config, backend, AudioPlayback::new(), log, Vec::new())
        .with_notices(notices_tx);

    satellite.handle_event(TurnEvent::TypedText(text));
    while satellite.state().turn().is_some() {
        if !satellite.process_next().await {
            break;
        }
    }

    while let Ok(notice) = notices_rx.try_recv() {
        if let Some(line) = console::render_notice(&notice) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Print the conversation log
fn history(config: &Config) -> anyhow::Result<()> {
    let log = JsonFileLog::new(config.history_path());
    let entries = log.entries()?;

    if entries.is_empty() {
        println!("No conversation yet ({})", log.path().display());
        return Ok(());
    }

    for entry in &entries {
        println!("{}", console::render_entry(entry));
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(config: &Config, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(config.capture);
    let mut streams = capture.start()?;
    let threshold = config.vad.energy_threshold;

    println!("Sample rate: {} Hz", streams.sample_rate);
    println!("---");

    for i in 0..duration {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        let mut window = Vec::new();
        while let Ok(Some(block)) = tokio::time::timeout_at(deadline, streams.samples.recv()).await
        {
            window.extend(block);
        }

        let mut frames = 0;
        while streams.frames.try_recv().is_ok() {
            frames += 1;
        }

        let energy = rms_energy(&window);
        let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let speech = if energy > threshold { "speech" } else { "" };

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | frames: {frames:2} | [{meter}] {speech}",
            i + 1,
            energy,
            peak,
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    Ok(())
}

/// Test speaker output with the chime and a sine wave
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");

    let playback = AudioPlayback::new();

    println!("Playing the acknowledgment chime");
    playback
        .play(load_chime(config.chime_path.as_deref())?)
        .finished()
        .await?;

    println!("You should hear a 440Hz tone for 2 seconds\n");

    // Generate 2 seconds of 440Hz sine wave at 24kHz sample rate
    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    playback.play_samples(samples, sample_rate).finished().await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    Ok(())
}
