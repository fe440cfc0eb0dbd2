use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use jarvix::agent::SpeechSink;
use jarvix::daemon::{build_conversation, build_speech_output};
use jarvix::home::HomeClient;
use jarvix::voice::{AudioCapture, AudioPlayback, sine_tone};
use jarvix::{Config, Daemon};

/// Jarvix - voice assistant with smart home control
#[derive(Parser)]
#[command(name = "jarvix", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (text chat only)
    #[arg(long, env = "JARVIX_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat over stdin instead of the microphone
    Chat {
        /// Speak replies through TTS as well
        #[arg(long)]
        speak: bool,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Exchange a Home Assistant authorization code for tokens
    HomeLogin {
        /// Authorization code from the Home Assistant login redirect
        #[arg(long)]
        code: String,
    },
    /// List Home Assistant entities
    Entities {
        /// Only show entities in this domain (e.g. "light")
        #[arg(long)]
        domain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,jarvix=info",
        1 => "info,jarvix=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Chat { speak } => chat(speak).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::HomeLogin { code } => home_login(&code).await,
            Command::Entities { domain } => list_entities(domain.as_deref()).await,
        };
    }

    let config = Config::load_with_options(cli.disable_voice)?;
    tracing::debug!(backend = %config.backend, home = config.home.is_some(), "loaded configuration");

    Daemon::new(config).run().await?;
    Ok(())
}

/// Text conversation loop over stdin
#[allow(clippy::future_not_send)]
async fn chat(speak: bool) -> anyhow::Result<()> {
    let config = Config::load_with_options(!speak)?;
    let mut conversation = build_conversation(&config).await?;
    let mut speech = if speak {
        Some(build_speech_output(&config)?)
    } else {
        None
    };

    println!("Chatting with {} ({}). Ctrl-D to quit.\n", config.backend, conversation.backend().model());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        let report = match speech.as_mut() {
            Some(output) => conversation.run_turn(text, output).await?,
            None => conversation.respond(text).await,
        };
        println!("jarvix> {}\n", report.reply);
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Sample rate: {} Hz", jarvix::voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = jarvix::voice::rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
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

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;
    let samples = sine_tone(440.0, Duration::from_secs(2), 0.3);

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        jarvix::voice::PLAYBACK_SAMPLE_RATE
    );
    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Test TTS output
#[allow(clippy::future_not_send)]
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let mut speech = build_speech_output(&config)?;

    println!("Synthesizing and playing speech...");
    speech.speak(text).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Exchange a Home Assistant authorization code for tokens
async fn home_login(code: &str) -> anyhow::Result<()> {
    let config = Config::load_with_options(true)?;
    let home = config
        .home
        .context("Home Assistant is not configured (set IS_HA_CONFIGURED=true and HA_URL)")?;

    let client = HomeClient::new(&home)?;
    let tokens = client.exchange_auth_code(code).await?;

    println!("Access token (expires in {}s):\n  {}", tokens.expires_in, tokens.access_token);
    match tokens.refresh_token {
        Some(refresh) => {
            println!("\nRefresh token:\n  {refresh}");
            println!("\nStore it as HA_REFRESH_TOKEN or [home].refresh_token in the config file.");
        }
        None => println!("\nNo refresh token was returned."),
    }

    Ok(())
}

/// List the current entity snapshot
async fn list_entities(domain: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load_with_options(true)?;
    let home = config
        .home
        .context("Home Assistant is not configured (set HA_TOKEN or HA_REFRESH_TOKEN)")?;

    let client = HomeClient::new(&home)?;
    client.ensure_running().await?;

    let mut entities = client.fetch_entities().await?;
    entities.retain(|e| domain.is_none_or(|d| e.domain() == d));
    entities.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

    for entity in &entities {
        println!("{:<40} {:<12} {}", entity.entity_id, entity.state, entity.display_name());
    }
    println!("\n{} entities", entities.len());

    Ok(())
}
