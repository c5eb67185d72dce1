use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use dialoguer::Input;
use tracing_subscriber::EnvFilter;

use nfc_jukebox::device::{DeviceLine, LineReader};
use nfc_jukebox::playback::{PlaybackService, SpotifyAuth, SpotifyClient, extract_auth_code};
use nfc_jukebox::voice::{Microphone, SAMPLE_RATE, rms};
use nfc_jukebox::{Bridge, Config};

/// NFC Jukebox - voice and tag-reader control for Spotify playback
#[derive(Parser)]
#[command(name = "jukebox", version, about)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, env = "JUKEBOX_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice input (for setups without a microphone)
    #[arg(long)]
    disable_voice: bool,

    /// Disable the serial tag reader
    #[arg(long)]
    disable_device: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize with Spotify and store the refresh token
    Authorize,
    /// List Spotify output devices
    Devices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Print lines received from the tag reader
    TestSerial {
        /// Duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins unless verbosity was asked for explicitly
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("info,nfc_jukebox=debug"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

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
    let mut config = Config::load(cli.config.as_deref())?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Authorize => authorize(&config).await,
            Command::Devices => list_devices(&config).await,
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSerial { duration } => test_serial(&config, duration).await,
        };
    }

    if cli.disable_voice {
        tracing::info!("voice explicitly disabled via --disable-voice");
        config.voice.enabled = false;
    }
    if cli.disable_device {
        tracing::info!("device explicitly disabled via --disable-device");
        config.device.enabled = false;
    }

    tracing::debug!(?config, "loaded configuration");

    Bridge::new(config).run().await?;
    Ok(())
}

/// Run the authorization-code flow once and store the refresh token
async fn authorize(config: &Config) -> anyhow::Result<()> {
    let credentials = config.spotify.credentials()?;
    let state = format!("{:x}", chrono::Utc::now().timestamp_micros());
    let url = credentials.authorize_url(&state)?;

    println!("Open this URL in a browser and approve access:\n");
    println!("  {url}\n");
    println!(
        "You will be redirected to {}. Copy the full address from the browser bar.\n",
        credentials.redirect_uri
    );

    let pasted: String = Input::new()
        .with_prompt("Redirected URL (or code)")
        .interact_text()?;

    let code = extract_auth_code(&pasted)
        .ok_or_else(|| anyhow::anyhow!("no authorization code found in input"))?;

    let token = credentials.exchange_code(&code).await?;
    let path = config.token_path();
    token.save(&path)?;

    println!("\nRefresh token saved to {}", path.display());
    Ok(())
}

/// Print the account's output devices
async fn list_devices(config: &Config) -> anyhow::Result<()> {
    let auth = SpotifyAuth::new(config.spotify.credentials()?, config.refresh_token()?);
    let client = SpotifyClient::new(auth);

    let devices = client.devices().await?;
    if devices.is_empty() {
        println!("No active devices found. Please open Spotify on your device.");
        return Ok(());
    }

    let configured = config.spotify.device_name.as_deref();
    for device in devices {
        let marker = if Some(device.name.as_str()) == configured { "*" } else { " " };
        let active = if device.is_active { " (active)" } else { "" };
        println!("{marker} {}{active}  [{}]", device.name, device.id);
    }

    if configured.is_none() {
        println!("\nSet JUKEBOX_DEVICE_NAME to one of the names above.");
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Say a command, e.g. \"arduino pause\"\n");

    let microphone = Microphone::open()?;

    println!("Device: {} ({SAMPLE_RATE} Hz)", microphone.name());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = microphone.drain();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    drop(microphone);

    println!("\n---");
    println!("Speech should push RMS well above 0.03; if it stays near 0,");
    println!("check that the right input device is the system default.");

    Ok(())
}

/// Print classified tag reader lines
async fn test_serial(config: &Config, duration: u64) -> anyhow::Result<()> {
    let settings = config.device.serial.clone();
    let framing = config.device.framing;

    println!(
        "Reading {} at {} baud for {duration} seconds ({framing} framing)...\n",
        settings.port, settings.baud_rate
    );

    let port = settings.open()?;

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut reader = LineReader::new(port);
        let deadline = Instant::now() + Duration::from_secs(duration);

        while Instant::now() < deadline {
            let Some(line) = reader.read_line()? else {
                continue;
            };

            match DeviceLine::parse(&line, framing) {
                DeviceLine::Empty => {}
                DeviceLine::AlbumUri(uri) => println!("album   {uri}"),
                DeviceLine::Volume(volume) => println!("volume  {volume}"),
                DeviceLine::Invalid(reason) => println!("invalid {line:?}: {reason}"),
                DeviceLine::Unknown(text) => println!("other   {text}"),
            }
        }

        Ok(())
    })
    .await??;

    Ok(())
}
