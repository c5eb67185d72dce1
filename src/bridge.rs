//! Bridge - the supervising service
//!
//! Wires the playback client, actuator, throttle and resolver together,
//! starts whichever input sources are available and waits for shutdown.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::actuator::PlaybackActuator;
use crate::command::CommandParser;
use crate::config::ThrottleConfig;
use crate::device::{DeviceInput, spawn_reader};
use crate::playback::{PlaybackService, SpotifyAuth, SpotifyClient};
use crate::resolver::CommandResolver;
use crate::shutdown::Shutdown;
use crate::throttle::VolumeThrottle;
use crate::voice::{VoiceInput, spawn_listener};
use crate::{Config, Error, Result};

/// How long the loops get to finish after shutdown is requested
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Buffered lines between the serial thread and the device loop
const DEVICE_CHANNEL_CAPACITY: usize = 32;

/// Buffered utterances between the capture thread and the voice loop
const VOICE_CHANNEL_CAPACITY: usize = 1;

/// Shared state handed to both input loops
pub struct BridgeContext {
    /// Shutdown flag
    pub shutdown: Shutdown,
    /// Playback actuator
    pub actuator: Arc<PlaybackActuator>,
    /// Volume throttle shared by both loops
    pub throttle: Arc<VolumeThrottle>,
    /// Voice command resolver
    pub resolver: Arc<CommandResolver>,
}

impl BridgeContext {
    /// Build the shared objects around a playback service
    #[must_use]
    pub fn new(
        service: Arc<dyn PlaybackService>,
        device_name: &str,
        wake_word: &str,
        limits: ThrottleConfig,
        shutdown: Shutdown,
    ) -> Self {
        let actuator = Arc::new(PlaybackActuator::new(
            service,
            device_name,
            limits.backoff,
            shutdown.clone(),
        ));
        let throttle = Arc::new(VolumeThrottle::with_limits(
            Arc::clone(&actuator),
            limits.min_interval,
            limits.min_delta,
        ));
        let resolver = Arc::new(CommandResolver::new(
            CommandParser::new(wake_word),
            Arc::clone(&actuator),
            Arc::clone(&throttle),
            shutdown.clone(),
        ));

        Self {
            shutdown,
            actuator,
            throttle,
            resolver,
        }
    }
}

/// The jukebox bridge
pub struct Bridge {
    config: Config,
}

impl Bridge {
    /// Create a bridge from configuration
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until shutdown is requested
    ///
    /// # Errors
    ///
    /// Returns error if required configuration is missing or no input source
    /// could be started
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        let device_name = config.spotify.device_name()?;
        let auth = SpotifyAuth::new(config.spotify.credentials()?, config.refresh_token()?);
        let service: Arc<dyn PlaybackService> = Arc::new(SpotifyClient::new(auth));

        let ctx = BridgeContext::new(
            service,
            device_name,
            &config.voice.wake_word,
            config.throttle,
            Shutdown::new(),
        );

        let mut loops = JoinSet::new();
        let mut threads = Vec::new();

        if config.voice.enabled {
            let transcriber = Arc::new(config.voice.speech_to_text()?);
            let (tx, rx) = mpsc::channel(VOICE_CHANNEL_CAPACITY);

            match spawn_listener(tx, ctx.shutdown.clone()).await {
                Ok(thread) => {
                    threads.push(thread);
                    let voice = VoiceInput::new(transcriber, Arc::clone(&ctx.resolver));
                    let shutdown = ctx.shutdown.clone();
                    loops.spawn(async move { voice.run(rx, shutdown).await });
                }
                Err(e) => tracing::warn!(error = %e, "voice input unavailable"),
            }
        } else {
            tracing::info!("voice input disabled");
        }

        if config.device.enabled {
            match config.device.serial.open() {
                Ok(port) => {
                    let (tx, rx) = mpsc::channel(DEVICE_CHANNEL_CAPACITY);
                    threads.push(spawn_reader(port, tx, ctx.shutdown.clone())?);

                    let device = DeviceInput::new(
                        config.device.framing,
                        Arc::clone(&ctx.actuator),
                        Arc::clone(&ctx.throttle),
                    );
                    let shutdown = ctx.shutdown.clone();
                    loops.spawn(async move { device.run(rx, shutdown).await });
                }
                Err(e) => tracing::warn!(error = %e, "device input unavailable"),
            }
        } else {
            tracing::info!("device input disabled");
        }

        if loops.is_empty() {
            return Err(Error::Config("no input source available".to_string()));
        }

        let signals = ctx.shutdown.listen_for_signals();
        tracing::info!(
            device = device_name,
            wake_word = ctx.resolver.wake_word(),
            "jukebox ready"
        );

        supervise(loops, &ctx.shutdown, SHUTDOWN_GRACE).await;
        join_threads(threads, SHUTDOWN_GRACE).await;
        signals.abort();

        tracing::info!("jukebox stopped");
        Ok(())
    }
}

/// Wait for shutdown, then give the loops `grace` to finish
///
/// Shutdown is also triggered when every loop has ended on its own. Returns
/// `false` if loops had to be aborted after the grace period.
pub async fn supervise(mut loops: JoinSet<()>, shutdown: &Shutdown, grace: Duration) -> bool {
    loop {
        tokio::select! {
            () = shutdown.triggered() => break,
            joined = loops.join_next() => match joined {
                Some(Ok(())) => {}
                Some(Err(e)) => tracing::error!(error = %e, "input loop failed"),
                None => {
                    tracing::info!("all input loops finished");
                    shutdown.trigger();
                    break;
                }
            },
        }
    }

    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "input loop failed");
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(grace_secs = grace.as_secs(), "input loops did not stop in time, aborting");
        loops.abort_all();
        return false;
    }

    true
}

/// Join the hardware threads, giving up after `grace`
///
/// Returns the number of threads that panicked.
async fn join_threads(threads: Vec<JoinHandle<()>>, grace: Duration) -> usize {
    let joined = tokio::task::spawn_blocking(move || {
        let mut panicked = 0;
        for thread in threads {
            let name = thread.thread().name().unwrap_or("unnamed").to_string();
            if thread.join().is_err() {
                tracing::error!(thread = %name, "hardware thread panicked");
                panicked += 1;
            }
        }
        panicked
    });

    match tokio::time::timeout(grace, joined).await {
        Ok(Ok(panicked)) => panicked,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "joining hardware threads failed");
            0
        }
        Err(_) => {
            tracing::warn!("hardware threads did not stop in time");
            0
        }
    }
}
