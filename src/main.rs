use anyhow::Result;
use clap::Parser;
use owo_colors::OwoColorize;
use std::sync::Arc;
use streamscribe::cli::{Cli, Commands};
use streamscribe::config::Config;
use streamscribe::server::Server;
use streamscribe::stt::transcriber::Transcriber;
use streamscribe::stt::whisper::{WhisperConfig, WhisperTranscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        None | Some(Commands::Serve) => {
            run_serve(config, cli.quiet, cli.verbose).await?;
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Listen { device }) => {
            run_listen(config, device, cli.quiet).await?;
        }
        Some(Commands::Check) => {
            run_check(&config);
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/streamscribe/config.toml)
/// 3. Built-in defaults
/// Environment variables override the file; CLI flags override everything.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(path) = cli.config.as_deref() {
        Config::load(path)?
    } else {
        match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        }
    }
    .with_env_overrides();

    if let Some(model) = &cli.model {
        config.stt.model_path = model.clone();
    }
    if let Some(language) = &cli.language {
        config.stt.language = language.clone();
    }
    if let Some(bind) = &cli.bind {
        config.server.bind_addr = bind.clone();
    }
    config.validate()?;

    Ok(config)
}

fn build_transcriber(config: &Config) -> Result<Arc<dyn Transcriber>> {
    let transcriber = WhisperTranscriber::new(WhisperConfig {
        model_path: config.stt.model_path.clone(),
        language: config.stt.language.clone(),
        threads: config.stt.threads,
        no_speech_threshold: streamscribe::defaults::NO_SPEECH_THRESHOLD,
    })?;
    Ok(Arc::new(transcriber))
}

/// Run the WebSocket transcription server until SIGINT/SIGTERM.
async fn run_serve(config: Config, quiet: bool, verbose: u8) -> Result<()> {
    if !quiet {
        eprintln!(
            "Loading model from {}...",
            config.stt.model_path.display()
        );
    }
    let transcriber = match build_transcriber(&config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    };
    if !quiet {
        eprintln!("Model '{}' loaded.", transcriber.model_name());
    }

    // Per-session connect/close lines only at -v
    let server = Arc::new(Server::bind(&config, transcriber, quiet || verbose == 0).await?);
    if !quiet {
        eprintln!("Listening on ws://{}", server.local_addr());
        eprintln!("Server ready.");
    }

    let server_clone = Arc::clone(&server);
    let server_handle = tokio::spawn(async move { server_clone.run().await });

    wait_for_shutdown_signal(quiet).await;

    server.stop().await;
    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => eprintln!("{}", format!("Server error: {}", e).red()),
        Err(e) => eprintln!("streamscribe: server task failed: {e}"),
    }

    if !quiet {
        eprintln!("Server stopped.");
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown_signal(quiet: bool) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nReceived SIGINT, shutting down...");
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                eprintln!("Error setting up signal handler: {}", e);
            }
            if !quiet {
                eprintln!("\nReceived SIGTERM, shutting down...");
            }
        }
    }
}

/// Wait for SIGTERM signal (used by systemd).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = streamscribe::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    eprintln!("Audio capture not available: built without the cpal-audio feature");
    std::process::exit(1);
}

/// Capture from the microphone and print transcriptions to stdout.
#[cfg(feature = "cpal-audio")]
async fn run_listen(config: Config, device: Option<String>, quiet: bool) -> Result<()> {
    use streamscribe::audio::capture::CpalAudioSource;
    use streamscribe::live::{LiveSettings, run_live};
    use streamscribe::session::dispatcher::DispatchUpdate;
    use tokio::sync::{mpsc, watch};

    let transcriber = match build_transcriber(&config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    };

    let device_name = device.or_else(|| config.capture.device.clone());
    let source = CpalAudioSource::new(device_name.as_deref())?;
    let settings = LiveSettings::from_config(&config);

    if !quiet {
        eprintln!("Listening... (Ctrl+C to stop)");
    }

    let (updates_tx, mut updates_rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);

    let printer = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            match update {
                DispatchUpdate::Transcribed { text, .. } => println!("{}", text),
                DispatchUpdate::Silence { .. } => {}
                DispatchUpdate::Failed { message, .. } => {
                    eprintln!("{}", format!("Error: {}", message).red());
                }
            }
        }
    });

    let loop_handle = tokio::spawn(run_live(
        source,
        transcriber,
        settings,
        updates_tx,
        stop_rx,
        quiet,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            if !quiet {
                eprintln!("\nStopping capture...");
            }
            let _ = stop_tx.send(true);
        }
        _ = stop_tx.closed() => {}
    }

    let result = loop_handle.await;
    let _ = printer.await;
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            eprintln!("{}", format!("Capture failed: {}", e).red());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("streamscribe: capture task failed: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(not(feature = "cpal-audio"))]
async fn run_listen(_config: Config, _device: Option<String>, _quiet: bool) -> Result<()> {
    eprintln!("Audio capture not available: built without the cpal-audio feature");
    std::process::exit(1);
}

/// Report on the runtime setup without starting anything.
fn run_check(config: &Config) {
    println!("streamscribe {}", streamscribe::version_string());

    let model_path = &config.stt.model_path;
    if model_path.exists() {
        println!("  Model:    {} (found)", model_path.display());
    } else {
        println!(
            "  Model:    {} {}",
            model_path.display(),
            "(missing)".yellow()
        );
    }

    let whisper = cfg!(feature = "whisper");
    println!(
        "  Whisper:  {}",
        if whisper { "enabled" } else { "disabled (stub backend)" }
    );
    println!("  Backend:  {}", streamscribe::defaults::gpu_backend());

    #[cfg(feature = "cpal-audio")]
    match streamscribe::audio::capture::list_devices() {
        Ok(devices) => println!("  Capture:  {} input device(s)", devices.len()),
        Err(e) => println!("  Capture:  {}", format!("unavailable ({})", e).yellow()),
    }
    #[cfg(not(feature = "cpal-audio"))]
    println!("  Capture:  disabled (cpal-audio feature off)");

    println!("  Bind:     {}", config.server.bind_addr);
    println!("  Language: {}", config.stt.language);
}
