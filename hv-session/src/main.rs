//! Voice session client (hv-session) - Main entry point
//!
//! Connects to the session server, plays assistant audio to a WAV file or the
//! sound card, and maps stdin lines to push-to-talk:
//! - empty line or `t`: toggle talking
//! - `s <text>`: share text with the assistant
//! - `q`: end the session and quit

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use hv_common::config::{LoggingConfig, SessionConfig};
use hv_common::events::SessionEvent;
use hv_session::audio::{PacedSink, SinkTarget, WavCaptureSource};
use hv_session::playback::OutputGraph;
use hv_session::transport::WebSocketTransport;
use hv_session::{build_info, SessionHandle, SessionRuntime, SharedState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for hv-session
#[derive(Parser, Debug)]
#[command(name = "hv-session")]
#[command(about = "Push-to-talk voice session client")]
#[command(version)]
struct Args {
    /// Config file (overrides HV_CONFIG and the per-user config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Session server WebSocket URL
    #[arg(short, long, env = "HV_SERVER_URL")]
    url: Option<String>,

    /// Log level or filter directive
    #[arg(long, env = "HV_LOG_LEVEL")]
    log_level: Option<String>,

    /// Replay this WAV file as the microphone
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Record assistant audio to this WAV file
    #[arg(long)]
    output_wav: Option<PathBuf>,

    /// Use the sound card for output and (without --input-wav) capture
    #[cfg(feature = "device")]
    #[arg(long)]
    device: bool,

    /// Output device name (default device if omitted)
    #[cfg(feature = "device")]
    #[arg(long)]
    output_device: Option<String>,

    /// Input device name (default device if omitted)
    #[cfg(feature = "device")]
    #[arg(long)]
    input_device: Option<String>,

    /// List output devices and exit
    #[cfg(feature = "device")]
    #[arg(long)]
    list_devices: bool,
}

/// Whatever is producing sound for this session
enum Output {
    Paced(PacedSink),
    #[cfg(feature = "device")]
    Device(hv_session::audio::device::DeviceOutput),
}

/// Whatever is standing in for the microphone
enum Input {
    Silent,
    Wav(WavCaptureSource),
    #[cfg(feature = "device")]
    Device(hv_session::audio::device::DeviceInput),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if list_devices(&args)? {
        return Ok(());
    }

    let mut config =
        SessionConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = &args.url {
        config.server_url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    init_logging(&config.logging)?;

    info!(
        "Starting hv-session {} ({}, built {})",
        build_info::GIT_HASH,
        build_info::BUILD_PROFILE,
        build_info::BUILD_TIMESTAMP
    );

    #[cfg(feature = "device")]
    let device_output = if args.device {
        Some(
            hv_session::audio::device::DeviceOutput::open(args.output_device.as_deref())
                .context("Failed to open audio output")?,
        )
    } else {
        None
    };

    #[cfg(feature = "device")]
    let output_rate = device_output
        .as_ref()
        .map(|d| d.sample_rate())
        .unwrap_or(config.output_sample_rate);
    #[cfg(not(feature = "device"))]
    let output_rate = config.output_sample_rate;

    let graph = OutputGraph::new(output_rate, config.fade_curve());
    let shared = Arc::new(SharedState::new(config.event_bus_capacity));

    let (transport, transport_rx) = WebSocketTransport::connect(&config.server_url)
        .await
        .context("Failed to connect to session server")?;

    let (runtime, handle) = SessionRuntime::new(
        config.clone(),
        graph.clone(),
        Arc::clone(&shared),
        transport,
        transport_rx,
    );

    let printer = tokio::spawn(print_events(shared.subscribe_events()));
    let mut runtime_task = tokio::spawn(runtime.run());

    #[cfg(feature = "device")]
    let output = match device_output {
        Some(mut device) => {
            device.start(graph.clone(), capability_reporter(handle.clone()))?;
            Output::Device(device)
        }
        None => Output::Paced(start_paced_sink(&args, &config, graph.clone())?),
    };
    #[cfg(not(feature = "device"))]
    let output = Output::Paced(start_paced_sink(&args, &config, graph.clone())?);

    let input = start_input(&args, &config, &handle)?;

    println!("Enter toggles talking, 's <text>' shares text, 'q' quits.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut talking = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                match line {
                    "" | "t" => {
                        if talking {
                            handle.key_up().await?;
                        } else {
                            handle.key_down().await?;
                        }
                        talking = !talking;
                    }
                    "q" => {
                        handle.end_session().await?;
                        break;
                    }
                    _ if line.starts_with("s ") => {
                        let text = line[2..].trim();
                        handle
                            .share_content(serde_json::json!({ "text": text }))
                            .await?;
                    }
                    other => println!("Unknown command '{}'", other),
                }
            }
            result = &mut runtime_task => {
                let state = result.context("Session runtime panicked")??;
                info!("Session ended in state {}", state);
                stop_devices(output, input);
                printer.abort();
                return Ok(());
            }
            _ = shutdown_signal() => break,
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Runtime already stopped: {}", e);
    }
    let state = runtime_task.await.context("Session runtime panicked")??;
    info!("Session ended in state {}", state);

    stop_devices(output, input);
    printer.abort();
    Ok(())
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let directive = if logging.level.contains('=') {
        logging.level.clone()
    } else {
        format!("hv_session={0},hv_common={0}", logging.level)
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let registry = tracing_subscriber::registry().with(filter);

    match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
        }
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}

fn start_paced_sink(args: &Args, config: &SessionConfig, graph: OutputGraph) -> Result<PacedSink> {
    let target = match &args.output_wav {
        Some(path) => SinkTarget::WavFile(path.clone()),
        None => SinkTarget::Null,
    };
    PacedSink::start(graph, target, config.render_block_frames).context("Failed to start output")
}

fn start_input(args: &Args, config: &SessionConfig, handle: &SessionHandle) -> Result<Input> {
    let gate = Arc::clone(&handle.shared().capture_gate);

    if let Some(path) = &args.input_wav {
        let capture = handle.clone();
        let source =
            WavCaptureSource::start(path, config.capture_block_frames, gate, move |block, rate| {
                capture.capture_frame(block, rate);
            })
            .context("Failed to start WAV capture")?;
        return Ok(Input::Wav(source));
    }

    start_device_input(args, handle, gate)
}

#[cfg(feature = "device")]
fn start_device_input(
    args: &Args,
    handle: &SessionHandle,
    gate: Arc<std::sync::atomic::AtomicBool>,
) -> Result<Input> {
    if !args.device {
        info!("No capture source configured; push-to-talk will send silence only");
        return Ok(Input::Silent);
    }

    let capture = handle.clone();
    let device = hv_session::audio::device::DeviceInput::start(
        args.input_device.as_deref(),
        gate,
        move |block, rate| {
            capture.capture_frame(block, rate);
        },
        capability_reporter(handle.clone()),
    )
    .context("Failed to open microphone")?;
    Ok(Input::Device(device))
}

#[cfg(not(feature = "device"))]
fn start_device_input(
    _args: &Args,
    _handle: &SessionHandle,
    _gate: Arc<std::sync::atomic::AtomicBool>,
) -> Result<Input> {
    info!("No capture source configured; push-to-talk will send silence only");
    Ok(Input::Silent)
}

#[cfg(feature = "device")]
fn list_devices(args: &Args) -> Result<bool> {
    if !args.list_devices {
        return Ok(false);
    }
    for name in hv_session::audio::device::list_output_devices()? {
        println!("{}", name);
    }
    Ok(true)
}

#[cfg(not(feature = "device"))]
fn list_devices(_args: &Args) -> Result<bool> {
    Ok(false)
}

/// Forward audio-thread stream failures into the session as capability errors
#[cfg(feature = "device")]
fn capability_reporter(handle: SessionHandle) -> hv_session::audio::device::ErrorCallback {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(reason) = rx.recv().await {
            if handle.capability_failed(reason).await.is_err() {
                break;
            }
        }
    });
    Arc::new(move |reason| {
        let _ = tx.send(reason);
    })
}

fn stop_devices(output: Output, input: Input) {
    match input {
        Input::Silent => {}
        Input::Wav(source) => source.stop(),
        #[cfg(feature = "device")]
        Input::Device(device) => device.stop(),
    }
    match output {
        Output::Paced(sink) => match sink.stop() {
            Ok(frames) => info!("Output stopped after {} frames", frames),
            Err(e) => warn!("Output sink error: {}", e),
        },
        #[cfg(feature = "device")]
        Output::Device(mut device) => device.stop(),
    }
}

/// Print transcripts and state changes for the user
async fn print_events(mut rx: broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::Transcript { speaker, text, .. }) => println!("{}: {}", speaker, text),
            Ok(SessionEvent::StateChanged { new_state, .. }) => println!("[{}]", new_state),
            Ok(SessionEvent::ThinkingIndicator { active: true }) => println!("(thinking...)"),
            Ok(SessionEvent::SessionError { message, .. }) => println!("error: {}", message),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Event printer lagged by {}", n),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
