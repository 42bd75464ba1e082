//! Track Client
//!
//! Browses the server's catalog, receives a selected track over UDP and plays
//! it locally. Driven by simple commands on stdin.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_track_streamer::{
    audio::{list_output_devices, AudioSink, CpalSink, PlaybackController, PlaybackState},
    config::AppConfig,
    control::ControlClient,
    network::{FixedAddr, LocalAddrResolver, ReceivedStream, RouteProbe, StreamReceiver},
};

#[derive(Debug, PartialEq)]
enum Command {
    List,
    Play(usize),
    Pause,
    Resume,
    Stop,
    Status,
    Devices,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(word) => word.to_ascii_lowercase(),
            None => return Err(String::new()),
        };
        match command.as_str() {
            "list" | "ls" => Ok(Command::List),
            "play" => match words.next().map(str::parse::<usize>) {
                Some(Ok(id)) => Ok(Command::Play(id)),
                _ => Err("usage: play <track id>".into()),
            },
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "stop" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "devices" => Ok(Command::Devices),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command: {}", other)),
        }
    }
}

/// Session number, track id, and outcome of a background receive
type Finished = (u64, usize, udp_track_streamer::Result<ReceivedStream>);

/// The receive started by the latest `play`
struct PendingReceive {
    session: u64,
    track_id: usize,
    handle: JoinHandle<()>,
}

impl PendingReceive {
    /// Abort the task and wait for it, freeing its port
    async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}

/// Forget the pending receive if `session` is the one it tracks. A result
/// from an older session must not clear a newer one.
fn settle(pending: &mut Option<PendingReceive>, session: u64) -> bool {
    if pending.as_ref().is_some_and(|p| p.session == session) {
        *pending = None;
        true
    } else {
        false
    }
}

/// Opening or closing an output stream waits on the playback thread;
/// keep that off the async workers.
fn play_blocking<S: AudioSink>(
    controller: &mut PlaybackController<S>,
    stream: ReceivedStream,
) -> udp_track_streamer::Result<()> {
    tokio::task::block_in_place(|| controller.play(stream))
}

fn stop_blocking<S: AudioSink>(controller: &mut PlaybackController<S>) {
    tokio::task::block_in_place(|| controller.stop())
}

fn print_help() {
    println!("Commands: list | play <id> | pause | resume | stop | status | devices | quit");
}

fn print_tracks(tracks: &[String]) {
    println!("\n=== Tracks ===");
    if tracks.is_empty() {
        println!("  (none)");
    }
    for (id, name) in tracks.iter().enumerate() {
        println!("  [{}] {}", id, name);
    }
    println!();
}

/// Bind a receiver, ask the server to stream to it, and receive in the
/// background. The receiver is bound first so no frame arrives before
/// anyone listens.
async fn start_stream(
    config: &AppConfig,
    control: &ControlClient,
    resolver: &dyn LocalAddrResolver,
    track_id: usize,
    session: u64,
    done_tx: mpsc::UnboundedSender<Finished>,
) -> Result<PendingReceive> {
    let mut receiver = StreamReceiver::from_config(&config.client);
    let local = receiver.bind().await?;

    let server = control.server_addr().await?;
    let destination = SocketAddr::new(resolver.local_ip_for(server)?, local.port());
    let reply = control.request_stream(track_id, Some(destination)).await?;
    println!("{}", reply);

    let handle = tokio::spawn(async move {
        let result = receiver.receive().await;
        let _ = done_tx.send((session, track_id, result));
    });
    Ok(PendingReceive {
        session,
        track_id,
        handle,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting track client");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    let control = ControlClient::new(&config.client.server_url)?;
    let resolver: Box<dyn LocalAddrResolver> = match config.client.advertise_ip {
        Some(ip) => Box::new(FixedAddr(ip)),
        None => Box::new(RouteProbe),
    };
    let mut controller = PlaybackController::new(CpalSink::new(config.client.output_device.clone()));

    let mut tracks = match control.list_tracks().await {
        Ok(tracks) => tracks,
        Err(e) => {
            tracing::error!("Failed to fetch track list from {}: {}", config.client.server_url, e);
            Vec::new()
        }
    };
    print_tracks(&tracks);
    print_help();

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Finished>();
    let mut receiving: Option<PendingReceive> = None;
    let mut next_session = 0u64;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(Duration::from_millis(250));
    let mut last_state = controller.state();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let command = match Command::parse(&line) {
                    Ok(command) => command,
                    Err(msg) if msg.is_empty() => continue,
                    Err(msg) => {
                        println!("{}", msg);
                        continue;
                    }
                };

                match command {
                    Command::List => {
                        match control.list_tracks().await {
                            Ok(fresh) => tracks = fresh,
                            Err(e) => eprintln!("Error: {}", e),
                        }
                        print_tracks(&tracks);
                    }
                    Command::Play(track_id) => {
                        // Free the port held by a receive that never finished
                        if let Some(previous) = receiving.take() {
                            previous.cancel().await;
                        }
                        next_session += 1;
                        match start_stream(&config, &control, resolver.as_ref(), track_id, next_session, done_tx.clone()).await {
                            Ok(pending) => receiving = Some(pending),
                            Err(e) => eprintln!("Error: {}", e),
                        }
                    }
                    Command::Pause => controller.pause(),
                    Command::Resume => controller.resume(),
                    Command::Stop => stop_blocking(&mut controller),
                    Command::Status => {
                        match &receiving {
                            Some(p) if !p.handle.is_finished() => println!(
                                "Playback: {:?}, receiving track {}",
                                controller.state(),
                                p.track_id
                            ),
                            _ => println!("Playback: {:?}, receiver idle", controller.state()),
                        }
                        if let Some(now) = controller.now_playing() {
                            println!(
                                "  {} ch, {} Hz, {:.1}s",
                                now.channels, now.sample_rate, now.duration_secs
                            );
                        }
                    }
                    Command::Devices => {
                        println!("\n=== Output Devices ===");
                        for name in list_output_devices() {
                            println!("  {}", name);
                        }
                        println!();
                    }
                    Command::Help => print_help(),
                    Command::Quit => break,
                }
            }
            Some((session, track_id, result)) = done_rx.recv() => {
                if !settle(&mut receiving, session) {
                    tracing::debug!("Ignoring result of superseded receive for track {}", track_id);
                    continue;
                }
                let stream = match result {
                    Ok(stream) => stream,
                    Err(e) => {
                        eprintln!("Error receiving track {}: {}", track_id, e);
                        continue;
                    }
                };
                println!("Received track {}: {} bytes in {} frames", track_id, stream.buffer.len(), stream.frames);

                if let Some(dir) = &config.client.save_dir {
                    match stream.save(dir, &format!("track_{}", track_id)) {
                        Ok(path) => println!("Audio saved to {}", path.display()),
                        Err(e) => eprintln!("Could not save track {}: {}", track_id, e),
                    }
                }
                if let Err(e) = play_blocking(&mut controller, stream) {
                    eprintln!("Error playing track {}: {}", track_id, e);
                }
            }
            _ = tick.tick() => {
                let state = controller.poll();
                if state != last_state && state == PlaybackState::Stopped {
                    println!("Playback finished");
                }
                last_state = state;
                if let Some(e) = controller.sink().check_errors() {
                    tracing::warn!("Output stream error: {}", e);
                }
            }
        }
    }

    stop_blocking(&mut controller);
    if let Some(pending) = receiving {
        pending.cancel().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("play 3"), Ok(Command::Play(3)));
        assert_eq!(Command::parse("  LS "), Ok(Command::List));
        assert_eq!(Command::parse("exit"), Ok(Command::Quit));
        assert!(Command::parse("play").is_err());
        assert!(Command::parse("play x").is_err());
        assert!(Command::parse("dance").is_err());
        assert_eq!(Command::parse(""), Err(String::new()));
    }

    fn pending(session: u64, track_id: usize) -> PendingReceive {
        PendingReceive {
            session,
            track_id,
            handle: tokio::spawn(std::future::pending::<()>()),
        }
    }

    #[tokio::test]
    async fn test_stale_result_keeps_newer_receive() {
        let mut receiving = Some(pending(2, 7));

        // A result from the session replaced by `play 7`
        assert!(!settle(&mut receiving, 1));
        let kept = receiving.as_ref().unwrap();
        assert_eq!((kept.session, kept.track_id), (2, 7));

        assert!(settle(&mut receiving, 2));
        assert!(receiving.is_none());
        assert!(!settle(&mut receiving, 2));
    }

    #[tokio::test]
    async fn test_cancel_frees_port() {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let held = PendingReceive {
            session: 1,
            track_id: 0,
            handle: tokio::spawn(async move {
                let _socket = socket;
                std::future::pending::<()>().await
            }),
        };

        held.cancel().await;
        assert!(tokio::net::UdpSocket::bind(addr).await.is_ok());
    }

    #[derive(Default)]
    struct CountingSink {
        loads: usize,
        stops: usize,
    }

    impl AudioSink for CountingSink {
        fn load(
            &mut self,
            _clip: udp_track_streamer::codec::PcmClip,
        ) -> std::result::Result<(), udp_track_streamer::error::AudioError> {
            // Stands in for waiting on the output thread
            std::thread::sleep(Duration::from_millis(20));
            self.loads += 1;
            Ok(())
        }
        fn pause(&mut self) {}
        fn resume(&mut self) {}
        fn stop(&mut self) {
            self.stops += 1;
        }
        fn is_finished(&self) -> bool {
            false
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_playback_calls_inside_runtime() {
        let mut controller = PlaybackController::new(CountingSink::default());
        let stream = ReceivedStream {
            header: None,
            buffer: vec![0u8; 8],
            frames: 1,
            source: None,
        };
        play_blocking(&mut controller, stream).unwrap();
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert_eq!(controller.sink().loads, 1);

        stop_blocking(&mut controller);
        assert_eq!(controller.state(), PlaybackState::Idle);
        assert_eq!(controller.sink().stops, 1);
    }
}
