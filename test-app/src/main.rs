// deckctl test application -- CLI tool for exercising the HyperDeck client
// against a real deck or the in-process mock server.
//
// Usage:
//   deckctl-test-app --host 192.168.10.50 info
//   deckctl-test-app --host 192.168.10.50 status
//   deckctl-test-app --host 192.168.10.50 play --clip 2 --speed 100 --loop
//   deckctl-test-app --host 192.168.10.50 goto timecode 00:01:00:00
//   deckctl-test-app --host 192.168.10.50 add "Intro.mov"
//   deckctl-test-app --host 192.168.10.50 raw "slot info" --wait
//   deckctl-test-app --host 192.168.10.50 -vv monitor --duration 30
//   deckctl-test-app --mock clips

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use deckctl::DeckEvent;
use deckctl::hyperdeck::{ClipRef, GotoTarget, HyperDeck, HyperDeckBuilder, PlayOptions};
use deckctl_test_harness::MockDeckServer;
use deckctl_test_harness::fixtures;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// deckctl test application -- drives a disk recorder from the command line.
#[derive(Parser)]
#[command(name = "deckctl-test-app", version, about)]
struct Cli {
    /// Deck address (`host`, `host:port` or `[v6]:port`).
    /// Required unless --mock is used.
    #[arg(long)]
    host: Option<String>,

    /// Control port used when --host carries none.
    #[arg(long, default_value_t = 9993)]
    port: u16,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// Run against an in-process mock deck instead of real hardware.
    #[arg(long)]
    mock: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print device identity.
    Info,

    /// Print transport and timeline status.
    Status,

    /// List the disk clip catalog and the playback timeline.
    Clips,

    /// Start playback.
    Play {
        /// Cue this clip id first.
        #[arg(long)]
        clip: Option<u32>,
        /// Percent of normal speed, negative for reverse.
        #[arg(long, allow_hyphen_values = true)]
        speed: Option<i32>,
        /// Loop playback.
        #[arg(long = "loop")]
        looping: bool,
        /// Stop at the end of the current clip.
        #[arg(long)]
        single_clip: bool,
    },

    /// Stop playback.
    Stop,

    /// Move the playhead.
    Goto {
        #[arg(value_enum)]
        kind: GotoKind,
        /// Clip id (or +N / -N), timecode, or timeline start/end/frame.
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Remove every clip from the playback timeline.
    Clear,

    /// Append a clip to the playback timeline.
    Add {
        /// Clip file name, or catalog id with --id.
        clip: String,
        /// Treat CLIP as a catalog id.
        #[arg(long)]
        id: bool,
    },

    /// Send one raw protocol line.
    Raw {
        line: String,
        /// Wait for and print the outcome header.
        #[arg(long)]
        wait: bool,
    },

    /// Print events as they arrive.
    Monitor {
        /// Seconds to monitor for.
        #[arg(long, default_value_t = 60)]
        duration: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum GotoKind {
    Clip,
    Timecode,
    Timeline,
}

impl GotoKind {
    fn as_protocol(self) -> &'static str {
        match self {
            GotoKind::Clip => "clip id",
            GotoKind::Timecode => "timecode",
            GotoKind::Timeline => "timeline",
        }
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}

// ---------------------------------------------------------------------------
// Mock deck
// ---------------------------------------------------------------------------

/// Start a mock deck scripted for `command`. Returns the server and its
/// address.
async fn start_mock(command: &Command) -> Result<(MockDeckServer, String)> {
    let mut server = MockDeckServer::new()
        .await
        .context("failed to start mock deck")?;
    fixtures::script_handshake(&mut server);

    match command {
        Command::Play { clip, .. } => {
            let options = play_options(command).context("invalid play options")?;
            if let Some(id) = clip {
                server.expect_line(&format!("goto: clip id: {id}"), fixtures::OK);
            }
            server.expect_line(
                &deckctl::hyperdeck::commands::cmd_play(&options)?,
                fixtures::OK,
            );
            server.expect_line("transport info", fixtures::TRANSPORT_INFO);
        }
        Command::Stop => {
            server.expect_line("stop", fixtures::OK);
            server.expect_line("transport info", fixtures::TRANSPORT_INFO);
        }
        Command::Goto { kind, value } => {
            let target = GotoTarget::parse(kind.as_protocol(), value)?;
            server.expect_line(
                &deckctl::hyperdeck::commands::cmd_goto(&target),
                fixtures::OK,
            );
            server.expect_line("transport info", fixtures::TRANSPORT_INFO);
        }
        Command::Clear => server.expect_line("clips clear", fixtures::OK),
        Command::Add { clip, id } => {
            let clip = clip_ref(clip, *id)?;
            server.expect_line(
                &deckctl::hyperdeck::commands::cmd_clips_add(&clip)?,
                fixtures::OK,
            );
        }
        Command::Raw { line, .. } => server.expect_line(line, fixtures::OK),
        Command::Monitor { .. } => {
            server.pause(Duration::from_millis(500));
            server.push(b"508 transport info:\r\nstatus: play\r\nspeed: 100\r\n\r\n");
            server.pause(Duration::from_millis(500));
            server.push(b"513 timeline position:\r\ntimeline: 30\r\ntimecode: 00:00:00:30\r\n\r\n");
            server.pause(Duration::from_millis(500));
            server.hang_up();
        }
        Command::Info | Command::Status | Command::Clips => {}
    }

    let addr = server.addr().to_string();
    server.start();
    Ok((server, addr))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn play_options(command: &Command) -> Result<PlayOptions> {
    let Command::Play {
        clip,
        speed,
        looping,
        single_clip,
    } = command
    else {
        bail!("not a play command");
    };

    let mut options = PlayOptions::new();
    options.clip_id = *clip;
    options.speed = *speed;
    options.looping = looping.then_some(true);
    options.single_clip = single_clip.then_some(true);
    Ok(options)
}

fn clip_ref(clip: &str, by_id: bool) -> Result<ClipRef> {
    if by_id {
        let id = clip
            .parse::<u32>()
            .with_context(|| format!("invalid clip id: {clip}"))?;
        Ok(ClipRef::Id(id))
    } else {
        Ok(ClipRef::Name(clip.to_string()))
    }
}

fn print_info(deck: &HyperDeck) {
    let d = deck.device_info();
    println!("Model:            {}", d.model);
    println!("Name:             {}", deck.name().unwrap_or_default());
    println!("Protocol version: {}", d.protocol_version);
    println!("Software version: {}", d.software_version);
    println!("Unique id:        {}", d.unique_id);
    println!("Slots:            {}", d.slot_count);
    println!("Address:          {}", deck.addr().unwrap_or("-"));
}

fn print_status(deck: &HyperDeck) {
    let t = deck.transport_info();
    let tl = deck.timeline();
    println!("Status:           {}", t.status);
    println!("Speed:            {}%", tl.speed);
    println!("Loop:             {}", tl.looping);
    println!("Timecode:         {}", tl.timecode);
    println!(
        "Display timecode: {}",
        t.display_timecode.as_deref().unwrap_or("-")
    );
    println!("Timeline frame:   {}", tl.position);
    println!(
        "Clip:             {}",
        tl.active_clip.map_or("-".to_string(), |id| id.to_string())
    );
    println!(
        "Slot:             {} ({})",
        t.slot_id.map_or("-".to_string(), |id| id.to_string()),
        t.slot_name.as_deref().unwrap_or("-")
    );
    println!("Video format:     {}", t.video_format.as_deref().unwrap_or("-"));
}

fn print_clips(deck: &HyperDeck) {
    let clips = deck.clips();
    println!("Disk ({} clips):", clips.len());
    for c in &clips {
        println!(
            "  {:>3}  {:<32} {:<10} {:<10} {}",
            c.id, c.name, c.format, c.video_format, c.duration
        );
    }

    let timeline = deck.timeline();
    println!("\nTimeline ({} clips):", timeline.clips.len());
    for c in &timeline.clips {
        println!(
            "  {:>3}  {:<32} {} +{}",
            c.id, c.name, c.start_timecode, c.duration
        );
    }
}

async fn monitor(deck: &HyperDeck, duration: Duration) -> Result<()> {
    let mut events = deck.subscribe();
    let start = tokio::time::Instant::now();
    let deadline = start + duration;

    println!("Monitoring for {}s...\n", duration.as_secs());
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                println!(
                    "{:>6}.{:03}s {:?}",
                    elapsed.as_secs(),
                    elapsed.subsec_millis(),
                    event
                );
                if event == DeckEvent::Disconnected {
                    break;
                }
            }
            Ok(Err(RecvError::Lagged(n))) => println!("(missed {n} events)"),
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }
    Ok(())
}

async fn run(deck: &HyperDeck, command: &Command) -> Result<()> {
    match command {
        Command::Info => print_info(deck),
        Command::Status => print_status(deck),
        Command::Clips => print_clips(deck),
        Command::Play { .. } => {
            deck.play(&play_options(command)?)?;
            // Replies arrive in order, so this returns after the play outcome.
            deck.refresh_transport().await?;
            print_status(deck);
        }
        Command::Stop => {
            deck.stop()?;
            deck.refresh_transport().await?;
            print_status(deck);
        }
        Command::Goto { kind, value } => {
            deck.goto(&GotoTarget::parse(kind.as_protocol(), value)?)?;
            deck.refresh_transport().await?;
            print_status(deck);
        }
        Command::Clear => {
            deck.clear_clips().await.context("clips clear failed")?;
            println!("Timeline cleared.");
        }
        Command::Add { clip, id } => {
            deck.add_clip(clip_ref(clip, *id)?)
                .await
                .context("clips add failed")?;
            println!("Added {clip}.");
        }
        Command::Raw { line, wait } => {
            if *wait {
                let reply = deck.command(line).await?;
                println!("{} {}", reply.code, reply.message);
            } else {
                deck.send(line)?;
            }
        }
        Command::Monitor { duration } => monitor(deck, Duration::from_secs(*duration)).await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (server, host) = if cli.mock {
        let (server, addr) = start_mock(&cli.command).await?;
        println!("Using mock deck at {addr}");
        (Some(server), addr)
    } else {
        let host = cli
            .host
            .clone()
            .context("--host is required when not using --mock")?;
        (None, host)
    };

    let deck = HyperDeckBuilder::new()
        .host(&host)
        .port(cli.port)
        .connect_timeout(Duration::from_secs(cli.timeout))
        .build()
        .await
        .with_context(|| format!("failed to connect to {host}"))?;

    let result = run(&deck, &cli.command).await;
    deck.close().await;

    if let Some(server) = server {
        if let Err(e) = server.wait().await {
            tracing::warn!(error = %e, "mock deck script did not complete");
        }
    }
    result
}
