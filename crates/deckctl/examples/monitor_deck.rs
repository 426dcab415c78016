//! Monitor a deck's event stream.
//!
//! Connects, prints the identity and clip catalog, then prints every event
//! for 60 seconds. Press play or scrub on the deck to generate traffic.
//!
//! # Usage
//!
//! ```sh
//! RUST_LOG=deckctl_hyperdeck=debug cargo run -p deckctl --example monitor_deck -- 192.168.10.50
//! ```

use std::time::Duration;

use deckctl::DeckEvent;
use deckctl::hyperdeck::HyperDeckBuilder;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.10.50".to_string());
    println!("Connecting to {host}...");

    let deck = HyperDeckBuilder::new()
        .host(&host)
        .connect_timeout(Duration::from_secs(3))
        .build()
        .await?;

    let device = deck.device_info();
    println!(
        "Connected: {} (protocol {}, {} slots)\n",
        device.model, device.protocol_version, device.slot_count
    );
    for clip in &device.clips {
        println!("  {:>3}  {:<32} {}", clip.id, clip.name, clip.duration);
    }
    println!();

    let mut events = deck.subscribe();
    let start = tokio::time::Instant::now();
    let deadline = start + Duration::from_secs(60);

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match tokio::time::timeout(remaining, events.recv()).await {
            Ok(Ok(event)) => {
                let elapsed = start.elapsed();
                let ts = format!("{:>6}.{:03}s", elapsed.as_secs(), elapsed.subsec_millis());
                match event {
                    DeckEvent::TransportChanged { status } => {
                        let t = deck.timeline();
                        println!("{ts} Transport    {status} speed {} loop {}", t.speed, t.looping);
                    }
                    DeckEvent::TimecodeChanged { timecode } => println!("{ts} Timecode     {timecode}"),
                    DeckEvent::DisplayTimecodeChanged { timecode } => {
                        println!("{ts} Display      {timecode}")
                    }
                    DeckEvent::ClipListChanged { count } => println!("{ts} Clips        {count}"),
                    DeckEvent::TimelineChanged { clips } => println!("{ts} Timeline     {clips} clips"),
                    DeckEvent::Disconnected => {
                        println!("{ts} Disconnected");
                        break;
                    }
                    other => println!("{ts} {other:?}"),
                }
            }
            Ok(Err(RecvError::Lagged(n))) => println!("(missed {n} events)"),
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }

    deck.close().await;
    println!("\nMonitoring complete.");
    Ok(())
}
