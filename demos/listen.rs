//! Discover a bulb, toggle it, and print state-change notifications.
//!
//! Run with `cargo run --example listen`.

use std::time::Duration;
use yeelight_lan::Yeelight;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let bulb = Yeelight::from_discovery(Duration::from_secs(3)).await?;
    println!("Connected to {}", bulb.address());

    let props = bulb.get_props(&["power", "bright"]).await?;
    println!(
        "power={} bright={}",
        props.get("power").unwrap_or("?"),
        props.get("bright").unwrap_or("?")
    );

    let (mut notifications, cancel) = bulb.listen().await?;

    bulb.turn_on().await?;
    bulb.set_brightness(60).await?;

    println!("Listening for notifications, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            n = notifications.recv() => match n {
                Ok(n) => println!("{}: {:?}", n.method, n.params),
                Err(e) => {
                    eprintln!("notification stream ended: {e}");
                    break;
                }
            },
        }
    }

    cancel.cancel();
    bulb.close().await;
    Ok(())
}
