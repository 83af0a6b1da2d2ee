// Minimal smoke-test client for the newline-delimited JSON framing.
// Joins a map, reports a couple of positions, pings, and prints every
// frame the server sends back.

use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::time::sleep;

// Get current timestamp in milliseconds
fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

async fn send(write_half: &mut OwnedWriteHalf, frame: serde_json::Value) -> std::io::Result<()> {
    let mut line = frame.to_string();
    line.push('\n');
    write_half.write_all(line.as_bytes()).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:3002".to_string());

    println!("Connecting to {}", addr);
    let stream = TcpStream::connect(&addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    // Print everything the server sends.
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            println!("<- {}", line);
        }
        println!("Server closed the connection");
    });

    send(
        &mut write_half,
        json!({
            "event": "join",
            "data": {
                "odId": format!("od_test_{}", get_timestamp()),
                "name": "SmokeTester",
                "mapId": "henesys",
                "x": 400.0,
                "y": 300.0,
                "level": 1
            }
        }),
    )
    .await?;

    for i in 0..3 {
        sleep(Duration::from_millis(500)).await;
        send(
            &mut write_half,
            json!({
                "event": "updatePosition",
                "data": {
                    "x": 400.0 + i as f32 * 25.0,
                    "y": 300.0,
                    "facing": "right",
                    "animationState": "walk",
                    "velocityX": 50.0,
                    "velocityY": 0.0
                }
            }),
        )
        .await?;
    }

    send(
        &mut write_half,
        json!({
            "event": "latencyPing",
            "data": { "timestamp": get_timestamp() }
        }),
    )
    .await?;

    // Give the server a moment to answer before dropping the socket.
    sleep(Duration::from_secs(2)).await;
    Ok(())
}
