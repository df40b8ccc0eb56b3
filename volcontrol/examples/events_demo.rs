// examples/events_demo.rs
//
// Prints the events pushed by a Volumio player:
//   - opens a Socket.IO session (Engine.IO polling)
//   - asks for the current state (`getState`)
//   - prints every push with an HH:MM:SS timestamp
//
// Build and run (from the volcontrol crate root):
//   cargo run --example events_demo --                    # localhost:3000
//   cargo run --example events_demo -- volumio.local      # other host
//   cargo run --example events_demo -- volumio.local 3000
//
// Ctrl-C to quit.

use std::env;
use std::time::Duration;

use volcontrol::{DEFAULT_SOCKETIO_PORT, PushTransport, SocketIoTransport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    let args: Vec<String> = env::args().collect();
    let host = args.get(1).map(String::as_str).unwrap_or("localhost");
    let port = match args.get(2) {
        Some(port) => port.parse()?,
        None => DEFAULT_SOCKETIO_PORT,
    };

    println!("Connecting to Volumio at {}:{}...", host, port);
    let transport = SocketIoTransport::connect(host, port, Duration::from_secs(5))?;
    let events = transport.subscribe();
    transport.emit("getState", None)?;

    while !transport.is_closed() {
        match events.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => {
                let now = chrono::Local::now().format("%H:%M:%S");
                println!("[{}] {} {}", now, event.name, event.payload);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    println!("Session closed by the player.");
    Ok(())
}
