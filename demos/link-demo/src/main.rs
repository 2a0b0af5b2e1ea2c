//! Runs one end of a LAN robot link.
//!
//! ```text
//! link-demo slave [port]    # device bridge: logs packets, replies with voltage
//! link-demo master [port]   # controller: drives motor 3, broadcasts gamepad state
//! ```
//!
//! Start both on the same subnet; `RUST_LOG=debug` shows discovery.

use std::sync::Arc;
use std::time::Duration;

use tclink::prelude::*;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Master,
    Slave,
}

impl Role {
    fn parse(arg: &str) -> Option<Self> {
        match arg {
            "master" => Some(Role::Master),
            "slave" => Some(Role::Slave),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave => "slave",
        }
    }

    fn opposite(self) -> &'static str {
        match self {
            Role::Master => "slave",
            Role::Slave => "master",
        }
    }
}

fn usage() -> ! {
    eprintln!("usage: link-demo <master|slave> [discovery-port]");
    std::process::exit(2);
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

fn run_master(link: &RobotLink) -> Result<(), TclinkError> {
    link.connect()?;
    for step in 0..20u32 {
        let power = (f64::from(step) / 10.0).sin();
        match link.send(&MotorPowerPacket::new(3, power))? {
            Some(reply) => {
                tracing::info!(step, power, reply_len = reply.len(), "motor command acknowledged")
            }
            None => tracing::info!(step, power, "motor command sent"),
        }

        let gamepad = GamepadDataPacket {
            left_stick_y: power,
            a_button: step % 2 == 0,
            ..GamepadDataPacket::new(GAMEPAD_MASTER)
        };
        link.broadcast(&gamepad)?;
        std::thread::sleep(Duration::from_millis(250));
    }
    Ok(())
}

fn run_slave(link: &RobotLink) -> Result<(), TclinkError> {
    link.add_packet_listener(Arc::new(|packet: &RobotPacket| {
        tracing::info!(label = %packet.label(), device = packet.device_id(), ?packet, "packet");
    }));
    link.add_raw_packet_listener(Arc::new(|packet: &Packet| {
        tracing::info!(%packet, "raw packet");
    }));

    let codec = BinaryCodec::default();
    let voltage = codec.encode(&VoltageDataPacket::new(12.6).to_packet()?)?;
    link.set_reply_handler(Arc::new(move |_: &Packet| Some(voltage.clone())));

    while !link.is_closed() {
        std::thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}

fn main() -> Result<(), TclinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let role = args.next().as_deref().and_then(Role::parse).unwrap_or_else(|| usage());
    let port = match args.next() {
        Some(port) => port.parse::<u16>().unwrap_or_else(|_| usage()),
        None => tclink::transport::DEFAULT_DISCOVERY_PORT,
    };

    let link = LinkBuilder::new(role.name())
        .opposite(role.opposite())
        .discovery_port(port)
        .build()?;

    let outcome = match role {
        Role::Master => run_master(&link),
        Role::Slave => run_slave(&link),
    };
    link.close();
    outcome
}
