use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;

use crate::{device::DeviceId, gateway::Gateway};

const COMMAND_USAGE: &str = "u";
const COMMAND_LIST_DEVICES: &str = "ld";
const COMMAND_LIST_PORTS: &str = "lp";
const COMMAND_LIST_MAPPINGS: &str = "lm";
const COMMAND_SEND: &str = "s";
const COMMAND_BROADCAST: &str = "b";
const COMMAND_ADD_DEVICE: &str = "a";
const COMMAND_ADD_NEW_DEVICES: &str = "an";
const COMMAND_DELETE_DEVICE: &str = "d";
const COMMAND_DELETE_ALL_DEVICES: &str = "da";
const COMMAND_QUIT: &str = "q";

fn print_usage() {
    println!("Usage:");
    println!("\t{COMMAND_LIST_DEVICES}: List all registered devices.");
    println!("\t{COMMAND_LIST_PORTS}: List all of the system's serial ports.");
    println!("\t{COMMAND_LIST_MAPPINGS}: List all mappings from device IDs to serial ports.");
    println!("\t{COMMAND_SEND}: Send a message to a single device.");
    println!("\t{COMMAND_BROADCAST}: Broadcast a message to all registered devices.");
    println!("\t{COMMAND_ADD_DEVICE}: Add a device.");
    println!("\t{COMMAND_ADD_NEW_DEVICES}: Add all new devices.");
    println!("\t{COMMAND_DELETE_DEVICE}: Delete a device.");
    println!("\t{COMMAND_DELETE_ALL_DEVICES}: Delete all devices.");
    println!("\t{COMMAND_QUIT}: Quit the gateway.");
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Option<String> {
    println!("{text}");
    lines.next_line().await.ok().flatten()
}

/// Drive the gateway from stdin until `q` or end of input.
///
/// Gateway events are printed as they arrive, so an attached operator
/// sees admissions, removals and incoming messages live.
pub async fn run(gateway: Gateway) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut events = gateway.subscribe();

    print_usage();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Ok(Some(line)) = line else { break };

                match line.trim() {
                    COMMAND_USAGE => print_usage(),
                    COMMAND_LIST_DEVICES => println!("{}", gateway.device_id_list()),
                    COMMAND_LIST_PORTS => println!("{}", gateway.port_list()),
                    COMMAND_LIST_MAPPINGS => println!("{}", gateway.mapping_list()),
                    COMMAND_SEND => {
                        let Some(id) = prompt(&mut lines, "-> Enter Device ID:").await else { break };
                        let Some(message) = prompt(&mut lines, "-> Enter Message:").await else { break };

                        gateway.send_to_device(&DeviceId::new(id.trim()), &message);
                    }
                    COMMAND_BROADCAST => {
                        let Some(message) = prompt(&mut lines, "-> Enter Message:").await else { break };

                        gateway.broadcast_message(&message);
                    }
                    COMMAND_ADD_DEVICE => {
                        let Some(port) = prompt(&mut lines, "-> Enter Serial Port:").await else { break };

                        if gateway.add_device(port.trim(), false).await {
                            println!("Device added.");
                        } else {
                            println!("Device was not added, see the log.");
                        }
                    }
                    COMMAND_ADD_NEW_DEVICES => {
                        let added = gateway.add_new_ports(false).await;
                        println!("Added {added} devices.");
                    }
                    COMMAND_DELETE_DEVICE => {
                        let Some(id) = prompt(&mut lines, "-> Enter Device ID:").await else { break };

                        if gateway.delete_device(&DeviceId::new(id.trim())).await {
                            println!("Device deleted.");
                        } else {
                            println!("Device was not deleted, see the log.");
                        }
                    }
                    COMMAND_DELETE_ALL_DEVICES => {
                        let deleted = gateway.delete_all().await;
                        println!("Deleted {deleted} devices.");
                    }
                    COMMAND_QUIT => break,
                    "" => {}
                    unknown => {
                        println!("Unknown command {unknown:?}.");
                        print_usage();
                    }
                }
            }

            event = events.recv() => {
                use tokio::sync::broadcast::error::RecvError;

                match event {
                    Ok(event) => println!("{event}"),
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Console fell behind on gateway events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
}
