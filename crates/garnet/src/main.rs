//! Connectivity test harness for the reliable UDP connection layer.
//!
//! Runs one endpoint in server or client role as named by `config.toml`,
//! logging connection events and keeping a small demo payload queued to
//! every connected peer.

use std::cell::RefCell;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::atomic::AtomicBool;

use garnet_log::GarnetLogger;
use garnet_net::{Endpoint, Role};
use log::{error, info, Level};

mod config;
mod game_loop;

fn main() {
    if GarnetLogger::init(Level::Info).is_err() {
        eprintln!("failed to install the logger");
    }

    let config = match config::handle() {
        Ok(config) => config,
        Err(err) => {
            error!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let role = match config.role() {
        Ok(role) => role,
        Err(err) => {
            error!("{err}");
            std::process::exit(1);
        }
    };

    let mut endpoint = Endpoint::new(
        role,
        config.network.server_port,
        config.network.client_port,
        config.network.broadcast,
    );

    if role == Role::Client && !config.network.broadcast {
        match config.server_address() {
            Ok(Some(address)) => endpoint.connect_to(address),
            Ok(None) => {}
            Err(err) => {
                error!("{err}");
                std::process::exit(1);
            }
        }
    }

    let connected: Rc<RefCell<HashSet<Ipv4Addr>>> = Rc::new(RefCell::new(HashSet::new()));

    {
        let connected = connected.clone();
        endpoint.set_connected_callback(move |address| {
            info!("connected: {address}");
            connected.borrow_mut().insert(address);
        });
    }
    {
        let connected = connected.clone();
        endpoint.set_disconnected_callback(move |address| {
            info!("disconnected: {address}");
            connected.borrow_mut().remove(&address);
        });
    }
    endpoint.set_received_callback(|payload, address, meta| {
        info!(
            "received {} bytes from {address}{}{}",
            payload.len(),
            if meta.out_of_order { " (out of order)" } else { "" },
            if meta.resent { " (resent)" } else { "" },
        );
    });

    info!(
        "running as {} on server port {}",
        config.network.role, config.network.server_port
    );

    let payload = config.demo.payload.clone().into_bytes();
    let run_flag = AtomicBool::new(true);

    game_loop::run(
        &run_flag,
        move |dt| {
            endpoint.tick(dt);

            // Keep every peer's queue primed with the demo payload.
            let peers: Vec<Ipv4Addr> = connected.borrow().iter().copied().collect();
            for address in peers {
                if endpoint.queue_len(address) == 0 {
                    endpoint.send(&payload, address, true);
                }
            }
        },
        || {},
        game_loop::DEFAULT_FPS_LIMIT,
        game_loop::DEFAULT_INTERVAL,
    );
}
