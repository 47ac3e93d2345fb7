//! # Joint State Executable
//!
//! Caches the joint state published by the hand and serves the latest sample on request, so that
//! clients can read the hand's position at any time without subscribing to the raw stream.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Latest joint state storage
mod cache;

/// Joint state cache server abstraction.
mod cache_server;

/// Parameters for the joint state executable.
mod params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::{
    eqpt::hand::JointStateResponse,
    net::{zmq, NetParams},
};
use log::{info, trace, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

// Internal
use cache::JointStateCache;
use cache_server::CacheServer;
use params::JointStateExecParams;
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
    time::seconds_to_duration,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session =
        Session::new("joint_state_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Joint State Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::Relaxed);
    })
    .wrap_err("Failed to set the interrupt handler")?;

    // ---- LOAD PARAMETERS ----

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;
    let params: JointStateExecParams = util::params::load("joint_state_exec.toml")
        .wrap_err("Could not load joint_state_exec params")?;

    info!("Parameters loaded");

    // ---- SERVER INITIALISATION ----

    let zmq_ctx = zmq::Context::new();

    let mut server =
        CacheServer::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise server")?;
    let mut cache = JointStateCache::new(params.stale_after_s.map(seconds_to_duration));

    info!("Server initialised");

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    while running.load(Ordering::Relaxed) {
        let readable = match server.poll(params.poll_timeout_ms) {
            Ok(r) => r,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        if readable.raw {
            match server.recv_raw() {
                Ok(Some(msg)) => match cache.update(&msg) {
                    Ok(()) if cache.num_accepted == 1 => info!("First joint state received"),
                    Ok(()) => (),
                    Err(e) => warn!("Rejected joint state: {}", e),
                },
                Ok(None) => (),
                Err(e) => warn!("{}", e),
            }
        }

        if readable.query {
            let response = match server.recv_query() {
                Ok(Some(q)) => cache.respond(&q),
                Ok(None) => JointStateResponse::Invalid,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };

            trace!("Query response: {:?}", response);

            if let Err(e) = server.send_response(&response) {
                warn!("Could not respond to the client: {}", e);
            }
        }
    }

    info!(
        "Shutting down, {} joint states accepted, {} rejected",
        cache.num_accepted, cache.num_rejected
    );

    session.exit();

    Ok(())
}
