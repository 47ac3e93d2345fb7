//! # Simulated Hand Executable
//!
//! Stands in for the hand driver so the counting demo can be run without hardware. Demands are
//! followed at a limited rate and the joint state is published every cycle.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Network abstraction of the simulated hand.
mod hand_server;

/// Parameters for the simulated hand.
mod params;

/// Joint motion model.
mod sim_hand;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::net::{zmq, NetParams};
use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Instant;

// Internal
use hand_server::HandServer;
use params::HandSimExecParams;
use sim_hand::SimHand;
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
        Session::new("hand_sim_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Simulated Hand Executable\n");
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
    let params: HandSimExecParams = util::params::load("hand_sim_exec.toml")
        .wrap_err("Could not load hand_sim_exec params")?;

    info!(
        "Parameters loaded, simulating {} joints",
        params.initial_pos_rad.len()
    );

    // ---- SERVER INITIALISATION ----

    let zmq_ctx = zmq::Context::new();
    let mut server =
        HandServer::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise server")?;
    let mut hand = SimHand::new(&params);
    let cycle_period = seconds_to_duration(params.cycle_period_s);

    info!("Server initialised");

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    let mut was_settled = true;

    while running.load(Ordering::Relaxed) {
        let cycle_start_instant = Instant::now();

        // Only the latest demands matter
        while let Some(dems) = server.get_demands() {
            debug!("New demands for {} joints", dems.pos_rad.len());
            hand.set_demands(&dems);
        }

        hand.step();

        let settled = hand.settled();
        if settled && !was_settled {
            debug!("Hand settled");
        }
        was_settled = settled;

        if let Err(e) = server.send_joint_state(&hand.joint_state()) {
            warn!("Could not publish joint state: {}", e);
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }
    }

    info!("Shutting down");

    session.exit();

    Ok(())
}
