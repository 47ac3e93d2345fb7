//! # Counter Executable
//!
//! This executable makes the hand count. It accepts counting goals from clients, runs them through
//! the pose sequencer and publishes the feedback and results of each goal.
//!
//! The hand is reached through two services which must be running alongside:
//! - the hand itself (or `hand_sim_exec`), subscribed to position demands
//! - `joint_state_exec`, caching the hand's joint state and answering queries for it

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use comms_if::{
    action::GoalEvent,
    net::{zmq, NetParams},
};
use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, RecvTimeoutError},
    Arc,
};
use std::time::{Duration, Instant};

// Internal
use counter_lib::{
    catalog::PoseCatalog,
    goal_host::{server::GoalServer, worker::WorkerHandle, GoalHost, RunDispatcher},
    hand_client::HandClient,
    joint_state_client::JointStateClient,
    params::CounterExecParams,
    sequencer::PoseSequencer,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// How long to wait for the active goal to report its result when shutting down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("counter_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Counter Executable\n");
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
    let exec_params: CounterExecParams =
        util::params::load("counter_exec.toml").wrap_err("Could not load counter_exec params")?;
    exec_params
        .sequencer
        .validate()
        .wrap_err("Invalid sequencer params")?;
    let catalog = Arc::new(
        PoseCatalog::load(&exec_params.poses_file).wrap_err("Could not load the pose catalog")?,
    );

    info!(
        "Parameters loaded, {} poses in the catalog, able to count to {}",
        catalog.names().len(),
        catalog.numbered_pose_count()
    );

    // ---- NETWORK INITIALISATION ----

    let zmq_ctx = zmq::Context::new();

    let hand_client =
        HandClient::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the hand client")?;
    let joint_state_client = JointStateClient::new(&zmq_ctx, &net_params)
        .wrap_err("Failed to initialise the joint state client")?;
    let mut server =
        GoalServer::new(&zmq_ctx, &net_params).wrap_err("Failed to initialise the goal server")?;

    info!("Network initialised");

    // ---- SEQUENCER INITIALISATION ----

    let sequencer = PoseSequencer::new(
        exec_params.sequencer.clone(),
        catalog.clone(),
        hand_client,
        joint_state_client,
    );
    let (worker, worker_events) = WorkerHandle::spawn(sequencer);
    let mut host = GoalHost::new(
        exec_params.goal_host.new_goal_policy,
        catalog.numbered_pose_count(),
        worker,
    );

    info!("Goal host ready, policy: {:?}", exec_params.goal_host.new_goal_policy);

    // ---- MAIN LOOP ----

    while running.load(Ordering::Relaxed) {
        // Serve at most one request per iteration, the receive timeout paces the loop
        match server.recv_request() {
            Ok(Some(request)) => {
                info!("Request: {:?}", request);
                let (response, events) = host.handle_request(request);

                if let Err(e) = server.send_response(&response) {
                    warn!("Could not respond to the client: {}", e);
                }
                publish(&mut server, &events);
            }
            Ok(None) => (),
            Err(e) => warn!("Could not receive a request: {}", e),
        }

        while let Ok(event) = worker_events.try_recv() {
            let events = host.handle_worker_event(event);
            publish(&mut server, &events);
        }

        save_reports(&mut host, &session, exec_params.goal_host.save_run_reports);
    }

    // ---- SHUTDOWN ----

    info!("Interrupted, shutting down");

    let events = host.cancel_all();
    publish(&mut server, &events);

    // Cancellation only takes effect at the next step so the active goal is allowed to finish
    if !wait_for_active(&mut host, &mut server, &worker_events) {
        // The run would only stop once its current pose is reached or times out
        host.dispatcher_mut().detach();
    }
    save_reports(&mut host, &session, exec_params.goal_host.save_run_reports);

    drop(host);
    session.exit();

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn publish(server: &mut GoalServer, events: &[GoalEvent]) {
    for event in events {
        if let Err(e) = server.publish(event) {
            warn!("Could not publish event for goal {}: {}", event.id(), e);
        }
    }
}

fn save_reports<D: RunDispatcher>(host: &mut GoalHost<D>, session: &Session, save: bool) {
    for report in host.take_reports() {
        if save {
            session.save(report.save_path(), report);
        }
    }
}

/// Returns false if the active goal did not report its result within `SHUTDOWN_TIMEOUT`.
fn wait_for_active<D: RunDispatcher>(
    host: &mut GoalHost<D>,
    server: &mut GoalServer,
    worker_events: &Receiver<GoalEvent>,
) -> bool {
    if let Some(id) = host.active() {
        info!("Waiting for goal {} to stop", id);
    }

    let deadline = Instant::now() + SHUTDOWN_TIMEOUT;

    while host.active().is_some() {
        let remaining = deadline.saturating_duration_since(Instant::now());

        match worker_events.recv_timeout(remaining) {
            Ok(event) => {
                let events = host.handle_worker_event(event);
                publish(server, &events);
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Active goal did not stop in time");
                return false;
            }
            Err(RecvTimeoutError::Disconnected) => return true,
        }
    }

    true
}
