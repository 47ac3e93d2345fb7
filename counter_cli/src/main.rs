//! # Counter Command Line Interface
//!
//! Sends goals to the counter executable and prints their feedback, or sends a single pose
//! straight to the hand (useful to reset the hand to a known pose before a demo).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Client for the counter's goal server.
mod goal_client;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Result,
};
use comms_if::{
    action::{Goal, GoalEvent, GoalId, GoalRequest, GoalResponse},
    net::{zmq, NetParams},
};
use log::{debug, info};
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use counter_lib::{catalog::PoseCatalog, hand_client::HandClient};
use goal_client::GoalClient;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time given to the SUB socket to receive its subscription before a goal is submitted, otherwise
/// the first events may be missed.
const SUBSCRIBE_SETTLE: Duration = Duration::from_millis(200);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "counter_cli", about = "Make the hand count")]
struct Opt {
    /// How long to wait for the counter (or the hand) to connect and respond, in milliseconds
    #[structopt(short, long, default_value = "2000")]
    timeout_ms: i32,

    #[structopt(subcommand)]
    cmd: Command,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
enum Command {
    /// Count up to the target and print the progress
    Count {
        /// Number to count to
        target: u32,
    },

    /// Cancel a goal, it stops at the start of its next step
    Cancel {
        /// ID of the goal
        goal_id: u64,
    },

    /// Show the active and pending goals
    Status,

    /// Print all goal events until interrupted
    Watch,

    /// Send a single pose from the catalog to the hand
    Pose {
        /// Name of the pose, for example `hand_extended_pos`
        name: String,

        /// Parameter file holding the pose table
        #[structopt(long, default_value = "poses.toml")]
        poses_file: String,
    },
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let session = Session::new("counter_cli", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    let net_params: NetParams =
        util::params::load("net.toml").wrap_err("Could not load net params")?;

    let zmq_ctx = zmq::Context::new();

    let timeout_ms = opt.timeout_ms;
    let connect = || {
        GoalClient::new(&zmq_ctx, &net_params, timeout_ms)
            .wrap_err("Could not connect to the counter")
    };

    let result = match opt.cmd {
        Command::Count { target } => connect().and_then(|mut c| count(&mut c, target)),
        Command::Cancel { goal_id } => connect().and_then(|mut c| {
            print_response(&c.request(&GoalRequest::Cancel(GoalId(goal_id)))?);
            Ok(())
        }),
        Command::Status => connect().and_then(|mut c| {
            print_response(&c.request(&GoalRequest::Status)?);
            Ok(())
        }),
        Command::Watch => connect().and_then(|mut c| watch(&mut c)),
        Command::Pose { name, poses_file } => {
            send_pose(&zmq_ctx, &net_params, &name, &poses_file, timeout_ms)
        }
    };

    session.exit();

    result
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Submit a goal and follow it until its result arrives.
fn count(client: &mut GoalClient, target: u32) -> Result<()> {
    thread::sleep(SUBSCRIBE_SETTLE);

    let id = match client.request(&GoalRequest::Submit(Goal { target }))? {
        GoalResponse::Accepted(id) => id,
        r => {
            print_response(&r);
            return Err(eyre!("Goal not accepted"));
        }
    };

    println!("Goal {} accepted, counting to {}", id, target);

    loop {
        let event = match client.next_event()? {
            Some(e) if e.id() == id => e,
            Some(e) => {
                debug!("Ignoring event for goal {}", e.id());
                continue;
            }
            None => continue,
        };

        match event {
            GoalEvent::Feedback { progress, .. } => println!("{}", progress.completed_steps),
            GoalEvent::Result { outcome, .. } => {
                println!("Goal {} finished: {}", id, outcome);

                return match outcome.is_succeeded() {
                    true => Ok(()),
                    false => Err(eyre!("Goal {} did not succeed", id)),
                };
            }
        }
    }
}

fn watch(client: &mut GoalClient) -> Result<()> {
    info!("Watching goal events, Ctrl+C to stop");

    loop {
        match client.next_event()? {
            Some(GoalEvent::Feedback { id, progress }) => {
                println!("{}: {} steps completed", id, progress.completed_steps)
            }
            Some(GoalEvent::Result { id, outcome }) => println!("{}: {}", id, outcome),
            None => (),
        }
    }
}

/// Publish one pose as a hand demand.
fn send_pose(
    ctx: &zmq::Context,
    net_params: &NetParams,
    name: &str,
    poses_file: &str,
    timeout_ms: i32,
) -> Result<()> {
    let catalog = PoseCatalog::load(poses_file).wrap_err("Could not load the pose catalog")?;
    let pose = catalog.resolve(name)?;

    let mut hand = HandClient::new(ctx, net_params).wrap_err("Could not create the hand client")?;

    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
    while !hand.connected() {
        if start.elapsed() > timeout {
            return Err(eyre!("Hand did not connect within {} ms", timeout_ms));
        }
        thread::sleep(Duration::from_millis(10));
    }

    // Give the subscriber time to register, PUB drops messages until it has
    thread::sleep(SUBSCRIBE_SETTLE);

    hand.send_demands(&pose.to_dems())?;

    println!("Sent pose \"{}\" ({} joints)", pose.name(), pose.len());

    Ok(())
}

fn print_response(response: &GoalResponse) {
    match response {
        GoalResponse::Accepted(id) => println!("Accepted as goal {}", id),
        GoalResponse::Rejected { reason } => println!("Rejected: {}", reason),
        GoalResponse::CancelRequested(id) => {
            println!("Cancellation of goal {} requested", id)
        }
        GoalResponse::UnknownGoal(id) => println!("Goal {} is not active or pending", id),
        GoalResponse::Status { active, pending } => {
            println!("Active:  {}", fmt_goal(active));
            println!("Pending: {}", fmt_goal(pending));
        }
        GoalResponse::Invalid => println!("The counter did not understand the request"),
    }
}

fn fmt_goal(id: &Option<GoalId>) -> String {
    match id {
        Some(id) => id.to_string(),
        None => String::from("none"),
    }
}
