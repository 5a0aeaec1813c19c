//! Executable for planning and checking capacity goals against a described platform.
//!
//! The platform is simulated from a YAML description, so nothing here touches real hardware.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

use clap::{Args, Parser, Subcommand};
use std::{fs, path::PathBuf, process, sync::Arc};

use nvm_core::{NvmSession, PlatformServices, SimulatedPlatform};
use nvm_sdk::{
    config::NvmConfiguration,
    device::Uid,
    error::{NvmError, Result},
    goal::{ConfigGoal, GoalInput, PersistentMemType, ReserveDimm},
};

#[derive(Parser, Debug)]
struct Cli {
    /// Path to the YAML platform description.
    #[arg(short, long)]
    platform: PathBuf,
    /// Optional path to a YAML session configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the discovered devices and the platform capabilities.
    Show,
    /// Plan a capacity goal and print it.
    Plan {
        #[command(flatten)]
        goal: GoalArgs,
        /// Stage the planned goal on the simulated devices.
        #[arg(long, default_value_t = false)]
        commit: bool,
    },
    /// Plan and stage a capacity goal, then write it to a goal file.
    Dump {
        #[command(flatten)]
        goal: GoalArgs,
        /// Path of the goal file to write.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check that a goal file applies to the described platform.
    CheckLoad {
        /// Path of the goal file to read.
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GoalArgs {
    /// Percentage of capacity mapped as volatile memory.
    #[arg(long, default_value_t = 0)]
    volatile_percent: u8,
    /// Percentage of the persistent portion left unmapped.
    #[arg(long, default_value_t = 0)]
    reserved_percent: u8,
    /// Keep one DIMM per socket out of interleaved App Direct.
    #[arg(long, default_value_t = false)]
    reserve_dimm: bool,
    /// Request mirrored App Direct interleave sets.
    #[arg(long, default_value_t = false)]
    mirrored: bool,
    /// Create one App Direct region per DIMM instead of interleaving.
    #[arg(long, default_value_t = false)]
    not_interleaved: bool,
    /// Target DIMM. All manageable DIMMs are targeted when omitted.
    #[arg(long = "dimm")]
    dimms: Vec<Uid>,
}

impl GoalArgs {
    fn input(&self, config: &NvmConfiguration) -> GoalInput {
        GoalInput {
            persistent_mem_type: if self.not_interleaved {
                PersistentMemType::AppDirectNotInterleaved
            } else {
                PersistentMemType::AppDirect
            },
            volatile_percent: self.volatile_percent,
            reserved_percent: self.reserved_percent,
            reserve_dimm: if self.reserve_dimm { ReserveDimm::AppDirectNotInterleaved } else { ReserveDimm::None },
            mirrored: self.mirrored,
            ..config.goal_input()
        }
    }
}

fn main() {
    env_logger::Builder::from_default_env().format_timestamp(None).init();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("Error: {}", err);
        process::exit(i32::from(err.return_code().code()));
    }
}

fn read(path: &PathBuf) -> Result<String> {
    fs::read_to_string(path).map_err(|err| NvmError::Io(format!("{}: {}", path.display(), err)))
}

fn run(cli: Cli) -> Result<()> {
    let platform = Arc::new(SimulatedPlatform::from_yaml(&read(&cli.platform)?)?);
    let config = match &cli.config {
        Some(path) => NvmConfiguration::from_yaml(&read(path)?)?,
        None => NvmConfiguration::default(),
    };
    let session = NvmSession::open(PlatformServices::from_platform(platform), config)?;
    let mut guard = session.acquire();

    match cli.command {
        Command::Show => {
            for device in guard.devices() {
                println!(
                    "{:<22} socket {} capacity {:#x} security {} {:?}",
                    device.uid,
                    device.socket_id(),
                    device.capacity,
                    device.lock_state,
                    device.manageability
                );
            }
            println!("{:#?}", guard.capabilities());
        }
        Command::Plan { goal, commit } => {
            let plan = guard.plan_goal(&goal.input(session.config()), &goal.dimms).map_err(|err| {
                print_goals(&err.goals);
                err.kind
            })?;
            print_goals(&plan.goals);
            for set in &plan.interleave_sets {
                println!("{:?}", set);
            }
            if commit {
                guard.commit_goal(&plan.goals)?;
                println!("Staged goals on {} DIMMs", plan.goals.len());
            }
        }
        Command::Dump { goal, output } => {
            guard.create_goal(&goal.input(session.config()), &goal.dimms)?;
            let count = guard.dump_goal(&output)?;
            println!("Wrote {} goals to {}", count, output.display());
        }
        Command::CheckLoad { input } => {
            let goals = guard.load_goal(&input)?;
            print_goals(&goals);
        }
    }
    Ok(())
}

fn print_goals(goals: &[ConfigGoal]) {
    for goal in goals {
        println!(
            "{:<22} socket {} volatile {:#x} app direct {:#x} reserved {:#x} {:?}",
            goal.uid,
            goal.socket_id,
            goal.volatile_size,
            goal.appdirect_size(),
            goal.storage_capacity,
            goal.status
        );
    }
}
