//! Command-line interface definitions

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zenith", version, about = "Savings plan tracker")]
pub struct Cli {
    /// Data directory for the database and zenith.toml.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Configuration file (defaults to <data-dir>/zenith.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Evaluate as if today were this date (YYYY-MM-DD).
    #[arg(long, global = true)]
    pub today: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an account and sign in.
    Register {
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Sign in to an existing account.
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Sign out.
    Logout,

    /// Show the signed-in user.
    Whoami,

    /// List known accounts.
    Users,

    /// Manage plans.
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Complete today's entry of the active plan.
    Pay,

    /// Flip one entry of the active plan between pending and completed.
    Toggle { index: u32 },

    /// Show progress of the active plan.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Print chart series of the active plan as JSON.
    Analytics,

    /// Show the month calendar of the active plan.
    Calendar {
        /// Month to show (YYYY-MM), defaults to the current month.
        #[arg(long)]
        month: Option<String>,

        /// One of all, done, overdue, upcoming.
        #[arg(long, default_value = "all")]
        filter: String,
    },

    /// Totals across all plans of the signed-in user.
    Summary {
        #[arg(long)]
        json: bool,
    },

    /// Write the interchange bundle of the whole store.
    Export {
        /// Output file; stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Replace the whole store with an interchange bundle.
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum PlanAction {
    /// Create a plan and make it active.
    Create {
        name: String,

        /// One of full, half, quarter, simple, weekly.
        #[arg(long, default_value = "full")]
        mode: String,

        /// First entry date (YYYY-MM-DD), defaults to today.
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Daily deposit for simple plans.
        #[arg(long)]
        daily_amount: Option<f64>,

        /// Theme color (#rrggbb).
        #[arg(long)]
        color: Option<String>,
    },

    /// List plans of the signed-in user.
    List,

    /// Make a plan active.
    Use { plan_id: String },
}
