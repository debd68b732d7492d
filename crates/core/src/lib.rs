//! Zenith Core Library
//!
//! Deposit-schedule math, progress metrics, analytics series and the
//! versioned multi-user document store behind the Zenith savings tracker.

pub mod analytics;
pub mod auth;
pub mod calendar;
pub mod config;
pub mod context;
pub mod error;
pub mod invariants;
pub mod metrics;
pub mod milestones;
pub mod models;
pub mod money;
pub mod schedule;
pub mod storage;

pub use analytics::{build_analytics, portfolio_summary, PlanSnapshot, PortfolioSummary, SeriesBundle};
pub use auth::{hash_password, verify_password, AuthService};
pub use calendar::{CalendarFilter, CalendarLayout, CalendarView, EntryStatus};
pub use config::{AppConfig, ConfigError};
pub use context::PlanContext;
pub use error::{Error, Result};
pub use metrics::{compute_metrics, mark_current_paid, toggle_completion, Metrics};
pub use milestones::{Milestone, MilestoneEvent};
pub use models::*;
pub use money::Money;
pub use storage::{Database, Document, ExportBundle, PlanRepository, UserPlans};
