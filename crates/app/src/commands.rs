//! Command handlers
//!
//! Handlers write human output to the given writer and return core errors.

use std::io::Write;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use zenith_core::calendar::CalendarLayout;
use zenith_core::{
    build_analytics, compute_metrics, portfolio_summary, AuthService, CalendarFilter,
    CalendarView, Error, MilestoneEvent, Money, NewPlan, PlanContext, PlanMode, PlanRepository,
    Result,
};

use crate::cli::{Commands, PlanAction};
use crate::state::AppState;

/// Reference instants for one invocation
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    pub now: DateTime<Utc>,
    pub today: NaiveDate,
}

impl Clock {
    pub fn system(today_override: Option<NaiveDate>) -> Self {
        Self {
            now: Utc::now(),
            today: today_override.unwrap_or_else(|| chrono::Local::now().date_naive()),
        }
    }
}

pub fn run(state: &AppState, command: Commands, clock: Clock, out: &mut dyn Write) -> Result<()> {
    let auth = AuthService::new(&state.db);

    match command {
        Commands::Register { username, password } => {
            let session = auth.register(&username, &password, clock.now)?;
            writeln!(out, "Registered and signed in as {}.", session.username)?;
        }
        Commands::Login { username, password } => {
            let session = auth.login(&username, &password, clock.now)?;
            writeln!(out, "Signed in as {}.", session.username)?;
        }
        Commands::Logout => {
            auth.logout()?;
            writeln!(out, "Signed out.")?;
        }
        Commands::Whoami => match auth.current_session(clock.now)? {
            Some(session) => writeln!(
                out,
                "{} (session valid until {})",
                session.username,
                session.expires_at.format("%Y-%m-%d %H:%M UTC")
            )?,
            None => writeln!(out, "Not signed in.")?,
        },
        Commands::Users => {
            for name in auth.usernames()? {
                writeln!(out, "{name}")?;
            }
        }
        Commands::Plan { action } => {
            let mut context = signed_in_context(state, &auth, clock)?;
            plan_action(state, &mut context, action, clock, out)?;
        }
        Commands::Pay => {
            let mut context = signed_in_context(state, &auth, clock)?;
            let events = context.mark_current_paid(clock.today)?;
            context.save(&state.db)?;
            writeln!(out, "Marked today's entry as paid.")?;
            print_events(&events, out)?;
        }
        Commands::Toggle { index } => {
            let mut context = signed_in_context(state, &auth, clock)?;
            let events = context.toggle(index)?;
            context.save(&state.db)?;
            let done = context
                .active_plan()
                .is_some_and(|plan| plan.is_completed(index));
            let status = if done { "completed" } else { "pending" };
            writeln!(out, "Entry {index} is now {status}.")?;
            print_events(&events, out)?;
        }
        Commands::Status { json } => {
            let context = signed_in_context(state, &auth, clock)?;
            let plan = require_active(&context)?;
            let metrics = compute_metrics(plan, clock.today);
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&metrics)?)?;
            } else {
                writeln!(out, "{} ({})", plan.name, plan.mode().label())?;
                writeln!(
                    out,
                    "Saved {} of {} ({:.1}%)",
                    state.money(metrics.completed_amount),
                    state.money(metrics.target_amount),
                    metrics.progress_percent
                )?;
                writeln!(
                    out,
                    "Due by now {} (variance {})",
                    state.money(metrics.projected_by_now),
                    state.money(metrics.variance_by_now)
                )?;
                writeln!(
                    out,
                    "Entries {}/{}; streak {}; overdue {}; upcoming {}",
                    metrics.completed_count,
                    plan.total_days,
                    metrics.streak,
                    metrics.overdue,
                    metrics.upcoming
                )?;
                if let Some(next) = metrics.next_due_index {
                    writeln!(out, "Next due entry: {next}")?;
                }
            }
        }
        Commands::Analytics => {
            let context = signed_in_context(state, &auth, clock)?;
            let plan = require_active(&context)?;
            let bundle = build_analytics(plan, &compute_metrics(plan, clock.today));
            writeln!(out, "{}", serde_json::to_string_pretty(&bundle)?)?;
        }
        Commands::Calendar { month, filter } => {
            let context = signed_in_context(state, &auth, clock)?;
            let plan = require_active(&context)?;
            let (year, month) = match month {
                Some(text) => parse_month(&text)?,
                None => (clock.today.year(), clock.today.month()),
            };
            let view =
                CalendarView::build(plan, year, month, clock.today, CalendarFilter::from_str(&filter))?;
            print_calendar(state, &view, out)?;
        }
        Commands::Summary { json } => {
            let context = signed_in_context(state, &auth, clock)?;
            let summary = portfolio_summary(&context.plans, clock.today);
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
            } else {
                for snapshot in &summary.plans {
                    writeln!(
                        out,
                        "{:<24} {:>14} / {:<14} {:>5.1}%  overdue {}",
                        snapshot.name,
                        state.money(snapshot.metrics.completed_amount),
                        state.money(snapshot.metrics.target_amount),
                        snapshot.metrics.progress_percent,
                        snapshot.metrics.overdue
                    )?;
                }
                writeln!(
                    out,
                    "Total saved {} of {}; overdue entries {}",
                    state.money(summary.total_saved),
                    state.money(summary.total_target),
                    summary.total_overdue
                )?;
            }
        }
        Commands::Export { output } => {
            let bundle = state.db.export_bundle(clock.now)?;
            let text = serde_json::to_string_pretty(&bundle)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    writeln!(out, "Exported to {}.", path.display())?;
                }
                None => writeln!(out, "{text}")?,
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let payload: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| Error::Import(format!("not valid JSON: {e}")))?;
            let document = state.db.import_bundle(&payload, clock.now)?;
            writeln!(
                out,
                "Imported {} users. Sign in again to continue.",
                document.users.len()
            )?;
        }
    }
    Ok(())
}

fn plan_action(
    state: &AppState,
    context: &mut PlanContext,
    action: PlanAction,
    clock: Clock,
    out: &mut dyn Write,
) -> Result<()> {
    match action {
        PlanAction::Create {
            name,
            mode,
            start,
            daily_amount,
            color,
        } => {
            let mode = PlanMode::from_str(&mode)
                .ok_or_else(|| Error::Validation(format!("unknown plan mode '{mode}'")))?;
            let new = NewPlan {
                name,
                start_date: start.unwrap_or(clock.today),
                mode,
                color_theme: Some(color.unwrap_or_else(|| state.config.default_color_theme.clone())),
                fixed_daily_amount: daily_amount.map(Money::from_f64),
            };
            let plan = context.add_plan(new, clock.now)?;
            writeln!(
                out,
                "Created {} ({}), target {}. id {}",
                plan.name,
                plan.mode(),
                state.money(plan.target_amount()),
                plan.id
            )?;
            context.save(&state.db)?;
        }
        PlanAction::List => {
            if context.plans.is_empty() {
                writeln!(out, "No plans yet.")?;
            }
            for plan in &context.plans {
                let marker = if context.active_plan_id.as_deref() == Some(plan.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                writeln!(
                    out,
                    "{marker} {}  {:<24} {:<8} from {}",
                    plan.id,
                    plan.name,
                    plan.mode(),
                    plan.start_date
                )?;
            }
        }
        PlanAction::Use { plan_id } => {
            if !context.plans.iter().any(|plan| plan.id == plan_id) {
                return Err(Error::NotFound(format!("plan {plan_id}")));
            }
            context.set_active_plan(Some(&plan_id));
            context.save(&state.db)?;
            writeln!(out, "Active plan set to {plan_id}.")?;
        }
    }
    Ok(())
}

fn signed_in_context<R: PlanRepository>(
    state: &AppState,
    auth: &AuthService<'_, R>,
    clock: Clock,
) -> Result<PlanContext> {
    let session = auth.require_session(clock.now)?;
    PlanContext::load(&state.db, &session.username)
}

fn require_active(context: &PlanContext) -> Result<&zenith_core::Plan> {
    context
        .active_plan()
        .ok_or_else(|| Error::Precondition("Create a plan first.".to_string()))
}

fn parse_month(text: &str) -> Result<(i32, u32)> {
    let invalid = || Error::Validation(format!("expected YYYY-MM, got '{text}'"));
    let (year, month) = text.trim().split_once('-').ok_or_else(invalid)?;
    let year = year.parse::<i32>().map_err(|_| invalid())?;
    let month = month.parse::<u32>().map_err(|_| invalid())?;
    Ok((year, month))
}

fn print_events(events: &[MilestoneEvent], out: &mut dyn Write) -> Result<()> {
    for event in events {
        writeln!(out, "{}", event.message())?;
    }
    Ok(())
}

fn status_mark(status: &zenith_core::EntryStatus) -> char {
    if status.done {
        'x'
    } else if status.today {
        '>'
    } else if status.overdue {
        '!'
    } else {
        '.'
    }
}

fn print_calendar(state: &AppState, view: &CalendarView, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", view.month_start.format("%B %Y"))?;
    match &view.layout {
        CalendarLayout::Grid { cells } => {
            writeln!(out, "  Mon   Tue   Wed   Thu   Fri   Sat   Sun")?;
            for week in cells.chunks(7) {
                let line: Vec<String> = week
                    .iter()
                    .map(|cell| match (&cell.entry, cell.in_month) {
                        (Some(entry), true) if entry.visible => {
                            format!("{:>4}{} ", cell.date.day(), status_mark(&entry.status))
                        }
                        (_, true) => format!("{:>4}  ", cell.date.day()),
                        (_, false) => "      ".to_string(),
                    })
                    .collect();
                writeln!(out, "{}", line.concat().trim_end())?;
            }
        }
        CalendarLayout::Weekly { entries } => {
            for entry in entries.iter().filter(|e| e.visible) {
                writeln!(
                    out,
                    "Week {:02}  {}  {}  {}",
                    entry.index,
                    entry.date.format("%b %-d"),
                    state.money(entry.amount),
                    status_mark(&entry.status)
                )?;
            }
        }
    }
    if view.is_empty() {
        writeln!(out, "No entries to show this month.")?;
    }
    writeln!(
        out,
        "{} due this month, {} shown ({})",
        view.due_in_month,
        view.visible_in_month,
        view.filter.as_str()
    )?;
    Ok(())
}
