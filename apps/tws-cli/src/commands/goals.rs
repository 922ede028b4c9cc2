// goals.rs — Goal table subcommands: list, show, validate.

use clap::Subcommand;
use tws_goal::procedures::param;
use tws_goal::{GoalEntry, GoalId, GoalProcedure, GoalTable};

#[derive(Subcommand)]
pub enum GoalsCommands {
    /// List every goal with its contention policy.
    List,
    /// Show one goal in detail, including script steps.
    Show {
        /// Goal name (e.g., "become_primary").
        goal: String,
    },
    /// Check the goal table invariants.
    Validate,
}

pub fn execute(cmd: &GoalsCommands) -> anyhow::Result<()> {
    let table = GoalTable::standard();

    match cmd {
        GoalsCommands::List => list_goals(&table),
        GoalsCommands::Show { goal } => show_goal(&table, goal),
        GoalsCommands::Validate => validate(&table),
    }
}

fn list_goals(table: &GoalTable) -> anyhow::Result<()> {
    println!(
        "{:<34} {:<11} {:<40} {}",
        "GOAL", "CONTENTION", "PROCEDURE", "EVENTS"
    );
    println!("{}", "-".repeat(110));

    for entry in table.entries() {
        println!(
            "{:<34} {:<11} {:<40} {}",
            entry.goal.as_str(),
            entry.contention.to_string(),
            entry.procedure.to_string(),
            events_summary(entry),
        );
    }
    println!("\n{} goal(s) total.", table.entries().count());

    Ok(())
}

fn show_goal(table: &GoalTable, name: &str) -> anyhow::Result<()> {
    let goal: GoalId = name.parse()?;
    let entry = table.entry(goal);

    println!("Goal:       {}", entry.goal);
    println!("Contention: {}", entry.contention);
    println!("Procedure:  {}", entry.procedure);
    if let Some(exclusive) = entry.exclusive {
        println!("Exclusive:  {}", exclusive);
    }
    if !entry.concurrent.is_empty() {
        println!("Concurrent: {}", entry.concurrent);
    }
    println!("Events:     {}", events_summary(entry));

    if let GoalProcedure::Script(script) = entry.procedure {
        println!("\nSteps:");
        for (index, step) in script.steps.iter().enumerate() {
            let payload = match param::describe(step.procedure, step.payload) {
                Some(name) => name.to_string(),
                None if step.payload.is_empty() => String::new(),
                None => hex(step.payload),
            };
            println!("  {:>2}. {:<28} {}", index + 1, step.procedure.as_str(), payload);
        }
    }

    Ok(())
}

fn validate(table: &GoalTable) -> anyhow::Result<()> {
    table.validate()?;
    println!(
        "Goal table OK: {} goals, {} procedures.",
        table.entries().count(),
        table.procedures().len()
    );
    Ok(())
}

fn events_summary(entry: &GoalEntry) -> String {
    let events: Vec<String> = [
        ("success", entry.success_event),
        ("timeout", entry.timeout_event),
        ("failed", entry.failed_event),
    ]
    .into_iter()
    .filter_map(|(on, event)| event.map(|e| format!("{}={}", on, e)))
    .collect();

    if events.is_empty() {
        "-".to_string()
    } else {
        events.join(" ")
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
