//! `cadence schedule`: Check a cron expression.

use cadence_workflow::CronSchedule;
use chrono::{DateTime, Local};

pub fn run(expr: &str, at: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = match CronSchedule::parse(expr) {
        Ok(schedule) => schedule,
        Err(e) => {
            println!("❌ {e}");
            return Err(e.into());
        }
    };

    let at: DateTime<Local> = match at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| format!("Invalid --at timestamp '{raw}': {e}"))?
            .with_timezone(&Local),
        None => Local::now(),
    };

    println!("✅ Valid schedule: {schedule}");
    println!("   At:      {}", at.format("%Y-%m-%d %H:%M %Z"));
    println!(
        "   Matches: {}",
        if schedule.matches(&at) { "yes" } else { "no" }
    );
    match schedule.next_after(&at) {
        Some(next) => println!("   Next:    {}", next.format("%Y-%m-%d %H:%M %Z")),
        None => println!("   Next:    never (no matching minute within four years)"),
    }

    Ok(())
}
