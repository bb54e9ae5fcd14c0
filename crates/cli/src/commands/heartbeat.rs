//! `cadence heartbeat`: List the jobs in a heartbeat file.

use std::path::PathBuf;

use cadence_config::AppConfig;
use cadence_workflow::{CronSchedule, heartbeat_file};
use chrono::Local;

pub async fn run(file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match file {
        Some(path) => path,
        None => AppConfig::load()
            .map_err(|e| format!("Failed to load config: {e}"))?
            .heartbeat_path(),
    };

    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No heartbeat file at {}", path.display());
            println!("  Run `cadence init` to create one.");
            return Ok(());
        }
        Err(e) => return Err(format!("Failed to read {}: {e}", path.display()).into()),
    };

    let config = heartbeat_file::parse(&text);
    if config.jobs.is_empty() {
        println!("No heartbeat jobs in {}", path.display());
        return Ok(());
    }

    let now = Local::now();
    println!(
        "💓 {} job(s) in {} (version {}):\n",
        config.jobs.len(),
        path.display(),
        config.version
    );
    for job in &config.jobs {
        let status = if job.enabled { "✅" } else { "⏸️" };
        let due = match CronSchedule::parse(&job.schedule) {
            Ok(schedule) if job.enabled && schedule.matches(&now) => " ← due now".to_string(),
            Ok(_) => String::new(),
            Err(e) => format!(" ⚠️  {e}"),
        };
        println!("  {status} {} [{}] {}{due}", job.id, job.mode, job.schedule);
        if let Some(timeout) = job.timeout_sec {
            println!("     Timeout: {timeout}s");
        }
        let first_line = job.prompt.lines().next().unwrap_or_default();
        println!("     Prompt:  {first_line}");
    }

    Ok(())
}
