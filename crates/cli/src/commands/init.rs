//! `cadence init`: First-time setup.

use cadence_agent::prompt::seed_data_dir;
use cadence_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("⏱  Cadence — First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    // Honour an edited config (or env overrides) when choosing the data dir
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    seed_data_dir(&config.data_dir)?;
    println!("✅ Data directory ready: {}", config.data_dir.display());
    println!("   soul.md       — agent identity");
    println!("   {:<13} — scheduled jobs", config.heartbeat.file);
    println!("   tasks/        — task files and reference handbooks");

    println!("\n🎉 Setup complete! Run `cadence run` to start the loops.\n");
    Ok(())
}
