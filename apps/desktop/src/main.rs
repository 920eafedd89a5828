use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use menu_core::load_settings;
use tracing::info;

mod actions;
mod controls;
mod scenario;
mod simulated;

use scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "genome-menubar", about = "Drive the genome browser menu bar headlessly")]
struct Args {
    /// Settings file; defaults to ./menubar.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Scenario::Demo)]
    scenario: Scenario,
    /// Print the final state of every control as JSON.
    #[arg(long)]
    dump_json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let settings = load_settings(args.config.as_deref());
    info!(?settings, scenario = ?args.scenario, "starting menu bar");

    let snapshot = scenario::run(args.scenario, settings)?;
    if args.dump_json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }
    Ok(())
}
