mod cli;
mod processor;

use periodical_distiller::{
    collaborators::{self, Collaborators},
    config,
    orchestrator::{standard_pipeline, Orchestrator},
    stages::bucket_names,
};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "periodical_distiller=trace,distiller_kanban=trace".to_string()
        } else {
            "periodical_distiller=debug,distiller_kanban=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { pips } => run_pips(&pips, cli.config.as_deref()),
        Commands::Serve { stage } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let processor = processor::StageProcessor::new(&config, &stage)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(processor.run())?;
            Ok(())
        }
        Commands::Status { json } => show_status(cli.config.as_deref(), json),
        Commands::Redrive { bucket, id } => redrive(cli.config.as_deref(), &bucket, id.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("periodical-distiller {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_pips(pips: &[PathBuf], config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let collaborators = Collaborators::from_config(&config.stages);
    let mut orchestrator = Orchestrator::standard(&config, collaborators)?;

    let report = orchestrator.run_batch(pips);

    for item in &report.items {
        match &item.result {
            Ok(run) => {
                println!("{}", run.id());
                println!("  Bucket: {} ({:?})", run.bucket, run.state);
                println!("  Status: {}", run.status().unwrap_or("-"));
            }
            Err(e) => {
                println!("{}", item.pip_path.display());
                println!("  Failed: {:#}", e);
            }
        }
    }

    let errors = report.errors();
    if !errors.is_empty() {
        println!("\nErrors:");
        for error in &errors {
            println!("  {}", error);
        }
    }

    if !report.all_sealed() {
        anyhow::bail!(
            "{} of {} packages sealed",
            report.sealed_count(),
            report.items.len()
        );
    }

    println!("\nAll {} packages sealed", report.items.len());
    Ok(())
}

fn show_status(config_path: Option<&Path>, json: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let pipeline = standard_pipeline(&config.workspace.root);
    let snapshot = pipeline.snapshot()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("Buckets under {}:\n", config.workspace.root.display());
    for name in bucket_names() {
        let Some(bucket) = snapshot.get(name) else {
            continue;
        };
        println!(
            "{:<16} waiting {:>4}  in-process {:>4}  errored {:>4}",
            name,
            bucket.waiting.len(),
            bucket.in_process.len(),
            bucket.errored.len()
        );
        for id in &bucket.errored {
            println!("  ✗ {}", id);
        }
        for id in &bucket.in_process {
            println!("  … {}", id);
        }
    }

    Ok(())
}

fn redrive(config_path: Option<&Path>, bucket: &str, id: Option<&str>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let pipeline = standard_pipeline(&config.workspace.root);

    let moved = pipeline.redrive(bucket, id)?;
    if moved.is_empty() {
        println!("No errored tokens in {}", bucket);
    } else {
        for id in &moved {
            println!("Re-driven: {}", id);
        }
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking stage commands...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = collaborators::check_tools(&config.stages);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available() {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.stage);

        match (&tool.command, &tool.path) {
            (Some(_), Some(path)) => print!(" - {}", path.display()),
            (Some(command), None) => print!(" - {} not found", command),
            (None, _) => print!(" - not configured"),
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All stage commands are available!");
    } else {
        println!("Some stage commands are missing. Tokens reaching those stages will be quarantined.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Bucket root: {}", config.workspace.root.display());
    println!("  SIP output: {}", config.workspace.sip_output.display());
    println!("  Poll interval: {}s", config.processing.poll_interval_secs);
    let configured = config
        .stages
        .iter()
        .filter(|(_, command)| command.is_some())
        .count();
    println!("  Stage commands: {}/6 configured", configured);

    Ok(())
}
