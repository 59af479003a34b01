use anyhow::Result;
use clap::Parser;
use distributed_queue::cli::{run_drain, run_simulation, Cli, Commands, DrainArgs, SimulateArgs};
use distributed_queue::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments first to get debug flag
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let level = if cli.debug {
        tracing::Level::DEBUG // DEBUG level or higher when --debug
    } else {
        tracing::Level::WARN // WARN level or higher in normal operation (errors and warnings only)
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Simulate(args) => handle_simulate_command(config, &args).await?,
        Commands::Drain(args) => handle_drain_command(&config, &args).await?,
    }

    Ok(())
}

async fn handle_simulate_command(mut config: Config, args: &SimulateArgs) -> Result<()> {
    if let Some(producers) = args.producers {
        config.simulation.producers = producers;
    }
    if let Some(consumers) = args.consumers {
        config.simulation.consumers = consumers;
    }
    if let Some(items) = args.items {
        config.simulation.items = items;
    }
    config.validate()?;

    println!(
        "🚀 Simulating {} producer(s) and {} consumer(s) on {}",
        config.simulation.producers, config.simulation.consumers, config.queue.directory
    );
    let report = run_simulation(&config.queue.directory, &config.simulation).await?;

    println!("📦 Offered:      {}", report.offered);
    println!("✅ Delivered:    {}", report.delivered);
    println!("🔁 Duplicates:   {}", report.duplicates);
    println!("↕️  Out of order: {}", report.out_of_order);
    if !report.is_clean() {
        anyhow::bail!("simulation violated queue guarantees: {:?}", report);
    }
    Ok(())
}

async fn handle_drain_command(config: &Config, args: &DrainArgs) -> Result<()> {
    config.validate()?;
    let drained = run_drain(
        &config.queue.directory,
        &config.simulation.payload_prefix,
        args.items,
    )
    .await?;

    for (position, payload) in drained.iter().enumerate() {
        println!("{:>5}  {}", position, payload);
    }
    println!("🏁 Drained {} item(s); queue is empty", drained.len());
    Ok(())
}
