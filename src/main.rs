use clap::{Parser, Subcommand};
use epimap::{config, data, projection, render, server};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the per-date map frames
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the frames and the hover API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            println!("Generating map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load metrics and geometry
            let dataset = data::load_data(&app_config)?;

            // 2. Fit the projection and flatten to pixel space
            let states = projection::project_states(dataset.states, &app_config.map);

            // 3. Render frames
            render::generate_frames(&app_config, &states, &dataset.dates)?;

            println!("Generation complete!");
        }
        Commands::Serve { config } => {
            println!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // The API renders on demand, so it needs the same projected
            // states the frame generator uses.
            println!("Loading data for API...");
            let dataset = data::load_data(&app_config)?;
            let states = projection::project_states(dataset.states, &app_config.map);

            server::start_server(app_config, states, dataset.dates).await?;
        }
    }

    Ok(())
}
