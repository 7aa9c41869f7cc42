use anyhow::Result;
use archief_cli::app::{self, Services};
use archief_cli::presenter::{Presenter, present_turn};
use archief_cli::{Cli, Command, Settings, ingest, repl, telemetry};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.log_level.as_deref())?;

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);
    let services = Services::connect(&settings)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            let pipeline = app::build_pipeline(&settings, &services)?;
            repl::run(&pipeline, &settings).await
        }
        Command::Ask { query } => {
            let pipeline = app::build_pipeline(&settings, &services)?;
            let mut session = app::new_session(&settings);
            let mut presenter = Presenter::new(std::io::stdout());
            let reply = present_turn(&mut session, &pipeline, &query.join(" "), &mut presenter).await?;
            anyhow::ensure!(!reply.failed, "the question could not be answered");
            Ok(())
        }
        Command::Ingest { file } => {
            let writer = app::build_writer(&settings, &services)?;
            let written = ingest::run(&file, &writer).await?;
            println!("Wrote {written} documents.");
            Ok(())
        }
    }
}
