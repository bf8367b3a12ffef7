//! CLI entry point - the composition root.
//!
//! Logging and `.env` are set up here, then the parsed command is routed to
//! a handler. Every command shuts running servers down before exiting.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolbridge_cli::{Cli, CliConfig, CliContext, Commands, bootstrap, exit_code_for, handlers};

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(ctx: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Paths => handlers::paths::execute(&ctx.config),
        Commands::Servers { command } => handlers::servers::execute(ctx, command).await,
        Commands::Run => handlers::run::execute(ctx).await,
        Commands::Tools { server } => handlers::protocol::tools(ctx, &server).await,
        Commands::Call { server, tool, args } => {
            handlers::protocol::call(ctx, &server, &tool, &args).await
        }
        Commands::Prompts { server } => handlers::protocol::prompts(ctx, &server).await,
        Commands::Prompt {
            server,
            prompt,
            args,
        } => handlers::protocol::prompt(ctx, &server, &prompt, args.as_deref()).await,
        Commands::Resources { server } => handlers::protocol::resources(ctx, &server).await,
        Commands::Read { server, uri } => handlers::protocol::read(ctx, &server, &uri).await,
        Commands::Cache { command } => handlers::cache::execute(ctx, command).await,
        Commands::Registry { command } => handlers::registry::execute(ctx, command).await,
        Commands::Network { url } => handlers::network::execute(ctx, url.as_deref()).await,
        Commands::Download {
            url,
            target_name,
            label,
            args,
        } => {
            handlers::repository::execute(
                ctx,
                &url,
                target_name.as_deref(),
                label.as_deref(),
                &args,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing so .env can feed clap's env fallbacks
    dotenvy::dotenv().ok();

    let mut cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command.take() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = match CliConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    };
    let ctx = bootstrap(config);

    let result = dispatch(&ctx, command).await;
    ctx.mcp.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
    Ok(())
}
