mod commands;
mod config;
mod options;
mod utils;

use clap::{Parser, CommandFactory};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = options::Cli::parse();

    options::verbose::init(cli.verbose);

    if cli.version {
        options::version::show(cli.verbose);
        return Ok(());
    }

    match cli.command {
        Some(options::Commands::Install { version, mirror, arch, refresh }) => {
            let args = commands::install::InstallArgs {
                version,
                mirror,
                arch,
                refresh,
            };
            commands::install::execute(args).await?;
        }
        Some(options::Commands::Use { version }) => {
            commands::r#use::execute(&version)?;
        }
        Some(options::Commands::List { remote, refresh }) => {
            commands::list::execute(remote, refresh).await?;
        }
        Some(options::Commands::Remove { version }) => {
            commands::remove::execute(&version).await?;
        }
        None => {
            let mut cmd = options::Cli::command();
            cmd.print_help()?;
            println!();
        }
    }

    Ok(())
}
