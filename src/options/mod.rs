pub mod verbose;
pub mod version;

use clap::{Parser, Subcommand, ArgAction};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short = 'V', long, action = ArgAction::SetTrue)]
    pub version: bool,

    /// Print debug logs from the download pipeline
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download and install a Node.js release
    Install {
        /// Exact version, `latest`, `lts` or a range such as `18`
        version: String,

        /// Release mirror, overriding the config and environment
        #[arg(long)]
        mirror: Option<String>,

        /// Target architecture (defaults to the host's)
        #[arg(long)]
        arch: Option<String>,

        /// Re-download the release index before resolving the version
        #[arg(long, action = ArgAction::SetTrue)]
        refresh: bool,
    },

    /// Make an installed version the active one
    #[command(name = "use")]
    Use {
        version: String,
    },

    /// Delete an installed version
    Remove {
        version: String,
    },

    /// List installed versions, or available ones with --remote
    List {
        #[arg(short, long)]
        remote: bool,

        #[arg(long, action = ArgAction::SetTrue)]
        refresh: bool,
    },
}
