use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Supervise an app server, front server, and log pipeline as one stack", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Session configuration file
    #[arg(short, long, default_value = "stackctl.json")]
    pub config: PathBuf,

    /// Validate the configuration (units and log globs) and exit
    #[arg(long)]
    pub check: bool,
}
