use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    modforge::run(modforge::Cli::parse()).await
}
