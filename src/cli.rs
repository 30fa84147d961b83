use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::registry::{RegistrySource, SourceSelection};

#[derive(Parser, Debug)]
#[clap(
    name = "modforge",
    about = "Download, reconcile and package Minecraft server mods",
    version
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Command>,

    /// Reset download progress before running
    #[clap(long)]
    pub reset: bool,

    /// Ignore cache and progress, download everything again
    #[clap(long, global = true)]
    pub force: bool,

    /// Download only this category
    #[clap(long)]
    pub category: Option<String>,

    /// Only reconcile the mods directory and write the profile
    #[clap(long)]
    pub clean: bool,

    /// Only build the client pack
    #[clap(long)]
    pub client: bool,

    /// Download mods, then build the client pack
    #[clap(long)]
    pub all: bool,

    /// Install from the profile instead of categories
    #[clap(long)]
    pub profile: bool,

    /// Profile file inside the profiles directory
    #[clap(long)]
    pub profile_name: Option<String>,

    /// Configuration file (defaults to the user config directory)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search the registries and print the hits
    Search {
        query: String,
        #[clap(long, value_enum)]
        source: Option<SourceSelection>,
        #[clap(long, default_value_t = 10)]
        limit: usize,
        /// Install the hits into the mods directory
        #[clap(long)]
        download: bool,
    },
    /// Install one project by registry id
    DownloadId {
        id: String,
        #[clap(long, value_enum, default_value_t = RegistrySource::Modrinth)]
        source: RegistrySource,
        /// Release id or version number instead of the newest
        #[clap(long = "mod-version")]
        version: Option<String>,
    },
}
