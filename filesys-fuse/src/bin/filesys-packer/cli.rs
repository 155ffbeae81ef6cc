use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an image and lay out an empty volume on it
    Format {
        #[command(flatten)]
        image: Image,

        /// Volume size in 512-byte sectors
        #[arg(long, short = 'n', default_value_t = 16 * 2048)]
        sectors: u32,
    },

    /// Copy a host file into a new inode and print its sector
    Pack {
        #[command(flatten)]
        image: Image,

        /// Host file to copy
        #[arg(long, short)]
        source: PathBuf,
    },

    /// Write the contents of an inode to stdout
    Cat {
        #[command(flatten)]
        image: Image,

        #[arg(long)]
        sector: u32,
    },

    /// Remove an inode and free its sectors
    Rm {
        #[command(flatten)]
        image: Image,

        #[arg(long)]
        sector: u32,
    },
}

#[derive(Args)]
pub struct Image {
    /// Volume image path
    #[arg(long, short)]
    pub image: PathBuf,
}
