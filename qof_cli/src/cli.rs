use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Store, fetch and remove files on local disk, COS or OSS", long_about = None)]
pub struct Cli {
    /// Configuration file; `qof.toml` in the working directory otherwise
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// JSON document holding the file records
    #[arg(long, global = true, value_name = "FILE", default_value = "qof-catalog.json")]
    pub catalog: PathBuf,

    /// Storage mode: local, cos or oss
    #[arg(short, long, global = true, default_value = "local")]
    pub mode: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a local file and print its record
    Upload {
        #[arg(required = true)]
        path: PathBuf,

        /// Logical directory, e.g. /2025/06
        #[arg(short, long, default_value = "")]
        dir: String,

        /// Storage station; the mode's default station otherwise
        #[arg(short, long)]
        station: Option<String>,

        /// Declared MIME type; guessed from the extension otherwise
        #[arg(short = 't', long = "type")]
        file_type: Option<String>,

        /// Owner id; makes the file private
        #[arg(short, long)]
        owner: Option<i64>,

        #[arg(short, long)]
        label: Option<String>,
    },
    /// Write a stored file to disk
    #[command(visible_alias = "get")]
    Download {
        file_id: i64,

        #[arg(short, long, value_name = "PATH")]
        out: PathBuf,

        /// Owner id presented for private files
        #[arg(long)]
        as_owner: Option<i64>,
    },
    /// Like download, limited to the preview types
    Preview {
        file_id: i64,

        #[arg(short, long, value_name = "PATH")]
        out: PathBuf,

        #[arg(long)]
        as_owner: Option<i64>,
    },
    /// Remove a stored file and its record
    #[command(visible_alias = "rm")]
    Delete { file_id: i64 },
    /// Print the records in the catalog
    #[command(visible_alias = "ls")]
    List,
    /// Print the configured stations of the selected mode
    Stations,
}
