use {
    clap::{Parser, Subcommand},
    sealdrop_protocol::{BucketId, FolderId, ObjectIndex},
    std::path::PathBuf,
};

/// Encrypts files and uploads them to a sealdrop server.
#[derive(Debug, Parser)]
pub struct Cli {
    /// Path to the config file. Defaults to `sealdrop.json5` in the user's config dir.
    #[clap(long)]
    pub config: Option<PathBuf>,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Encrypt and upload a file, then register it in the catalog.
    Upload {
        path: PathBuf,
        /// Catalog folder to put the file into.
        #[arg(long, default_value_t = FolderId(0))]
        folder: FolderId,
    },
    /// Decrypt a downloaded object.
    Decrypt {
        encrypted: PathBuf,
        output: PathBuf,
        /// Object index printed by `upload`.
        #[arg(long)]
        index: ObjectIndex,
        /// Bucket of the object. Defaults to the configured bucket.
        #[arg(long)]
        bucket: Option<BucketId>,
    },
}
