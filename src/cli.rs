use clap::{Parser, Subcommand};

/// catalogd — versioned listings catalog API
#[derive(Parser)]
#[command(name = "catalogd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server
    Serve {
        /// Port to bind (overrides CATALOG_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Grant permissions to an existing user
    Grant {
        #[arg(long)]
        email: String,
        /// Permission codes, e.g. listings:write
        #[arg(long, value_delimiter = ',')]
        permissions: Vec<String>,
    },

    /// Run pending database migrations and exit
    Migrate,
}
