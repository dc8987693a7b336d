use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use twinframe_contracts::config::non_empty_env;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";
pub const DEFAULT_STORAGE_DIR: &str = "twinframe_data";

#[derive(Debug, Parser)]
#[command(
    name = "twinframe-server",
    version,
    about = "Upload endpoint and download proxy for Twinframe"
)]
pub struct ServerArgs {
    /// Address to listen on [env: TWINFRAME_BIND]
    #[arg(long)]
    pub bind: Option<String>,
    /// Directory uploaded objects are written to [env: TWINFRAME_STORAGE_DIR]
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,
    /// Base of the URLs handed back for stored objects [env: TWINFRAME_PUBLIC_URL]
    #[arg(long)]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub storage_dir: PathBuf,
    pub public_url: String,
}

impl ServerConfig {
    /// Flags win over the environment, which wins over defaults.
    pub fn resolve<F>(args: ServerArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = args
            .bind
            .or_else(|| lookup("TWINFRAME_BIND"))
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind}"))?;
        let storage_dir = args
            .storage_dir
            .or_else(|| lookup("TWINFRAME_STORAGE_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
        let public_url = args
            .public_url
            .or_else(|| lookup("TWINFRAME_PUBLIC_URL"))
            .unwrap_or_else(|| format!("http://{bind}"));
        Ok(Self {
            bind,
            storage_dir,
            public_url,
        })
    }

    pub fn from_args(args: ServerArgs) -> Result<Self> {
        Self::resolve(args, non_empty_env)
    }
}
