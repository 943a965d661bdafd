use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::ArgGroup;
use fp_bundle::{PoolDescriptor, RpcSource};
use fp_common::parsers::{parse_height, parse_url};
use serde::{Deserialize, Serialize};
use url::Url;

pub const CHAIN_ID_MAINNET: &str = "kyve-1";
pub const CHAIN_ID_KAON: &str = "kaon-1";
pub const CHAIN_ID_KORELLIA: &str = "korellia-2";

const DEFAULT_CHANNEL_CAPACITY: usize = 100;

fn default_chain_id() -> String {
    CHAIN_ID_MAINNET.into()
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// Fastsync: streams historical blocks from the KYVE bundle archive, or from an archival rpc node, into a local
/// block store.
#[derive(Clone, Debug, clap::Parser, Deserialize, Serialize)]
#[clap(group(ArgGroup::new("block_source").args(&["block_pool_id", "block_rpc"]).multiple(false)))]
pub struct RunCmd {
    /// Home directory of the local node. Must contain `config/genesis.json`.
    #[arg(env = "FASTSYNC_HOME", long, value_name = "PATH")]
    pub home: Option<PathBuf>,

    /// KYVE chain id, selects the default chain rest endpoint.
    #[arg(env = "FASTSYNC_CHAIN_ID", long, value_name = "CHAIN ID", default_value = CHAIN_ID_MAINNET)]
    #[serde(default = "default_chain_id")]
    pub chain_id: String,

    /// Rest endpoint of the KYVE chain, overriding the default for `--chain-id`.
    #[clap(env = "FASTSYNC_CHAIN_REST", long, value_parser = parse_url, value_name = "URL")]
    pub chain_rest: Option<Url>,

    /// Storage endpoint used to download bundle payloads. Defaults to the gateway of each bundle's storage
    /// provider.
    #[clap(env = "FASTSYNC_STORAGE_REST", long, value_parser = parse_url, value_name = "URL")]
    pub storage_rest: Option<Url>,

    /// Id of the KYVE pool archiving the blocks to sync.
    #[arg(env = "FASTSYNC_BLOCK_POOL_ID", long, value_name = "POOL ID", group = "block_source")]
    pub block_pool_id: Option<u64>,

    /// Archival rpc node to fetch blocks from, instead of the bundle archive.
    #[clap(env = "FASTSYNC_BLOCK_RPC", long, value_parser = parse_url, value_name = "URL", group = "block_source")]
    pub block_rpc: Option<Url>,

    /// Pause between two block requests to `--block-rpc`, in milliseconds.
    #[arg(env = "FASTSYNC_BLOCK_RPC_REQ_TIMEOUT", long, value_name = "MILLISECONDS", default_value_t = 0)]
    #[serde(default)]
    pub block_rpc_req_timeout: u64,

    /// Last height to sync, inclusive. 0 follows the chain without bound.
    #[arg(env = "FASTSYNC_TARGET_HEIGHT", long, value_name = "BLOCK NUMBER", value_parser = parse_height, default_value_t = 0)]
    #[serde(default)]
    pub target_height: u64,

    /// Exit once the archive has no more blocks, instead of waiting for new ones. Implied by `--target-height`.
    #[arg(env = "FASTSYNC_STOP_ON_SYNC", long)]
    #[serde(default)]
    pub stop_on_sync: bool,

    /// Name of the chain being synced. Defaults to the chain id of the local genesis.
    #[arg(env = "FASTSYNC_SOURCE", long, value_name = "NAME")]
    pub source: Option<String>,

    /// Accept invalid TLS certificates from `--block-rpc` when probing it.
    #[arg(env = "FASTSYNC_SKIP_TLS_VERIFICATION", long)]
    #[serde(default)]
    pub skip_tls_verification: bool,

    /// Blocks buffered between the download and the local store.
    #[arg(env = "FASTSYNC_CHANNEL_CAPACITY", long, value_name = "BLOCKS", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Load the arguments from a toml, json or yaml file instead of the command line.
    #[arg(env = "FASTSYNC_CONFIG_FILE", long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

impl RunCmd {
    /// Checks what clap cannot when the arguments come from a config file.
    pub fn check_mode(&self) -> anyhow::Result<()> {
        if self.home.is_none() {
            bail!("Missing home directory, set it with `--home <PATH>`");
        }
        match (self.block_pool_id, &self.block_rpc) {
            (Some(_), Some(_)) => bail!("`--block-pool-id` and `--block-rpc` cannot be used together"),
            (None, None) => bail!("No block source, set one with `--block-pool-id <POOL ID>` or `--block-rpc <URL>`"),
            _ => Ok(()),
        }
    }

    pub fn home(&self) -> anyhow::Result<&PathBuf> {
        self.home.as_ref().context("Missing home directory")
    }

    pub fn pool(&self) -> Option<PoolDescriptor> {
        self.block_pool_id.map(PoolDescriptor::new)
    }

    pub fn rpc_source(&self) -> Option<RpcSource> {
        self.block_rpc
            .clone()
            .map(|endpoint| RpcSource::new(endpoint, Duration::from_millis(self.block_rpc_req_timeout)))
    }

    pub fn must_exit(&self) -> bool {
        self.stop_on_sync || self.target_height > 0
    }

    /// Chain rest endpoint, falling back to the public endpoint of `--chain-id`.
    pub fn chain_rest(&self) -> anyhow::Result<Url> {
        if let Some(url) = &self.chain_rest {
            return Ok(url.clone());
        }
        let default = match self.chain_id.as_str() {
            CHAIN_ID_MAINNET => "https://api.kyve.network",
            CHAIN_ID_KAON => "https://api.kaon.kyve.network",
            CHAIN_ID_KORELLIA => "https://api.korellia.kyve.network",
            other => bail!("No default rest endpoint for chain id `{other}`, set one with `--chain-rest <URL>`"),
        };
        Ok(parse_url(default)?)
    }
}
