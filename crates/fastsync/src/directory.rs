//! Block store backed by a node home directory.
//!
//! ```text
//! <home>/config/genesis.json      chain id and initial height
//! <home>/data/blocks/<height>.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context};
use fc_block_sync::ConsumingEngine;
use fp_bundle::DataItem;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};

#[serde_as]
#[derive(Debug, Deserialize)]
struct Genesis {
    chain_id: String,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default = "default_initial_height")]
    initial_height: u64,
}

fn default_initial_height() -> u64 {
    1
}

pub struct DirectoryEngine {
    blocks_dir: PathBuf,
    chain_id: String,
    next_height: u64,
}

impl DirectoryEngine {
    /// Opens the store in `home`, resuming one past the highest stored block.
    pub fn open(home: &Path) -> anyhow::Result<Self> {
        let genesis_path = home.join("config").join("genesis.json");
        let genesis = std::fs::read(&genesis_path)
            .with_context(|| format!("Reading genesis file at {}", genesis_path.display()))?;
        let genesis: Genesis = serde_json::from_slice(&genesis)
            .with_context(|| format!("Parsing genesis file at {}", genesis_path.display()))?;

        let blocks_dir = home.join("data").join("blocks");
        std::fs::create_dir_all(&blocks_dir)
            .with_context(|| format!("Creating block directory at {}", blocks_dir.display()))?;

        let latest = Self::latest_stored(&blocks_dir)?;
        // Height 0 does not exist in a tendermint chain.
        let next_height = latest.map_or(genesis.initial_height.max(1), |height| height + 1);
        tracing::debug!(
            "Opened block store at {} for chain {}, latest stored block is {:?}",
            blocks_dir.display(),
            genesis.chain_id,
            latest
        );

        Ok(Self { blocks_dir, chain_id: genesis.chain_id, next_height })
    }

    fn latest_stored(blocks_dir: &Path) -> anyhow::Result<Option<u64>> {
        let mut latest = None;
        for entry in std::fs::read_dir(blocks_dir).with_context(|| format!("Listing {}", blocks_dir.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let height = path.file_stem().and_then(|stem| stem.to_str()).and_then(|stem| stem.parse::<u64>().ok());
                latest = latest.max(height);
            }
        }
        Ok(latest)
    }

    pub fn block_path(&self, height: u64) -> PathBuf {
        self.blocks_dir.join(format!("{height}.json"))
    }
}

#[async_trait::async_trait]
impl ConsumingEngine for DirectoryEngine {
    fn chain_id(&self) -> anyhow::Result<String> {
        Ok(self.chain_id.clone())
    }

    fn next_height(&self) -> anyhow::Result<u64> {
        Ok(self.next_height)
    }

    async fn apply_item(&mut self, item: DataItem) -> anyhow::Result<()> {
        let height = item.height()?;
        ensure!(height == self.next_height, "Expected block {}, got block {height}", self.next_height);

        // Written aside then renamed, a block file is either complete or absent.
        let path = self.block_path(height);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &item.value).await.with_context(|| format!("Writing {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &path).await.with_context(|| format!("Moving block to {}", path.display()))?;

        self.next_height = height + 1;
        Ok(())
    }
}
