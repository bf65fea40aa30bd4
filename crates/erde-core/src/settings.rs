use erde_chain::{Address, types::parse_checksummed_address};
use serde::{Deserialize, Serialize};

/// Where persisted artifacts are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// S3-compatible storage (AWS S3, MinIO, etc).
    S3,
    /// Local filesystem storage.
    LocalFile,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::LocalFile
    }
}

/// AWS configuration, required when `storage_backend == S3`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsSettings {
    /// Environment variable: `ERDE__AWS__REGION`
    pub region: String,
    /// Environment variable: `ERDE__AWS__BUCKET`
    pub bucket: String,
    /// Environment variable: `ERDE__AWS__ACCESS_KEY_ID`
    pub access_key_id: String,
    /// Environment variable: `ERDE__AWS__SECRET_ACCESS_KEY`
    pub secret_access_key: String,
    /// Custom S3 endpoint for MinIO / S3-compatible services.
    /// Environment variable: `ERDE__AWS__ENDPOINT`
    pub endpoint: Option<String>,
}

/// Artifact filenames under `output_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactFilenames {
    pub snapshot_csv: String,
    pub weights_csv: String,
    pub rewards_csv: String,
    pub merkle_json: String,
    pub summary_txt: String,
}

impl Default for ArtifactFilenames {
    fn default() -> Self {
        Self {
            snapshot_csv: "snapshot.csv".to_string(),
            weights_csv: "weights.csv".to_string(),
            rewards_csv: "rewards.csv".to_string(),
            merkle_json: "merkle.json".to_string(),
            summary_txt: "summary.txt".to_string(),
        }
    }
}

/// Every configuration knob the pipeline needs, plus a small set of
/// additions beyond the minimal surface (aggregator concurrency, submitter
/// confirmation count, and the treasury address the residual policy needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// `RPC_URL` — endpoint for reads/writes.
    pub rpc_url: String,

    /// `USDP_VAULT`
    pub vault: String,
    /// `STABILITY_POOL`
    pub stability_pool: String,
    /// `REWARD_DISTRIBUTOR`
    pub reward_distributor: String,
    /// `EMISSION_MANAGER`
    pub emission_manager: String,
    /// `LP_TOKENS` — list of configured LP pool token addresses.
    pub lp_tokens: Vec<String>,

    /// `SNAPSHOT_BLOCK_RANGE` — `endBlock - startBlock` for the epoch
    /// window. Default 7,200 (~1 epoch on a 3s chain).
    #[serde(default = "default_block_range")]
    pub snapshot_block_range: u64,

    /// `OUTPUT_DIR`
    pub output_dir: String,
    #[serde(default)]
    pub filenames: ArtifactFilenames,

    /// `MAX_REWARD_DEVIATION` — warning threshold on utilization.
    #[serde(default = "default_max_reward_deviation")]
    pub max_reward_deviation: f64,

    /// `ADMIN_PRIVATE_KEY` — signing capability for the submitter. Never
    /// logged or serialized back out.
    pub admin_private_key: String,

    /// `FORCE_UPDATE` — allow submitting over an existing non-zero root.
    #[serde(default)]
    pub force_update: bool,

    /// The protocol treasury address the residual (§4.E rounding leftover)
    /// is attributed to. Required because the reference residual policy
    /// (fold `Σ r_c` into a treasury record) needs a destination.
    pub treasury_address: String,

    /// Snapshot aggregator fan-out bound (default 8).
    #[serde(default = "default_concurrency")]
    pub aggregator_concurrency: usize,

    /// Confirmations the submitter waits for after broadcasting
    /// `setMerkleRoot` (contract correctness boundary is one, operational
    /// policy may want more).
    #[serde(default = "default_confirmations")]
    pub submitter_confirmations: usize,

    pub storage_backend: StorageBackend,
    pub aws: Option<AwsSettings>,
}

fn default_block_range() -> u64 {
    7_200
}

fn default_max_reward_deviation() -> f64 {
    0.01
}

fn default_concurrency() -> usize {
    8
}

fn default_confirmations() -> usize {
    1
}

impl Settings {
    /// Loads configuration layered as: defaults < config file(s) <
    /// `.env` (via `dotenvy`) < process environment, all under the
    /// `ERDE__` prefix with `__` as the nesting separator.
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name("erde").required(false))
            .add_source(
                config::Environment::with_prefix("ERDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = settings.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Re-asserts the checksum/format constraints every address argument
    /// must satisfy, and that the LP pool list is well-formed.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("vault", &self.vault),
            ("stability_pool", &self.stability_pool),
            ("reward_distributor", &self.reward_distributor),
            ("emission_manager", &self.emission_manager),
            ("treasury_address", &self.treasury_address),
        ] {
            parse_checksummed_address(value)
                .map_err(|e| anyhow::anyhow!("config field `{field}` is not valid: {e}"))?;
        }
        for (i, pool) in self.lp_tokens.iter().enumerate() {
            parse_checksummed_address(pool)
                .map_err(|e| anyhow::anyhow!("lp_tokens[{i}] is not valid: {e}"))?;
        }
        if self.storage_backend == StorageBackend::S3 && self.aws.is_none() {
            anyhow::bail!("storage_backend = s3 requires an [aws] section");
        }
        Ok(())
    }

    pub fn vault_address(&self) -> Address {
        parse_checksummed_address(&self.vault).expect("validated at load time")
    }

    pub fn stability_pool_address(&self) -> Address {
        parse_checksummed_address(&self.stability_pool).expect("validated at load time")
    }

    pub fn reward_distributor_address(&self) -> Address {
        parse_checksummed_address(&self.reward_distributor).expect("validated at load time")
    }

    pub fn emission_manager_address(&self) -> Address {
        parse_checksummed_address(&self.emission_manager).expect("validated at load time")
    }

    pub fn treasury(&self) -> Address {
        parse_checksummed_address(&self.treasury_address).expect("validated at load time")
    }

    pub fn lp_token_addresses(&self) -> Vec<Address> {
        self.lp_tokens
            .iter()
            .map(|p| parse_checksummed_address(p).expect("validated at load time"))
            .collect()
    }

    /// The secp256k1 key behind `admin_private_key`. The submitter signs
    /// `setMerkleRoot` locally with this key and derives its own address
    /// from it, checked against the distributor's owner before every submit.
    pub fn signer_secret_key(&self) -> anyhow::Result<erde_chain::secp256k1::SecretKey> {
        erde_chain::secret_key_from_private_key(&self.admin_private_key)
            .map_err(|e| anyhow::anyhow!("admin_private_key is invalid: {e}"))
    }
}
