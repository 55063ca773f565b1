use {
    anyhow::{Context as _, Result, anyhow, ensure},
    byte_unit::Byte,
    derivative::Derivative,
    sealdrop_protocol::{AccessToken, BucketId, SharedSecret},
    sealdrop_sdk::ProgressWeights,
    serde::{Deserialize, Serialize},
    std::{path::PathBuf, time::Duration},
    url::Url,
};

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug)]
pub struct Config {
    pub server_url: Url,
    pub bucket: BucketId,
    #[derivative(Debug = "ignore")]
    pub shared_secret: SharedSecret,
    #[derivative(Debug = "ignore")]
    pub access_token: AccessToken,

    #[serde(default = "default_transfer_weight")]
    pub transfer_weight: u8,
    #[serde(default)]
    pub preparing_weight: u8,
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default = "default_warn_about_files_larger_than")]
    pub warn_about_files_larger_than: Byte,
}

impl Config {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let config: Self = json5::from_str(&fs_err::read_to_string(&path)?)
            .with_context(|| format!("failed to parse config {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.bucket.validate()?;
        ensure!(!self.shared_secret.is_empty(), "`shared_secret` is empty");
        self.progress_weights()?;
        Ok(())
    }

    pub fn progress_weights(&self) -> Result<ProgressWeights> {
        ProgressWeights::new(self.preparing_weight, self.transfer_weight)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| anyhow!("cannot find config dir"))?;
    Ok(config_dir.join("sealdrop.json5"))
}

fn default_transfer_weight() -> u8 {
    ProgressWeights::default().transfer()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_filter() -> String {
    "info".into()
}

fn default_warn_about_files_larger_than() -> Byte {
    Byte::from_u64(2 * 1024 * 1024 * 1024)
}
