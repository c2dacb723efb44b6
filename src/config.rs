use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::capture::CaptureConfig;
use crate::engine::pipeline::StageKind;
use crate::error::ConfigError;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub decode: DecodeConfig,

    #[serde(default)]
    pub queues: QueueConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    /// Pipeline description, in declaration order (upstream first)
    #[serde(default = "default_stages", rename = "stage")]
    pub stages: Vec<StageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            decode: DecodeConfig::default(),
            queues: QueueConfig::default(),
            capture: CaptureConfig::default(),
            stages: default_stages(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/crmonban/ingest.toml"),
            PathBuf::from("ingest.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Structural checks on the pipeline description.
    ///
    /// Reader/writer balance is not checked here; that is the topology
    /// validator's job once the queues exist.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.decode.max_tunnel_depth == 0 {
            return Err(ConfigError::ZeroTunnelDepth);
        }

        let mut captures = 0;
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::EmptyStageName(idx));
            }
            let kind = stage.kind.name();
            match stage.kind {
                StageKind::Capture => {
                    captures += 1;
                    if stage.input.is_some() {
                        return Err(ConfigError::UnexpectedInput(stage.name.clone(), kind));
                    }
                }
                _ => {
                    if stage.input.is_none() {
                        return Err(ConfigError::MissingInput(stage.name.clone(), kind));
                    }
                }
            }
            match stage.kind {
                StageKind::Release => {
                    if !stage.outputs.is_empty() {
                        return Err(ConfigError::UnexpectedOutputs(stage.name.clone(), kind));
                    }
                }
                _ => {
                    if stage.outputs.is_empty() {
                        return Err(ConfigError::MissingOutputs(stage.name.clone(), kind));
                    }
                }
            }
        }

        match captures {
            0 => Err(ConfigError::NoCapture),
            1 => Ok(()),
            _ => Err(ConfigError::MultipleCaptures),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    /// Maximum tunnel nesting below a root packet
    #[serde(default = "default_max_tunnel_depth")]
    pub max_tunnel_depth: u8,

    #[serde(default)]
    pub teredo: TeredoConfig,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_tunnel_depth: default_max_tunnel_depth(),
            teredo: TeredoConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeredoConfig {
    /// Try Teredo decapsulation on UDP payloads
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Restrict detection to these UDP ports (empty = every UDP payload)
    #[serde(default)]
    pub ports: Vec<u16>,
}

impl Default for TeredoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ports: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Refuse to create two queues with the same name
    #[serde(default = "default_true")]
    pub reject_duplicate_names: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_names: true,
        }
    }
}

/// One stage of the pipeline description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub kind: StageKind,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl StageConfig {
    pub fn new(name: &str, kind: StageKind, input: Option<&str>, outputs: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            input: input.map(str::to_string),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// capture -> "decode-in" -> decode -> "release-in" -> release
fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::new("capture", StageKind::Capture, None, &["decode-in"]),
        StageConfig::new("decode", StageKind::Decode, Some("decode-in"), &["release-in"]),
        StageConfig::new("release", StageKind::Release, Some("release-in"), &[]),
    ]
}

fn default_true() -> bool {
    true
}

fn default_max_tunnel_depth() -> u8 {
    4
}
