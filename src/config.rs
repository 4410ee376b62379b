//! Endpoint configuration, read from flags or the environment.

use clap::Args;

use crate::common::types::RemoteNode;

pub const DEFAULT_LOCAL_AE_TITLE: &str = "DVTK_MW_SCU";
pub const DEFAULT_LOCAL_PORT: u16 = 11112;
pub const DEFAULT_REMOTE_AE_TITLE: &str = "DVTK_MW_SCP";
pub const DEFAULT_REMOTE_HOST: &str = "localhost";
pub const DEFAULT_REMOTE_PORT: u16 = 107;

/// Storage provider the sender pushes to when no destination is given.
pub const DEFAULT_STORE_HOST: &str = "localhost";
pub const DEFAULT_STORE_PORT: u16 = 11112;
pub const DEFAULT_STORE_AE_TITLE: &str = "MYSTORE";

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct EmulatorConfig {
    /// Local AE title (clamped to 16 characters when an association is opened)
    #[arg(long = "local-ae", env = "LOCAL_AE_TITLE", default_value = DEFAULT_LOCAL_AE_TITLE)]
    pub local_ae_title: String,

    /// Local listen port
    #[arg(long, env = "LOCAL_PORT", default_value_t = DEFAULT_LOCAL_PORT)]
    pub local_port: u16,

    /// Remote AE title
    #[arg(long = "remote-ae", env = "REMOTE_AE_TITLE", default_value = DEFAULT_REMOTE_AE_TITLE)]
    pub remote_ae_title: String,

    /// Remote host name or address
    #[arg(long, env = "REMOTE_HOST", default_value = DEFAULT_REMOTE_HOST)]
    pub remote_host: String,

    /// Remote port
    #[arg(long, env = "REMOTE_PORT", default_value_t = DEFAULT_REMOTE_PORT)]
    pub remote_port: u16,
}

impl EmulatorConfig {
    pub fn remote_node(&self) -> RemoteNode {
        RemoteNode::new(
            self.remote_host.clone(),
            self.remote_port,
            self.remote_ae_title.clone(),
        )
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            local_ae_title: DEFAULT_LOCAL_AE_TITLE.to_string(),
            local_port: DEFAULT_LOCAL_PORT,
            remote_ae_title: DEFAULT_REMOTE_AE_TITLE.to_string(),
            remote_host: DEFAULT_REMOTE_HOST.to_string(),
            remote_port: DEFAULT_REMOTE_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        config: EmulatorConfig,
    }

    #[test]
    fn test_flags_override() {
        let cli = Cli::try_parse_from([
            "test",
            "--remote-host",
            "10.1.2.3",
            "--remote-port",
            "4242",
            "--remote-ae",
            "RIS",
            "--local-ae",
            "A_TITLE_LONGER_THAN_SIXTEEN",
        ])
        .unwrap();

        let node = cli.config.remote_node();
        assert_eq!(node.to_string(), "RIS@10.1.2.3:4242");
        // no clamp at load time
        assert_eq!(cli.config.local_ae_title, "A_TITLE_LONGER_THAN_SIXTEEN");
    }

    #[test]
    fn test_port_must_be_numeric() {
        assert!(Cli::try_parse_from(["test", "--remote-port", "ris"]).is_err());
    }

    #[test]
    fn test_default_node() {
        let config = EmulatorConfig::default();
        assert_eq!(config.remote_node().to_string(), "DVTK_MW_SCP@localhost:107");
        assert_eq!(config.local_port, 11112);
    }
}
