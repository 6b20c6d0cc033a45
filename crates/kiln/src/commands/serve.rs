//! Dev server command.

use anyhow::Result;
use kiln_core::ReloadBus;
use kiln_server::{DevServer, DevServerConfig};

use super::Project;

/// Serve the source root until Ctrl-C.
pub async fn run(project: &Project, port: Option<u16>, open: bool) -> Result<()> {
    let root = &project.layout.root;
    if !root.exists() {
        anyhow::bail!(
            "Source directory not found: {}. Run 'kiln init' first.",
            root.display()
        );
    }

    let mut config = DevServerConfig::from_config(root, &project.config.server);
    if let Some(port) = port {
        config.port = port;
    }
    config.open = config.open && open;

    DevServer::new(config, ReloadBus::new()).start().await?;

    Ok(())
}
