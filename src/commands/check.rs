//! `disks check` - validate the configuration and build every disk.

use std::path::Path;

use anyhow::{Context, Result, bail};
use disks::{DiskManager, DisksConfig};

/// Execute the check command.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = DisksConfig::load_from(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // Warnings are logged by the manager
    let warnings = config.validate()?.warnings.len();
    let names: Vec<String> = config.names().map(str::to_string).collect();
    let manager = DiskManager::new(config)?;

    let mut failed = 0usize;
    for name in &names {
        match manager.disk(name) {
            Ok(_) => println!("ok      {name}"),
            Err(e) => {
                failed += 1;
                println!("failed  {name}: {e}");
            },
        }
    }

    if failed > 0 {
        bail!("{failed} of {} disks failed to build", names.len());
    }

    println!(
        "\n{} disks configured in {} ({warnings} warnings)",
        names.len(),
        config_path.display()
    );
    Ok(())
}
