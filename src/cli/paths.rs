//! CLI subcommand: `modelchat paths`
//!
//! Prints every resolved file location for debugging and scripting.

use anyhow::Result;

use modelchat::paths::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    println!("ModelChat Paths");
    println!("===============");
    println!();
    println!("Plugin:     {}", paths.plugin_dir.display());
    println!("  config.yml:      {}", paths.config_file().display());
    println!("  data.json:       {}", paths.data_file().display());
    println!("  data lock:       {}", paths.data_lock().display());
    println!("  mcp_config.json: {}", paths.mcp_config_file().display());
    println!();
    println!("Cache:      {}", paths.cache_dir.display());
    println!("  history:         {}", paths.history_file().display());

    Ok(())
}
