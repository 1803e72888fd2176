//! Show or initialize the engine configuration.

use std::path::Path;

use clap::Args;
use patchcord_config::EngineConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Print only the configuration file path
    #[arg(long)]
    path: bool,

    /// Write the default configuration to the config path
    #[arg(long)]
    write_default: bool,

    /// Overwrite an existing file with --write-default
    #[arg(long, requires = "write_default")]
    force: bool,
}

pub fn run(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    if args.path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if args.write_default {
        if config_path.exists() && !args.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }
        EngineConfig::default().save(config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let config = EngineConfig::load_or_default(config_path)?;
    if config_path.exists() {
        println!("# {}", config_path.display());
    } else {
        println!("# {} (not found, showing defaults)", config_path.display());
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
