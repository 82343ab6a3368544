//! Init command implementation

use crate::archive::Archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::setup::{default_configurators, Setup};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Write a default config, create the directories, database and setup file
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;

    config.save()?;
    config.ensure_dirs()?;

    let archive = Archive::connect(&config).await?;
    archive.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    let mut setup = Setup::open(&config.paths.setup_file, &default_configurators())?;
    if !config.paths.setup_file.exists() {
        let data = setup.data().clone();
        setup.append(data)?;
        info!("Wrote setup defaults to {:?}", config.paths.setup_file);
    }

    Ok(config)
}
