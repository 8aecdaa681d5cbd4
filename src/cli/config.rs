use crate::config::generate::generate_starter_config;
use crate::config::{system_config_path, user_config_path};
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Prefer the user config location, falling back to /etc
    let config_path = match user_config_path() {
        Some(user_config) => match user_config.parent().map(fs::create_dir_all) {
            Some(Err(e)) => {
                eprintln!("Warning: Could not create directory for {}: {}", user_config.display(), e);
                eprintln!("Falling back to {}", system_config_path().display());
                system_config_path()
            }
            _ => user_config,
        },
        None => system_config_path(),
    };

    write_new_config(&config_content, config_path)
}

fn write_new_config(config_content: &str, config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}; remove it first or use --stdout",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}
