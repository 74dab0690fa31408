use std::path::Path;

use ca_core::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    Show,
    Path,
    Reset,
}

/// Run the `config` subcommand against the file at `path`.
pub fn run(config: &Config, path: &Path, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => println!("{}", config.to_json()?),
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Reset => {
            let mut fresh = config.clone();
            fresh.reset_to_defaults();
            fresh.save_to(path)?;
            println!("Configuration reset: {}", path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_writes_defaults_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut custom = Config::default();
        custom.buffers.output_lines = 42;
        custom.save_to(&path).unwrap();

        run(&custom, &path, ConfigAction::Reset).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
        assert!(dir.path().join("config.json.bak").exists());
    }

    #[test]
    fn show_and_path_do_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        run(&Config::default(), &path, ConfigAction::Show).unwrap();
        run(&Config::default(), &path, ConfigAction::Path).unwrap();
        assert!(!path.exists());
    }
}
