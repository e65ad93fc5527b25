use super::{CliError, EXIT_SUCCESS};
use atelier_core::CoreError;
use clap::CommandFactory;
use std::path::Path;

pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, CliError> {
    std::fs::create_dir_all(dir).map_err(CoreError::Io)?;
    let cmd = C::command();
    let man = clap_mangen::Man::new(cmd.clone());
    let mut buf = Vec::new();
    man.render(&mut buf).map_err(CoreError::Io)?;
    std::fs::write(dir.join("atelier.1"), &buf).map_err(CoreError::Io)?;
    for sub in cmd.get_subcommands() {
        let man = clap_mangen::Man::new(sub.clone());
        let mut buf = Vec::new();
        man.render(&mut buf).map_err(CoreError::Io)?;
        let path = dir.join(format!("atelier-{}.1", sub.get_name()));
        std::fs::write(&path, &buf).map_err(CoreError::Io)?;
    }
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}
