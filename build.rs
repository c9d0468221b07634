//! Build script that renders man pages from the clap parser: `crunchvm.1`
//! for the binary and `crunchvm-<subcommand>.1` for each subcommand.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(man: &Man, page: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    fs::write(page, buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let man_dir = env::var_os("OUT_DIR").map(PathBuf::from).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
    })?;

    let root = Cli::command();
    for sub in root.get_subcommands() {
        let name = format!("crunchvm-{}", sub.get_name());
        let page = man_dir.join(format!("{name}.1"));
        render(&Man::new(sub.clone()).title(name.to_uppercase()), &page)?;
    }
    render(&Man::new(root), &man_dir.join("crunchvm.1"))
}
