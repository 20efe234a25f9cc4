// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .default_value("/etc/pubsync/pubsync.toml")
        .help("Path to the configuration file")
}

fn build_cli() -> Command {
    Command::new("pubsync")
        .version(env!("CARGO_PKG_VERSION"))
        .author("pubsync Contributors")
        .about("Publish packages from an artifact store to software repositories")
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("sync")
                .about("Publish new packages from the store to a backend")
                .arg(
                    Arg::new("backend")
                        .required(true)
                        .value_parser(["dir", "cvmfs", "packman", "rpm"])
                        .help("Destination backend"),
                )
                .arg(config_arg())
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Log what would be done without changing anything"),
                )
                .arg(
                    Arg::new("abort_at_start")
                        .long("abort-at-start")
                        .action(ArgAction::SetTrue)
                        .help("Abort a transaction left open by an earlier run first"),
                ),
        )
        .subcommand(
            Command::new("test-rules")
                .about("Check rules against a table of expected results")
                .arg(Arg::new("table").required(true).help("Expectation table (TOML)"))
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("remove-orphans")
                .about("List RPMs that no marked package needs")
                .arg(Arg::new("dir").default_value(".").help("Directory containing the RPMs"))
                .arg(
                    Arg::new("do_delete")
                        .long("do-delete")
                        .action(ArgAction::SetTrue)
                        .help("Delete orphans instead of printing rm commands"),
                )
                .arg(
                    Arg::new("marker")
                        .long("marker")
                        .default_value("O2")
                        .help("Keep RPMs whose file name contains this marker"),
                )
                .arg(
                    Arg::new("rpm_arch")
                        .long("rpm-arch")
                        .default_value("x86_64")
                        .help("Architecture suffix of the RPM files"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pubsync.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
