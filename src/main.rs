//! Thin CLI layer: parse args, styled output, and call into nori-core.
//! Crash-proof: panic caught and reported; all errors return Result.

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nori_core::{
    DependencyOutcome, HttpRegistryClient, InstallOutcome, InstallReport, InstallRequest,
    InstallRoot, PackageSpec, Registries, RegistryEndpoint, VersionListing,
};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Run `f` on this thread; in quiet mode show a spinner until it returns.
fn run_with_spinner<T, F>(message: &str, quiet: bool, f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String>,
{
    if !quiet || !std::io::stderr().is_terminal() {
        return f();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    let result = f();
    spinner.finish_and_clear();
    result
}

fn set_quiet() {
    env::set_var("NORI_QUIET", "1");
}

fn registry_arg() -> Arg {
    Arg::new("registry")
        .long("registry")
        .value_name("URL")
        .help("Query only this registry instead of searching all configured ones")
}

fn quiet_arg() -> Arg {
    Arg::new("quiet")
        .short('q')
        .long("quiet")
        .action(ArgAction::SetTrue)
        .help("Minimal output; show spinner when busy")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Machine-readable JSON output")
}

fn cli() -> Command {
    Command::new("nori")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Install profiles and skills from Nori registries")
        .after_help(
            "Examples:\n  nori install demo\n  nori install acme/demo@1.2.0\n  nori versions demo --json\n  nori search review\n  nori publish ./my-profile --name my-profile --registry https://acme.noriskillsets.dev",
        )
        .subcommand(
            Command::new("install")
                .about("Install or upgrade a profile and the skills it declares")
                .arg(
                    Arg::new("package")
                        .required(true)
                        .help("[org/]name[@version]"),
                )
                .arg(registry_arg())
                .arg(
                    Arg::new("root")
                        .long("root")
                        .value_name("DIR")
                        .help("Installation root (default: NORI_INSTALL_DIR, config, or nearest root above cwd)"),
                )
                .arg(
                    Arg::new("list-versions")
                        .long("list-versions")
                        .action(ArgAction::SetTrue)
                        .help("List available versions instead of installing"),
                )
                .arg(quiet_arg()),
        )
        .subcommand(
            Command::new("versions")
                .about("List dist-tags and published versions of a package")
                .arg(Arg::new("package").required(true).help("[org/]name"))
                .arg(registry_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("search")
                .about("Search every configured registry for profiles")
                .arg(Arg::new("query").required(true))
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("publish")
                .about("Pack a profile directory and upload it as a new version")
                .arg(Arg::new("dir").required(true).help("Profile directory"))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .required(true)
                        .help("Package name on the registry"),
                )
                .arg(
                    Arg::new("version")
                        .long("version")
                        .help("Version to publish (default: patch bump of latest, or 1.0.0)"),
                )
                .arg(
                    Arg::new("registry")
                        .long("registry")
                        .value_name("URL")
                        .help("Registry to publish to (default: public registry)"),
                )
                .arg(json_arg()),
        )
}

fn parse_spec(sub_m: &ArgMatches) -> Result<PackageSpec, String> {
    let raw = sub_m
        .get_one::<String>("package")
        .map(String::as_str)
        .unwrap_or_default();
    nori_core::parse_package_spec(raw).map_err(|e| e.to_string())
}

fn current_dir() -> Result<PathBuf, String> {
    env::current_dir().map_err(|e| format!("Cannot read current directory: {}", e))
}

fn install_root(sub_m: &ArgMatches, config: &nori_core::Config, cwd: &Path) -> InstallRoot {
    sub_m
        .get_one::<String>("root")
        .map(PathBuf::from)
        .or_else(|| config.install_dir())
        .map(InstallRoot::new)
        .unwrap_or_else(|| InstallRoot::discover(cwd))
}

fn print_listing(listing: &VersionListing, json_out: bool) -> Result<(), String> {
    if json_out {
        let json = serde_json::to_string_pretty(listing).map_err(|e| e.to_string())?;
        println!("{}", json);
        return Ok(());
    }
    info(&format!("{} on {}", listing.package, listing.registry_url));
    for (tag, version) in &listing.dist_tags {
        println!("  {}: {}", tag, version);
    }
    for entry in &listing.versions {
        match &entry.published_at {
            Some(ts) => println!("  {}  {}", entry.version, ts.dimmed()),
            None => println!("  {}", entry.version),
        }
    }
    Ok(())
}

fn print_install_report(report: &InstallReport) {
    let target = format!("{}@{}", report.package, report.version);
    match &report.outcome {
        InstallOutcome::Installed => success(&format!(
            "Installed {} from {} into {}",
            target,
            report.registry_url,
            report.path.display()
        )),
        InstallOutcome::Upgraded { from } => {
            success(&format!("Upgraded {} from {} to {}", report.package, from, report.version))
        }
        InstallOutcome::AlreadyCurrent => info(&format!("{} is already installed", target)),
        InstallOutcome::AlreadyNewer { installed } => info(&format!(
            "{} is already at newer version {}; not downgrading",
            report.package, installed
        )),
    }
    for dep in &report.dependencies {
        let line = match &dep.outcome {
            DependencyOutcome::Installed { version } => format!("  + skill {}@{}", dep.name, version),
            DependencyOutcome::Upgraded { from, to } => {
                format!("  ^ skill {} {} -> {}", dep.name, from, to)
            }
            DependencyOutcome::AlreadyCurrent { version } => {
                format!("  = skill {}@{}", dep.name, version)
            }
            DependencyOutcome::AlreadyNewer { installed, .. } => {
                format!("  = skill {}@{} (newer than latest)", dep.name, installed)
            }
        };
        dim(&line);
    }
    for w in &report.warnings {
        warning(&format!("warning: {}", w));
    }
}

fn run() -> Result<(), String> {
    let matches = cli().get_matches();
    let client = HttpRegistryClient::new();

    match matches.subcommand() {
        Some(("install", sub_m)) => {
            let spec = parse_spec(sub_m)?;
            let quiet = sub_m.get_flag("quiet");
            if quiet {
                set_quiet();
            }
            let cwd = current_dir()?;
            let config = nori_core::load_config(&cwd);
            let registries: Registries = config.registries();
            let explicit = sub_m.get_one::<String>("registry").cloned();

            if sub_m.get_flag("list-versions") {
                let listing = nori_core::list_versions(&client, &spec, &registries, explicit.as_deref())
                    .map_err(|e| e.to_string())?;
                return print_listing(&listing, false);
            }

            let root = install_root(sub_m, &config, &cwd);
            let mut request = InstallRequest::new(spec);
            if let Some(url) = &explicit {
                request = request.with_registry(url);
            }
            let message = format!("Installing {}", request.spec);
            let report = run_with_spinner(&message, quiet, || {
                nori_core::install_package(&client, &request, &registries, &root)
                    .map_err(|e| e.to_string())
            })?;
            print_install_report(&report);
        }
        Some(("versions", sub_m)) => {
            let spec = parse_spec(sub_m)?;
            let json_out = sub_m.get_flag("json");
            if json_out {
                set_quiet();
            }
            let config = nori_core::load_config(&current_dir()?);
            let explicit = sub_m.get_one::<String>("registry").map(String::as_str);
            let listing = nori_core::list_versions(&client, &spec, &config.registries(), explicit)
                .map_err(|e| e.to_string())?;
            print_listing(&listing, json_out)?;
        }
        Some(("search", sub_m)) => {
            let query = sub_m
                .get_one::<String>("query")
                .map(String::as_str)
                .unwrap_or_default();
            let json_out = sub_m.get_flag("json");
            if json_out {
                set_quiet();
            }
            let config = nori_core::load_config(&current_dir()?);
            let hits = nori_core::search_registries(&client, query, &config.registries());
            if json_out {
                let json = serde_json::to_string_pretty(&hits).map_err(|e| e.to_string())?;
                println!("{}", json);
            } else if hits.iter().all(|h| h.packages.is_empty()) {
                info(&format!("No packages match '{}'", query));
            } else {
                for registry in hits.iter().filter(|h| !h.packages.is_empty()) {
                    info(&registry.registry_url);
                    for pkg in &registry.packages {
                        match &pkg.description {
                            Some(d) => println!("  {}  {}", pkg.name, d.dimmed()),
                            None => println!("  {}", pkg.name),
                        }
                    }
                }
            }
        }
        Some(("publish", sub_m)) => {
            let dir = sub_m
                .get_one::<String>("dir")
                .map(PathBuf::from)
                .unwrap_or_default();
            let name = sub_m
                .get_one::<String>("name")
                .map(String::as_str)
                .unwrap_or_default();
            let version = sub_m.get_one::<String>("version").map(String::as_str);
            let json_out = sub_m.get_flag("json");
            if json_out {
                set_quiet();
            }
            let config = nori_core::load_config(&current_dir()?);
            let registries = config.registries();
            let url = sub_m
                .get_one::<String>("registry")
                .cloned()
                .unwrap_or_else(|| registries.public_url.clone());
            let endpoint = registries
                .credentials_for(&url)
                .cloned()
                .unwrap_or_else(|| RegistryEndpoint::public(&url));
            let report = nori_core::publish_profile(&client, &dir, name, version, &endpoint)
                .map_err(|e| e.to_string())?;
            if json_out {
                let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
                println!("{}", json);
            } else {
                success(&format!(
                    "Published {}@{} to {}",
                    report.name, report.version, report.registry_url
                ));
            }
        }
        _ => {
            if use_color() {
                println!("{}", "nori".bright_cyan().bold());
            } else {
                println!("nori");
            }
            dim("Install profiles and skills from Nori registries.");
            dim("\nRun `nori --help` for details.");
        }
    }

    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
