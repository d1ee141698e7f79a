//! Built-in subcommands: their argument declarations and what they do with
//! the parsed [`Args`].

use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use cellar_argparse::{
    Arch, Args, Backend, CaskLoader, CommandSpec, Count, KegStore, NamedArgType, Only, Os, Request,
    Resolved, Spec, SystemInfo, TapRegistry,
};
use cellar_metadata::{CASK_METADATA_DIR, INSTALL_RECEIPT, InstallReceipt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::prefix::FsBackend;

pub struct Command {
    pub name: &'static str,
    declare: fn() -> Result<CommandSpec>,
    run: fn(&Args, &FsBackend) -> Result<()>,
}

impl Command {
    pub fn spec(&self) -> Result<CommandSpec> {
        (self.declare)()
    }

    pub fn run(&self, args: &Args, backend: &FsBackend) -> Result<()> {
        (self.run)(args, backend)
    }
}

pub const COMMANDS: &[Command] = &[
    Command {
        name: "cat",
        declare: cat_args,
        run: cat,
    },
    Command {
        name: "commands",
        declare: commands_args,
        run: commands,
    },
    Command {
        name: "info",
        declare: info_args,
        run: info,
    },
    Command {
        name: "install",
        declare: install_args,
        run: install,
    },
    Command {
        name: "list",
        declare: list_args,
        run: list,
    },
    Command {
        name: "tap-info",
        declare: tap_info_args,
        run: tap_info,
    },
    Command {
        name: "uninstall",
        declare: uninstall_args,
        run: uninstall,
    },
];

pub fn find(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|c| c.name)
}

fn formula_or_cask(spec: &mut CommandSpec) -> &mut CommandSpec {
    spec.switch(&["--formula", "--formulae"], "Treat all named arguments as formulae.")
        .switch(&["--cask", "--casks"], "Treat all named arguments as casks.")
        .conflicts(&["--formula", "--cask"])
}

fn info_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("info");
    spec.description("Display information about a *formula* or *cask*.")
        .switch(&["--json"], "Print a JSON representation.")
        .flag(
            &["--os="],
            "Show bottle tags for the given operating system, or `all`.",
        )
        .flag(
            &["--arch="],
            "Show bottle tags for the given architecture, or `all`.",
        );
    formula_or_cask(&mut spec).named_args(
        &[NamedArgType::Formula, NamedArgType::Cask],
        Count::at_least(1),
    )?;
    Ok(spec)
}

fn info(args: &Args, backend: &FsBackend) -> Result<()> {
    let resolved = args.named().to_formulae_and_casks(Request::new())?;

    if args.switch("json")? {
        let mut out = Vec::new();
        for item in resolved.iter() {
            out.push(match item {
                Resolved::Formula(formula) => {
                    let def = backend.formula_definition(formula)?;
                    let installed: Vec<String> = backend
                        .kegs(&backend.rack(&formula.name))
                        .iter()
                        .map(|k| k.version.to_string())
                        .collect();
                    json!({
                        "name": formula.name,
                        "full_name": formula.full_name,
                        "tap": formula.tap.as_ref().map(|t| t.name()),
                        "version": formula.version,
                        "desc": def.desc,
                        "homepage": def.homepage,
                        "options": formula.options.iter().map(|o| &o.flag).collect::<Vec<_>>(),
                        "installed": installed,
                    })
                }
                Resolved::Cask(cask) => json!({
                    "token": cask.token,
                    "full_name": cask.full_name,
                    "tap": cask.tap.as_ref().map(|t| t.name()),
                    "version": cask.version,
                    "installed": backend.installed_cask_version(&cask.token),
                }),
                Resolved::Keg(keg) => json!({ "name": keg.name, "version": keg.version.to_string() }),
            });
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let show_tags = args.flag("os")?.is_some() || args.flag("arch")?.is_some();
    for item in resolved.iter() {
        match item {
            Resolved::Formula(formula) => {
                let def = backend.formula_definition(formula)?;
                println!("==> {}: stable {}", formula.full_name, formula.version);
                if !def.desc.is_empty() {
                    println!("{}", def.desc);
                }
                if !def.homepage.is_empty() {
                    println!("{}", def.homepage);
                }
                let kegs = backend.kegs(&backend.rack(&formula.name));
                if kegs.is_empty() {
                    println!("Not installed");
                }
                for keg in kegs {
                    println!("{}", keg.path.display());
                }
                if show_tags {
                    let tags: Vec<String> = args
                        .os_arch_combinations()?
                        .into_iter()
                        .map(|(os, arch)| bottle_tag(os, arch))
                        .collect();
                    println!("Bottle tags: {}", tags.join(", "));
                }
                if !formula.options.is_empty() {
                    println!("==> Options");
                    for option in &formula.options {
                        println!("{}\n\t{}", option.flag, option.description);
                    }
                }
            }
            Resolved::Cask(cask) => {
                let version = cask.version.as_deref().unwrap_or("latest");
                println!("==> {}: {version}", cask.full_name);
                match backend.installed_cask_version(&cask.token) {
                    Some(installed) => println!("Installed: {installed}"),
                    None => println!("Not installed"),
                }
            }
            Resolved::Keg(keg) => println!("{}", keg.path.display()),
        }
    }
    Ok(())
}

fn bottle_tag(os: Os, arch: Arch) -> String {
    match (os, arch) {
        (Os::Linux, arch) => format!("{}_linux", linux_arch(arch)),
        (Os::Macos(version), Arch::Arm) => format!("arm64_{}", version.symbol()),
        (Os::Macos(version), Arch::Intel) => version.symbol().to_string(),
    }
}

fn linux_arch(arch: Arch) -> &'static str {
    match arch {
        Arch::Intel => "x86_64",
        Arch::Arm => "arm64",
    }
}

fn install_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("install");
    spec.description(
        "Install a *formula* or *cask*. Additional options specific to a formula may be \
         appended to the command.",
    )
    .switch(
        &["-f", "--force"],
        "Install formulae without checking for previously installed keg-only or non-migrated versions.",
    )
    .switch(
        &["-n", "--dry-run"],
        "Show what would be installed, but do not actually install anything.",
    )
    .switch(
        &["-s", "--build-from-source"],
        "Compile *formula* from source even if a bottle is provided.",
    )
    .switch(
        &["--HEAD"],
        "If *formula* defines it, install the HEAD version, aka. main, trunk, unstable, master.",
    )
    .switch(
        &["--force-bottle"],
        "Install from a bottle if it exists for the current or newest version of macOS.",
    )
    .conflicts(&["--build-from-source", "--force-bottle"])
    .conflicts(&["--cask", "--HEAD"])
    .conflicts(&["--cask", "--build-from-source"]);
    formula_or_cask(&mut spec)
        .formula_options()
        .cask_options()
        .named_args(
            &[NamedArgType::Formula, NamedArgType::Cask],
            Count::at_least(1),
        )?;
    Ok(spec)
}

fn install(args: &Args, backend: &FsBackend) -> Result<()> {
    let dry_run = args.switch("dry_run")?;
    let force = args.switch("force")?;
    let from_source = args.build_from_source_formulae()?;
    let resolved = args.named().to_formulae_and_casks(Request::new())?;

    for item in resolved.iter() {
        match item {
            Resolved::Formula(formula) => {
                let keg = backend.rack(&formula.name).path.join(&formula.version);
                if keg.exists() && !force {
                    warn!("{} {} is already installed", formula.full_name, formula.version);
                    continue;
                }
                if dry_run {
                    println!("Would install {} {}", formula.full_name, formula.version);
                    continue;
                }
                if from_source.contains(&formula.full_name) {
                    println!("==> Building {} from source", formula.full_name);
                }

                let used_options: Vec<String> = args
                    .flags_only()
                    .iter()
                    .filter(|flag| {
                        let name = flag.split('=').next().unwrap_or_default();
                        formula
                            .options
                            .iter()
                            .any(|o| o.flag.trim_end_matches('=') == name)
                    })
                    .cloned()
                    .collect();
                let now = unix_now();
                let receipt = InstallReceipt {
                    tap: formula.tap.as_ref().map(|t| t.name()),
                    spec: match formula.spec {
                        Spec::Head => "head",
                        Spec::Stable => "stable",
                    }
                    .to_string(),
                    used_options,
                    source_modified_time: now,
                    installed_on_request: true,
                    time: now,
                };
                fs::create_dir_all(&keg)
                    .with_context(|| format!("failed to create {}", keg.display()))?;
                let bytes = receipt
                    .to_json_bytes()
                    .with_context(|| format!("failed to serialize receipt for {}", formula.full_name))?;
                fs::write(keg.join(INSTALL_RECEIPT), bytes)
                    .with_context(|| format!("failed to write receipt into {}", keg.display()))?;
                link(&keg, &backend.opt_dir().join(&formula.name))?;
                println!("==> Installed {} {}", formula.full_name, formula.version);
            }
            Resolved::Cask(cask) => {
                let version = cask.version.as_deref().unwrap_or("latest");
                let staged = backend.caskroom().join(&cask.token).join(version);
                if staged.exists() && !force {
                    warn!("Cask '{}' is already installed.", cask.token);
                    continue;
                }
                if dry_run {
                    println!("Would install {} {version}", cask.full_name);
                    continue;
                }
                fs::create_dir_all(&staged)
                    .with_context(|| format!("failed to create {}", staged.display()))?;
                let metadata = backend.caskroom().join(&cask.token).join(CASK_METADATA_DIR);
                fs::create_dir_all(&metadata)?;
                let source = backend.cask_definition_path(cask);
                fs::copy(&source, backend.installed_caskfile(&cask.token))
                    .with_context(|| format!("failed to copy {}", source.display()))?;
                if let Some(appdir) = cask.config.as_ref().and_then(|c| c.dirs.get("appdir")) {
                    info!(cask = %cask.token, appdir = %appdir, "using custom application directory");
                }
                println!("==> Installed {} {version}", cask.full_name);
            }
            Resolved::Keg(_) => {}
        }
    }
    Ok(())
}

#[cfg(unix)]
fn link(target: &Path, link: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link).with_context(|| format!("failed to replace {}", link.display()))?;
    }
    std::os::unix::fs::symlink(target, link)
        .with_context(|| format!("failed to link {}", link.display()))
}

#[cfg(not(unix))]
fn link(_target: &Path, link: &Path) -> Result<()> {
    debug!(link = %link.display(), "symlinks unsupported; skipping");
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn uninstall_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("uninstall");
    spec.description("Uninstall a *formula* or *cask*.").switch(
        &["-f", "--force"],
        "Delete all installed versions of *formula*.",
    );
    formula_or_cask(&mut spec).named_args(
        &[NamedArgType::InstalledFormula, NamedArgType::InstalledCask],
        Count::at_least(1),
    )?;
    Ok(spec)
}

fn uninstall(args: &Args, backend: &FsBackend) -> Result<()> {
    let (kegs, casks) =
        args.named()
            .to_kegs_to_casks(args.only_formula_or_cask(), false, args.switch("force")?)?;

    for keg in kegs {
        fs::remove_dir_all(&keg.path)
            .with_context(|| format!("failed to remove {}", keg.path.display()))?;
        println!("Uninstalling {}", keg.path.display());

        let rack = backend.rack(&keg.name);
        if backend.kegs(&rack).is_empty() {
            fs::remove_dir_all(&rack.path)
                .with_context(|| format!("failed to remove {}", rack.path.display()))?;
            for dir in [backend.opt_dir(), backend.linked_dir()] {
                let link = dir.join(&keg.name);
                if fs::symlink_metadata(&link).is_ok() {
                    fs::remove_file(&link)
                        .with_context(|| format!("failed to remove {}", link.display()))?;
                }
            }
        }
    }
    for cask in casks {
        let staged = backend.caskroom().join(&cask.token);
        fs::remove_dir_all(&staged)
            .with_context(|| format!("failed to remove {}", staged.display()))?;
        println!("Uninstalling cask {}", cask.token);
    }
    Ok(())
}

fn list_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("list");
    spec.description("List all installed formulae and casks.")
        .switch(&["--versions"], "Show the version number for each listed *formula* or *cask*.");
    formula_or_cask(&mut spec).named_args(
        &[NamedArgType::InstalledFormula, NamedArgType::InstalledCask],
        Count::any(),
    )?;
    Ok(spec)
}

fn list(args: &Args, backend: &FsBackend) -> Result<()> {
    let versions = args.switch("versions")?;
    let only = args.only_formula_or_cask();

    if args.no_named() {
        if only != Some(Only::Cask) {
            for rack in backend.installed_racks() {
                if versions {
                    let kegs: Vec<String> = backend
                        .kegs(&rack)
                        .iter()
                        .map(|k| k.version.to_string())
                        .collect();
                    println!("{} {}", rack.name, kegs.join(" "));
                } else {
                    println!("{}", rack.name);
                }
            }
        }
        if only != Some(Only::Formula) {
            for token in backend.installed_casks() {
                if versions {
                    let version = backend.installed_cask_version(&token).unwrap_or_default();
                    println!("{token} {version}");
                } else {
                    println!("{token}");
                }
            }
        }
        return Ok(());
    }

    let (kegs, casks) = args.named().to_kegs_to_casks(only, false, true)?;
    for keg in kegs {
        if versions {
            println!("{} {}", keg.name, keg.version);
        } else {
            println!("{}", keg.path.display());
        }
    }
    for cask in casks {
        let version = backend.installed_cask_version(&cask.token).unwrap_or_default();
        println!("{} {version}", cask.token);
    }
    Ok(())
}

fn tap_info_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("tap-info");
    spec.description("Show detailed information about one or more *tap*s.")
        .switch(&["--installed"], "Show information on each installed tap.")
        .switch(&["--json"], "Print a JSON representation of *tap*.")
        .named_args(&[NamedArgType::Tap], Count::any())?;
    Ok(spec)
}

fn tap_info(args: &Args, backend: &FsBackend) -> Result<()> {
    let taps = if args.switch("installed")? {
        backend.installed_taps()
    } else {
        args.named().to_taps()?
    };

    if args.switch("json")? {
        let out: Vec<_> = taps
            .iter()
            .map(|tap| {
                json!({
                    "name": tap.name(),
                    "user": tap.user,
                    "repo": tap.repo,
                    "path": tap.path,
                    "installed": tap.installed,
                    "formula_names": file_stems(&backend.tap_formula_files(tap)),
                    "cask_tokens": file_stems(&backend.tap_cask_files(tap)),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for tap in &taps {
        if !tap.installed {
            println!("{}: Not installed", tap.name());
            continue;
        }
        let formulae = backend.tap_formula_files(tap).len();
        let casks = backend.tap_cask_files(tap).len();
        println!("{}: Installed", tap.name());
        println!("{formulae} formulae, {casks} casks");
        println!("{}", tap.path.display());
    }
    Ok(())
}

fn file_stems(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_stem()?.to_str().map(str::to_string))
        .collect()
}

fn cat_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("cat");
    spec.description("Display the source of a *formula* or *cask*.")
        .dev_command();
    formula_or_cask(&mut spec).named_args(
        &[NamedArgType::Formula, NamedArgType::Cask],
        Count::exactly(1),
    )?;
    Ok(spec)
}

fn cat(args: &Args, _backend: &FsBackend) -> Result<()> {
    for path in args.named().to_paths(args.only_formula_or_cask(), false)? {
        let body = fs::read_to_string(&path)
            .with_context(|| format!("{} does not exist", path.display()))?;
        print!("{body}");
        if !body.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn commands_args() -> Result<CommandSpec> {
    let mut spec = CommandSpec::new("commands");
    spec.description("Show lists of built-in commands.")
        .named_args(&[NamedArgType::None], Count::any())?;
    Ok(spec)
}

fn commands(args: &Args, _backend: &FsBackend) -> Result<()> {
    if !args.context().quiet {
        println!("==> Built-in commands");
    }
    for name in names() {
        println!("{name}");
    }
    Ok(())
}

/// Parses `argv` for the named command and runs it.
///
/// Returns the process exit code: usage errors exit 1 after printing the
/// command's usage, and `--help` prints usage to stdout.
pub fn dispatch(
    name: &str,
    argv: &[String],
    backend: Rc<FsBackend>,
    system: SystemInfo,
) -> Result<u8> {
    let Some(command) = find(name) else {
        eprintln!("Error: Unknown command: cellar {name}");
        return Ok(1);
    };

    let shared: Rc<dyn Backend> = backend.clone();
    let parser = cellar_argparse::Parser::new(command.spec()?, shared)
        .system(system)
        .commands(names());

    match parser.parse(argv) {
        Ok(cellar_argparse::ParseOutcome::Help(text)) => {
            print!("{text}");
            Ok(0)
        }
        Ok(cellar_argparse::ParseOutcome::Args(args)) => {
            debug!(command = name, named = ?args.named().as_slice(), "running command");
            command.run(&args, &backend)?;
            Ok(0)
        }
        Err(failure) => {
            if failure.error.shows_usage() {
                eprint!("{}", failure.usage);
            }
            eprintln!("Error: {}", failure.error);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_declares_a_valid_spec() {
        for command in COMMANDS {
            let spec = command.spec().unwrap();
            assert_eq!(spec.command(), command.name);
        }
    }

    #[test]
    fn command_table_is_sorted() {
        let names: Vec<&str> = names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn bottle_tags_follow_platform_naming() {
        use cellar_argparse::MacosVersion;
        assert_eq!(bottle_tag(Os::Linux, Arch::Intel), "x86_64_linux");
        assert_eq!(
            bottle_tag(Os::Macos(MacosVersion::Sonoma), Arch::Arm),
            "arm64_sonoma"
        );
        assert_eq!(
            bottle_tag(Os::Macos(MacosVersion::Sonoma), Arch::Intel),
            "sonoma"
        );
    }

    #[test]
    fn install_accepts_formula_and_cask_options() {
        let spec = install_args().unwrap();
        assert!(spec.accepts_formula_options());
        assert!(spec.accepts_cask_options());
        assert!(spec.options().iter().any(|o| o.longs().contains(&"--appdir".to_string())));
    }
}
