//! Filesystem layout of a cellar prefix and the [`Backend`] over it.
//!
//! ```text
//! <prefix>/Library/Taps/<user>/homebrew-<repo>/{Formula,Casks}/*.json
//! <prefix>/Cellar/<name>/<version>/INSTALL_RECEIPT.json
//! <prefix>/opt/<name> -> ../Cellar/<name>/<version>
//! <prefix>/var/homebrew/linked/<name> -> ../../../Cellar/<name>/<version>
//! <prefix>/Caskroom/<token>/<version>/
//! <prefix>/Caskroom/<token>/.metadata/<token>.json
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cellar_argparse::{
    Cask, CaskConfig, CaskLoader, Formula, FormulaLoader, FormulaOption, Keg, KegStore, LoadOptions,
    Lookup, PkgVersion, Rack, Spec, Tab, Tap, TapRegistry,
};
use cellar_metadata::{
    CASK_METADATA_DIR, CaskDefinition, FormulaDefinition, INSTALL_RECEIPT, InstallReceipt,
};
use serde::de::DeserializeOwned;
use tracing::debug;

const CORE_TAP: (&str, &str) = ("homebrew", "core");
const CASK_TAP: (&str, &str) = ("homebrew", "cask");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Formula,
    Cask,
}

impl Kind {
    fn dir(self) -> &'static str {
        match self {
            Self::Formula => "Formula",
            Self::Cask => "Casks",
        }
    }

    fn core(self) -> (&'static str, &'static str) {
        match self {
            Self::Formula => CORE_TAP,
            Self::Cask => CASK_TAP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn taps_dir(&self) -> PathBuf {
        self.root.join("Library").join("Taps")
    }

    pub fn cellar(&self) -> PathBuf {
        self.root.join("Cellar")
    }

    pub fn opt_dir(&self) -> PathBuf {
        self.root.join("opt")
    }

    pub fn linked_dir(&self) -> PathBuf {
        self.root.join("var").join("homebrew").join("linked")
    }

    pub fn caskroom(&self) -> PathBuf {
        self.root.join("Caskroom")
    }

    fn tap_path(&self, user: &str, repo: &str) -> PathBuf {
        self.taps_dir().join(user).join(format!("homebrew-{repo}"))
    }

    /// Every tap directory present on disk.
    pub fn installed_taps(&self) -> Vec<Tap> {
        let mut taps = Vec::new();
        for user in sorted_dirs(&self.taps_dir()) {
            let Some(user_name) = file_name(&user) else { continue };
            for repo in sorted_dirs(&user) {
                let Some(repo_name) = file_name(&repo) else { continue };
                taps.push(self.fetch_tap(&user_name, &repo_name));
            }
        }
        taps
    }

    /// Racks holding at least one keg.
    pub fn installed_racks(&self) -> Vec<Rack> {
        sorted_dirs(&self.cellar())
            .into_iter()
            .filter_map(|path| {
                let name = file_name(&path)?;
                let rack = Rack { name, path };
                (!self.kegs(&rack).is_empty()).then_some(rack)
            })
            .collect()
    }

    pub fn installed_casks(&self) -> Vec<String> {
        sorted_dirs(&self.caskroom())
            .iter()
            .filter_map(|path| file_name(path))
            .collect()
    }

    pub fn formula_definition(&self, formula: &Formula) -> Result<FormulaDefinition> {
        read_json(&formula.path)
    }

    pub fn cask_definition_path(&self, cask: &Cask) -> PathBuf {
        self.cask_path(&cask.full_name)
    }

    fn definition_path(&self, kind: Kind, name: &str) -> PathBuf {
        match self.split_qualified(name) {
            Some((user, repo, short)) => self
                .tap_path(&user, &repo)
                .join(kind.dir())
                .join(format!("{short}.json")),
            None => {
                let (user, repo) = kind.core();
                let core = self
                    .tap_path(user, repo)
                    .join(kind.dir())
                    .join(format!("{name}.json"));
                if core.exists() {
                    return core;
                }
                self.find_in_taps(kind, name)
                    .into_iter()
                    .next()
                    .map(|(_, path)| path)
                    .unwrap_or(core)
            }
        }
    }

    /// `user/repo/name` split into a normalized tap and the short name.
    fn split_qualified(&self, name: &str) -> Option<(String, String, String)> {
        let mut parts = name.splitn(3, '/');
        let (user, repo, short) = (parts.next()?, parts.next()?, parts.next()?);
        if user.is_empty() || repo.is_empty() || short.is_empty() || short.contains('/') {
            return None;
        }
        let (user, repo) = Tap::normalize(user, repo);
        Some((user, repo, short.to_lowercase()))
    }

    fn find_in_taps(&self, kind: Kind, name: &str) -> Vec<(Tap, PathBuf)> {
        self.installed_taps()
            .into_iter()
            .filter_map(|tap| {
                let path = tap.path.join(kind.dir()).join(format!("{name}.json"));
                path.is_file().then_some((tap, path))
            })
            .collect()
    }

    /// Locates a definition by path, qualified name or short name. Short names
    /// prefer the core tap, otherwise they must be unique across taps.
    fn locate(&self, kind: Kind, name: &str) -> Lookup<(Option<Tap>, PathBuf)> {
        let as_path = Path::new(name);
        if name.ends_with(".json") && as_path.is_file() {
            return Lookup::Found((None, as_path.to_path_buf()));
        }

        if let Some((user, repo, short)) = self.split_qualified(name) {
            let tap = self.fetch_tap(&user, &repo);
            let path = tap.path.join(kind.dir()).join(format!("{short}.json"));
            return if path.is_file() {
                Lookup::Found((Some(tap), path))
            } else {
                Lookup::NotFound
            };
        }

        let mut found = self.find_in_taps(kind, &name.to_lowercase());
        let (core_user, core_repo) = kind.core();
        if let Some(pos) = found
            .iter()
            .position(|(tap, _)| tap.user == core_user && tap.repo == core_repo)
        {
            let (tap, path) = found.swap_remove(pos);
            return Lookup::Found((Some(tap), path));
        }
        match found.len() {
            0 => Lookup::NotFound,
            1 => {
                let (tap, path) = found.remove(0);
                Lookup::Found((Some(tap), path))
            }
            _ => Lookup::Ambiguous(
                found
                    .iter()
                    .map(|(tap, _)| format!("{}/{name}", tap.name()))
                    .collect(),
            ),
        }
    }

    fn read_formula(&self, tap: Option<Tap>, path: &Path, options: &LoadOptions) -> Lookup<Formula> {
        let def: FormulaDefinition = match read_json(path) {
            Ok(def) => def,
            Err(e) => return Lookup::Broken(format!("{e:#}")),
        };
        let spec = match options.spec {
            Some(Spec::Head) if def.head.is_some() => Spec::Head,
            _ => Spec::Stable,
        };
        let version = match spec {
            Spec::Head => "HEAD".to_string(),
            Spec::Stable => def.pkg_version(),
        };
        Lookup::Found(Formula {
            full_name: qualified(tap.as_ref(), Kind::Formula, &def.name),
            name: def.name,
            version,
            tap,
            options: def
                .options
                .into_iter()
                .map(|o| FormulaOption {
                    flag: o.flag,
                    description: o.description,
                })
                .collect(),
            spec,
            path: path.to_path_buf(),
        })
    }

    fn read_cask(&self, tap: Option<Tap>, path: &Path, config: Option<&CaskConfig>) -> Lookup<Cask> {
        let def: CaskDefinition = match read_json(path) {
            Ok(def) => def,
            Err(e) => return Lookup::Broken(format!("{e:#}")),
        };
        let caskfile = self.installed_caskfile(&def.token);
        Lookup::Found(Cask {
            full_name: qualified(tap.as_ref(), Kind::Cask, &def.token),
            token: def.token,
            version: def.version,
            tap,
            installed_caskfile: caskfile.is_file().then_some(caskfile),
            config: config.cloned(),
        })
    }

    pub fn installed_caskfile(&self, token: &str) -> PathBuf {
        self.caskroom()
            .join(token)
            .join(CASK_METADATA_DIR)
            .join(format!("{token}.json"))
    }

    /// A formula reconstructed from the newest keg's receipt.
    fn formula_from_receipt(&self, name: &str) -> Lookup<Formula> {
        let rack = self.rack(&name.to_lowercase());
        let Some(keg) = self.kegs(&rack).into_iter().max_by(|a, b| a.version.compare(&b.version))
        else {
            return Lookup::NotFound;
        };
        let receipt: InstallReceipt = read_json(&keg.path.join(INSTALL_RECEIPT)).unwrap_or_default();
        let tap = receipt.tap.as_deref().and_then(|t| {
            let (user, repo) = t.split_once('/')?;
            Some(self.fetch_tap(user, repo))
        });
        debug!(formula = %rack.name, keg = %keg.path.display(), "resolved formula from install receipt");
        Lookup::Found(Formula {
            full_name: qualified(tap.as_ref(), Kind::Formula, &rack.name),
            name: rack.name,
            version: keg.version.to_string(),
            tap,
            options: Vec::new(),
            spec: if receipt.spec == "head" { Spec::Head } else { Spec::Stable },
            path: keg.path.join(INSTALL_RECEIPT),
        })
    }

    /// The keg a symlink under `dir` points at, if it belongs to `rack`.
    fn keg_behind_link(&self, dir: &Path, rack: &Rack) -> Option<Keg> {
        let target = fs::canonicalize(dir.join(&rack.name)).ok()?;
        let rack_path = fs::canonicalize(&rack.path).ok()?;
        if target.parent()? != rack_path {
            return None;
        }
        let version = target.file_name()?;
        Keg::from_path(&rack.path.join(version))
    }
}

impl FormulaLoader for FsBackend {
    fn load_formula(&self, name: &str, options: &LoadOptions) -> Lookup<Formula> {
        match self.locate(Kind::Formula, name) {
            Lookup::Found((tap, path)) => self.read_formula(tap, &path, options),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Broken(reason) => Lookup::Broken(reason),
            Lookup::Ambiguous(candidates) => Lookup::Ambiguous(candidates),
        }
    }

    fn resolve_formula(&self, name: &str, options: &LoadOptions) -> Lookup<Formula> {
        match self.load_formula(name, options) {
            Lookup::NotFound => self.formula_from_receipt(name),
            other => other,
        }
    }

    fn formula_from_rack(&self, rack: &Rack) -> Lookup<Formula> {
        self.resolve_formula(&rack.name, &LoadOptions::default())
    }

    fn formula_path(&self, name: &str) -> PathBuf {
        self.definition_path(Kind::Formula, name)
    }
}

impl CaskLoader for FsBackend {
    fn load_cask(&self, name: &str, config: Option<&CaskConfig>) -> Lookup<Cask> {
        match self.locate(Kind::Cask, name) {
            Lookup::Found((tap, path)) => self.read_cask(tap, &path, config),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::Broken(reason) => Lookup::Broken(reason),
            Lookup::Ambiguous(candidates) => Lookup::Ambiguous(candidates),
        }
    }

    fn load_cask_file(&self, path: &Path, config: Option<&CaskConfig>) -> Lookup<Cask> {
        if !path.is_file() {
            return Lookup::NotFound;
        }
        match self.read_cask(None, path, config) {
            Lookup::Found(mut cask) => {
                cask.installed_caskfile = Some(path.to_path_buf());
                Lookup::Found(cask)
            }
            other => other,
        }
    }

    fn cask_path(&self, name: &str) -> PathBuf {
        self.definition_path(Kind::Cask, name)
    }

    fn installed_cask_version(&self, token: &str) -> Option<String> {
        sorted_dirs(&self.caskroom().join(token))
            .iter()
            .filter_map(|path| file_name(path))
            .filter(|name| name != CASK_METADATA_DIR)
            .max_by(|a, b| PkgVersion::parse(a).compare(&PkgVersion::parse(b)))
    }
}

impl KegStore for FsBackend {
    fn rack(&self, name: &str) -> Rack {
        Rack {
            name: name.to_string(),
            path: self.cellar().join(name),
        }
    }

    fn kegs(&self, rack: &Rack) -> Vec<Keg> {
        sorted_dirs(&rack.path)
            .iter()
            .filter_map(|path| Keg::from_path(path))
            .collect()
    }

    fn opt_keg(&self, rack: &Rack) -> Option<Keg> {
        self.keg_behind_link(&self.opt_dir(), rack)
    }

    fn linked_keg(&self, rack: &Rack) -> Option<Keg> {
        self.keg_behind_link(&self.linked_dir(), rack)
    }

    fn latest_installed_prefix(&self, formula: &Formula) -> Option<Keg> {
        let path = self.rack(&formula.name).path.join(&formula.version);
        path.is_dir().then(|| Keg::from_path(&path)).flatten()
    }

    fn tab(&self, keg: &Keg) -> Tab {
        let receipt: InstallReceipt = read_json(&keg.path.join(INSTALL_RECEIPT)).unwrap_or_default();
        Tab {
            source_modified_time: receipt.source_modified_time,
        }
    }
}

impl TapRegistry for FsBackend {
    fn fetch_tap(&self, user: &str, repo: &str) -> Tap {
        let (user, repo) = Tap::normalize(user, repo);
        let path = self.tap_path(&user, &repo);
        Tap {
            installed: path.is_dir(),
            user,
            repo,
            path,
        }
    }

    fn tap_formula_files(&self, tap: &Tap) -> Vec<PathBuf> {
        json_files(&tap.path.join(Kind::Formula.dir()))
    }

    fn tap_cask_files(&self, tap: &Tap) -> Vec<PathBuf> {
        json_files(&tap.path.join(Kind::Cask.dir()))
    }
}

/// Core-tap packages are known by their short name.
fn qualified(tap: Option<&Tap>, kind: Kind, name: &str) -> String {
    match tap {
        Some(tap) if (tap.user.as_str(), tap.repo.as_str()) != kind.core() => {
            format!("{}/{name}", tap.name())
        }
        _ => name.to_string(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

fn sorted_dirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn json_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()?.to_str().map(str::to_string)
}
