//! Collaborators the parser and resolver consult.
//!
//! The engine never reads definitions, casks or kegs itself. It asks a
//! [`Backend`] and branches on the [`Lookup`] it gets back, so the whole
//! fallback protocol in [`crate::named_args`] is plain matching instead of
//! error-type juggling.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

/// Outcome of asking a loader for one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// The definition exists but could not be loaded.
    Broken(String),
    /// The short name matched definitions in several taps.
    Ambiguous(Vec<String>),
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Spec {
    #[default]
    Stable,
    Head,
}

/// Overrides passed to the formula loader.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadOptions {
    pub spec: Option<Spec>,
    pub force_bottle: bool,
    pub flags: Vec<String>,
}

/// An option a formula declares for itself, e.g. `--with-foo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormulaOption {
    pub flag: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tap {
    pub user: String,
    pub repo: String,
    pub path: PathBuf,
    pub installed: bool,
}

impl Tap {
    /// Canonical `user` and `repo`: lowercase, without a `homebrew-` repo prefix.
    pub fn normalize(user: &str, repo: &str) -> (String, String) {
        let user = user.to_lowercase();
        let repo = repo.to_lowercase();
        let repo = repo
            .strip_prefix("homebrew-")
            .map(str::to_string)
            .unwrap_or(repo);
        (user, repo)
    }

    pub fn name(&self) -> String {
        format!("{}/{}", self.user, self.repo)
    }
}

impl fmt::Display for Tap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.repo)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub name: String,
    pub full_name: String,
    pub version: String,
    pub tap: Option<Tap>,
    pub options: Vec<FormulaOption>,
    pub spec: Spec,
    pub path: PathBuf,
}

/// Cask directory overrides and language preferences given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaskConfig {
    pub dirs: IndexMap<String, String>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cask {
    pub token: String,
    pub full_name: String,
    pub version: Option<String>,
    pub tap: Option<Tap>,
    /// Copy of the definition saved when the cask was installed.
    pub installed_caskfile: Option<PathBuf>,
    pub config: Option<CaskConfig>,
}

impl Cask {
    /// Placeholder for an installed cask whose definition no longer loads.
    pub fn stub(token: &str, version: Option<String>, config: Option<CaskConfig>) -> Self {
        Self {
            token: token.to_string(),
            full_name: token.to_string(),
            version,
            tap: None,
            installed_caskfile: None,
            config,
        }
    }
}

/// A version directory name such as `1.2.3_1` (version `1.2.3`, revision 1).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PkgVersion {
    pub version: String,
    pub revision: u32,
}

impl PkgVersion {
    pub fn parse(s: &str) -> Self {
        if let Some((version, revision)) = s.rsplit_once('_') {
            if let Ok(revision) = revision.parse() {
                return Self {
                    version: version.to_string(),
                    revision,
                };
            }
        }
        Self {
            version: s.to_string(),
            revision: 0,
        }
    }

    pub fn is_head(&self) -> bool {
        self.version.starts_with("HEAD")
    }

    /// Orders by version segments, numbers numerically, then by revision.
    pub fn compare(&self, other: &Self) -> Ordering {
        compare_versions(&self.version, &other.version).then(self.revision.cmp(&other.revision))
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.revision == 0 {
            f.write_str(&self.version)
        } else {
            write!(f, "{}_{}", self.version, self.revision)
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

fn segments(version: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut start = None;
    let mut numeric = false;
    for (i, c) in version.char_indices() {
        let is_digit = c.is_ascii_digit();
        if !c.is_ascii_alphanumeric() {
            if let Some(s) = start.take() {
                out.push(segment(&version[s..i], numeric));
            }
            continue;
        }
        match start {
            Some(s) if is_digit != numeric => {
                out.push(segment(&version[s..i], numeric));
                start = Some(i);
            }
            Some(_) => {}
            None => start = Some(i),
        }
        numeric = is_digit;
    }
    if let Some(s) = start {
        out.push(segment(&version[s..], numeric));
    }
    out
}

fn segment(text: &str, numeric: bool) -> Segment<'_> {
    if numeric {
        if let Ok(n) = text.parse() {
            return Segment::Number(n);
        }
    }
    Segment::Text(text)
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (segments(a), segments(b));
    for pair in a.iter().zip(b.iter()) {
        let ord = match pair {
            (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
            (Segment::Text(x), Segment::Text(y)) => x.cmp(y),
            (Segment::Number(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Number(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// One installed version of a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Keg {
    pub name: String,
    pub version: PkgVersion,
    pub path: PathBuf,
}

impl Keg {
    /// Builds a keg from `<rack>/<version>`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let version = path.file_name()?.to_str()?;
        let name = path.parent()?.file_name()?.to_str()?;
        Some(Self {
            name: name.to_string(),
            version: PkgVersion::parse(version),
            path: path.to_path_buf(),
        })
    }
}

/// The directory holding every installed version of one formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rack {
    pub name: String,
    pub path: PathBuf,
}

/// Install receipt fields the resolver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tab {
    pub source_modified_time: u64,
}

pub trait FormulaLoader {
    /// Loads a formula by name, full name or path.
    fn load_formula(&self, name: &str, options: &LoadOptions) -> Lookup<Formula>;

    /// Like [`FormulaLoader::load_formula`], preferring the installed spec when one exists.
    fn resolve_formula(&self, name: &str, options: &LoadOptions) -> Lookup<Formula> {
        self.load_formula(name, options)
    }

    fn formula_from_rack(&self, rack: &Rack) -> Lookup<Formula>;

    /// Where the definition for `name` lives (or would live).
    fn formula_path(&self, name: &str) -> PathBuf;
}

pub trait CaskLoader {
    fn load_cask(&self, name: &str, config: Option<&CaskConfig>) -> Lookup<Cask>;

    fn load_cask_file(&self, path: &Path, config: Option<&CaskConfig>) -> Lookup<Cask>;

    fn cask_path(&self, name: &str) -> PathBuf;

    fn installed_cask_version(&self, token: &str) -> Option<String>;
}

pub trait KegStore {
    /// The rack for `name`, whether or not it exists on disk.
    fn rack(&self, name: &str) -> Rack;

    fn kegs(&self, rack: &Rack) -> Vec<Keg>;

    /// Target of the `opt/<name>` link, if it points at a keg.
    fn opt_keg(&self, rack: &Rack) -> Option<Keg>;

    /// Target of the linked-keg reference, if it points at a keg.
    fn linked_keg(&self, rack: &Rack) -> Option<Keg>;

    /// The installed keg matching the formula's current version, if present.
    fn latest_installed_prefix(&self, formula: &Formula) -> Option<Keg>;

    fn tab(&self, keg: &Keg) -> Tab;
}

pub trait TapRegistry {
    fn fetch_tap(&self, user: &str, repo: &str) -> Tap;

    fn tap_formula_files(&self, tap: &Tap) -> Vec<PathBuf>;

    fn tap_cask_files(&self, tap: &Tap) -> Vec<PathBuf>;
}

/// Everything the engine needs from the package world.
pub trait Backend: FormulaLoader + CaskLoader + KegStore + TapRegistry {}

impl<T> Backend for T where T: FormulaLoader + CaskLoader + KegStore + TapRegistry + ?Sized {}
