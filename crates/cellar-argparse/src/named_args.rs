//! Turning positional tokens into formulae, casks, kegs and taps.
//!
//! Resolution is lazy and memoized per `(restriction, method)`: the same
//! tokens can be asked for as formulae and as kegs without one request
//! invalidating the other. Each token's outcome is cached, so
//! `ignore_unavailable` only filters what was already computed.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, error, warn};

use crate::args::Only;
use crate::backend::{
    Backend, Cask, CaskConfig, Formula, Keg, LoadOptions, Lookup, Rack, Tap,
};
use crate::error::ResolveError;

/// How a token is turned into a formula-side object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResolveMethod {
    /// Load the definition.
    #[default]
    Factory,
    /// Load the definition, preferring what is installed.
    Resolve,
    /// The newest installed keg.
    LatestKegs,
    /// The keg `opt/` points at, or the only one.
    DefaultKegs,
    /// Every installed keg.
    Kegs,
}

impl ResolveMethod {
    fn wants_keg_like_cask(self) -> bool {
        matches!(self, Self::LatestKegs | Self::DefaultKegs | Self::Kegs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Formula(Formula),
    Keg(Keg),
    Cask(Cask),
}

impl Resolved {
    pub fn name(&self) -> &str {
        match self {
            Self::Formula(f) => &f.full_name,
            Self::Keg(k) => &k.name,
            Self::Cask(c) => &c.full_name,
        }
    }

    /// Formulae and kegs, as opposed to casks.
    pub fn is_formula_like(&self) -> bool {
        !matches!(self, Self::Cask(_))
    }
}

/// Parameters of [`NamedArgs::to_formulae_and_casks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// `None` inherits the `--formula`/`--cask` restriction of the parsed args.
    only: Option<Option<Only>>,
    method: ResolveMethod,
    ignore_unavailable: bool,
    uniq: bool,
}

impl Default for Request {
    fn default() -> Self {
        Self {
            only: None,
            method: ResolveMethod::Factory,
            ignore_unavailable: false,
            uniq: true,
        }
    }
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only(mut self, only: Option<Only>) -> Self {
        self.only = Some(only);
        self
    }

    pub fn method(mut self, method: ResolveMethod) -> Self {
        self.method = method;
        self
    }

    /// Drop tokens that resolve to nothing instead of failing.
    pub fn ignore_unavailable(mut self, ignore: bool) -> Self {
        self.ignore_unavailable = ignore;
        self
    }

    pub fn keep_duplicates(mut self) -> Self {
        self.uniq = false;
        self
    }
}

type Outcome = Result<Vec<Resolved>, ResolveError>;

/// Named arguments of one invocation and the means to resolve them.
pub struct NamedArgs {
    names: Vec<String>,
    backend: Rc<dyn Backend>,
    default_only: Option<Only>,
    load_options: LoadOptions,
    cask_config: Option<CaskConfig>,
    cache: RefCell<HashMap<(Option<Only>, ResolveMethod), Rc<[Outcome]>>>,
    warnings: RefCell<Vec<String>>,
}

impl fmt::Debug for NamedArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedArgs")
            .field("names", &self.names)
            .field("default_only", &self.default_only)
            .field("load_options", &self.load_options)
            .field("cask_config", &self.cask_config)
            .finish_non_exhaustive()
    }
}

impl NamedArgs {
    pub(crate) fn new(
        names: Vec<String>,
        backend: Rc<dyn Backend>,
        default_only: Option<Only>,
        load_options: LoadOptions,
        cask_config: Option<CaskConfig>,
    ) -> Self {
        Self {
            names,
            backend,
            default_only,
            load_options,
            cask_config,
            cache: RefCell::new(HashMap::new()),
            warnings: RefCell::new(Vec::new()),
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.names.iter()
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn load_options(&self) -> &LoadOptions {
        &self.load_options
    }

    pub fn cask_config(&self) -> Option<&CaskConfig> {
        self.cask_config.as_ref()
    }

    /// Warnings emitted so far, in order. They are also logged.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.borrow().clone()
    }

    /// Tokens lowercased unless they look like paths, archives or existing
    /// files, without duplicates, in first-seen order.
    pub fn downcased_unique_named(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for name in &self.names {
            let name = if name.contains('/') || name.ends_with(".tar.gz") || Path::new(name).exists()
            {
                name.clone()
            } else {
                name.to_lowercase()
            };
            if !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    pub fn to_formulae_and_casks(&self, request: Request) -> Result<Rc<[Resolved]>, ResolveError> {
        let only = request.only.unwrap_or(self.default_only);
        let outcomes = self.outcomes(only, request.method);

        let mut resolved = Vec::new();
        for outcome in outcomes.iter() {
            match outcome {
                Ok(items) => resolved.extend(items.iter().cloned()),
                Err(e) if request.ignore_unavailable && e.is_unavailable() => {
                    debug!(error = %e, "ignoring unavailable named argument");
                }
                Err(e) => return Err(e.clone()),
            }
        }
        if request.uniq {
            resolved = dedup(resolved);
        }
        Ok(resolved.into())
    }

    pub fn to_formulae(&self) -> Result<Vec<Formula>, ResolveError> {
        let resolved = self.to_formulae_and_casks(Request::new().only(Some(Only::Formula)))?;
        Ok(resolved
            .iter()
            .filter_map(|r| match r {
                Resolved::Formula(f) => Some(f.clone()),
                _ => None,
            })
            .collect())
    }

    pub fn to_casks(&self) -> Result<Vec<Cask>, ResolveError> {
        let resolved = self.to_formulae_and_casks(Request::new().only(Some(Only::Cask)))?;
        Ok(casks_of(&resolved))
    }

    pub fn to_resolved_formulae(&self) -> Result<Vec<Formula>, ResolveError> {
        let resolved = self.to_formulae_and_casks(
            Request::new()
                .only(Some(Only::Formula))
                .method(ResolveMethod::Resolve),
        )?;
        Ok(resolved
            .iter()
            .filter_map(|r| match r {
                Resolved::Formula(f) => Some(f.clone()),
                _ => None,
            })
            .collect())
    }

    /// Splits into formulae or kegs on one side and casks on the other.
    pub fn to_formulae_to_casks(
        &self,
        only: Option<Only>,
        method: ResolveMethod,
    ) -> Result<(Vec<Resolved>, Vec<Cask>), ResolveError> {
        let resolved = self.to_formulae_and_casks(Request::new().only(only).method(method))?;
        let (formulae, casks): (Vec<Resolved>, Vec<Resolved>) =
            resolved.iter().cloned().partition(Resolved::is_formula_like);
        Ok((formulae, casks_of(&casks)))
    }

    pub fn to_resolved_formulae_to_casks(
        &self,
        only: Option<Only>,
    ) -> Result<(Vec<Formula>, Vec<Cask>), ResolveError> {
        let (formulae, casks) = self.to_formulae_to_casks(only, ResolveMethod::Resolve)?;
        let formulae = formulae
            .into_iter()
            .filter_map(|r| match r {
                Resolved::Formula(f) => Some(f),
                _ => None,
            })
            .collect();
        Ok((formulae, casks))
    }

    /// Like [`NamedArgs::to_formulae_and_casks`], but tokens that name neither
    /// a formula nor a cask are returned as errors in place.
    pub fn to_formulae_and_casks_and_unavailable(
        &self,
        only: Option<Only>,
        method: ResolveMethod,
    ) -> Result<Vec<Result<Resolved, ResolveError>>, ResolveError> {
        let outcomes = self.outcomes(only, method);
        let mut out: Vec<Result<Resolved, ResolveError>> = Vec::new();
        for outcome in outcomes.iter() {
            match outcome {
                Ok(items) => out.extend(items.iter().cloned().map(Ok)),
                Err(e) if e.is_formula_or_cask_unavailable() => out.push(Err(e.clone())),
                Err(e) => return Err(e.clone()),
            }
        }
        Ok(dedup(out))
    }

    pub fn to_kegs(&self) -> Result<Vec<Keg>, ResolveError> {
        self.formula_kegs(ResolveMethod::Kegs)
    }

    pub fn to_default_kegs(&self) -> Result<Vec<Keg>, ResolveError> {
        self.formula_kegs(ResolveMethod::DefaultKegs)
    }

    pub fn to_latest_kegs(&self) -> Result<Vec<Keg>, ResolveError> {
        self.formula_kegs(ResolveMethod::LatestKegs)
    }

    fn formula_kegs(&self, method: ResolveMethod) -> Result<Vec<Keg>, ResolveError> {
        let resolved =
            self.to_formulae_and_casks(Request::new().only(Some(Only::Formula)).method(method))?;
        Ok(kegs_of(&resolved))
    }

    /// Installed kegs (every version with `all_kegs`, else the default one) and casks.
    pub fn to_kegs_to_casks(
        &self,
        only: Option<Only>,
        ignore_unavailable: bool,
        all_kegs: bool,
    ) -> Result<(Vec<Keg>, Vec<Cask>), ResolveError> {
        let method = if all_kegs {
            ResolveMethod::Kegs
        } else {
            ResolveMethod::DefaultKegs
        };
        let resolved = self.to_formulae_and_casks(
            Request::new()
                .only(only)
                .method(method)
                .ignore_unavailable(ignore_unavailable),
        )?;
        Ok((kegs_of(&resolved), casks_of(&resolved)))
    }

    pub fn to_taps(&self) -> Result<Vec<Tap>, ResolveError> {
        let mut taps = Vec::new();
        for name in self.downcased_unique_named() {
            taps.push(self.fetch_tap(&name)?);
        }
        Ok(dedup(taps))
    }

    pub fn to_installed_taps(&self) -> Result<Vec<Tap>, ResolveError> {
        let taps = self.to_taps()?;
        if let Some(tap) = taps.iter().find(|t| !t.installed) {
            return Err(ResolveError::TapUnavailable(tap.name()));
        }
        Ok(taps)
    }

    /// Existing paths are kept; `user/repo` becomes a tap directory (or its
    /// definition files with `recurse_tap`); anything else becomes the
    /// formula and/or cask definition path that exists.
    pub fn to_paths(&self, only: Option<Only>, recurse_tap: bool) -> Result<Vec<PathBuf>, ResolveError> {
        let mut paths = Vec::new();
        for name in self.downcased_unique_named() {
            let path = PathBuf::from(&name);
            if path.exists() {
                paths.push(path);
                continue;
            }

            if name.matches('/').count() == 1 && !name.starts_with("./") && !name.starts_with('/') {
                let tap = self.fetch_tap(&name)?;
                match (recurse_tap, only) {
                    (true, Some(Only::Formula)) => paths.extend(self.backend.tap_formula_files(&tap)),
                    (true, Some(Only::Cask)) => paths.extend(self.backend.tap_cask_files(&tap)),
                    _ => paths.push(tap.path),
                }
                continue;
            }

            match only {
                Some(Only::Formula) => paths.push(self.backend.formula_path(&name)),
                Some(Only::Cask) => paths.push(self.backend.cask_path(&name)),
                None => {
                    let candidates: Vec<PathBuf> = [
                        self.backend.formula_path(&name),
                        self.backend.cask_path(&name),
                    ]
                    .into_iter()
                    .filter(|p| p.exists())
                    .collect();
                    if candidates.is_empty() {
                        paths.push(path);
                    } else {
                        paths.extend(candidates);
                    }
                }
            }
        }
        Ok(dedup(paths))
    }

    /// Tokens of the form `homebrew/cask*/<token>`.
    pub fn homebrew_tap_cask_names(&self) -> Vec<String> {
        self.downcased_unique_named()
            .into_iter()
            .filter(|name| is_official_cask_ref(name))
            .collect()
    }

    fn fetch_tap(&self, name: &str) -> Result<Tap, ResolveError> {
        match name.split_once('/') {
            Some((user, repo)) if !user.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(self.backend.fetch_tap(user, repo))
            }
            _ => Err(ResolveError::InvalidTapName(name.to_string())),
        }
    }

    fn outcomes(&self, only: Option<Only>, method: ResolveMethod) -> Rc<[Outcome]> {
        let key = (only, method);
        let cached = self.cache.borrow().get(&key).cloned();
        if let Some(hit) = cached {
            debug!(?only, ?method, "named argument cache hit");
            return hit;
        }

        let computed: Rc<[Outcome]> = self
            .downcased_unique_named()
            .iter()
            .map(|name| self.load_formula_or_cask(name, only, method))
            .collect();
        self.cache.borrow_mut().insert(key, Rc::clone(&computed));
        computed
    }

    fn load_formula_or_cask(&self, name: &str, only: Option<Only>, method: ResolveMethod) -> Outcome {
        let mut unreadable: Option<ResolveError> = None;

        if only != Some(Only::Cask) {
            match self.load_formula_side(name, method) {
                Ok(found) => {
                    if only != Some(Only::Formula) {
                        self.warn_if_cask_conflicts(name, "formula");
                    }
                    return Ok(found);
                }
                Err(e) if e.is_unreadable() => unreadable = Some(e),
                Err(e) if e.is_unavailable() => {
                    if only == Some(Only::Formula) {
                        return Err(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if only != Some(Only::Formula) {
            let keg_like = method.wants_keg_like_cask();
            let config = self.cask_config.as_ref();
            match self.backend.load_cask(name, config) {
                Lookup::Found(cask) => {
                    if let Some(e) = &unreadable {
                        self.report_error(format!("Failed to load formula: {name}\n{e}"));
                        self.warn(format!("Treating {name} as a cask."));
                    }
                    let cask = if keg_like {
                        self.installed_cask(name, cask)
                    } else {
                        cask
                    };
                    return Ok(vec![Resolved::Cask(cask)]);
                }
                Lookup::Broken(reason) => {
                    if keg_like {
                        return Ok(vec![Resolved::Cask(self.stub_cask(name))]);
                    }
                    unreadable.get_or_insert(ResolveError::CaskUnreadable {
                        token: name.to_string(),
                        reason,
                    });
                }
                Lookup::NotFound => {
                    if only == Some(Only::Cask) {
                        return Err(ResolveError::CaskUnavailable(name.to_string()));
                    }
                }
                Lookup::Ambiguous(candidates) => {
                    return Err(ResolveError::TapCaskAmbiguity {
                        token: name.to_string(),
                        candidates,
                    });
                }
            }
        }

        if let Some(e) = unreadable {
            return Err(e);
        }

        let lowered = name.to_lowercase();
        let parts: Vec<&str> = lowered.splitn(3, '/').collect();
        if let [user, repo, short_name] = parts[..] {
            if !repo.is_empty() && !short_name.is_empty() {
                let tap = self.backend.fetch_tap(user, repo);
                return Err(ResolveError::TapFormulaOrCaskUnavailable {
                    tap: tap.name(),
                    name: short_name.to_string(),
                });
            }
        }

        if self.backend.resolve_formula(name, &self.load_options).is_found() {
            let rack = self.backend.rack(&lowered);
            return Err(ResolveError::NoSuchKeg {
                name: name.to_string(),
                rack: rack.path,
            });
        }

        Err(ResolveError::FormulaOrCaskUnavailable(name.to_string()))
    }

    fn load_formula_side(&self, name: &str, method: ResolveMethod) -> Outcome {
        match method {
            ResolveMethod::Factory => {
                let formula = formula_lookup(name, self.backend.load_formula(name, &self.load_options))?;
                Ok(vec![Resolved::Formula(formula)])
            }
            ResolveMethod::Resolve => {
                let formula =
                    formula_lookup(name, self.backend.resolve_formula(name, &self.load_options))?;
                Ok(vec![Resolved::Formula(formula)])
            }
            ResolveMethod::LatestKegs => Ok(vec![Resolved::Keg(self.resolve_latest_keg(name)?)]),
            ResolveMethod::DefaultKegs => Ok(vec![Resolved::Keg(self.resolve_default_keg(name)?)]),
            ResolveMethod::Kegs => {
                let (_, kegs) = self.resolve_kegs(name)?;
                Ok(kegs.into_iter().map(Resolved::Keg).collect())
            }
        }
    }

    fn resolve_kegs(&self, name: &str) -> Result<(Rack, Vec<Keg>), ResolveError> {
        let rack = self.backend.rack(&name.to_lowercase());
        let kegs = if name.is_empty() {
            Vec::new()
        } else {
            self.backend.kegs(&rack)
        };
        if kegs.is_empty() {
            return Err(ResolveError::NoSuchKeg {
                name: name.to_string(),
                rack: rack.path,
            });
        }
        Ok((rack, kegs))
    }

    fn resolve_latest_keg(&self, name: &str) -> Result<Keg, ResolveError> {
        let (rack, mut kegs) = self.resolve_kegs(name)?;

        if let Some(keg) = self.backend.opt_keg(&rack) {
            return Ok(keg);
        }
        if let Some(keg) = self.backend.linked_keg(&rack) {
            return Ok(keg);
        }
        if kegs.len() == 1 {
            return Ok(kegs.remove(0));
        }

        let newest_stable = kegs
            .iter()
            .filter(|k| !k.version.is_head())
            .max_by(|a, b| a.version.compare(&b.version));
        if let Some(keg) = newest_stable {
            return Ok(keg.clone());
        }

        kegs.into_iter()
            .max_by_key(|k| (self.backend.tab(k).source_modified_time, k.version.revision))
            .ok_or_else(|| ResolveError::NoSuchKeg {
                name: name.to_string(),
                rack: rack.path.clone(),
            })
    }

    fn resolve_default_keg(&self, name: &str) -> Result<Keg, ResolveError> {
        let (rack, mut kegs) = self.resolve_kegs(name)?;

        if let Some(keg) = self.backend.opt_keg(&rack) {
            return Ok(keg);
        }
        if let Some(keg) = self.backend.linked_keg(&rack) {
            return Ok(keg);
        }
        if kegs.len() == 1 {
            return Ok(kegs.remove(0));
        }

        let formula = if name.contains('/') || Path::new(name).exists() {
            self.backend.load_formula(name, &LoadOptions::default())
        } else {
            self.backend.formula_from_rack(&rack)
        };
        match formula {
            Lookup::Found(formula) => self
                .backend
                .latest_installed_prefix(&formula)
                .ok_or_else(|| {
                    ResolveError::MultipleVersionsInstalled(format!(
                        "{0} has multiple installed versions\nRun `cellar uninstall --force {0}` to remove all versions.",
                        rack.name
                    ))
                }),
            Lookup::NotFound | Lookup::Broken(_) => {
                Err(ResolveError::MultipleVersionsInstalled(format!(
                    "Multiple kegs installed to {}\nHowever we don't know which one you refer to.\nPlease delete (with `rm -rf`!) all but one and then try again.",
                    rack.path.display()
                )))
            }
            Lookup::Ambiguous(candidates) => Err(ResolveError::TapFormulaAmbiguity {
                name: name.to_string(),
                candidates,
            }),
        }
    }

    /// Prefers the cask file saved at install time, falling back to a stub
    /// when that copy no longer loads.
    fn installed_cask(&self, name: &str, cask: Cask) -> Cask {
        let Some(caskfile) = cask.installed_caskfile.clone().filter(|p| p.exists()) else {
            return cask;
        };
        match self
            .backend
            .load_cask_file(&caskfile, self.cask_config.as_ref())
        {
            Lookup::Found(installed) => installed,
            Lookup::Broken(reason) => {
                debug!(cask = name, %reason, "installed caskfile is unreadable");
                self.stub_cask(name)
            }
            Lookup::NotFound | Lookup::Ambiguous(_) => cask,
        }
    }

    fn stub_cask(&self, name: &str) -> Cask {
        Cask::stub(
            name,
            self.backend.installed_cask_version(name),
            self.cask_config.clone(),
        )
    }

    fn warn_if_cask_conflicts(&self, reference: &str, loaded_type: &str) {
        let mut message = format!("Treating {reference} as a {loaded_type}.");
        match self.backend.load_cask(reference, None) {
            Lookup::Found(cask) => {
                if let Some(tap) = &cask.tap {
                    message.push_str(&format!(" For the cask, use {}/{}", tap.name(), cask.token));
                }
            }
            Lookup::Broken(reason) => {
                self.report_error(format!("Failed to load cask: {reference}\n{reason}"));
            }
            Lookup::NotFound | Lookup::Ambiguous(_) => return,
        }
        self.warn(message);
    }

    fn warn(&self, message: String) {
        warn!("{message}");
        self.warnings.borrow_mut().push(message);
    }

    fn report_error(&self, message: String) {
        error!("{message}");
        self.warnings.borrow_mut().push(message);
    }
}

fn formula_lookup(name: &str, lookup: Lookup<Formula>) -> Result<Formula, ResolveError> {
    match lookup {
        Lookup::Found(formula) => Ok(formula),
        Lookup::NotFound => Err(ResolveError::FormulaUnavailable(name.to_string())),
        Lookup::Broken(reason) => Err(ResolveError::FormulaUnreadable {
            name: name.to_string(),
            reason,
        }),
        Lookup::Ambiguous(candidates) => Err(ResolveError::TapFormulaAmbiguity {
            name: name.to_string(),
            candidates,
        }),
    }
}

/// `homebrew/cask` or `homebrew/cask-<suffix>` followed by a token.
pub(crate) fn is_official_cask_ref(name: &str) -> bool {
    let mut parts = name.splitn(3, '/');
    let (Some(user), Some(repo), Some(token)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let repo = repo.to_ascii_lowercase();
    let repo_ok = repo == "cask"
        || repo
            .strip_prefix("cask-")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
    user.eq_ignore_ascii_case("homebrew")
        && repo_ok
        && !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.' | '@'))
}

fn casks_of(resolved: &[Resolved]) -> Vec<Cask> {
    resolved
        .iter()
        .filter_map(|r| match r {
            Resolved::Cask(c) => Some(c.clone()),
            _ => None,
        })
        .collect()
}

fn kegs_of(resolved: &[Resolved]) -> Vec<Keg> {
    resolved
        .iter()
        .filter_map(|r| match r {
            Resolved::Keg(k) => Some(k.clone()),
            _ => None,
        })
        .collect()
}

fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
