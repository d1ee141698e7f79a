//! The frozen result of a parse.

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexMap;

use crate::error::{ArgsError, ResolveError};
use crate::named_args::NamedArgs;
use crate::options::{OptionDef, option_to_name};
use crate::system::{Arch, Os, SystemInfo, valid_combination};

/// The value held by one declared option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `None` only for a negatable switch that was not passed.
    Switch(Option<bool>),
    Flag(Option<String>),
    List(Option<Vec<String>>),
}

impl Value {
    /// Whether the option counts as passed for conflicts and constraints.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Switch(v) => *v == Some(true),
            Self::Flag(v) => v.is_some(),
            Self::List(v) => v.is_some(),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Self::Switch(_) => "switch",
            Self::Flag(_) => "flag",
            Self::List(_) => "list",
        }
    }
}

/// Where a switch value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Args,
    Env,
}

/// Restriction to one of the two package domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Only {
    Formula,
    Cask,
}

impl fmt::Display for Only {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Formula => "formula",
            Self::Cask => "cask",
        })
    }
}

pub(crate) fn restriction(formula: bool, cask: bool) -> Option<Only> {
    match (formula, cask) {
        (true, false) => Some(Only::Formula),
        (false, true) => Some(Only::Cask),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Context {
    pub debug: bool,
    pub quiet: bool,
    pub verbose: bool,
}

/// Option values keyed by canonical name, with every declared alias pointing
/// at its slot. Only the parser holds this mutably.
#[derive(Debug, Clone, Default)]
pub(crate) struct OptionTable {
    values: IndexMap<String, Value>,
    aliases: HashMap<String, String>,
    sources: HashMap<String, Source>,
    negatable: HashSet<String>,
}

impl OptionTable {
    pub(crate) fn declare(&mut self, def: &OptionDef) {
        let key = def.key();
        for alias in def.aliases() {
            self.aliases.insert(alias, key.clone());
        }
        if def.is_negatable() {
            self.negatable.insert(key.clone());
        }
        self.sources.remove(&key);
        self.values.insert(key, def.default_value());
    }

    fn slot(&self, name: &str) -> Option<&str> {
        self.aliases
            .get(&option_to_name(name))
            .map(String::as_str)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).and_then(|key| self.values.get(key))
    }

    pub(crate) fn set(&mut self, name: &str, value: Value, source: Source) {
        let Some(key) = self.slot(name).map(str::to_string) else {
            return;
        };
        self.sources.insert(key.clone(), source);
        self.values.insert(key, value);
    }

    /// A default applied after parsing; it has no source, so it counts as
    /// passed on the command line when conflicts are checked.
    pub(crate) fn assume(&mut self, name: &str, value: Value) {
        let Some(key) = self.slot(name).map(str::to_string) else {
            return;
        };
        self.sources.remove(&key);
        self.values.insert(key, value);
    }

    /// Undeclared names count as not passed.
    pub(crate) fn passed(&self, name: &str) -> bool {
        self.get(name).is_some_and(Value::is_set)
    }

    pub(crate) fn source(&self, name: &str) -> Option<Source> {
        self.slot(name).and_then(|key| self.sources.get(key).copied())
    }

    pub(crate) fn disable_switch(&mut self, name: &str) {
        let Some(key) = self.slot(name).map(str::to_string) else {
            return;
        };
        let value = if self.negatable.contains(&key) {
            Value::Switch(None)
        } else {
            Value::Switch(Some(false))
        };
        self.values.insert(key, value);
    }
}

/// Parsed, validated and frozen arguments of one invocation.
///
/// There is no mutating API: every accessor borrows.
#[derive(Debug)]
pub struct Args {
    table: OptionTable,
    named: NamedArgs,
    remaining: Vec<String>,
    cli_args: Vec<String>,
    options_only: Vec<String>,
    flags_only: Vec<String>,
    system: SystemInfo,
}

impl Args {
    pub(crate) fn new(
        table: OptionTable,
        named: NamedArgs,
        remaining: Vec<String>,
        cli_args: Vec<String>,
        system: SystemInfo,
    ) -> Self {
        let options_only = cli_args
            .iter()
            .filter(|a| a.starts_with('-'))
            .cloned()
            .collect();
        let flags_only = cli_args
            .iter()
            .filter(|a| a.starts_with("--"))
            .cloned()
            .collect();
        Self {
            table,
            named,
            remaining,
            cli_args,
            options_only,
            flags_only,
            system,
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.table.get(name).is_some()
    }

    /// The raw value of any declared option, by short, long or canonical name.
    pub fn get(&self, name: &str) -> Result<&Value, ArgsError> {
        self.table
            .get(name)
            .ok_or_else(|| ArgsError::Undeclared(name.to_string()))
    }

    /// A switch, with an unset negatable switch reading as false.
    pub fn switch(&self, name: &str) -> Result<bool, ArgsError> {
        Ok(self.switch_state(name)?.unwrap_or(false))
    }

    pub fn switch_state(&self, name: &str) -> Result<Option<bool>, ArgsError> {
        match self.get(name)? {
            Value::Switch(v) => Ok(*v),
            other => Err(wrong_kind(name, "switch", other)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<Option<&str>, ArgsError> {
        match self.get(name)? {
            Value::Flag(v) => Ok(v.as_deref()),
            other => Err(wrong_kind(name, "flag", other)),
        }
    }

    pub fn array(&self, name: &str) -> Result<Option<&[String]>, ArgsError> {
        match self.get(name)? {
            Value::List(v) => Ok(v.as_deref()),
            other => Err(wrong_kind(name, "list", other)),
        }
    }

    pub fn source(&self, name: &str) -> Option<Source> {
        self.table.source(name)
    }

    pub fn named(&self) -> &NamedArgs {
        &self.named
    }

    pub fn no_named(&self) -> bool {
        self.named.is_empty()
    }

    /// Tokens left over after option parsing, with `--` kept between the
    /// option region and the forced positionals.
    pub fn remaining(&self) -> &[String] {
        &self.remaining
    }

    /// Passed options in declaration order, rendered back to argv form.
    pub fn cli_args(&self) -> &[String] {
        &self.cli_args
    }

    pub fn options_only(&self) -> &[String] {
        &self.options_only
    }

    pub fn flags_only(&self) -> &[String] {
        &self.flags_only
    }

    /// The literal value of `--name=value` as it appears in [`Args::flags_only`].
    pub fn value(&self, name: &str) -> Option<&str> {
        let prefix = if name.starts_with("--") {
            format!("{name}=")
        } else {
            format!("--{}=", name.replace('_', "-"))
        };
        self.flags_only
            .iter()
            .find_map(|arg| arg.strip_prefix(prefix.as_str()))
    }

    pub fn context(&self) -> Context {
        Context {
            debug: self.table.passed("debug"),
            quiet: self.table.passed("quiet"),
            verbose: self.table.passed("verbose"),
        }
    }

    pub fn only_formula_or_cask(&self) -> Option<Only> {
        restriction(self.table.passed("formula"), self.table.passed("cask"))
    }

    /// Targets selected by `--os` and `--arch`, defaulting to the current system.
    ///
    /// Impossible pairs are dropped only when one of the axes was `all`.
    pub fn os_arch_combinations(&self) -> Result<Vec<(Os, Arch)>, ArgsError> {
        let mut skip_invalid = false;

        let oses = match self.optional_flag("os") {
            None => vec![self.system.os],
            Some("all") => {
                skip_invalid = true;
                Os::all()
            }
            Some(os) => vec![os.parse()?],
        };
        let arches = match self.optional_flag("arch") {
            None => vec![self.system.arch],
            Some("all") => {
                skip_invalid = true;
                Arch::ALL.to_vec()
            }
            Some(arch) => vec![arch.parse()?],
        };

        Ok(oses
            .iter()
            .flat_map(|os| arches.iter().map(move |arch| (*os, *arch)))
            .filter(|(os, arch)| !skip_invalid || valid_combination(*os, *arch))
            .collect())
    }

    fn optional_flag(&self, name: &str) -> Option<&str> {
        match self.table.get(name) {
            Some(Value::Flag(v)) => v.as_deref(),
            _ => None,
        }
    }

    /// Full names of the named formulae when a source build was requested.
    pub fn build_from_source_formulae(&self) -> Result<Vec<String>, ResolveError> {
        if self.table.passed("build_from_source")
            || self.table.passed("HEAD")
            || self.table.passed("build_bottle")
        {
            self.named_formula_names()
        } else {
            Ok(Vec::new())
        }
    }

    pub fn include_test_formulae(&self) -> Result<Vec<String>, ResolveError> {
        if self.table.passed("include_test") {
            self.named_formula_names()
        } else {
            Ok(Vec::new())
        }
    }

    fn named_formula_names(&self) -> Result<Vec<String>, ResolveError> {
        Ok(self
            .named
            .to_formulae()?
            .into_iter()
            .map(|f| f.full_name)
            .collect())
    }

    pub fn system(&self) -> SystemInfo {
        self.system
    }
}

fn wrong_kind(name: &str, expected: &'static str, actual: &Value) -> ArgsError {
    ArgsError::WrongKind {
        name: name.to_string(),
        expected,
        actual: actual.kind_name(),
    }
}
