//! Two-pass argv parsing, validation and freezing into [`Args`].
//!
//! Commands that accept formula options are parsed twice: a permissive
//! bootstrap pass finds the package names so their options can be declared,
//! then the authoritative pass runs against the extended spec.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::args::{Args, OptionTable, Source, Value, restriction};
use crate::backend::{Backend, CaskConfig, Formula, LoadOptions, Lookup, Spec};
use crate::error::{ParseError, ParseFailure};
use crate::named_args::{NamedArgs, is_official_cask_ref};
use crate::options::{CommandSpec, NamedArgType, OptionKind, cask_dir_keys, name_to_option};
use crate::system::SystemInfo;
use crate::usage;

/// What a successful parse produced.
#[derive(Debug)]
pub enum ParseOutcome {
    Args(Args),
    /// `--help` was passed; the rendered help text.
    Help(String),
}

pub struct Parser {
    spec: CommandSpec,
    backend: Rc<dyn Backend>,
    permissive: bool,
    system: SystemInfo,
    commands: Vec<String>,
    banner: String,
}

/// Tokens left after walking argv: positionals from the option region, and
/// everything after the first literal `--`.
#[derive(Debug, Default)]
struct Walked {
    remaining: Vec<String>,
    after: Vec<String>,
}

struct LongName {
    name: String,
    index: usize,
    negated: bool,
}

enum Token {
    /// Values to store, and whether the next argv token was consumed.
    Matched(Vec<(usize, Value)>, bool),
    Unknown,
}

impl Parser {
    pub fn new(spec: CommandSpec, backend: Rc<dyn Backend>) -> Self {
        let banner = usage::generate_banner(&spec);
        Self {
            spec,
            backend,
            permissive: false,
            system: SystemInfo::current(),
            commands: Vec::new(),
            banner,
        }
    }

    /// Keep unknown options as positionals and skip validation.
    pub fn permissive(mut self, permissive: bool) -> Self {
        self.permissive = permissive;
        self
    }

    pub fn system(mut self, system: SystemInfo) -> Self {
        self.system = system;
        self
    }

    /// Command names accepted as positionals when the command takes `Command` arguments.
    pub fn commands<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn help_text(&self) -> String {
        usage::help_text(&self.spec, &self.banner)
    }

    /// Parses `argv`, reading switch defaults from `CELLAR_*` variables.
    pub fn parse(self, argv: &[String]) -> Result<ParseOutcome, ParseFailure> {
        let env: Vec<(String, String)> = std::env::vars()
            .filter(|(key, _)| key.starts_with("CELLAR_"))
            .collect();
        self.parse_with_env(argv, &env)
    }

    pub fn parse_with_env(
        mut self,
        argv: &[String],
        env: &[(String, String)],
    ) -> Result<ParseOutcome, ParseFailure> {
        debug!(command = %self.spec.command, ?argv, "parsing arguments");
        match self.run(argv, env) {
            Ok(outcome) => Ok(outcome),
            Err(error) => Err(ParseFailure {
                error,
                usage: self.help_text(),
            }),
        }
    }

    fn run(&mut self, argv: &[String], env: &[(String, String)]) -> Result<ParseOutcome, ParseError> {
        let env: HashMap<&str, &str> = env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let mut table = OptionTable::default();
        for def in &self.spec.options {
            table.declare(def);
        }
        for def in &self.spec.options {
            let Some(var) = def.env_var() else { continue };
            if env.get(var.as_str()).is_some_and(|v| !v.is_empty()) {
                table.set(&def.key(), Value::Switch(Some(true)), Source::Env);
            }
        }

        let mut argv = argv.to_vec();
        let only_casks = argv.iter().any(|a| a == "--cask" || a == "--casks");
        if self.spec.formula_options && !only_casks {
            argv = self.bootstrap(&mut table, &argv)?;
        }

        let walked = self.walk(&mut table, &argv, self.permissive)?;

        if !self.permissive && table.passed("help") {
            return Ok(ParseOutcome::Help(self.help_text()));
        }

        let named: Vec<String> = if self.permissive {
            Vec::new()
        } else {
            walked
                .remaining
                .iter()
                .chain(walked.after.iter())
                .cloned()
                .collect()
        };

        if !self.permissive {
            self.apply_platform_defaults(&mut table)?;
            self.check_constraint_violations(&mut table)?;
            self.check_named_args(named.len())?;
        }

        Ok(ParseOutcome::Args(self.freeze(table, walked, named)))
    }

    /// Permissive first pass that declares the options of every named formula.
    /// Returns argv rebuilt as `remaining -- after`.
    fn bootstrap(&mut self, table: &mut OptionTable, argv: &[String]) -> Result<Vec<String>, ParseError> {
        let walked = self.walk(table, argv, true)?;

        let names = walked
            .remaining
            .iter()
            .filter(|arg| !arg.starts_with('-'))
            .chain(walked.after.iter())
            .filter(|arg| !is_official_cask_ref(arg));
        let head = walked.remaining.iter().any(|a| a == "--HEAD") || table.passed("HEAD");
        let options = LoadOptions {
            spec: Some(if head { Spec::Head } else { Spec::Stable }),
            force_bottle: false,
            flags: walked
                .remaining
                .iter()
                .filter(|a| a.starts_with("--"))
                .cloned()
                .collect(),
        };

        let mut formulae: Vec<Formula> = Vec::new();
        for name in names {
            match self.backend.load_formula(name, &options) {
                Lookup::Found(formula) => {
                    if !formulae.iter().any(|f| f.name == formula.name) {
                        formulae.push(formula);
                    }
                }
                Lookup::NotFound => debug!(name = %name, "no formula for options bootstrap"),
                Lookup::Broken(reason) => {
                    debug!(name = %name, %reason, "unreadable formula during options bootstrap")
                }
                Lookup::Ambiguous(candidates) => {
                    debug!(name = %name, ?candidates, "ambiguous formula during options bootstrap")
                }
            }
        }

        for formula in &formulae {
            for option in &formula.options {
                let description = format!("`{}`: {}", formula.name, option.description);
                if option.flag.ends_with('=') {
                    self.spec.flag(&[option.flag.as_str()], description);
                } else {
                    self.spec.switch(&[option.flag.as_str()], description);
                }
                self.spec.conflicts(&["--cask", option.flag.as_str()]);
                if let Some(def) = self.spec.options.last() {
                    table.declare(def);
                }
            }
        }

        let mut rebuilt = walked.remaining;
        rebuilt.push("--".to_string());
        rebuilt.extend(walked.after);
        Ok(rebuilt)
    }

    fn walk(&self, table: &mut OptionTable, argv: &[String], permissive: bool) -> Result<Walked, ParseError> {
        let (region, after) = match argv.iter().position(|a| a == "--") {
            Some(sep) => (&argv[..sep], argv[sep + 1..].to_vec()),
            None => (argv, Vec::new()),
        };

        let longs = self.long_names();
        let allow_commands = self.spec.named.accepts(&NamedArgType::Command);
        let mut remaining = Vec::new();

        let mut i = 0;
        while i < region.len() {
            let arg = region[i].as_str();
            let next = region.get(i + 1).map(String::as_str);

            let token = if arg.starts_with("--") {
                self.long_option(&longs, arg, next)
            } else if arg.starts_with('-') && arg.len() > 1 {
                self.short_cluster(arg, next)
            } else {
                remaining.push(arg.to_string());
                i += 1;
                continue;
            };

            match token {
                Ok(Token::Matched(values, consumed_next)) => {
                    for (index, value) in values {
                        let key = self.spec.options[index].key();
                        table.set(&key, value, Source::Args);
                    }
                    if consumed_next {
                        i += 1;
                    }
                }
                Ok(Token::Unknown) | Err(ParseError::AmbiguousOption { .. })
                    if permissive || (allow_commands && self.commands.iter().any(|c| c == arg)) =>
                {
                    remaining.push(arg.to_string());
                }
                Ok(Token::Unknown) => return Err(ParseError::InvalidOption(arg.to_string())),
                Err(e) => return Err(e),
            }
            i += 1;
        }

        Ok(Walked { remaining, after })
    }

    fn long_names(&self) -> Vec<LongName> {
        let mut names = Vec::new();
        for (index, def) in self.spec.options.iter().enumerate() {
            for long in &def.longs {
                let name = long.trim_start_matches('-').to_string();
                if def.negatable {
                    names.push(LongName {
                        name: format!("no-{name}"),
                        index,
                        negated: true,
                    });
                }
                names.push(LongName {
                    name,
                    index,
                    negated: false,
                });
            }
        }
        names
    }

    /// Exact match first, then a unique case-insensitive prefix. A longer
    /// candidate extending the shortest one does not make it ambiguous.
    fn match_long<'n>(&self, longs: &'n [LongName], given: &str) -> Result<Option<&'n LongName>, ParseError> {
        if let Some(exact) = longs.iter().find(|l| l.name == given) {
            return Ok(Some(exact));
        }

        let lowered = given.to_lowercase();
        let mut candidates: Vec<&LongName> = longs
            .iter()
            .filter(|l| l.name.to_lowercase().starts_with(&lowered))
            .collect();
        candidates.sort_by_key(|l| l.name.len());

        let Some(shortest) = candidates.first().copied() else {
            return Ok(None);
        };
        let unambiguous = candidates.iter().all(|c| {
            (c.index == shortest.index && c.negated == shortest.negated)
                || c.name.starts_with(&shortest.name)
        });
        if unambiguous {
            return Ok(Some(shortest));
        }

        let mut names: Vec<String> = candidates.iter().map(|c| format!("--{}", c.name)).collect();
        names.dedup();
        Err(ParseError::AmbiguousOption {
            option: format!("--{given}"),
            candidates: names,
        })
    }

    fn long_option(&self, longs: &[LongName], arg: &str, next: Option<&str>) -> Result<Token, ParseError> {
        let body = &arg[2..];
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (body, None),
        };
        let name = name.replace('_', "-");

        let Some(long) = self.match_long(longs, &name)? else {
            return Ok(Token::Unknown);
        };
        let def = &self.spec.options[long.index];

        match def.kind {
            OptionKind::Switch => {
                if inline.is_some() {
                    return Err(ParseError::NeedlessArgument(arg.to_string()));
                }
                Ok(Token::Matched(vec![(long.index, Value::Switch(Some(!long.negated)))], false))
            }
            OptionKind::OptionalFlag => Ok(Token::Matched(
                vec![(long.index, Value::Flag(inline))],
                false,
            )),
            kind => {
                let (value, consumed) = match (inline, next) {
                    (Some(value), _) => (value, false),
                    (None, Some(next)) => (next.to_string(), true),
                    (None, None) => return Err(ParseError::MissingArgument(arg.to_string())),
                };
                Ok(Token::Matched(
                    vec![(long.index, required_value(kind, value))],
                    consumed,
                ))
            }
        }
    }

    /// `-abc`: every character must be a known short option or the whole
    /// token is rejected.
    fn short_cluster(&self, arg: &str, next: Option<&str>) -> Result<Token, ParseError> {
        let body = &arg[1..];
        let mut values = Vec::new();

        for (pos, c) in body.char_indices() {
            let short = format!("-{c}");
            let Some(index) = self
                .spec
                .options
                .iter()
                .position(|def| def.shorts.contains(&short))
            else {
                return Ok(Token::Unknown);
            };

            let kind = self.spec.options[index].kind;
            if kind == OptionKind::Switch {
                values.push((index, Value::Switch(Some(true))));
                continue;
            }

            let rest = &body[pos + c.len_utf8()..];
            if !rest.is_empty() {
                let value = match kind {
                    OptionKind::OptionalFlag => Value::Flag(Some(rest.to_string())),
                    kind => required_value(kind, rest.to_string()),
                };
                values.push((index, value));
                return Ok(Token::Matched(values, false));
            }
            return match (kind, next) {
                (OptionKind::OptionalFlag, _) => {
                    values.push((index, Value::Flag(None)));
                    Ok(Token::Matched(values, false))
                }
                (kind, Some(next)) => {
                    values.push((index, required_value(kind, next.to_string())));
                    Ok(Token::Matched(values, true))
                }
                (_, None) => Err(ParseError::MissingArgument(short)),
            };
        }

        Ok(Token::Matched(values, false))
    }

    /// Linux defaults `--formula` to on and rejects `--cask`.
    fn apply_platform_defaults(&self, table: &mut OptionTable) -> Result<(), ParseError> {
        if self.spec.dev_command || !self.system.is_linux() {
            return Ok(());
        }
        if self.spec.find("formula").is_some() {
            table.assume("formula", Value::Switch(Some(true)));
        }
        if table.passed("cask") {
            return Err(ParseError::CaskOnLinux);
        }
        Ok(())
    }

    fn check_constraint_violations(&self, table: &mut OptionTable) -> Result<(), ParseError> {
        self.check_invalid_constraints()?;
        self.check_conflicts(table)?;
        self.check_constraints(table)
    }

    fn check_invalid_constraints(&self) -> Result<(), ParseError> {
        for group in &self.spec.conflicts {
            for (primary, secondary) in &self.spec.constraints {
                if group.contains(primary) && group.contains(secondary) {
                    return Err(ParseError::InvalidConstraint {
                        primary: primary.clone(),
                        secondary: secondary.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Two or more passed members conflict unless exactly one came from argv,
    /// in which case the env-sourced ones are switched back off.
    fn check_conflicts(&self, table: &mut OptionTable) -> Result<(), ParseError> {
        for group in &self.spec.conflicts {
            let violations: Vec<&String> = group.iter().filter(|o| table.passed(o)).collect();
            if violations.len() < 2 {
                continue;
            }

            let from_env: Vec<&String> = violations
                .iter()
                .copied()
                .filter(|o| table.source(o) == Some(Source::Env))
                .collect();
            if violations.len() - from_env.len() != 1 {
                return Err(ParseError::OptionConflict(
                    violations.iter().map(|o| name_to_option(o)).collect(),
                ));
            }

            for option in from_env {
                debug!(option = %option, "overriding environment default with command-line option");
                table.disable_switch(option);
            }
        }
        Ok(())
    }

    fn check_constraints(&self, table: &OptionTable) -> Result<(), ParseError> {
        for (primary, secondary) in &self.spec.constraints {
            if table.passed(secondary) && !table.passed(primary) {
                return Err(ParseError::OptionConstraint {
                    primary: name_to_option(primary),
                    secondary: name_to_option(secondary),
                });
            }
        }
        Ok(())
    }

    fn check_named_args(&self, count: usize) -> Result<(), ParseError> {
        let spec = &self.spec.named;
        let types = spec.kind_names();
        match (spec.min, spec.max) {
            (Some(min), Some(max)) if min == max && count != max => {
                Err(ParseError::NumberOfNamedArguments { count: min, types })
            }
            (Some(min), _) if count < min => Err(ParseError::MinNamedArguments { minimum: min, types }),
            (_, Some(max)) if count > max => Err(ParseError::MaxNamedArguments { maximum: max, types }),
            _ => Ok(()),
        }
    }

    fn freeze(&self, table: OptionTable, walked: Walked, named: Vec<String>) -> Args {
        let Walked { mut remaining, after } = walked;
        if !remaining.is_empty() && !after.is_empty() {
            remaining.push("--".to_string());
        }
        remaining.extend(after);

        let mut cli_args = Vec::new();
        for def in &self.spec.options {
            let option = def.display_name();
            match table.get(&def.key()) {
                Some(Value::Switch(Some(true))) => cli_args.push(option.to_string()),
                Some(Value::Switch(Some(false))) if def.is_negatable() => {
                    if let Some(long) = option.strip_prefix("--") {
                        cli_args.push(format!("--no-{long}"));
                    }
                }
                Some(Value::Flag(Some(value))) => cli_args.push(format!("{option}={value}")),
                Some(Value::List(Some(list))) => {
                    cli_args.push(format!("{option}={}", list.join(",")))
                }
                _ => {}
            }
        }

        let load_options = LoadOptions {
            spec: table.passed("HEAD").then_some(Spec::Head),
            force_bottle: table.passed("force_bottle"),
            flags: cli_args
                .iter()
                .filter(|a| a.starts_with("--"))
                .cloned()
                .collect(),
        };

        let cask_config = self.spec.cask_options.then(|| {
            let dirs: IndexMap<String, String> = cask_dir_keys()
                .filter_map(|key| match table.get(&key) {
                    Some(Value::Flag(Some(dir))) => Some((key, dir.clone())),
                    _ => None,
                })
                .collect();
            let languages = match table.get("language") {
                Some(Value::List(Some(list))) => list.clone(),
                _ => Vec::new(),
            };
            CaskConfig { dirs, languages }
        });

        let named = NamedArgs::new(
            named,
            Rc::clone(&self.backend),
            restriction(table.passed("formula"), table.passed("cask")),
            load_options,
            cask_config,
        );
        Args::new(table, named, remaining, cli_args, self.system)
    }
}

fn required_value(kind: OptionKind, value: String) -> Value {
    match kind {
        OptionKind::CommaArray if value.is_empty() => Value::List(Some(Vec::new())),
        OptionKind::CommaArray => Value::List(Some(value.split(',').map(str::to_string).collect())),
        _ => Value::Flag(Some(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::Only;
    use crate::backend::{
        CaskLoader, FormulaLoader, FormulaOption, KegStore, Keg, Rack, Tab, Tap, TapRegistry,
    };
    use crate::options::{Count, OptionOpts};
    use crate::system::{Arch, MacosVersion, Os};
    use std::path::{Path, PathBuf};

    #[derive(Default)]
    struct StubBackend {
        formulae: Vec<Formula>,
    }

    impl FormulaLoader for StubBackend {
        fn load_formula(&self, name: &str, _options: &LoadOptions) -> Lookup<Formula> {
            self.formulae
                .iter()
                .find(|f| f.name == name)
                .cloned()
                .map_or(Lookup::NotFound, Lookup::Found)
        }

        fn formula_from_rack(&self, _rack: &Rack) -> Lookup<Formula> {
            Lookup::NotFound
        }

        fn formula_path(&self, name: &str) -> PathBuf {
            PathBuf::from(name)
        }
    }

    impl CaskLoader for StubBackend {
        fn load_cask(&self, _name: &str, _config: Option<&CaskConfig>) -> Lookup<crate::Cask> {
            Lookup::NotFound
        }

        fn load_cask_file(&self, _path: &Path, _config: Option<&CaskConfig>) -> Lookup<crate::Cask> {
            Lookup::NotFound
        }

        fn cask_path(&self, name: &str) -> PathBuf {
            PathBuf::from(name)
        }

        fn installed_cask_version(&self, _token: &str) -> Option<String> {
            None
        }
    }

    impl KegStore for StubBackend {
        fn rack(&self, name: &str) -> Rack {
            Rack {
                name: name.to_string(),
                path: PathBuf::from(name),
            }
        }

        fn kegs(&self, _rack: &Rack) -> Vec<Keg> {
            Vec::new()
        }

        fn opt_keg(&self, _rack: &Rack) -> Option<Keg> {
            None
        }

        fn linked_keg(&self, _rack: &Rack) -> Option<Keg> {
            None
        }

        fn latest_installed_prefix(&self, _formula: &Formula) -> Option<Keg> {
            None
        }

        fn tab(&self, _keg: &Keg) -> Tab {
            Tab::default()
        }
    }

    impl TapRegistry for StubBackend {
        fn fetch_tap(&self, user: &str, repo: &str) -> Tap {
            Tap {
                user: user.to_string(),
                repo: repo.to_string(),
                path: PathBuf::new(),
                installed: false,
            }
        }

        fn tap_formula_files(&self, _tap: &Tap) -> Vec<PathBuf> {
            Vec::new()
        }

        fn tap_cask_files(&self, _tap: &Tap) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    fn macos() -> SystemInfo {
        SystemInfo::new(Os::Macos(MacosVersion::Sonoma), Arch::Arm)
    }

    fn linux() -> SystemInfo {
        SystemInfo::new(Os::Linux, Arch::Intel)
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parser(spec: CommandSpec) -> Parser {
        Parser::new(spec, Rc::new(StubBackend::default())).system(macos())
    }

    fn run(parser: Parser, args: &[&str], vars: &[(&str, &str)]) -> Result<Args, ParseError> {
        match parser.parse_with_env(&argv(args), &env(vars)) {
            Ok(ParseOutcome::Args(args)) => Ok(args),
            Ok(ParseOutcome::Help(text)) => panic!("unexpected help output:\n{text}"),
            Err(failure) => Err(failure.error),
        }
    }

    fn parse(spec: CommandSpec, args: &[&str]) -> Args {
        match run(parser(spec), args, &[]) {
            Ok(args) => args,
            Err(e) => panic!("parse failed: {e}"),
        }
    }

    fn parse_err(spec: CommandSpec, args: &[&str]) -> ParseError {
        match run(parser(spec), args, &[]) {
            Ok(args) => panic!("expected an error, got: {args:?}"),
            Err(e) => e,
        }
    }

    fn install_spec() -> CommandSpec {
        let mut spec = CommandSpec::new("install");
        spec.switch(&["--formula", "--formulae"], "Treat all named arguments as formulae.")
            .switch(&["--cask", "--casks"], "Treat all named arguments as casks.")
            .switch(&["--HEAD"], "Install the HEAD version.")
            .switch(&["-s", "--build-from-source"], "Compile from source.")
            .switch(&["--force-bottle"], "Install from a bottle.")
            .switch(&["-f", "--force"], "Force.")
            .conflicts(&["--formula", "--cask"])
            .conflicts(&["--build-from-source", "--force-bottle"]);
        spec
    }

    #[test]
    fn switches_flags_and_lists_are_stored_and_echoed() {
        let mut spec = CommandSpec::new("x");
        spec.switch(&["-f", "--force"], "Force.")
            .flag(&["--os="], "Target OS.")
            .comma_array("--language", "Languages.");

        let args = parse(spec, &["-f", "--os=linux", "--language", "en,de", "foo"]);
        assert!(args.switch("force").unwrap());
        assert!(args.switch("-f").unwrap());
        assert_eq!(args.flag("os").unwrap(), Some("linux"));
        assert_eq!(args.array("language").unwrap(), Some(&["en".to_string(), "de".to_string()][..]));
        assert_eq!(args.named().as_slice(), ["foo"]);
        assert_eq!(args.cli_args(), ["--force", "--os=linux", "--language=en,de"]);
        assert_eq!(args.value("os"), Some("linux"));
        assert!(matches!(args.switch("os"), Err(crate::ArgsError::WrongKind { .. })));
        assert!(matches!(args.switch("nope"), Err(crate::ArgsError::Undeclared(_))));
    }

    #[test]
    fn repeated_flags_keep_the_last_value() {
        let mut spec = CommandSpec::new("x");
        spec.flag(&["--os="], "Target OS.");
        let args = parse(spec, &["--os=linux", "--os", "sonoma"]);
        assert_eq!(args.flag("os").unwrap(), Some("sonoma"));
        assert_eq!(args.value("--os"), Some("sonoma"));
    }

    #[test]
    fn long_names_complete_by_prefix() {
        let args = parse(install_spec(), &["--forc", "--build_from_source", "--head"]);
        assert!(args.switch("force").unwrap());
        assert!(!args.switch("force_bottle").unwrap());
        assert!(args.switch("build_from_source").unwrap());
        assert!(args.switch("HEAD").unwrap());

        let args = parse(install_spec(), &["--formul"]);
        assert!(args.switch("formula").unwrap());
    }

    #[test]
    fn shared_prefix_is_ambiguous() {
        match parse_err(install_spec(), &["--fo"]) {
            ParseError::AmbiguousOption { option, candidates } => {
                assert_eq!(option, "--fo");
                assert!(candidates.contains(&"--force".to_string()));
                assert!(candidates.contains(&"--formula".to_string()));
            }
            other => panic!("expected AmbiguousOption, got: {other:?}"),
        }
    }

    #[test]
    fn negatable_switches_have_three_states() {
        let spec = || {
            let mut spec = CommandSpec::new("x");
            spec.switch(&["--[no-]color"], "Colorize.")
                .switch(&["--plain"], "Plain.");
            spec
        };
        assert_eq!(parse(spec(), &[]).switch_state("color").unwrap(), None);
        assert_eq!(parse(spec(), &["--color"]).switch_state("color").unwrap(), Some(true));
        assert_eq!(parse(spec(), &["--no-color"]).switch_state("color").unwrap(), Some(false));
        assert!(!parse(spec(), &["--no-color"]).switch("color").unwrap());
        assert_eq!(
            parse_err(spec(), &["--no-plain"]),
            ParseError::InvalidOption("--no-plain".into())
        );
    }

    #[test]
    fn reconstructed_argv_reparses_to_the_same_values() {
        let spec = || {
            let mut spec = CommandSpec::new("x");
            spec.switch(&["-f", "--force"], "Force.")
                .switch(&["--dry-run"], "Dry run.")
                .switch(&["--[no-]color"], "Colorize.")
                .switch(&["--[no-]pager"], "Page.")
                .switch(&["--[no-]emoji"], "Emoji.")
                .flag(&["--os="], "Target OS.")
                .flag(&["--json"], "Print JSON.")
                .flag(&["--format"], "Format.")
                .comma_array("--language", "Languages.");
            spec
        };

        let first = run(
            parser(spec()),
            &[
                "--no-color",
                "--pager",
                "-f",
                "--os",
                "linux",
                "--json=v2",
                "--format",
                "--language=en,de",
                "a",
                "--",
                "-b",
            ],
            &[("CELLAR_VERBOSE", "1")],
        )
        .unwrap();
        assert_eq!(
            first.cli_args(),
            [
                "--verbose",
                "--force",
                "--no-color",
                "--pager",
                "--os=linux",
                "--json=v2",
                "--language=en,de",
            ]
        );
        assert_eq!(first.remaining(), ["a", "--", "-b"]);

        let again: Vec<&str> = first
            .cli_args()
            .iter()
            .chain(first.remaining())
            .map(String::as_str)
            .collect();
        let second = run(parser(spec()), &again, &[]).unwrap();

        for def in spec().options() {
            let key = def.key();
            assert_eq!(first.get(&key).unwrap(), second.get(&key).unwrap(), "value of {key}");
        }
        assert_eq!(second.switch_state("color").unwrap(), Some(false));
        assert_eq!(second.switch_state("emoji").unwrap(), None);
        assert!(!second.switch("dry_run").unwrap());
        assert_eq!(second.flag("format").unwrap(), None);
        assert_eq!(second.source("verbose"), Some(Source::Args));
        assert_eq!(second.cli_args(), first.cli_args());
        assert_eq!(second.named().as_slice(), ["a", "-b"]);
    }

    #[test]
    fn os_and_arch_select_bottle_targets() {
        let spec = || {
            let mut spec = CommandSpec::new("x");
            spec.flag(&["--os="], "Target OS.")
                .flag(&["--arch="], "Target architecture.");
            spec
        };
        let combos = |args: &[&str]| parse(spec(), args).os_arch_combinations();

        assert_eq!(
            combos(&[]).unwrap(),
            [(Os::Macos(MacosVersion::Sonoma), Arch::Arm)]
        );
        let on_linux = run(parser(spec()).system(linux()), &[], &[]).unwrap();
        assert_eq!(
            on_linux.os_arch_combinations().unwrap(),
            [(Os::Linux, Arch::Intel)]
        );

        // Explicit pairs are kept even when no binaries can exist for them.
        assert_eq!(
            combos(&["--os=linux", "--arch=arm"]).unwrap(),
            [(Os::Linux, Arch::Arm)]
        );
        assert_eq!(combos(&["--os=linux"]).unwrap(), [(Os::Linux, Arch::Arm)]);

        assert_eq!(
            combos(&["--os=all", "--arch=arm"]).unwrap(),
            [
                MacosVersion::Sonoma,
                MacosVersion::Ventura,
                MacosVersion::Monterey,
                MacosVersion::BigSur,
            ]
            .map(|v| (Os::Macos(v), Arch::Arm))
        );
        assert_eq!(
            combos(&["--os=linux", "--arch=all"]).unwrap(),
            [(Os::Linux, Arch::Intel)]
        );
        let everything = combos(&["--os=all", "--arch=all"]).unwrap();
        assert_eq!(everything.len(), 14);
        assert!(!everything.contains(&(Os::Linux, Arch::Arm)));
        assert!(everything.contains(&(Os::Macos(MacosVersion::ElCapitan), Arch::Intel)));

        assert_eq!(
            combos(&["--os=plan9"]).unwrap_err(),
            crate::ArgsError::UnknownSystem("plan9".into())
        );
        assert_eq!(
            combos(&["--arch=sparc"]).unwrap_err(),
            crate::ArgsError::UnknownSystem("sparc".into())
        );
    }

    #[test]
    fn switch_with_value_is_needless() {
        assert_eq!(
            parse_err(install_spec(), &["--force=yes"]),
            ParseError::NeedlessArgument("--force=yes".into())
        );
    }

    #[test]
    fn required_flag_takes_next_token_or_fails() {
        let spec = || {
            let mut spec = CommandSpec::new("x");
            spec.flag(&["-o", "--os="], "Target OS.");
            spec
        };
        assert_eq!(parse_err(spec(), &["--os"]), ParseError::MissingArgument("--os".into()));
        assert_eq!(parse_err(spec(), &["-o"]), ParseError::MissingArgument("-o".into()));
        assert_eq!(parse(spec(), &["--os", "-weird"]).flag("os").unwrap(), Some("-weird"));
        assert_eq!(parse(spec(), &["-olinux"]).flag("os").unwrap(), Some("linux"));
        assert_eq!(parse(spec(), &["-o", "linux"]).flag("os").unwrap(), Some("linux"));
        assert_eq!(
            parse_err(spec(), &["--os", "--", "linux"]),
            ParseError::MissingArgument("--os".into())
        );
    }

    #[test]
    fn optional_flag_never_consumes_the_next_token() {
        let spec = || {
            let mut spec = CommandSpec::new("x");
            spec.flag(&["--json"], "Print JSON.");
            spec
        };
        let args = parse(spec(), &["--json", "v2"]);
        assert_eq!(args.flag("json").unwrap(), None);
        assert_eq!(args.named().as_slice(), ["v2"]);
        assert_eq!(parse(spec(), &["--json=v2"]).flag("json").unwrap(), Some("v2"));
    }

    #[test]
    fn short_clusters_are_all_or_nothing() {
        let args = parse(install_spec(), &["-fs"]);
        assert!(args.switch("force").unwrap());
        assert!(args.switch("build_from_source").unwrap());

        assert_eq!(parse_err(install_spec(), &["-fz"]), ParseError::InvalidOption("-fz".into()));

        let args = run(parser(install_spec()).permissive(true), &["-fz"], &[]).unwrap();
        assert!(!args.switch("force").unwrap());
        assert_eq!(args.remaining(), ["-fz"]);
    }

    #[test]
    fn permissive_keeps_unknown_options_and_skips_validation() {
        let mut spec = install_spec();
        spec.named_args(&[NamedArgType::Formula], Count::exactly(1))
            .unwrap();
        let args = run(
            parser(spec).permissive(true),
            &["--with-foo", "--formula", "--cask", "a", "b"],
            &[],
        )
        .unwrap();
        assert_eq!(args.remaining(), ["--with-foo", "a", "b"]);
        assert!(args.named().is_empty());
        assert!(args.switch("formula").unwrap() && args.switch("cask").unwrap());
    }

    #[test]
    fn known_commands_pass_through_as_named() {
        let mut spec = CommandSpec::new("help");
        spec.named_args(&[NamedArgType::Command], Count::any())
            .unwrap();
        let args = run(parser(spec).commands(["--prefix"]), &["--prefix"], &[]).unwrap();
        assert_eq!(args.named().as_slice(), ["--prefix"]);
    }

    #[test]
    fn separator_forces_positionals() {
        let args = parse(install_spec(), &["foo", "--", "--force"]);
        assert!(!args.switch("force").unwrap());
        assert_eq!(args.named().as_slice(), ["foo", "--force"]);
        assert_eq!(args.remaining(), ["foo", "--", "--force"]);

        let args = parse(install_spec(), &["--", "bar"]);
        assert_eq!(args.remaining(), ["bar"]);
    }

    #[test]
    fn conflicting_cli_options_are_rejected() {
        let err = parse_err(install_spec(), &["--formula", "--cask"]);
        assert_eq!(err.to_string(), "Options --formula and --cask are mutually exclusive.");
    }

    #[test]
    fn environment_defaults_yield_to_the_command_line() {
        let mut spec = CommandSpec::new("x");
        spec.conflicts(&["--quiet", "--verbose"]);

        let args = run(parser(spec.clone()), &["--verbose"], &[("CELLAR_QUIET", "1")]).unwrap();
        assert!(args.switch("verbose").unwrap());
        assert!(!args.switch("quiet").unwrap());
        assert_eq!(args.source("quiet"), Some(Source::Env));
        assert_eq!(args.source("verbose"), Some(Source::Args));

        let err = run(
            parser(spec.clone()),
            &[],
            &[("CELLAR_QUIET", "1"), ("CELLAR_VERBOSE", "1")],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ParseError::OptionConflict(vec!["--quiet".into(), "--verbose".into()])
        );

        let err = run(parser(spec), &["-q", "-v"], &[]).unwrap_err();
        assert!(matches!(err, ParseError::OptionConflict(_)));
    }

    #[test]
    fn empty_environment_values_are_false() {
        let args = run(parser(CommandSpec::new("x")), &[], &[("CELLAR_DEBUG", "")]).unwrap();
        assert!(!args.context().debug);
        let args = run(parser(CommandSpec::new("x")), &[], &[("CELLAR_DEBUG", "1")]).unwrap();
        assert!(args.context().debug);
        assert_eq!(args.cli_args(), ["--debug"]);
    }

    #[test]
    fn dependent_options_require_their_primary() {
        let mut spec = CommandSpec::new("x");
        spec.switch(&["--json"], "JSON.")
            .switch(&["--installed"], OptionOpts::from("Installed.").depends_on("--json"));
        let err = parse_err(spec.clone(), &["--installed"]);
        assert_eq!(err.to_string(), "`--installed` cannot be passed without `--json`.");
        assert!(parse(spec, &["--installed", "--json"]).switch("installed").unwrap());
    }

    #[test]
    fn conflicting_and_dependent_is_a_declaration_error() {
        let mut spec = CommandSpec::new("x");
        spec.switch(&["--a"], "A.")
            .switch(&["--b"], OptionOpts::from("B.").depends_on("--a"))
            .conflicts(&["--a", "--b"]);
        assert_eq!(
            parse_err(spec, &[]),
            ParseError::InvalidConstraint {
                primary: "a".into(),
                secondary: "b".into(),
            }
        );
    }

    #[test]
    fn named_argument_counts_are_enforced() {
        let spec = |types: &[NamedArgType], count: Count| {
            let mut spec = CommandSpec::new("x");
            spec.named_args(types, count).unwrap();
            spec
        };
        let both = [NamedArgType::Formula, NamedArgType::Cask];

        assert_eq!(
            parse_err(spec(&both, Count::exactly(1)), &[]).to_string(),
            "This command requires exactly 1 formula or cask argument."
        );
        assert_eq!(
            parse_err(spec(&[NamedArgType::Tap], Count::at_least(2)), &["a"]).to_string(),
            "This command requires at least 2 tap arguments."
        );
        assert_eq!(
            parse_err(spec(&[], Count::at_most(1)), &["a", "b"]).to_string(),
            "This command does not take more than 1 named argument."
        );
        assert_eq!(
            parse_err(spec(&[NamedArgType::None], Count::any()), &["a"]).to_string(),
            "This command does not take named arguments."
        );
        assert_eq!(
            parse_err(
                spec(&[NamedArgType::Subcommand("list".into())], Count::exactly(1)),
                &[]
            )
            .to_string(),
            "This command requires exactly 1 subcommand argument."
        );
        parse(spec(&both, Count::between(1, 2)), &["a", "b"]);
    }

    #[test]
    fn help_short_circuits_validation() {
        let mut spec = install_spec();
        spec.named_args(&[NamedArgType::Formula], Count::at_least(1))
            .unwrap();
        let outcome = parser(spec)
            .parse_with_env(&argv(&["--formula", "--cask", "-h"]), &[])
            .unwrap();
        let ParseOutcome::Help(text) = outcome else {
            panic!("expected help output");
        };
        assert!(text.starts_with("Usage: cellar install [options] formula [...]\n"));
    }

    #[test]
    fn failures_carry_the_usage_text() {
        let failure = parser(install_spec())
            .parse_with_env(&argv(&["--bogus"]), &[])
            .unwrap_err();
        assert_eq!(failure.error, ParseError::InvalidOption("--bogus".into()));
        assert!(failure.usage.starts_with("Usage: cellar install"));
        assert_eq!(failure.to_string(), "invalid option: --bogus");
    }

    #[test]
    fn linux_rejects_casks_and_defaults_to_formulae() {
        let linux_parser = |spec| Parser::new(spec, Rc::new(StubBackend::default())).system(linux());

        let err = run(linux_parser(install_spec()), &["--cask", "foo"], &[]).unwrap_err();
        assert_eq!(err, ParseError::CaskOnLinux);
        assert!(!err.shows_usage());

        let args = run(linux_parser(install_spec()), &["foo"], &[]).unwrap();
        assert_eq!(args.only_formula_or_cask(), Some(Only::Formula));
        assert_eq!(args.cli_args(), ["--formula"]);

        let mut dev = install_spec();
        dev.dev_command();
        let args = run(linux_parser(dev), &["--cask", "foo"], &[]).unwrap();
        assert_eq!(args.only_formula_or_cask(), Some(Only::Cask));
    }

    #[test]
    fn load_overrides_follow_the_parsed_switches() {
        let args = parse(install_spec(), &["--HEAD", "--force-bottle", "foo"]);
        let options = args.named().load_options();
        assert_eq!(options.spec, Some(Spec::Head));
        assert!(options.force_bottle);
        assert_eq!(options.flags, ["--HEAD", "--force-bottle"]);
        assert_eq!(args.flags_only(), ["--HEAD", "--force-bottle"]);
    }

    #[test]
    fn cask_options_build_a_cask_config() {
        let mut spec = install_spec();
        spec.cask_options();
        let args = parse(spec, &["--appdir=/Apps", "--language=de,en", "foo"]);
        let config = args.named().cask_config().unwrap();
        assert_eq!(config.dirs.get("appdir").map(String::as_str), Some("/Apps"));
        assert_eq!(config.dirs.len(), 1);
        assert_eq!(config.languages, ["de", "en"]);
        assert!(parse(install_spec(), &["foo"]).named().cask_config().is_none());
    }

    fn formula_with_options() -> Formula {
        Formula {
            name: "foo".into(),
            full_name: "foo".into(),
            version: "1.0".into(),
            tap: None,
            options: vec![
                FormulaOption {
                    flag: "--with-bar".into(),
                    description: "Build with bar support.".into(),
                },
                FormulaOption {
                    flag: "--jobs=".into(),
                    description: "Parallel jobs.".into(),
                },
            ],
            spec: Spec::Stable,
            path: PathBuf::from("foo.json"),
        }
    }

    #[test]
    fn formula_options_are_declared_from_named_formulae() {
        let backend = StubBackend {
            formulae: vec![formula_with_options()],
        };
        let mut spec = install_spec();
        spec.formula_options();

        let parser = Parser::new(spec.clone(), Rc::new(backend)).system(macos());
        let args = run(parser, &["foo", "--with-bar", "--jobs", "4"], &[]).unwrap();
        assert!(args.switch("with_bar").unwrap());
        assert_eq!(args.flag("jobs").unwrap(), Some("4"));
        assert_eq!(args.named().as_slice(), ["foo"]);
        assert_eq!(args.remaining(), ["foo"]);

        let parser = Parser::new(spec.clone(), Rc::new(StubBackend {
            formulae: vec![formula_with_options()],
        }))
        .system(macos());
        let outcome = parser.parse_with_env(&argv(&["foo", "--help"]), &[]).unwrap();
        let ParseOutcome::Help(text) = outcome else {
            panic!("expected help output");
        };
        assert!(text.contains("foo: Build with bar support."));

        let parser = Parser::new(spec, Rc::new(StubBackend {
            formulae: vec![formula_with_options()],
        }))
        .system(macos());
        let err = run(parser, &["--cask", "foo", "--with-bar"], &[]).unwrap_err();
        assert_eq!(err, ParseError::InvalidOption("--with-bar".into()));
    }

    #[test]
    fn unknown_formulae_leave_options_undeclared() {
        let mut spec = install_spec();
        spec.formula_options();
        let err = parse_err(spec, &["missing", "--with-bar"]);
        assert_eq!(err, ParseError::InvalidOption("--with-bar".into()));
    }
}
