//! The declaration surface a subcommand uses to describe its arguments.
//!
//! A [`CommandSpec`] is built once per command and handed to
//! [`crate::Parser::new`]. Nothing here touches argv.

use crate::args::Value;
use crate::error::SpecError;

/// Options every command accepts: `(short, long, description)`.
pub const GLOBAL_OPTIONS: [(&str, &str, &str); 4] = [
    ("-d", "--debug", "Display any debugging information."),
    ("-q", "--quiet", "Make some output more quiet."),
    ("-v", "--verbose", "Make some output more verbose."),
    ("-h", "--help", "Show this message."),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaskOptionKind {
    Flag,
    CommaArray,
}

struct CaskOption {
    name: &'static str,
    kind: CaskOptionKind,
    description: &'static str,
}

const fn cask_dir(name: &'static str, description: &'static str) -> CaskOption {
    CaskOption {
        name,
        kind: CaskOptionKind::Flag,
        description,
    }
}

/// Options merged into a spec by [`CommandSpec::cask_options`].
const GLOBAL_CASK_OPTIONS: &[CaskOption] = &[
    cask_dir(
        "--appdir=",
        "Target location for Applications (default: `/Applications`).",
    ),
    cask_dir(
        "--keyboard-layoutdir=",
        "Target location for Keyboard Layouts (default: `/Library/Keyboard Layouts`).",
    ),
    cask_dir(
        "--colorpickerdir=",
        "Target location for Color Pickers (default: `~/Library/ColorPickers`).",
    ),
    cask_dir(
        "--prefpanedir=",
        "Target location for Preference Panes (default: `~/Library/PreferencePanes`).",
    ),
    cask_dir(
        "--qlplugindir=",
        "Target location for QuickLook Plugins (default: `~/Library/QuickLook`).",
    ),
    cask_dir(
        "--mdimporterdir=",
        "Target location for Spotlight Plugins (default: `~/Library/Spotlight`).",
    ),
    cask_dir(
        "--dictionarydir=",
        "Target location for Dictionaries (default: `~/Library/Dictionaries`).",
    ),
    cask_dir(
        "--fontdir=",
        "Target location for Fonts (default: `~/Library/Fonts`).",
    ),
    cask_dir(
        "--servicedir=",
        "Target location for Services (default: `~/Library/Services`).",
    ),
    cask_dir(
        "--input-methoddir=",
        "Target location for Input Methods (default: `~/Library/Input Methods`).",
    ),
    cask_dir(
        "--internet-plugindir=",
        "Target location for Internet Plugins (default: `~/Library/Internet Plug-Ins`).",
    ),
    cask_dir(
        "--audio-unit-plugindir=",
        "Target location for Audio Unit Plugins (default: `~/Library/Audio/Plug-Ins/Components`).",
    ),
    cask_dir(
        "--vst-plugindir=",
        "Target location for VST Plugins (default: `~/Library/Audio/Plug-Ins/VST`).",
    ),
    cask_dir(
        "--vst3-plugindir=",
        "Target location for VST3 Plugins (default: `~/Library/Audio/Plug-Ins/VST3`).",
    ),
    cask_dir(
        "--screen-saverdir=",
        "Target location for Screen Savers (default: `~/Library/Screen Savers`).",
    ),
    CaskOption {
        name: "--language",
        kind: CaskOptionKind::CommaArray,
        description: "Comma-separated list of language codes to prefer for cask installation. \
                      The first matching language is used, otherwise it reverts to the cask's \
                      default language. The default value is the language of your system.",
    },
];

/// Canonical keys of the cask directory flags, in declaration order.
pub(crate) fn cask_dir_keys() -> impl Iterator<Item = String> {
    GLOBAL_CASK_OPTIONS
        .iter()
        .filter(|o| o.kind == CaskOptionKind::Flag)
        .map(|o| option_to_name(o.name))
}

/// `--foo-bar=` and `--[no-]foo-bar` become `foo_bar`; `-f` becomes `f`.
pub fn option_to_name(option: &str) -> String {
    let rest = option
        .strip_prefix("--")
        .or_else(|| option.strip_prefix('-'))
        .unwrap_or(option);
    let rest = rest.strip_prefix("[no-]").unwrap_or(rest);
    rest.replace('-', "_").replace('=', "")
}

/// The inverse of [`option_to_name`] for display: `f` is `-f`, `foo_bar` is `--foo-bar`.
pub fn name_to_option(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{}", name.replace('_', "-"))
    }
}

/// Fallback description derived from the option names.
pub fn option_to_description(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| {
            let bare = name
                .strip_prefix("--")
                .or_else(|| name.strip_prefix('-'))
                .unwrap_or(name);
            let bare = bare.strip_prefix("[no-]").unwrap_or(bare);
            bare.trim_end_matches('=').replace('-', " ")
        })
        .max()
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Switch,
    /// `--name` or `--name=value`; never consumes the next token.
    OptionalFlag,
    /// `--name=value` or `--name value`.
    RequiredFlag,
    /// A required value split on commas.
    CommaArray,
}

impl OptionKind {
    pub fn takes_value(self) -> bool {
        !matches!(self, Self::Switch)
    }
}

/// Per-option settings shared by [`CommandSpec::switch`], [`CommandSpec::flag`]
/// and [`CommandSpec::comma_array`].
///
/// A plain string converts into options carrying only a description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionOpts {
    description: Option<String>,
    hidden: bool,
    env: Option<String>,
    depends_on: Option<String>,
}

impl OptionOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Default a switch to true when `CELLAR_<NAME>` is set to a non-empty value.
    pub fn env(mut self, name: impl Into<String>) -> Self {
        self.env = Some(name.into());
        self
    }

    /// The option may only be passed together with `primary`.
    pub fn depends_on(mut self, primary: impl Into<String>) -> Self {
        self.depends_on = Some(primary.into());
        self
    }
}

impl From<&str> for OptionOpts {
    fn from(description: &str) -> Self {
        Self::new().description(description)
    }
}

impl From<String> for OptionOpts {
    fn from(description: String) -> Self {
        Self::new().description(description)
    }
}

/// One declared switch or flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDef {
    pub(crate) shorts: Vec<String>,
    pub(crate) longs: Vec<String>,
    pub(crate) kind: OptionKind,
    /// Declared as `--[no-]name`.
    pub(crate) negatable: bool,
    pub(crate) description: String,
    pub(crate) hidden: bool,
    pub(crate) env: Option<String>,
    pub(crate) global: bool,
}

impl OptionDef {
    fn new(names: &[&str], kind: OptionKind, opts: &OptionOpts, global: bool) -> Self {
        let mut shorts = Vec::new();
        let mut longs = Vec::new();
        let mut negatable = false;
        for raw in names {
            let name = raw.trim_end_matches('=');
            if let Some(rest) = name.strip_prefix("--[no-]") {
                negatable = true;
                longs.push(format!("--{rest}"));
            } else if name.starts_with("--") {
                longs.push(name.to_string());
            } else if let Some(rest) = name.strip_prefix('-') {
                shorts.push(format!("-{rest}"));
            } else if name.chars().count() == 1 {
                shorts.push(format!("-{name}"));
            } else {
                longs.push(format!("--{name}"));
            }
        }
        let description = opts
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| option_to_description(names));
        Self {
            shorts,
            longs,
            kind,
            negatable: negatable && kind == OptionKind::Switch,
            description,
            hidden: opts.hidden,
            env: opts.env.clone().filter(|_| kind == OptionKind::Switch),
            global,
        }
    }

    /// Canonical identity: the first long name, else the first short name.
    pub fn key(&self) -> String {
        option_to_name(self.display_name())
    }

    /// The long name if there is one, else the short name.
    pub fn display_name(&self) -> &str {
        self.longs
            .first()
            .or_else(|| self.shorts.first())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Every canonical name that refers to this option.
    pub fn aliases(&self) -> impl Iterator<Item = String> + '_ {
        self.shorts
            .iter()
            .chain(self.longs.iter())
            .map(|n| option_to_name(n))
    }

    pub fn shorts(&self) -> &[String] {
        &self.shorts
    }

    pub fn longs(&self) -> &[String] {
        &self.longs
    }

    pub fn kind(&self) -> OptionKind {
        self.kind
    }

    pub fn is_negatable(&self) -> bool {
        self.negatable
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    /// Environment variable consulted for the switch's default.
    pub fn env_var(&self) -> Option<String> {
        self.env
            .as_ref()
            .map(|name| format!("CELLAR_{}", name.to_ascii_uppercase()))
    }

    pub(crate) fn default_value(&self) -> Value {
        match self.kind {
            OptionKind::Switch if self.negatable => Value::Switch(None),
            OptionKind::Switch => Value::Switch(Some(false)),
            OptionKind::OptionalFlag | OptionKind::RequiredFlag => Value::Flag(None),
            OptionKind::CommaArray => Value::List(None),
        }
    }
}

/// Kinds of positional argument a command accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NamedArgType {
    None,
    Formula,
    Cask,
    InstalledFormula,
    InstalledCask,
    Tap,
    InstalledTap,
    Command,
    Diagnostic,
    File,
    Url,
    TextOrRegex,
    Other(String),
    /// A literal subcommand word such as `list` in `cellar services list`.
    Subcommand(String),
}

impl NamedArgType {
    /// Name used in messages; subcommand words all report as `subcommand`.
    pub fn symbol(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Formula => "formula",
            Self::Cask => "cask",
            Self::InstalledFormula => "installed_formula",
            Self::InstalledCask => "installed_cask",
            Self::Tap => "tap",
            Self::InstalledTap => "installed_tap",
            Self::Command => "command",
            Self::Diagnostic => "diagnostic_check",
            Self::File => "file",
            Self::Url => "url",
            Self::TextOrRegex => "text_or_regex",
            Self::Other(name) => name,
            Self::Subcommand(_) => "subcommand",
        }
    }
}

/// Cardinality of named arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Count {
    pub number: Option<usize>,
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Count {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn exactly(n: usize) -> Self {
        Self {
            number: Some(n),
            ..Self::default()
        }
    }

    pub fn at_least(n: usize) -> Self {
        Self {
            min: Some(n),
            ..Self::default()
        }
    }

    pub fn at_most(n: usize) -> Self {
        Self {
            max: Some(n),
            ..Self::default()
        }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    fn has_bounds(&self) -> bool {
        self.number.is_some() || self.min.is_some() || self.max.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedArgsSpec {
    pub types: Vec<NamedArgType>,
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl NamedArgsSpec {
    pub fn accepts(&self, ty: &NamedArgType) -> bool {
        self.types.contains(ty)
    }

    /// Distinct kind names for validation messages.
    pub(crate) fn kind_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for ty in &self.types {
            let name = ty.symbol().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }
}

/// Everything a command declares about its arguments.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub(crate) command: String,
    pub(crate) options: Vec<OptionDef>,
    pub(crate) conflicts: Vec<Vec<String>>,
    /// `(primary, secondary)`: secondary requires primary.
    pub(crate) constraints: Vec<(String, String)>,
    pub(crate) named: NamedArgsSpec,
    pub(crate) description: Option<String>,
    pub(crate) usage_banner: Option<String>,
    pub(crate) dev_command: bool,
    pub(crate) formula_options: bool,
    pub(crate) cask_options: bool,
}

impl CommandSpec {
    /// A spec for `command` with the global options already declared.
    pub fn new(command: impl Into<String>) -> Self {
        let mut spec = Self {
            command: command.into(),
            options: Vec::new(),
            conflicts: Vec::new(),
            constraints: Vec::new(),
            named: NamedArgsSpec::default(),
            description: None,
            usage_banner: None,
            dev_command: false,
            formula_options: false,
            cask_options: false,
        };
        for (short, long, description) in GLOBAL_OPTIONS {
            let mut opts = OptionOpts::new().description(description);
            if long != "--help" {
                opts = opts.env(option_to_name(long));
            }
            spec.register(&[short, long], OptionKind::Switch, opts, true);
        }
        spec
    }

    fn register(&mut self, names: &[&str], kind: OptionKind, opts: OptionOpts, global: bool) {
        let def = OptionDef::new(names, kind, &opts, global);
        let key = def.key();
        let declared = self.options.len();
        self.options.retain(|existing| existing.key() != key);
        if self.options.len() != declared {
            self.constraints.retain(|(_, secondary)| *secondary != key);
        }
        if let Some(primary) = &opts.depends_on {
            self.constraints
                .push((option_to_name(primary), def.key()));
        }
        self.options.push(def);
    }

    /// A boolean switch. `--[no-]name` declares a negatable switch that is unset by default.
    pub fn switch(&mut self, names: &[&str], opts: impl Into<OptionOpts>) -> &mut Self {
        self.register(names, OptionKind::Switch, opts.into(), false);
        self
    }

    /// A value flag; a name ending in `=` makes the value required.
    pub fn flag(&mut self, names: &[&str], opts: impl Into<OptionOpts>) -> &mut Self {
        let kind = if names.iter().any(|n| n.ends_with('=')) {
            OptionKind::RequiredFlag
        } else {
            OptionKind::OptionalFlag
        };
        self.register(names, kind, opts.into(), false);
        self
    }

    pub fn comma_array(&mut self, name: &str, opts: impl Into<OptionOpts>) -> &mut Self {
        self.register(&[name], OptionKind::CommaArray, opts.into(), false);
        self
    }

    /// At most one of `names` may be passed.
    pub fn conflicts(&mut self, names: &[&str]) -> &mut Self {
        self.conflicts
            .push(names.iter().map(|n| option_to_name(n)).collect());
        self
    }

    pub fn named_args(
        &mut self,
        types: &[NamedArgType],
        count: Count,
    ) -> Result<&mut Self, SpecError> {
        if count.number.is_some() && (count.min.is_some() || count.max.is_some()) {
            return Err(SpecError::NumberWithBounds);
        }
        let none = types.contains(&NamedArgType::None);
        if none && count.has_bounds() {
            return Err(SpecError::NoneWithBounds);
        }

        self.named.types = types.to_vec();
        if none {
            self.named.max = Some(0);
        } else if let Some(n) = count.number {
            self.named.min = Some(n);
            self.named.max = Some(n);
        } else if count.min.is_some() || count.max.is_some() {
            self.named.min = count.min;
            self.named.max = count.max;
        }
        Ok(self)
    }

    pub fn description(&mut self, text: &str) -> &mut Self {
        let text = text.trim_end_matches('\n');
        if !text.trim().is_empty() {
            self.description = Some(text.to_string());
        }
        self
    }

    /// Overrides the generated usage line. Text after the first blank line
    /// becomes the description.
    pub fn usage_banner(&mut self, text: &str) -> &mut Self {
        let text = text.trim_end_matches('\n');
        match text.split_once("\n\n") {
            Some((banner, description)) => {
                self.usage_banner = Some(banner.to_string());
                self.description = Some(description.to_string());
            }
            None => {
                self.usage_banner = Some(text.to_string());
                self.description = None;
            }
        }
        self
    }

    /// Developer commands skip the platform hooks during validation.
    pub fn dev_command(&mut self) -> &mut Self {
        self.dev_command = true;
        self
    }

    /// Options declared by the named formulae are accepted too.
    pub fn formula_options(&mut self) -> &mut Self {
        self.formula_options = true;
        self
    }

    /// Merges the cask directory flags and `--language`, each conflicting with `--formula`.
    pub fn cask_options(&mut self) -> &mut Self {
        for option in GLOBAL_CASK_OPTIONS {
            match option.kind {
                CaskOptionKind::Flag => self.flag(&[option.name], option.description),
                CaskOptionKind::CommaArray => self.comma_array(option.name, option.description),
            };
            self.conflicts(&["--formula", option.name]);
        }
        self.cask_options = true;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn options(&self) -> &[OptionDef] {
        &self.options
    }

    pub fn named_args_spec(&self) -> &NamedArgsSpec {
        &self.named
    }

    pub fn is_dev_command(&self) -> bool {
        self.dev_command
    }

    pub fn accepts_formula_options(&self) -> bool {
        self.formula_options
    }

    pub fn accepts_cask_options(&self) -> bool {
        self.cask_options
    }

    pub(crate) fn find(&self, key: &str) -> Option<&OptionDef> {
        self.options.iter().find(|def| def.aliases().any(|a| a == key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_names_are_canonicalized() {
        assert_eq!(option_to_name("--foo-bar="), "foo_bar");
        assert_eq!(option_to_name("--[no-]foo"), "foo");
        assert_eq!(option_to_name("-f"), "f");
        assert_eq!(option_to_name("--HEAD"), "HEAD");
        assert_eq!(name_to_option("f"), "-f");
        assert_eq!(name_to_option("foo_bar"), "--foo-bar");
    }

    #[test]
    fn missing_description_is_derived_from_longest_name() {
        assert_eq!(option_to_description(&["-f", "--force-bottle"]), "force bottle");
        let mut spec = CommandSpec::new("test");
        spec.switch(&["--dry-run"], OptionOpts::new());
        assert_eq!(spec.find("dry_run").unwrap().description(), "dry run");
    }

    #[test]
    fn redeclaring_a_long_name_keeps_only_the_latest() {
        let mut spec = CommandSpec::new("test");
        spec.switch(&["--foo"], "first")
            .switch(&["--bar"], "bar")
            .flag(&["--foo="], "second");

        let foos: Vec<&OptionDef> = spec
            .options()
            .iter()
            .filter(|o| o.longs() == ["--foo"])
            .collect();
        assert_eq!(foos.len(), 1);
        assert_eq!(foos[0].description(), "second");
        assert_eq!(foos[0].kind(), OptionKind::RequiredFlag);
        assert_eq!(spec.options().last().unwrap().display_name(), "--foo");
    }

    #[test]
    fn redeclaring_matches_canonical_names_and_drops_old_dependencies() {
        let mut spec = CommandSpec::new("test");
        spec.switch(&["--force"], "Force.")
            .switch(&["--foo_bar"], OptionOpts::new().depends_on("--force"))
            .switch(&["--foo-bar"], "Replacement.");

        let matching: Vec<&OptionDef> = spec
            .options()
            .iter()
            .filter(|o| o.key() == "foo_bar")
            .collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].display_name(), "--foo-bar");
        assert!(spec.constraints.is_empty());

        spec.switch(&["--quux"], OptionOpts::new().depends_on("--force"))
            .switch(&["--quux"], OptionOpts::new().depends_on("--foo-bar"));
        assert_eq!(
            spec.constraints,
            [("foo_bar".to_string(), "quux".to_string())]
        );
    }

    #[test]
    fn globals_are_declared_with_env_bindings() {
        let spec = CommandSpec::new("test");
        let keys: Vec<String> = spec.options().iter().map(OptionDef::key).collect();
        assert_eq!(keys, ["debug", "quiet", "verbose", "help"]);
        assert_eq!(
            spec.find("verbose").unwrap().env_var().as_deref(),
            Some("CELLAR_VERBOSE")
        );
        assert_eq!(spec.find("help").unwrap().env_var(), None);
        assert!(spec.options().iter().all(OptionDef::is_global));
    }

    #[test]
    fn negatable_switch_defaults_to_unset() {
        let mut spec = CommandSpec::new("test");
        spec.switch(&["--[no-]sign"], "Sign the result.");
        let def = spec.find("sign").unwrap();
        assert!(def.is_negatable());
        assert_eq!(def.default_value(), Value::Switch(None));
        assert!(spec.find("no_sign").is_none());
    }

    #[test]
    fn named_args_rejects_number_with_bounds() {
        let mut spec = CommandSpec::new("test");
        let err = spec
            .named_args(
                &[NamedArgType::Formula],
                Count {
                    number: Some(1),
                    min: Some(1),
                    max: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, SpecError::NumberWithBounds);

        let err = spec
            .named_args(&[NamedArgType::None], Count::at_most(1))
            .unwrap_err();
        assert_eq!(err, SpecError::NoneWithBounds);
    }

    #[test]
    fn named_args_none_sets_zero_maximum() {
        let mut spec = CommandSpec::new("test");
        spec.named_args(&[NamedArgType::None], Count::any()).unwrap();
        assert_eq!(spec.named_args_spec().max, Some(0));
        assert_eq!(spec.named_args_spec().min, None);

        spec.named_args(&[NamedArgType::Formula], Count::exactly(2))
            .unwrap();
        assert_eq!(spec.named_args_spec().min, Some(2));
        assert_eq!(spec.named_args_spec().max, Some(2));
    }

    #[test]
    fn cask_options_conflict_with_formula() {
        let mut spec = CommandSpec::new("install");
        spec.cask_options();
        assert!(spec.accepts_cask_options());
        assert_eq!(spec.find("appdir").unwrap().kind(), OptionKind::RequiredFlag);
        assert_eq!(spec.find("language").unwrap().kind(), OptionKind::CommaArray);
        assert!(
            spec.conflicts
                .iter()
                .any(|group| group == &["formula".to_string(), "fontdir".to_string()])
        );
        assert_eq!(cask_dir_keys().count(), 15);
    }

    #[test]
    fn usage_banner_splits_off_description() {
        let mut spec = CommandSpec::new("test");
        spec.usage_banner("`test` [<options>]\n\nDo the thing.\n");
        assert_eq!(spec.usage_banner.as_deref(), Some("`test` [<options>]"));
        assert_eq!(spec.description.as_deref(), Some("Do the thing."));
    }
}
