use std::path::PathBuf;

use thiserror::Error;

/// A command declared its own options inconsistently.
///
/// These are programmer mistakes and are raised while a [`crate::CommandSpec`] is being
/// built, never while argv is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Do not specify both `number` and `min` or `max`")]
    NumberWithBounds,

    #[error("Do not specify both `number`, `min` or `max` with `NamedArgType::None`")]
    NoneWithBounds,
}

/// A user-facing usage error found while parsing or validating argv.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// A required-value flag was the last token of the option region.
    #[error("missing argument: {0}")]
    MissingArgument(String),

    #[error("ambiguous option: {option} ({})", .candidates.join(", "))]
    AmbiguousOption {
        option: String,
        candidates: Vec<String>,
    },

    /// A switch was given an inline `=value`.
    #[error("needless argument: {0}")]
    NeedlessArgument(String),

    #[error("`{secondary}` cannot be passed without `{primary}`.")]
    OptionConstraint { primary: String, secondary: String },

    #[error("Options {} are mutually exclusive.", .0.join(" and "))]
    OptionConflict(Vec<String>),

    #[error(
        "`{primary}` and `{secondary}` cannot be mutually exclusive and mutually dependent simultaneously."
    )]
    InvalidConstraint { primary: String, secondary: String },

    #[error("This command requires exactly {count} {} {}.", kinds(.types), arguments(.count))]
    NumberOfNamedArguments { count: usize, types: Vec<String> },

    #[error("This command requires at least {minimum} {} {}.", kinds(.types), arguments(.minimum))]
    MinNamedArguments { minimum: usize, types: Vec<String> },

    #[error("{}", too_many_named(.maximum, .types))]
    MaxNamedArguments { maximum: usize, types: Vec<String> },

    #[error("Invalid `--cask` usage: Casks do not work on Linux")]
    CaskOnLinux,
}

impl ParseError {
    /// Whether the caller should print the command's usage text with this error.
    pub fn shows_usage(&self) -> bool {
        !matches!(self, Self::CaskOnLinux)
    }
}

fn kinds(types: &[String]) -> String {
    if types.is_empty() {
        return "named".to_string();
    }
    types
        .iter()
        .map(|t| t.replace('_', " "))
        .collect::<Vec<_>>()
        .join(" or ")
}

fn arguments(count: &usize) -> &'static str {
    if *count == 1 { "argument" } else { "arguments" }
}

fn too_many_named(maximum: &usize, types: &[String]) -> String {
    if *maximum == 0 {
        return "This command does not take named arguments.".to_string();
    }
    format!(
        "This command does not take more than {maximum} {} {}.",
        kinds(types),
        arguments(maximum)
    )
}

/// A parse failure together with the usage text of the command that failed.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ParseFailure {
    pub error: ParseError,
    pub usage: String,
}

/// Lookup on frozen [`crate::Args`] that cannot be answered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("CLI arg for `{0}` is not declared for this command")]
    Undeclared(String),

    #[error("CLI arg `{name}` holds a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unknown OS or architecture: {0}")]
    UnknownSystem(String),
}

/// Failure to turn a named argument into a formula, cask, keg or tap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No available formula with the name \"{0}\".")]
    FormulaUnavailable(String),

    #[error("Cask '{0}' is unavailable: No Cask with this name exists.")]
    CaskUnavailable(String),

    #[error("No available formula or cask with the name \"{0}\".")]
    FormulaOrCaskUnavailable(String),

    #[error(
        "No available formula or cask with the name \"{tap}/{name}\". Please tap it and then try again: cellar tap {tap}"
    )]
    TapFormulaOrCaskUnavailable { tap: String, name: String },

    #[error("{name}: {reason}")]
    FormulaUnreadable { name: String, reason: String },

    #[error("Cask '{token}' is unreadable: {reason}")]
    CaskUnreadable { token: String, reason: String },

    #[error(
        "Formulae found in multiple taps: {}. Please use the fully-qualified name to refer to a specific formula.",
        .candidates.join(", ")
    )]
    TapFormulaAmbiguity {
        name: String,
        candidates: Vec<String>,
    },

    #[error(
        "Casks found in multiple taps: {}. Please use the fully-qualified name to refer to a specific cask.",
        .candidates.join(", ")
    )]
    TapCaskAmbiguity {
        token: String,
        candidates: Vec<String>,
    },

    #[error("No such keg: {}", .rack.display())]
    NoSuchKeg { name: String, rack: PathBuf },

    #[error("{0}")]
    MultipleVersionsInstalled(String),

    #[error("No available tap {0}.")]
    TapUnavailable(String),

    #[error("Invalid tap name: '{0}'")]
    InvalidTapName(String),
}

impl ResolveError {
    /// Not-found conditions. Only these may be swallowed by `ignore_unavailable`.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::FormulaUnavailable(_)
                | Self::CaskUnavailable(_)
                | Self::FormulaOrCaskUnavailable(_)
                | Self::TapFormulaOrCaskUnavailable { .. }
                | Self::NoSuchKeg { .. }
        )
    }

    /// The definition exists but could not be loaded.
    pub fn is_unreadable(&self) -> bool {
        matches!(
            self,
            Self::FormulaUnreadable { .. } | Self::CaskUnreadable { .. }
        )
    }

    pub(crate) fn is_formula_or_cask_unavailable(&self) -> bool {
        matches!(
            self,
            Self::FormulaOrCaskUnavailable(_) | Self::TapFormulaOrCaskUnavailable { .. }
        )
    }
}
