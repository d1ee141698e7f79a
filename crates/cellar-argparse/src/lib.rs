//! Argument engine for `cellar` subcommands.
//!
//! A command describes its switches, flags and positional arguments with a
//! [`CommandSpec`]; a [`Parser`] turns argv into frozen [`Args`]; the
//! [`NamedArgs`] inside resolve positional tokens into formulae, casks, kegs
//! and taps through a [`Backend`].
//!
//! ```ignore
//! let mut spec = CommandSpec::new("info");
//! spec.switch(&["--json"], "Print a JSON representation.")
//!     .named_args(&[NamedArgType::Formula, NamedArgType::Cask], Count::at_least(1))?;
//!
//! match Parser::new(spec, backend).parse(&argv)? {
//!     ParseOutcome::Help(text) => print!("{text}"),
//!     ParseOutcome::Args(args) => {
//!         for item in args.named().to_formulae_and_casks(Request::new())?.iter() {
//!             println!("{}", item.name());
//!         }
//!     }
//! }
//! ```

mod args;
mod backend;
mod error;
mod named_args;
mod options;
mod parser;
mod system;
mod usage;

pub use args::{Args, Context, Only, Source, Value};
pub use backend::{
    Backend, Cask, CaskConfig, CaskLoader, Formula, FormulaLoader, FormulaOption, Keg, KegStore,
    LoadOptions, Lookup, PkgVersion, Rack, Spec, Tab, Tap, TapRegistry,
};
pub use error::{ArgsError, ParseError, ParseFailure, ResolveError, SpecError};
pub use named_args::{NamedArgs, Request, ResolveMethod, Resolved};
pub use options::{
    Count, CommandSpec, GLOBAL_OPTIONS, NamedArgType, NamedArgsSpec, OptionDef, OptionKind,
    OptionOpts, name_to_option, option_to_description, option_to_name,
};
pub use parser::{ParseOutcome, Parser};
pub use system::{Arch, MacosVersion, Os, SystemInfo, valid_combination};
