//! Usage banners and `--help` text.

use crate::options::{CommandSpec, NamedArgType, OptionDef, OptionKind};

const SUMMARY_INDENT: &str = "  ";
const SUMMARY_WIDTH: usize = 32;
const OPTION_DESC_WIDTH: usize = 45;
const COMMAND_DESC_WIDTH: usize = 80;

fn named_type_usage(ty: &NamedArgType) -> Option<String> {
    match ty {
        NamedArgType::TextOrRegex => Some("<text>|`/`<regex>`/`".to_string()),
        NamedArgType::Url => Some("<URL>".to_string()),
        NamedArgType::Subcommand(_) | NamedArgType::None => None,
        other => Some(format!("<{}>", other.symbol())),
    }
}

/// The generated one-line usage, e.g. ``"`info` [<options>] [<formula>|<cask> ...]"``.
pub(crate) fn generate_usage_banner(spec: &CommandSpec) -> String {
    let options: Vec<&OptionDef> = spec
        .options
        .iter()
        .filter(|o| !o.global && !o.hidden)
        .collect();

    let options = match options.len() {
        0 => String::new(),
        n if n > 2 => " [<options>]".to_string(),
        _ => options
            .iter()
            .map(|o| match o.kind {
                OptionKind::RequiredFlag | OptionKind::CommaArray => {
                    format!(" [`{}=`]", o.display_name())
                }
                _ => format!(" [`{}`]", o.display_name()),
            })
            .collect(),
    };

    let named = &spec.named;
    let mut named_args = String::new();
    if !named.types.is_empty() && !named.types.contains(&NamedArgType::None) {
        let mut parts: Vec<String> = named.types.iter().filter_map(named_type_usage).collect();
        if named
            .types
            .iter()
            .any(|t| matches!(t, NamedArgType::Subcommand(_)))
        {
            parts.push("<subcommand>".to_string());
        }
        let arg_type = parts.join("|");

        named_args = match (named.min, named.max) {
            (None, Some(1)) => format!(" [{arg_type}]"),
            (None, _) => format!(" [{arg_type} ...]"),
            (Some(1), Some(1)) => format!(" {arg_type}"),
            (Some(1), _) => format!(" {arg_type} [...]"),
            _ => format!(" {arg_type} ..."),
        };
    }

    format!("`{}`{options}{named_args}", spec.command)
}

/// Usage line followed by the description, as stored on the parser.
pub(crate) fn generate_banner(spec: &CommandSpec) -> String {
    let usage = spec
        .usage_banner
        .clone()
        .unwrap_or_else(|| generate_usage_banner(spec));
    match &spec.description {
        Some(description) => format!("{usage}\n\n{description}"),
        None => usage,
    }
}

/// Rendered help: the banner, then command options, then the global ones.
pub(crate) fn help_text(spec: &CommandSpec, banner: &str) -> String {
    let mut out = String::from("Usage: cellar ");
    let mut paragraphs = banner.split("\n\n");
    if let Some(usage) = paragraphs.next() {
        out.push_str(&plain(usage));
        out.push('\n');
    }
    for paragraph in paragraphs {
        out.push('\n');
        for line in wrap(&plain(paragraph), COMMAND_DESC_WIDTH) {
            out.push_str(&line);
            out.push('\n');
        }
    }

    let visible = |global: bool| {
        spec.options
            .iter()
            .filter(move |o| o.global == global && !o.hidden)
    };
    let rows: Vec<&OptionDef> = visible(false).chain(visible(true)).collect();
    if !rows.is_empty() {
        out.push('\n');
    }
    for def in rows {
        summarize(def, &mut out);
    }
    out
}

fn left_column(def: &OptionDef) -> String {
    let value_suffix = match def.kind {
        OptionKind::RequiredFlag | OptionKind::CommaArray => "=",
        _ => "",
    };
    let longs: Vec<String> = def
        .longs
        .iter()
        .map(|long| {
            if def.negatable {
                format!("--[no-]{}{value_suffix}", &long[2..])
            } else {
                format!("{long}{value_suffix}")
            }
        })
        .collect();

    if def.shorts.is_empty() {
        format!("    {}", longs.join(", "))
    } else {
        def.shorts
            .iter()
            .cloned()
            .chain(longs)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn summarize(def: &OptionDef, out: &mut String) {
    let left = left_column(def);
    let lines = wrap(&plain(&def.description), OPTION_DESC_WIDTH);
    let hanging = " ".repeat(SUMMARY_INDENT.len() + SUMMARY_WIDTH + 1);

    let mut lines = lines.into_iter();
    if left.len() > SUMMARY_WIDTH {
        out.push_str(&format!("{SUMMARY_INDENT}{left}\n"));
    } else {
        match lines.next() {
            Some(first) => out.push_str(&format!(
                "{SUMMARY_INDENT}{left:<width$} {first}\n",
                width = SUMMARY_WIDTH
            )),
            None => out.push_str(&format!("{SUMMARY_INDENT}{left}\n")),
        }
    }
    for line in lines {
        out.push_str(&format!("{hanging}{line}\n"));
    }
}

/// Drops the markup used in descriptions: backticks, `<arg>` and `*word*`.
fn plain(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '`' => {}
            '<' | '*' => {
                let close = if c == '<' { '>' } else { '*' };
                let rest: String = chars.clone().take_while(|&n| n != close).collect();
                let closed = chars.clone().nth(rest.chars().count()) == Some(close);
                if closed && !rest.is_empty() && !rest.contains(char::is_whitespace) {
                    out.push_str(&rest);
                    for _ in 0..=rest.chars().count() {
                        chars.next();
                    }
                } else {
                    out.push(c);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Greedy word wrap. Single newlines are joined; words longer than `width`
/// overflow instead of being split.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
