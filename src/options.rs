//! Option parsing for individual commands.
//!
//! Commands describe their flags declaratively with [`argh::FromArgs`]. The
//! adapter in this module turns argh's early exits into recoverable
//! [`ShellError`] values instead of letting them end the process, and keeps
//! negative numbers from being mistaken for flags. Option structures derive
//! [`argh::ArgsInfo`] as well, which tells the adapter which flags take a
//! value.

use crate::error::ShellError;
use argh::{ArgsInfo, EarlyExit, FlagInfoKind, FromArgs};
use std::any::Any;
use std::marker::PhantomData;

/// Result of a successful option parse.
pub struct ParsedArgs {
    /// The parsed option structure, downcast by the handler.
    pub options: Box<dyn Any>,
    /// Positional arguments left over after option processing.
    pub args: Vec<String>,
}

/// A parser bound to one command.
pub trait OptionParser {
    /// Parse `args` for the command invoked as `prog`.
    ///
    /// Fails with [`ShellError::ParseAbort`] when the parser wants an
    /// informational stop (help output) and [`ShellError::ParseError`] on
    /// malformed input.
    fn parse(&self, prog: &str, args: &[String]) -> Result<ParsedArgs, ShellError>;

    /// One-line usage text for `prog`.
    fn usage(&self, prog: &str) -> String;
}

/// Option structures that collect the positional arguments themselves.
///
/// The adapter hands the positionals to the handler separately, so arity can
/// be checked uniformly whether or not a command declares a parser.
pub trait Positionals {
    /// Move the positional arguments out of the parsed structure.
    fn take_positionals(&mut self) -> Vec<String>;
}

/// [`OptionParser`] backed by an argh derive.
pub struct ArghParser<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for ArghParser<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: FromArgs + ArgsInfo + Positionals + 'static> OptionParser for ArghParser<T> {
    fn parse(&self, prog: &str, args: &[String]) -> Result<ParsedArgs, ShellError> {
        let ordered = separate_positionals(&value_flags::<T>(), args);
        let argv: Vec<&str> = ordered.iter().map(String::as_str).collect();
        match T::from_args(&[prog], &argv) {
            Ok(mut parsed) => {
                let args = parsed.take_positionals();
                Ok(ParsedArgs {
                    options: Box::new(parsed),
                    args,
                })
            }
            Err(EarlyExit { output, status }) => {
                let output = output.trim_end().to_string();
                Err(match status {
                    Ok(()) => ShellError::ParseAbort(output),
                    Err(()) => ShellError::ParseError(output),
                })
            }
        }
    }

    fn usage(&self, prog: &str) -> String {
        match T::from_args(&[prog], &["--help"]) {
            Err(EarlyExit { output, .. }) => output.lines().next().unwrap_or_default().to_string(),
            Ok(_) => format!("Usage: {prog}"),
        }
    }
}

/// Spellings of the flags of `T` that take the next argument as their value.
fn value_flags<T: ArgsInfo>() -> Vec<String> {
    let info = T::get_args_info();
    let mut names = Vec::new();
    for flag in info.flags {
        if let FlagInfoKind::Option { .. } = flag.kind {
            names.push(format!("--{}", flag.long.trim_start_matches('-')));
            if let Some(short) = flag.short {
                names.push(format!("-{short}"));
            }
        }
    }
    names
}

/// `-5`, `-0.5` or `-1e3`, but not a flag such as `-x2` or `-inf`.
pub fn looks_like_negative_number(arg: &str) -> bool {
    arg.strip_prefix('-')
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_ascii_digit() || c == '.'))
        && arg.parse::<f64>().is_ok()
}

/// Reorder `args` so that the parser sees every flag, together with its
/// value, before a `--` and every positional argument after it.
///
/// Positionals keep their relative order, so a negative number stays a
/// positional value and is parsed like any other. Arguments following one
/// of `value_flags` are never moved away from it, and anything after an
/// explicit `--` stays positional.
pub fn separate_positionals(value_flags: &[String], args: &[String]) -> Vec<String> {
    let mut flags = Vec::new();
    let mut positionals = Vec::new();
    let mut rest = args.iter();
    while let Some(arg) = rest.next() {
        if arg == "--" {
            positionals.extend(rest.by_ref().cloned());
            break;
        }
        let is_flag = arg.len() > 1 && arg.starts_with('-') && !looks_like_negative_number(arg);
        if !is_flag {
            positionals.push(arg.clone());
            continue;
        }
        flags.push(arg.clone());
        if value_flags.contains(arg) {
            if let Some(value) = rest.next() {
                flags.push(value.clone());
            }
        }
    }
    if !positionals.is_empty() {
        flags.push("--".to_string());
        flags.append(&mut positionals);
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(FromArgs, ArgsInfo)]
    /// Shift a spectrum.
    struct Shift {
        #[argh(option, short = 'b')]
        /// shift amount
        by: Option<f64>,

        #[argh(switch, short = 'q')]
        /// be quiet
        quiet: bool,

        #[argh(positional, greedy)]
        /// spectrum ids
        ids: Vec<String>,
    }

    impl Positionals for Shift {
        fn take_positionals(&mut self) -> Vec<String> {
            std::mem::take(&mut self.ids)
        }
    }

    #[derive(FromArgs, ArgsInfo)]
    /// Move a marker.
    struct Marker {
        #[argh(positional)]
        /// new position
        position: f64,
    }

    impl Positionals for Marker {
        fn take_positionals(&mut self) -> Vec<String> {
            vec![self.position.to_string()]
        }
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn shift(args: &[&str]) -> (Shift, Vec<String>) {
        let parsed = ArghParser::<Shift>::default()
            .parse("shift", &strings(args))
            .unwrap();
        let opts = parsed.options.downcast::<Shift>().unwrap();
        (*opts, parsed.args)
    }

    #[test]
    fn test_negative_number_is_positional() {
        let (opts, args) = shift(&["-5", "2"]);
        assert_eq!(args, vec!["-5", "2"]);
        assert_eq!(args[0].parse::<f64>().unwrap(), -5.0);
        assert_eq!(opts.by, None);
    }

    #[test]
    fn test_negative_option_value_keeps_numeric_meaning() {
        let (opts, args) = shift(&["-b", "-2.5", "-q"]);
        assert_eq!(opts.by, Some(-2.5));
        assert!(opts.quiet);
        assert!(args.is_empty());

        let (opts, _) = shift(&["--by", "-1e3"]);
        assert_eq!(opts.by, Some(-1000.0));
    }

    #[test]
    fn test_options_after_negative_positional() {
        let (opts, args) = shift(&["-5", "-b", "-0.5", "7", "-q"]);
        assert_eq!(opts.by, Some(-0.5));
        assert!(opts.quiet);
        assert_eq!(args, vec!["-5", "7"]);
    }

    #[test]
    fn test_typed_positional_accepts_negative_number() {
        let parsed = ArghParser::<Marker>::default()
            .parse("marker", &strings(&["-2.5"]))
            .unwrap();
        assert_eq!(parsed.options.downcast_ref::<Marker>().unwrap().position, -2.5);
    }

    #[test]
    fn test_double_dash_keeps_flags_positional() {
        let (opts, args) = shift(&["--", "-q", "x"]);
        assert!(!opts.quiet);
        assert_eq!(args, vec!["-q", "x"]);
    }

    #[test]
    fn test_unknown_flag_is_parse_error() {
        let parser = ArghParser::<Shift>::default();
        let err = parser.parse("shift", &strings(&["-x"])).err().unwrap();
        assert!(matches!(err, ShellError::ParseError(_)));
    }

    #[test]
    fn test_missing_option_value_is_parse_error() {
        let parser = ArghParser::<Shift>::default();
        let err = parser.parse("shift", &strings(&["1", "-b"])).err().unwrap();
        assert!(matches!(err, ShellError::ParseError(_)));
    }

    #[test]
    fn test_help_is_parse_abort() {
        let parser = ArghParser::<Shift>::default();
        match parser.parse("shift", &strings(&["--help"])) {
            Err(ShellError::ParseAbort(text)) => assert!(text.contains("shift")),
            _ => panic!("expected an informational stop"),
        }
    }

    #[test]
    fn test_usage_is_first_help_line() {
        let parser = ArghParser::<Shift>::default();
        let usage = parser.usage("fit shift");
        assert!(usage.starts_with("Usage: fit shift"), "{usage}");
        assert!(!usage.contains('\n'));
    }

    #[test]
    fn test_separate_positionals() {
        let value_flags = strings(&["-b", "--by"]);
        assert_eq!(
            separate_positionals(&value_flags, &strings(&["a", "-q", "-1", "-b", "-2", "-", "b"])),
            strings(&["-q", "-b", "-2", "--", "a", "-1", "-", "b"])
        );
        assert_eq!(
            separate_positionals(&value_flags, &strings(&["-q"])),
            strings(&["-q"])
        );
        assert!(looks_like_negative_number("-.5"));
        assert!(!looks_like_negative_number("-x2"));
        assert!(!looks_like_negative_number("-inf"));
        assert!(!looks_like_negative_number("5"));
    }
}
