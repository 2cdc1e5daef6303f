use argh::FromArgs;
use command_shell::{EditorInput, Environment, LineSource, Repl, ScriptedInput, Settings};
use std::path::PathBuf;

#[derive(FromArgs)]
/// Interactive command shell with abbreviable commands, a calculator
/// console and batch files.
struct Args {
    #[argh(option)]
    /// history file to use instead of the default
    history: Option<PathBuf>,

    #[argh(switch)]
    /// do not read or write a history file
    no_history: bool,

    #[argh(option, short = 'b')]
    /// batch file to run before the prompt; may be repeated
    batch: Vec<String>,

    #[argh(option, short = 'c')]
    /// command line to run; the shell exits afterwards; may be repeated
    command: Vec<String>,
}

fn start<S: LineSource>(
    input: S,
    settings: Settings,
    env: Environment,
    args: &Args,
) -> anyhow::Result<Option<Repl<S>>> {
    let mut repl = Repl::new(input, settings, env.clone())?;
    command_shell::register_builtins(repl.tree_mut(), &env)?;

    let interrupt = repl.tree().interrupt();
    ctrlc::set_handler(move || interrupt.raise())?;

    for path in &args.batch {
        if !repl.process_line(&format!("@{path}"))? {
            return Ok(None);
        }
    }
    Ok(Some(repl))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Args = argh::from_env();

    let env = Environment::new();
    let mut settings = Settings::from_env(&env);
    if let Some(path) = &args.history {
        settings.history_file = Some(path.clone());
    }
    if args.no_history {
        settings.history_file = None;
    }

    if !args.command.is_empty() {
        settings.history_file = None;
        let Some(mut repl) = start(ScriptedInput::new(), settings, env, &args)? else {
            return Ok(());
        };
        for line in &args.command {
            if !repl.process_line(line)? {
                break;
            }
        }
        return Ok(());
    }

    match start(EditorInput::new()?, settings, env, &args)? {
        Some(mut repl) => repl.run(),
        None => Ok(()),
    }
}
