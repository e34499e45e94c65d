//! smpmap - order-preserving parallel map over worker processes

mod cli;
mod output;

use anyhow::{Context, Result, bail};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr, Stream::Stdout};
use serde_json::{Value, json};
use smpmap::logging::{self, LogConfig};
use smpmap::tasks;

use cli::{Cli, Commands, RunArgs, TaskArg};

fn main() {
    // Worker processes are this same binary; they serve one task and exit here.
    #[cfg(unix)]
    tasks::registry().serve_if_worker();

    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Tasks => cmd_tasks(),
        Commands::Run(args) => cmd_run(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Command-line flags win over environment variables.
fn init_logging(cli: &Cli) {
    let mut config = LogConfig::default();
    if let Some(filter) = cli.log_filter() {
        config = config.with_filter(filter);
    }
    config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    logging::init(config);
}

fn cmd_tasks() -> Result<()> {
    for info in tasks::BUILTINS {
        println!(
            "{:<10} {}",
            info.name.if_supports_color(Stdout, |text| text.bold()),
            info.summary
        );
        println!(
            "{:<10} input: {}",
            "",
            info.input.if_supports_color(Stdout, |text| text.dimmed())
        );
    }
    Ok(())
}

/// Raw JSON inputs from either the positional arguments or the range.
fn collect_inputs(args: &RunArgs) -> Result<Vec<Value>> {
    if let (Some(from), Some(to)) = (args.from, args.to) {
        if from > to {
            bail!("--from {} is greater than --to {}", from, to);
        }
        return Ok((from..=to)
            .map(|i| range_input(args.task, i, to, args.stagger_ms))
            .collect());
    }

    args.inputs
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_str(raw)
                .with_context(|| format!("Input #{} is not valid JSON: {}", index, raw))
        })
        .collect()
}

/// Input for position `i` of an inclusive range ending at `to`.
fn range_input(task: TaskArg, i: i64, to: i64, stagger_ms: u64) -> Value {
    match task {
        TaskArg::Sine => json!({
            "x": i,
            "delay_ms": stagger_ms.saturating_mul(to.abs_diff(i)),
        }),
        _ => json!(i),
    }
}

#[cfg(unix)]
fn cmd_run(args: &RunArgs) -> Result<()> {
    use smpmap::PoolConfig;
    use std::time::Duration;

    let inputs = collect_inputs(args)?;

    // Flags win over environment variables, as with logging.
    let mut config = PoolConfig::default().with_env_overrides();
    if let Some(max_children) = args.max_children {
        config = config.with_max_children(max_children);
    }
    if let Some(ms) = args.poll_timeout_ms {
        config = config.with_poll_timeout(Duration::from_millis(ms));
    }

    match args.task {
        TaskArg::Sine => run::run_task(tasks::Sine, inputs, config, args),
        TaskArg::Integrate => run::run_task(tasks::Integrate::default(), inputs, config, args),
        TaskArg::Sqrt => run::run_task(tasks::Sqrt, inputs, config, args),
        TaskArg::Crash => run::run_task(tasks::Crash, inputs, config, args),
    }
}

#[cfg(not(unix))]
fn cmd_run(args: &RunArgs) -> Result<()> {
    collect_inputs(args)?;
    smpmap::ProcessSupport::probe()?;
    bail!("worker processes are not available on this platform")
}

#[cfg(unix)]
mod run {
    use super::cli::{CapturedArg, RunArgs};
    use super::output::ResultPrinter;
    use anyhow::{Context, Result, bail};
    use serde_json::Value;
    use smpmap::{Computation, Parallelized, PoolConfig};
    use std::io::{self, Write};

    /// Map `computation` over `raw` inputs and print the results in order.
    ///
    /// Task failures are printed in place and counted; the command fails at
    /// the end if there were any. A run-level error stops immediately.
    pub fn run_task<C: Computation>(
        computation: C,
        raw: Vec<Value>,
        config: PoolConfig,
        args: &RunArgs,
    ) -> Result<()> {
        let name = computation.name().to_string();
        let inputs = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<C::Input>(value)
                    .with_context(|| format!("Input #{} is not a valid '{}' input", index, name))
            })
            .collect::<Result<Vec<_>>>()?;
        let total = inputs.len();

        let sink: Box<dyn Write> = match args.captured {
            CapturedArg::Stdout => Box::new(io::stdout()),
            CapturedArg::Stderr => Box::new(io::stderr()),
            CapturedArg::Discard => Box::new(io::sink()),
        };

        let parallel = Parallelized::new(computation, config)?;
        let mut printer = ResultPrinter::new(args.format.into(), io::stdout());
        let mut results = parallel.map_with_sink(inputs, sink);

        let mut failed = 0;
        for (index, result) in (&mut results).enumerate() {
            match result {
                Ok(value) => printer.value(index, &value)?,
                Err(e) if e.is_task_scoped() => {
                    failed += 1;
                    printer.failure(index, &e)?;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Running '{}' aborted", name));
                }
            }
        }

        let stats = results.stats();
        tracing::debug!(?stats, "Run complete");

        if failed > 0 {
            bail!("{} of {} '{}' tasks failed", failed, total, name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["smpmap", "run"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Run(args) => args,
            Commands::Tasks => panic!("Expected run command"),
        }
    }

    #[test]
    fn test_collect_json_inputs() {
        let args = run_args(&["sqrt", "4", "\"x\"", "[1]"]);
        let inputs = collect_inputs(&args).unwrap();
        assert_eq!(inputs, vec![json!(4), json!("x"), json!([1])]);
    }

    #[test]
    fn test_collect_invalid_json_input() {
        let args = run_args(&["sqrt", "4", "{oops"]);
        let err = collect_inputs(&args).unwrap_err();
        assert!(err.to_string().contains("Input #1"));
    }

    #[test]
    fn test_collect_range_with_stagger() {
        let args = run_args(&["sine", "--from", "1", "--to", "3", "--stagger-ms", "10"]);
        let inputs = collect_inputs(&args).unwrap();
        assert_eq!(
            inputs,
            vec![
                json!({"x": 1, "delay_ms": 20}),
                json!({"x": 2, "delay_ms": 10}),
                json!({"x": 3, "delay_ms": 0}),
            ]
        );
    }

    #[test]
    fn test_collect_plain_range() {
        let args = run_args(&["integrate", "--from", "-1", "--to", "1"]);
        assert_eq!(
            collect_inputs(&args).unwrap(),
            vec![json!(-1), json!(0), json!(1)]
        );
    }

    #[test]
    fn test_collect_reversed_range() {
        let args = run_args(&["sqrt", "--from", "5", "--to", "1"]);
        assert!(collect_inputs(&args).is_err());
    }
}
