//! Procedure execution.

use super::{OutputFormat, Session, parse_key_val, print_json};
use anyhow::{Context, Result, bail};
use clap::Args;
use hostside_core::{
    Event, EventAssertion, ExpectedEventSet, ProcedureInvocation, ProcedureResult,
    RemoteTestRunner, UserContextManager,
};

#[derive(Args)]
pub struct RunArgs {
    /// Package hosting the instrumentation
    pub package: String,
    /// Test class; a leading `.` is relative to the package
    pub class: String,
    /// Single test method to run
    #[arg(long)]
    pub method: Option<String>,
    /// User to run in (defaults to the current foreground user)
    #[arg(long)]
    pub user: Option<u32>,
    /// Instrumentation argument (can be repeated)
    #[arg(short = 'e', long = "extra", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub extras: Vec<(String, String)>,
    /// Instrumentation runner class (overrides configuration)
    #[arg(long)]
    pub runner: Option<String>,
    /// Event the procedure must emit, as JSON (can be repeated). When given,
    /// the emitted events must match this set exactly.
    #[arg(long, value_name = "JSON")]
    pub expect_event: Vec<String>,
}

/// Runs a procedure and prints its outcome. Fails if the procedure failed
/// or, with `--expect-event`, if the events do not match.
pub async fn execute(session: &Session, args: RunArgs) -> Result<()> {
    let expected = args
        .expect_event
        .iter()
        .map(|json| Event::from_json(json).with_context(|| format!("Invalid event: {json}")))
        .collect::<Result<ExpectedEventSet>>()?;

    let contexts = UserContextManager::new(session.channel.clone());
    let context = match args.user {
        Some(id) => contexts.adopt(id).await?,
        None => contexts.primary().await?,
    };

    let mut invocation = ProcedureInvocation::new(&args.package, &args.class, &context);
    if let Some(method) = &args.method {
        invocation = invocation.method(method);
    }
    if let Some(runner) = &args.runner {
        invocation = invocation.runner(runner);
    }
    for (name, value) in &args.extras {
        invocation = invocation.param(name, value);
    }

    let runner = RemoteTestRunner::from_config(session.channel.clone(), &session.config);
    let result = if args.expect_event.is_empty() {
        runner.run(&invocation).await?
    } else {
        EventAssertion::new(&runner)
            .run_and_assert(&invocation, &expected)
            .await?
    };

    print_result(session.format, &result)?;
    if !result.passed {
        bail!(
            "{} failed: {}",
            invocation.name(),
            result.failure.as_deref().unwrap_or("unknown failure")
        );
    }
    Ok(())
}

fn print_result(format: OutputFormat, result: &ProcedureResult) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(result)?,
        OutputFormat::Quiet => {}
        OutputFormat::Table => {
            for test in &result.tests {
                println!("{:<12} {}", test.status.to_string().to_uppercase(), test.name());
                if let Some(message) = test.message() {
                    println!("             {message}");
                }
            }
            if !result.events.is_empty() {
                println!();
                println!("Events:");
                for event in &result.events {
                    println!("  {event}");
                }
            }
        }
    }
    Ok(())
}
