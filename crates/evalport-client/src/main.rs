mod cli;
mod harness;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{BackendKind, Cli, Command, Target};
use evalport_backend_dense::DenseEvaluator;
use evalport_backend_ort::OrtEvaluator;
use evalport_core::{ConfigBlob, Evaluator, LayerDecl, Session};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

struct RunPlan {
    input: LayerDecl,
    max_value: u32,
    outputs: Vec<LayerDecl>,
    seed: Option<u64>,
    pause: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    let pause = cli.command.pause();
    let result = match cli.command {
        Command::Run {
            target,
            input,
            max_value,
            outputs,
            seed,
            pause,
        } => {
            let plan = RunPlan {
                input,
                max_value,
                outputs,
                seed,
                pause,
            };
            run(&target, &plan)
        }
        Command::Inspect { target } => inspect(&target),
    };

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("Error: {err:#}");
            ExitCode::FAILURE
        }
    };

    if pause {
        if let Err(err) = harness::wait_for_enter("Press <Enter> to terminate.") {
            tracing::warn!(error = %err, "failed to read from stdin");
        }
    }
    code
}

/// `filter` was already checked by the CLI parser.
fn init_tracing(filter: &str) {
    let filter = EnvFilter::new(filter);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(target: &Target, plan: &RunPlan) -> Result<()> {
    match target.backend() {
        BackendKind::Onnx => run_with(&OrtEvaluator::new(), target, plan),
        BackendKind::Dense | BackendKind::Auto => run_with(&DenseEvaluator::new(), target, plan),
    }
}

fn inspect(target: &Target) -> Result<()> {
    match target.backend() {
        BackendKind::Onnx => inspect_with(&OrtEvaluator::new(), target),
        BackendKind::Dense | BackendKind::Auto => inspect_with(&DenseEvaluator::new(), target),
    }
}

fn read_config(path: &Path) -> Result<ConfigBlob> {
    ConfigBlob::from_file(path).with_context(|| format!("failed to read config {}", path.display()))
}

fn run_with<E: Evaluator>(evaluator: &E, target: &Target, plan: &RunPlan) -> Result<()> {
    let first = plan.outputs.first().context("no output layer requested")?;

    info!(data_dir = %target.data_dir.display(), evaluator = evaluator.name(), "initializing model evaluator");
    let config = read_config(&target.config_path())?;
    let mut session = Session::initialize(evaluator, &config)?;

    let model_path = target.model_path();
    info!(path = %model_path.display(), "loading model");
    session.load_model(&model_path)?;

    let mut rng = harness::input_rng(plan.seed);
    let inputs = harness::random_inputs(&plan.input, plan.max_value, &mut rng);
    let mut outputs = harness::output_buffers(&plan.outputs);

    if plan.pause {
        harness::wait_for_enter("Press <Enter> to begin evaluating.")?;
    }

    info!("evaluating model");
    let returned = session.evaluate(&inputs, first.name.as_str(), first.width)?;
    debug!(layer = %first.name, values = returned.len(), "single-output evaluation");
    session.evaluate_into(&inputs, &mut outputs)?;

    info!("destroying model evaluator");
    session.destroy()?;

    print!("{}", harness::render_outputs(&outputs));
    Ok(())
}

fn inspect_with<E: Evaluator>(evaluator: &E, target: &Target) -> Result<()> {
    let config = read_config(&target.config_path())?;
    let mut session = Session::initialize(evaluator, &config)?;
    session.load_model(target.model_path())?;

    let table = harness::render_spec(session.spec()?);
    session.destroy()?;

    print!("{table}");
    Ok(())
}
