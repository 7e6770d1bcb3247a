use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use evalport_core::{LayerDecl, ModelArtifact};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "evalport", version, about = "Drive a model evaluator through one session")]
pub struct Cli {
    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "info", value_parser = parse_log_filter)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a model on a random input vector and print its outputs
    Run {
        #[command(flatten)]
        target: Target,

        /// Input layer to generate, as name:size
        #[arg(long, default_value = "features:784", value_parser = LayerDecl::parse)]
        input: LayerDecl,

        /// Generated input values are whole numbers in [0, max-value)
        #[arg(long, default_value_t = 255, value_parser = clap::value_parser!(u32).range(1..))]
        max_value: u32,

        /// Output layer to evaluate, as name:size (repeatable)
        #[arg(long = "output", default_value = "ol.z:10", value_parser = LayerDecl::parse)]
        outputs: Vec<LayerDecl>,

        /// Seed for the input generator
        #[arg(long)]
        seed: Option<u64>,

        /// Wait for Enter before evaluating and before exiting
        #[arg(long)]
        pause: bool,
    },

    /// Load a model and list its input and output layers
    Inspect {
        #[command(flatten)]
        target: Target,
    },
}

impl Command {
    pub fn pause(&self) -> bool {
        matches!(self, Command::Run { pause: true, .. })
    }
}

#[derive(Args, Debug)]
pub struct Target {
    /// Directory that relative config and model paths resolve against
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Evaluator configuration file
    #[arg(long, default_value = "Config/01_OneHidden.config")]
    pub config: PathBuf,

    /// Trained model artifact
    #[arg(long, default_value = "Output/Models/01_OneHidden")]
    pub model: PathBuf,

    /// Evaluator to drive
    #[arg(long, value_enum, default_value_t = BackendKind::Auto)]
    pub backend: BackendKind,
}

impl Target {
    pub fn config_path(&self) -> PathBuf {
        resolve(&self.data_dir, &self.config)
    }

    pub fn model_path(&self) -> PathBuf {
        resolve(&self.data_dir, &self.model)
    }

    /// `auto` picks the evaluator that understands the model artifact.
    pub fn backend(&self) -> BackendKind {
        match (self.backend, ModelArtifact::from_path(self.model_path())) {
            (BackendKind::Auto, ModelArtifact::OnnxPath(_)) => BackendKind::Onnx,
            (BackendKind::Auto, ModelArtifact::DenseJsonPath(_)) => BackendKind::Dense,
            (explicit, _) => explicit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Auto,
    Dense,
    Onnx,
}

fn parse_log_filter(raw: &str) -> Result<String, ParseError> {
    EnvFilter::try_new(raw)?;
    Ok(raw.to_string())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults_match_one_hidden_sample() {
        let cli = Cli::parse_from(["evalport", "run"]);
        let Command::Run {
            target,
            input,
            max_value,
            outputs,
            seed,
            pause,
        } = cli.command
        else {
            panic!("expected run");
        };

        assert_eq!(cli.log, "info");
        assert_eq!(input, LayerDecl::parse("features:784").unwrap());
        assert_eq!(outputs, vec![LayerDecl::parse("ol.z:10").unwrap()]);
        assert_eq!(max_value, 255);
        assert_eq!(seed, None);
        assert!(!pause);
        assert_eq!(target.backend(), BackendKind::Dense);
        assert_eq!(
            target.config_path(),
            PathBuf::from("./Config/01_OneHidden.config")
        );
    }

    #[test]
    fn relative_paths_resolve_against_data_dir() {
        let cli = Cli::parse_from([
            "evalport",
            "inspect",
            "--data-dir",
            "/data/mnist",
            "--model",
            "models/mnist.onnx",
            "--config",
            "/etc/eval.config",
        ]);
        let Command::Inspect { target } = cli.command else {
            panic!("expected inspect");
        };

        assert_eq!(target.model_path(), PathBuf::from("/data/mnist/models/mnist.onnx"));
        assert_eq!(target.config_path(), PathBuf::from("/etc/eval.config"));
        assert_eq!(target.backend(), BackendKind::Onnx);
    }

    #[test]
    fn repeated_outputs_and_validation() {
        let cli = Cli::parse_from([
            "evalport", "run", "--output", "h1:16", "--output", "ol.z:10", "--pause", "--backend",
            "dense",
        ]);
        assert!(cli.command.pause());
        let Command::Run { outputs, .. } = cli.command else {
            panic!("expected run");
        };
        assert_eq!(outputs.len(), 2);

        assert!(Cli::try_parse_from(["evalport", "run", "--max-value", "0"]).is_err());
        assert!(Cli::try_parse_from(["evalport", "run", "--output", "ol.z"]).is_err());
    }

    #[test]
    fn log_filter_is_validated() {
        let cli = Cli::parse_from(["evalport", "inspect", "--log", "evalport_core=debug,warn"]);
        assert_eq!(cli.log, "evalport_core=debug,warn");

        assert!(Cli::try_parse_from(["evalport", "run", "--log", "evalport=loud"]).is_err());
    }
}
