//! CPU reference evaluator for fully-connected feed-forward networks stored
//! as JSON.

mod network;

pub use network::{Activation, DenseNetwork, InputDef, LayerDef, NetworkFile};

use evalport_core::{
    verify_declared_layers, ConfigBlob, Device, Directives, EvalError, EvaluationFailure,
    Evaluator, EvaluatorInstance, LayerDecl, ModelArtifact, ModelSpec, NamedTensors,
    OutputRequest, Result,
};
use tracing::{debug, info};

const KNOWN_KEYS: &[&str] = &["layer", "deviceId", "precision"];

pub struct DenseEvaluator;

impl DenseEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DenseEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DenseInstance {
    declared: Vec<LayerDecl>,
    network: Option<DenseNetwork>,
}

impl Evaluator for DenseEvaluator {
    type Instance = DenseInstance;

    fn name(&self) -> &'static str {
        "dense"
    }

    fn init(&self, config: &ConfigBlob) -> Result<Self::Instance> {
        let directives = Directives::parse(config)?;
        directives.require_float_precision()?;

        let device = directives.device()?;
        if device != Device::Cpu {
            return Err(EvalError::ConfigInvalid(format!(
                "dense evaluator runs on the CPU only, got {device:?}"
            )));
        }

        for key in directives.keys().filter(|k| !KNOWN_KEYS.contains(k)) {
            debug!(key, "ignoring unknown config key");
        }

        Ok(DenseInstance {
            declared: directives.layers()?,
            network: None,
        })
    }
}

impl DenseInstance {
    fn network(&self) -> Result<&DenseNetwork> {
        self.network.as_ref().ok_or_else(|| {
            EvaluationFailure::Backend("dense evaluator has no model loaded".into()).into()
        })
    }
}

impl EvaluatorInstance for DenseInstance {
    fn load_model(&mut self, artifact: &ModelArtifact) -> Result<()> {
        let ModelArtifact::DenseJsonPath(path) = artifact else {
            return Err(EvalError::model_load(
                artifact.path(),
                "dense evaluator expects a dense JSON model",
            ));
        };

        let network =
            DenseNetwork::from_file(path).map_err(|e| EvalError::model_load(path, format!("{e:#}")))?;
        verify_declared_layers(&self.declared, network.spec(), path)?;

        info!(
            inputs = network.spec().inputs.len(),
            layers = network.spec().outputs.len(),
            "dense network loaded"
        );
        self.network = Some(network);
        Ok(())
    }

    fn spec(&self) -> Option<&ModelSpec> {
        self.network.as_ref().map(DenseNetwork::spec)
    }

    fn evaluate(&mut self, inputs: &NamedTensors, outputs: &[OutputRequest]) -> Result<NamedTensors> {
        let network = self.network()?;

        for (name, values) in inputs.iter() {
            let Some(width) = network
                .spec()
                .input(name.as_str())
                .and_then(|l| l.width())
            else {
                return Err(EvaluationFailure::UnknownInputLayer(name.clone()).into());
            };
            if values.len() != width {
                return Err(EvaluationFailure::ShapeMismatch {
                    layer: name.clone(),
                    expected: width,
                    actual: values.len(),
                }
                .into());
            }
        }
        if let Some(missing) = network
            .spec()
            .inputs
            .iter()
            .find(|l| !inputs.contains(l.name.as_str()))
        {
            return Err(EvaluationFailure::MissingInput(missing.name.clone()).into());
        }

        let mut wanted = Vec::with_capacity(outputs.len());
        for request in outputs {
            let idx = network
                .index_of(request.name.as_str())
                .ok_or_else(|| EvaluationFailure::UnknownOutputLayer(request.name.clone()))?;
            let width = network.width_of(request.name.as_str()).unwrap_or_default();
            if width != request.size {
                return Err(EvaluationFailure::ShapeMismatch {
                    layer: request.name.clone(),
                    expected: width,
                    actual: request.size,
                }
                .into());
            }
            wanted.push(idx);
        }

        let values = network
            .forward(&wanted, |name| inputs.get(name.as_str()))
            .map_err(|e| EvaluationFailure::Backend(format!("{e:#}")))?;

        Ok(outputs
            .iter()
            .map(|r| r.name.clone())
            .zip(values)
            .collect())
    }

    fn destroy(&mut self) -> Result<()> {
        self.network = None;
        Ok(())
    }
}
