use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    ConfigBlob, EvalError, EvaluationFailure, Evaluator, EvaluatorInstance, LayerSpec,
    ModelArtifact, ModelSpec, NamedTensors, OutputRequest, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Initialized,
    ModelLoaded,
    Evaluated,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Initialized => "initialized",
            SessionState::ModelLoaded => "model-loaded",
            SessionState::Evaluated => "evaluated",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Drives one evaluator instance through
/// `initialize -> load_model -> evaluate* -> destroy`.
///
/// The instance is released exactly once: by [`Session::destroy`], or on drop
/// if the caller never destroyed it. Failures are returned as-is and leave
/// the state unchanged; nothing is retried.
pub struct Session<I: EvaluatorInstance> {
    evaluator: &'static str,
    instance: Option<I>,
    state: SessionState,
    evaluations: u64,
}

impl<I: EvaluatorInstance> Session<I> {
    pub fn initialize<E>(evaluator: &E, config: &ConfigBlob) -> Result<Self>
    where
        E: Evaluator<Instance = I>,
    {
        let instance = evaluator.init(config)?;
        info!(evaluator = evaluator.name(), "evaluator initialized");
        Ok(Self {
            evaluator: evaluator.name(),
            instance: Some(instance),
            state: SessionState::Initialized,
            evaluations: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn evaluator_name(&self) -> &'static str {
        self.evaluator
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations
    }

    /// IO layers of the loaded model.
    pub fn spec(&self) -> Result<&ModelSpec> {
        let state = self.state;
        let instance = self.instance.as_ref().ok_or(EvalError::UseAfterDestroy { op: "spec" })?;
        instance
            .spec()
            .ok_or(EvalError::ModelNotLoaded { op: "spec", state })
    }

    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let instance = self.live("load_model")?;

        if !path.exists() {
            return Err(EvalError::model_load(path, "no such file or directory"));
        }

        let artifact = ModelArtifact::from_path(path);
        instance.load_model(&artifact)?;

        self.state = SessionState::ModelLoaded;
        info!(
            evaluator = self.evaluator,
            format = artifact.format_name(),
            path = %path.display(),
            "model loaded"
        );
        Ok(())
    }

    /// Evaluates a single output layer and returns exactly `output_size`
    /// values for it.
    pub fn evaluate(
        &mut self,
        inputs: &NamedTensors,
        output_layer: &str,
        output_size: usize,
    ) -> Result<Vec<f32>> {
        let request = OutputRequest::new(output_layer, output_size);
        let mut results = self.run("evaluate", inputs, std::slice::from_ref(&request))?;
        results.remove(output_layer).ok_or_else(|| {
            EvaluationFailure::UnknownOutputLayer(request.name.clone()).into()
        })
    }

    /// Fills every pre-sized entry of `outputs` with that layer's values.
    /// The key set and lengths of `outputs` never change, and on failure it
    /// is left untouched.
    pub fn evaluate_into(&mut self, inputs: &NamedTensors, outputs: &mut NamedTensors) -> Result<()> {
        let requests = outputs
            .iter()
            .map(|(name, values)| OutputRequest::new(name.clone(), values.len()))
            .collect::<Vec<_>>();

        let results = self.run("evaluate_into", inputs, &requests)?;
        for (name, slot) in outputs.iter_mut() {
            if let Some(values) = results.get(name.as_str()) {
                slot.copy_from_slice(values);
            }
        }
        Ok(())
    }

    pub fn destroy(&mut self) -> Result<()> {
        let mut instance = self
            .instance
            .take()
            .ok_or(EvalError::UseAfterDestroy { op: "destroy" })?;
        self.state = SessionState::Destroyed;
        info!(
            evaluator = self.evaluator,
            evaluations = self.evaluations,
            "destroying evaluator"
        );
        instance.destroy()
    }

    fn live(&mut self, op: &'static str) -> Result<&mut I> {
        self.instance
            .as_mut()
            .ok_or(EvalError::UseAfterDestroy { op })
    }

    fn run(
        &mut self,
        op: &'static str,
        inputs: &NamedTensors,
        requests: &[OutputRequest],
    ) -> Result<NamedTensors> {
        let state = self.state;
        let instance = self.live(op)?;
        if state == SessionState::Initialized {
            return Err(EvalError::ModelNotLoaded { op, state });
        }
        if requests.is_empty() {
            return Err(EvaluationFailure::NoOutputsRequested.into());
        }

        if let Some(spec) = instance.spec() {
            check_inputs(spec, inputs)?;
            check_requests(spec, requests)?;
        }

        let results = instance.evaluate(inputs, requests)?;
        check_results(requests, &results)?;

        self.state = SessionState::Evaluated;
        self.evaluations += 1;
        debug!(op, outputs = requests.len(), "evaluation complete");
        Ok(results)
    }
}

impl<I: EvaluatorInstance> Drop for Session<I> {
    fn drop(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            warn!(evaluator = self.evaluator, "session dropped without destroy; releasing");
            if let Err(err) = instance.destroy() {
                warn!(error = %err, "failed to release evaluator");
            }
        }
    }
}

fn check_inputs(spec: &ModelSpec, inputs: &NamedTensors) -> Result<()> {
    for (name, values) in inputs.iter() {
        let layer = spec
            .input(name.as_str())
            .ok_or_else(|| EvaluationFailure::UnknownInputLayer(name.clone()))?;
        check_len(layer, values.len())?;
    }

    if let Some(missing) = spec.inputs.iter().find(|l| !inputs.contains(l.name.as_str())) {
        return Err(EvaluationFailure::MissingInput(missing.name.clone()).into());
    }
    Ok(())
}

fn check_requests(spec: &ModelSpec, requests: &[OutputRequest]) -> Result<()> {
    for request in requests {
        let layer = spec
            .layer(request.name.as_str())
            .ok_or_else(|| EvaluationFailure::UnknownOutputLayer(request.name.clone()))?;
        check_len(layer, request.size)?;
    }
    Ok(())
}

fn check_len(layer: &LayerSpec, len: usize) -> Result<()> {
    let fits = match layer.width() {
        Some(width) => width == len,
        None => layer.resolve_shape(len).is_some(),
    };
    if fits {
        return Ok(());
    }

    let expected = layer
        .width()
        .unwrap_or_else(|| layer.dims.iter().flatten().product());
    Err(EvaluationFailure::ShapeMismatch {
        layer: layer.name.clone(),
        expected,
        actual: len,
    }
    .into())
}

fn check_results(requests: &[OutputRequest], results: &NamedTensors) -> Result<()> {
    for request in requests {
        let values = results
            .get(request.name.as_str())
            .ok_or_else(|| EvaluationFailure::UnknownOutputLayer(request.name.clone()))?;
        if values.len() != request.size {
            return Err(EvaluationFailure::ShapeMismatch {
                layer: request.name.clone(),
                expected: request.size,
                actual: values.len(),
            }
            .into());
        }
    }
    Ok(())
}
