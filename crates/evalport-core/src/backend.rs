use crate::{ConfigBlob, LayerName, ModelArtifact, ModelSpec, NamedTensors, Result};

/// One output layer the caller wants back, with the number of values it
/// expects for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputRequest {
    pub name: LayerName,
    pub size: usize,
}

impl OutputRequest {
    pub fn new(name: impl Into<LayerName>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// An inference engine that can be bound to a configuration.
pub trait Evaluator {
    type Instance: EvaluatorInstance;

    fn name(&self) -> &'static str;

    /// Fails with `ConfigInvalid` when the blob is not acceptable.
    fn init(&self, config: &ConfigBlob) -> Result<Self::Instance>;
}

/// A configured evaluator. Calls are blocking; sequencing is enforced by
/// [`crate::Session`], not here.
pub trait EvaluatorInstance {
    fn load_model(&mut self, artifact: &ModelArtifact) -> Result<()>;

    /// IO layers of the loaded model, `None` before a model is loaded.
    fn spec(&self) -> Option<&ModelSpec>;

    /// Returns one entry per request, in request order.
    fn evaluate(&mut self, inputs: &NamedTensors, outputs: &[OutputRequest])
        -> Result<NamedTensors>;

    /// Releases everything bound to the instance.
    fn destroy(&mut self) -> Result<()>;
}
