use anyhow::{bail, Context};
use evalport_core::{
    verify_declared_layers, ConfigBlob, DType, Device, Directives, EvalError, EvaluationFailure,
    Evaluator, EvaluatorInstance, LayerDecl, LayerName, LayerSpec, ModelArtifact, ModelSpec,
    NamedTensors, OutputRequest, Result,
};
use ort::{
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session, SessionInputValue,
    },
    tensor::TensorElementType,
    value::ValueType,
};
use tracing::{debug, info};

const KNOWN_KEYS: &[&str] = &["layer", "deviceId", "precision", "optimization"];

pub struct OrtEvaluator;

impl OrtEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OrtEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OrtInstance {
    device: Device,
    optimization: u8,
    declared: Vec<LayerDecl>,
    loaded: Option<LoadedGraph>,
}

struct LoadedGraph {
    session: Session,
    spec: ModelSpec,
}

impl Evaluator for OrtEvaluator {
    type Instance = OrtInstance;

    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn init(&self, config: &ConfigBlob) -> Result<Self::Instance> {
        let directives = Directives::parse(config)?;
        directives.require_float_precision()?;

        let device = directives.device()?;
        if matches!(device, Device::Cuda { .. }) && !cfg!(feature = "cuda") {
            return Err(EvalError::ConfigInvalid(
                "CUDA requested but evalport-backend-ort was built without the `cuda` feature"
                    .into(),
            ));
        }

        let optimization = match directives.get("optimization") {
            None => 3,
            Some(raw) => raw
                .parse::<u8>()
                .ok()
                .filter(|level| *level <= 3)
                .ok_or_else(|| {
                    EvalError::ConfigInvalid(format!("optimization must be 0..=3, got `{raw}`"))
                })?,
        };

        for key in directives.keys().filter(|k| !KNOWN_KEYS.contains(k)) {
            debug!(key, "ignoring unknown config key");
        }

        Ok(OrtInstance {
            device,
            optimization,
            declared: directives.layers()?,
            loaded: None,
        })
    }
}

impl EvaluatorInstance for OrtInstance {
    fn load_model(&mut self, artifact: &ModelArtifact) -> Result<()> {
        let ModelArtifact::OnnxPath(path) = artifact else {
            return Err(EvalError::model_load(
                artifact.path(),
                "onnxruntime evaluator expects an ONNX file",
            ));
        };

        let session = build_session(path, self.device, self.optimization)
            .map_err(|e| EvalError::model_load(path, format!("{e:#}")))?;
        let spec =
            build_model_spec(&session).map_err(|e| EvalError::model_load(path, format!("{e:#}")))?;
        verify_declared_layers(&self.declared, &spec, path)?;

        info!(
            inputs = spec.inputs.len(),
            outputs = spec.outputs.len(),
            device = ?self.device,
            "onnx session ready"
        );
        self.loaded = Some(LoadedGraph { session, spec });
        Ok(())
    }

    fn spec(&self) -> Option<&ModelSpec> {
        self.loaded.as_ref().map(|graph| &graph.spec)
    }

    fn evaluate(&mut self, inputs: &NamedTensors, outputs: &[OutputRequest]) -> Result<NamedTensors> {
        let graph = self
            .loaded
            .as_mut()
            .ok_or_else(|| backend_failure("onnxruntime evaluator has no model loaded"))?;

        for request in outputs {
            if graph.spec.output(request.name.as_str()).is_none() {
                return Err(EvaluationFailure::UnknownOutputLayer(request.name.clone()).into());
            }
        }
        if let Some(unknown) = inputs.names().find(|n| graph.spec.input(n.as_str()).is_none()) {
            return Err(EvaluationFailure::UnknownInputLayer(unknown.clone()).into());
        }

        let mut ort_inputs = Vec::with_capacity(graph.spec.inputs.len());
        for layer in &graph.spec.inputs {
            let values = inputs
                .get(layer.name.as_str())
                .ok_or_else(|| EvaluationFailure::MissingInput(layer.name.clone()))?;
            let value = input_value(layer, values)?;
            ort_inputs.push((layer.name.0.clone(), value));
        }

        let results = graph
            .session
            .run(ort_inputs)
            .map_err(|e| backend_failure(format!("onnxruntime run failed: {e}")))?;

        let mut collected = NamedTensors::new();
        for request in outputs {
            let Some((_, value)) = results
                .iter()
                .find(|(name, _)| *name == request.name.as_str())
            else {
                return Err(EvaluationFailure::UnknownOutputLayer(request.name.clone()).into());
            };

            let ValueType::Tensor { ty, .. } = value.dtype() else {
                return Err(backend_failure(format!(
                    "output `{}` is not a tensor",
                    request.name
                )));
            };
            if *ty != TensorElementType::Float32 {
                return Err(backend_failure(format!(
                    "output `{}` is {ty}; only f32 outputs are supported",
                    request.name
                )));
            }

            let array = value
                .try_extract_array::<f32>()
                .map_err(|e| backend_failure(e.to_string()))?;
            let flat: Vec<f32> = array.iter().copied().collect();
            if flat.len() != request.size {
                return Err(EvaluationFailure::ShapeMismatch {
                    layer: request.name.clone(),
                    expected: request.size,
                    actual: flat.len(),
                }
                .into());
            }
            collected.insert(request.name.clone(), flat);
        }

        Ok(collected)
    }

    fn destroy(&mut self) -> Result<()> {
        self.loaded = None;
        Ok(())
    }
}

fn backend_failure(msg: impl Into<String>) -> EvalError {
    EvaluationFailure::Backend(msg.into()).into()
}

fn input_value(layer: &LayerSpec, values: &[f32]) -> Result<SessionInputValue<'static>> {
    if layer.dtype != DType::F32 {
        return Err(backend_failure(format!(
            "input `{}` is {:?}; only f32 inputs are supported",
            layer.name, layer.dtype
        )));
    }

    let shape = layer.resolve_shape(values.len()).ok_or_else(|| {
        EvaluationFailure::ShapeMismatch {
            layer: layer.name.clone(),
            expected: layer.width().unwrap_or(0),
            actual: values.len(),
        }
    })?;

    let tensor = ort::value::Tensor::from_array((shape.to_vec(), values.to_vec()))
        .map_err(|e| backend_failure(format!("failed to build input `{}`: {e}", layer.name)))?;
    Ok(SessionInputValue::from(tensor.into_dyn()))
}

fn build_session(
    path: &std::path::Path,
    device: Device,
    optimization: u8,
) -> anyhow::Result<Session> {
    let level = match optimization {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    };

    let builder = Session::builder()
        .context("failed to create ORT session builder")?
        .with_optimization_level(level)
        .context("failed to configure ORT session builder")?;

    let builder = configure_session_builder(builder, device)?;

    builder
        .commit_from_file(path)
        .context("failed to load ONNX model")
}

fn configure_session_builder(builder: SessionBuilder, device: Device) -> anyhow::Result<SessionBuilder> {
    match device {
        Device::Cpu => Ok(builder),
        Device::Cuda { device_id } => configure_cuda(builder, device_id),
    }
}

fn configure_cuda(builder: SessionBuilder, device_id: u32) -> anyhow::Result<SessionBuilder> {
    #[cfg(feature = "cuda")]
    {
        use ort::execution_providers::cuda::CUDAExecutionProvider;
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32)
            .build();
        builder
            .with_execution_providers([ep])
            .context("failed to enable ORT CUDA execution provider")
    }
    #[cfg(not(feature = "cuda"))]
    {
        let _ = (builder, device_id);
        bail!("CUDA requested but evalport-backend-ort was built without the `cuda` feature")
    }
}

fn build_model_spec(session: &Session) -> anyhow::Result<ModelSpec> {
    let inputs = session
        .inputs
        .iter()
        .map(|input| layer_spec_from_value_type(&input.name, &input.input_type))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let outputs = session
        .outputs
        .iter()
        .map(|output| layer_spec_from_value_type(&output.name, &output.output_type))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(ModelSpec { inputs, outputs })
}

fn layer_spec_from_value_type(name: &str, value_type: &ValueType) -> anyhow::Result<LayerSpec> {
    let ValueType::Tensor { ty, shape, .. } = value_type else {
        bail!("layer `{name}` is not a tensor");
    };

    let dtype = ort_tensor_element_to_dtype(*ty)?;
    let dims = shape
        .iter()
        .map(|d| if *d < 0 { None } else { Some(*d as usize) })
        .collect::<Vec<_>>();

    Ok(LayerSpec {
        name: LayerName(name.to_string()),
        dtype,
        dims,
    })
}

fn ort_tensor_element_to_dtype(ty: TensorElementType) -> anyhow::Result<DType> {
    match ty {
        TensorElementType::Float32 => Ok(DType::F32),
        TensorElementType::Float16 => Ok(DType::F16),
        TensorElementType::Int64 => Ok(DType::I64),
        TensorElementType::Int32 => Ok(DType::I32),
        TensorElementType::Uint8 => Ok(DType::U8),
        _ => bail!("unsupported tensor element type: {ty}"),
    }
}
