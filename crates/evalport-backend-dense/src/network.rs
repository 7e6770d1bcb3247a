use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use evalport_core::{LayerName, LayerSpec, ModelSpec};
use serde::Deserialize;

/// On-disk form of a dense network.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkFile {
    pub inputs: Vec<InputDef>,
    pub layers: Vec<LayerDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputDef {
    pub name: String,
    pub width: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerDef {
    pub name: String,
    pub input: String,
    #[serde(default)]
    pub activation: Activation,
    /// One row per output unit.
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Identity,
    Sigmoid,
    Tanh,
    Relu,
    Softmax,
}

impl Activation {
    fn apply(self, values: &mut [f32]) {
        match self {
            Activation::Identity => {}
            Activation::Sigmoid => values.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp())),
            Activation::Tanh => values.iter_mut().for_each(|v| *v = v.tanh()),
            Activation::Relu => values.iter_mut().for_each(|v| *v = v.max(0.0)),
            Activation::Softmax => {
                let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for v in values.iter_mut() {
                    *v = (*v - max).exp();
                    sum += *v;
                }
                if sum > 0.0 {
                    values.iter_mut().for_each(|v| *v /= sum);
                }
            }
        }
    }
}

#[derive(Debug)]
struct Node {
    name: LayerName,
    width: usize,
    op: NodeOp,
}

impl Node {
    fn is_input(&self) -> bool {
        matches!(self.op, NodeOp::Input)
    }

    fn layer_spec(&self) -> LayerSpec {
        LayerSpec::flat(self.name.clone(), self.width)
    }
}

#[derive(Debug)]
enum NodeOp {
    Input,
    Dense {
        source: usize,
        activation: Activation,
        /// Row-major, `width x source width`.
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
}

/// A validated feed-forward network. Nodes are stored in evaluation order:
/// inputs first, then layers as they appear in the file.
#[derive(Debug)]
pub struct DenseNetwork {
    nodes: Vec<Node>,
    spec: ModelSpec,
}

impl DenseNetwork {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).context("failed to read model file")?;
        let file: NetworkFile = serde_json::from_str(&raw).context("malformed dense model")?;
        Self::from_definition(file)
    }

    pub fn from_definition(file: NetworkFile) -> Result<Self> {
        ensure!(!file.inputs.is_empty(), "model declares no inputs");
        ensure!(!file.layers.is_empty(), "model declares no layers");

        let mut nodes: Vec<Node> = Vec::with_capacity(file.inputs.len() + file.layers.len());

        for input in file.inputs {
            ensure!(input.width > 0, "input `{}` has zero width", input.name);
            ensure_unique(&nodes, &input.name)?;
            nodes.push(Node {
                name: LayerName(input.name),
                width: input.width,
                op: NodeOp::Input,
            });
        }

        for layer in file.layers {
            ensure_unique(&nodes, &layer.name)?;
            let Some(source) = nodes.iter().position(|n| n.name.as_str() == layer.input) else {
                bail!(
                    "layer `{}` reads from `{}`, which is not an input or an earlier layer",
                    layer.name,
                    layer.input
                );
            };
            let source_width = nodes[source].width;
            let width = layer.weights.len();

            ensure!(width > 0, "layer `{}` has no weight rows", layer.name);
            ensure!(
                layer.bias.len() == width,
                "layer `{}` has {} weight rows but {} biases",
                layer.name,
                width,
                layer.bias.len()
            );
            if let Some((row, bad)) = layer
                .weights
                .iter()
                .enumerate()
                .find(|(_, r)| r.len() != source_width)
            {
                bail!(
                    "layer `{}` weight row {row} has {} columns, input `{}` has width {source_width}",
                    layer.name,
                    bad.len(),
                    layer.input
                );
            }

            nodes.push(Node {
                name: LayerName(layer.name),
                width,
                op: NodeOp::Dense {
                    source,
                    activation: layer.activation,
                    weights: layer.weights.into_iter().flatten().collect(),
                    bias: layer.bias,
                },
            });
        }

        let spec = ModelSpec {
            inputs: nodes.iter().filter(|n| n.is_input()).map(Node::layer_spec).collect(),
            outputs: nodes.iter().filter(|n| !n.is_input()).map(Node::layer_spec).collect(),
        };

        Ok(Self { nodes, spec })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn width_of(&self, name: &str) -> Option<usize> {
        self.index_of(name).map(|idx| self.nodes[idx].width)
    }

    /// Runs the network far enough to produce every node in `wanted` and
    /// returns their values in the same order. `input` must yield the values
    /// of every input node the wanted nodes depend on.
    pub fn forward<'a>(
        &self,
        wanted: &[usize],
        mut input: impl FnMut(&LayerName) -> Option<&'a [f32]>,
    ) -> Result<Vec<Vec<f32>>> {
        let last = wanted.iter().copied().max().unwrap_or(0);
        let mut values: Vec<Option<Vec<f32>>> = Vec::with_capacity(last + 1);

        for node in &self.nodes[..=last] {
            let computed = match &node.op {
                NodeOp::Input => match input(&node.name) {
                    Some(data) => {
                        ensure!(
                            data.len() == node.width,
                            "input `{}` expects {} values, got {}",
                            node.name,
                            node.width,
                            data.len()
                        );
                        Some(data.to_vec())
                    }
                    None => None,
                },
                NodeOp::Dense {
                    source,
                    activation,
                    weights,
                    bias,
                } => match &values[*source] {
                    Some(x) => Some(affine(weights, bias, x, *activation)),
                    None => None,
                },
            };
            values.push(computed);
        }

        wanted
            .iter()
            .map(|&idx| {
                values[idx]
                    .clone()
                    .with_context(|| format!("missing input for `{}`", self.nodes[idx].name))
            })
            .collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name.as_str() == name)
    }
}

fn ensure_unique(nodes: &[Node], name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "empty layer name");
    ensure!(
        nodes.iter().all(|n| n.name.as_str() != name),
        "duplicate layer name `{name}`"
    );
    Ok(())
}

fn affine(weights: &[f32], bias: &[f32], x: &[f32], activation: Activation) -> Vec<f32> {
    let mut out: Vec<f32> = weights
        .chunks_exact(x.len())
        .zip(bias)
        .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f32>() + b)
        .collect();
    activation.apply(&mut out);
    out
}
