use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use evalport_core::{LayerDecl, ModelSpec, NamedTensors};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn input_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

/// `size` whole numbers drawn uniformly from `[0, max_value)`.
pub fn random_values(size: usize, max_value: u32, rng: &mut impl Rng) -> Vec<f32> {
    (0..size)
        .map(|_| rng.random_range(0..max_value.max(1)) as f32)
        .collect()
}

pub fn random_inputs(layer: &LayerDecl, max_value: u32, rng: &mut impl Rng) -> NamedTensors {
    NamedTensors::new().with(layer.name.clone(), random_values(layer.width, max_value, rng))
}

/// Pre-sized, zero-filled buffers for in-place evaluation.
pub fn output_buffers(layers: &[LayerDecl]) -> NamedTensors {
    layers
        .iter()
        .map(|l| (l.name.clone(), vec![0.0; l.width]))
        .collect()
}

pub fn render_outputs(outputs: &NamedTensors) -> String {
    let mut out = String::from("Output contents:\n");
    for (name, values) in outputs.iter() {
        let _ = writeln!(out, "Output layer: {name}");
        for v in values {
            let _ = writeln!(out, "{v}");
        }
    }
    out
}

pub fn render_spec(spec: &ModelSpec) -> String {
    let mut out = String::new();
    for (kind, layers) in [("input", &spec.inputs), ("output", &spec.outputs)] {
        for layer in layers {
            let width = layer
                .width()
                .map_or_else(|| "dynamic".to_string(), |w| w.to_string());
            let dims = layer
                .dims
                .iter()
                .map(|d| d.map_or_else(|| "?".to_string(), |n| n.to_string()))
                .collect::<Vec<_>>()
                .join("x");
            let _ = writeln!(
                out,
                "{kind:<6} {:<24} {:?} [{dims}] width={width}",
                layer.name.as_str(),
                layer.dtype
            );
        }
    }
    out
}

pub fn wait_for_enter(prompt: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{prompt}")?;
    stdout.flush()?;
    drop(stdout);

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}
