use std::fmt;

use crate::{DType, Shape};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerName(pub String);

impl LayerName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for LayerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    pub name: LayerName,
    pub dtype: DType,
    pub dims: Vec<Option<usize>>, // None = dynamic
}

impl LayerSpec {
    /// A flat layer of fixed width, as dense networks declare them.
    pub fn flat(name: impl Into<LayerName>, width: usize) -> Self {
        Self {
            name: name.into(),
            dtype: DType::F32,
            dims: vec![Some(width)],
        }
    }

    /// Flattened element count for a single sample, if the dims pin it down.
    /// A dynamic leading dim counts as a batch of one.
    pub fn width(&self) -> Option<usize> {
        self.dims
            .iter()
            .enumerate()
            .map(|(axis, dim)| match dim {
                Some(n) => Some(*n),
                None if axis == 0 => Some(1),
                None => None,
            })
            .product()
    }

    /// Concrete shape holding exactly `len` values, or `None` if no
    /// assignment of the dynamic dims fits.
    pub fn resolve_shape(&self, len: usize) -> Option<Shape> {
        if self.dims.is_empty() {
            return (len == 1).then(|| Shape::from_slice(&[]));
        }

        let inner_dynamic = self.dims.iter().skip(1).filter(|d| d.is_none()).count();
        let known: usize = self.dims.iter().map(|dim| dim.unwrap_or(1)).product();

        let fill = match inner_dynamic {
            0 => None,
            1 if known > 0 && len % known == 0 => Some(len / known),
            _ => return None,
        };

        let dims = self
            .dims
            .iter()
            .enumerate()
            .map(|(axis, dim)| match (dim, axis) {
                (Some(n), _) => *n,
                (None, 0) => 1,
                (None, _) => fill.unwrap_or(1),
            })
            .collect::<Vec<_>>();

        let shape = Shape::from_slice(&dims);
        (shape.numel() == len).then_some(shape)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelSpec {
    pub inputs: Vec<LayerSpec>,
    pub outputs: Vec<LayerSpec>,
}

impl ModelSpec {
    pub fn input(&self, name: &str) -> Option<&LayerSpec> {
        self.inputs.iter().find(|l| l.name.as_str() == name)
    }

    pub fn output(&self, name: &str) -> Option<&LayerSpec> {
        self.outputs.iter().find(|l| l.name.as_str() == name)
    }

    /// Looks a layer up among inputs first, then outputs.
    pub fn layer(&self, name: &str) -> Option<&LayerSpec> {
        self.input(name).or_else(|| self.output(name))
    }
}
