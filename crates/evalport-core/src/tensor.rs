use smallvec::SmallVec;

use crate::LayerName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl Device {
    /// Accepts `-1`, `cpu` and `auto` for the CPU, `N` or `cuda:N` for a GPU.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == "-1" || raw.eq_ignore_ascii_case("cpu") || raw.eq_ignore_ascii_case("auto") {
            return Some(Self::Cpu);
        }

        let id = raw.strip_prefix("cuda:").unwrap_or(raw);
        id.parse().ok().map(|device_id| Self::Cuda { device_id })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DType {
    F32,
    F16,
    I64,
    I32,
    U8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }
    pub fn to_vec(&self) -> Vec<usize> {
        self.0.to_vec()
    }
}

/// Insertion-ordered map from layer name to flattened `f32` contents.
///
/// Used for evaluator inputs and for pre-sized output buffers. Inserting an
/// existing name replaces its values in place and keeps its position.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamedTensors {
    entries: Vec<(LayerName, Vec<f32>)>,
}

impl NamedTensors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`NamedTensors::insert`].
    pub fn with(mut self, name: impl Into<LayerName>, values: Vec<f32>) -> Self {
        self.insert(name, values);
        self
    }

    /// A single layer pre-filled with zeros, ready to be evaluated into.
    pub fn zeroed(name: impl Into<LayerName>, size: usize) -> Self {
        Self::new().with(name, vec![0.0; size])
    }

    pub fn insert(&mut self, name: impl Into<LayerName>, values: Vec<f32>) -> Option<Vec<f32>> {
        let name = name.into();
        if let Some(idx) = self.entries.iter().position(|(n, _)| *n == name) {
            return Some(std::mem::replace(&mut self.entries[idx].1, values));
        }
        self.entries.push((name, values));
        None
    }

    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<f32>> {
        let idx = self.entries.iter().position(|(n, _)| n.as_str() == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &LayerName> {
        self.entries.iter().map(|(n, _)| n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LayerName, &[f32])> {
        self.entries.iter().map(|(n, v)| (n, v.as_slice()))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&LayerName, &mut Vec<f32>)> {
        self.entries.iter_mut().map(|(n, v)| (&*n, v))
    }
}

impl<N: Into<LayerName>> FromIterator<(N, Vec<f32>)> for NamedTensors {
    fn from_iter<I: IntoIterator<Item = (N, Vec<f32>)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (name, values) in iter {
            out.insert(name, values);
        }
        out
    }
}

impl IntoIterator for NamedTensors {
    type Item = (LayerName, Vec<f32>);
    type IntoIter = std::vec::IntoIter<(LayerName, Vec<f32>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
