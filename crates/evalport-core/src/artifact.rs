use std::path::{Path, PathBuf};

/// A trained model on disk, classified by how it must be decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelArtifact {
    OnnxPath(PathBuf),
    DenseJsonPath(PathBuf),
}

impl ModelArtifact {
    /// `.onnx` files are ONNX graphs; everything else is treated as a dense
    /// JSON network (sample models ship without an extension).
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let is_onnx = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
        if is_onnx {
            Self::OnnxPath(path)
        } else {
            Self::DenseJsonPath(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::OnnxPath(path) | Self::DenseJsonPath(path) => path,
        }
    }

    pub fn format_name(&self) -> &'static str {
        match self {
            Self::OnnxPath(_) => "onnx",
            Self::DenseJsonPath(_) => "dense",
        }
    }
}
