use std::fmt;
use std::io;
use std::path::Path;

use crate::{Device, EvalError, LayerName, ModelSpec, Result};

/// Evaluator configuration text, passed through unparsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigBlob(String);

impl ConfigBlob {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Reads a config file, joining its lines with `\n` (CRLF endings are
    /// normalised and no trailing newline is kept).
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self(raw.lines().collect::<Vec<_>>().join("\n")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `key=value` reader shared by the bundled evaluators.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Directives {
    entries: Vec<(String, String)>,
}

impl Directives {
    pub fn parse(config: &ConfigBlob) -> Result<Self> {
        let mut entries = Vec::new();
        for (idx, line) in config.as_str().lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(EvalError::ConfigInvalid(format!(
                    "line {}: expected key=value, got `{line}`",
                    idx + 1
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(EvalError::ConfigInvalid(format!(
                    "line {}: empty key",
                    idx + 1
                )));
            }
            entries.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { entries })
    }

    /// Last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// All `layer=name:width` declarations, in file order.
    pub fn layers(&self) -> Result<Vec<LayerDecl>> {
        self.get_all("layer").map(LayerDecl::parse).collect()
    }

    /// `deviceId`, defaulting to the CPU when absent.
    pub fn device(&self) -> Result<Device> {
        match self.get("deviceId") {
            None => Ok(Device::Cpu),
            Some(raw) => Device::parse(raw)
                .ok_or_else(|| EvalError::ConfigInvalid(format!("invalid deviceId `{raw}`"))),
        }
    }

    /// Only single precision is supported by the bundled evaluators.
    pub fn require_float_precision(&self) -> Result<()> {
        match self.get("precision") {
            None => Ok(()),
            Some(p) if p.eq_ignore_ascii_case("float") => Ok(()),
            Some(other) => Err(EvalError::ConfigInvalid(format!(
                "unsupported precision `{other}` (expected float)"
            ))),
        }
    }
}

/// An IO layer the configuration expects the model to expose.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerDecl {
    pub name: LayerName,
    pub width: usize,
}

impl LayerDecl {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = || EvalError::ConfigInvalid(format!("invalid layer declaration `{raw}`"));

        let (name, width) = raw.rsplit_once(':').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        let width = width.trim().parse::<usize>().map_err(|_| invalid())?;
        if width == 0 {
            return Err(invalid());
        }

        Ok(Self {
            name: LayerName::from(name),
            width,
        })
    }
}

/// Checks that a loaded model exposes every declared layer with the declared
/// width. Mismatches are reported as load failures for `path`.
pub fn verify_declared_layers(decls: &[LayerDecl], spec: &ModelSpec, path: &Path) -> Result<()> {
    for decl in decls {
        let Some(layer) = spec.layer(decl.name.as_str()) else {
            return Err(EvalError::model_load(
                path,
                format!("configured layer `{}` is not in the model", decl.name),
            ));
        };
        match layer.width() {
            Some(width) if width != decl.width => {
                return Err(EvalError::model_load(
                    path,
                    format!(
                        "configured layer `{}` has width {}, model has {width}",
                        decl.name, decl.width
                    ),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}
