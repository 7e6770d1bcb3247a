use std::io::Write;
use std::path::Path;

use anyhow::Result;
use evalport_core::{
    verify_declared_layers, ConfigBlob, Device, Directives, EvalError, LayerDecl, LayerSpec,
    ModelSpec,
};

#[test]
fn config_file_lines_are_joined_with_newlines() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(file, "deviceId=-1\r\nlayer=features:784\r\nlayer=ol.z:10\r\n")?;

    let blob = ConfigBlob::from_file(file.path())?;
    assert_eq!(blob.as_str(), "deviceId=-1\nlayer=features:784\nlayer=ol.z:10");
    Ok(())
}

#[test]
fn directives_skip_comments_and_keep_repeats() -> Result<()> {
    let blob = ConfigBlob::new(
        "# one hidden layer\n\nlayer=features:784\n  layer = ol.z:10  \ndeviceId=0\ndeviceId=cpu\nfoo=bar=baz",
    );
    let directives = Directives::parse(&blob)?;

    assert_eq!(directives.get("deviceId"), Some("cpu"));
    assert_eq!(directives.device()?, Device::Cpu);
    assert_eq!(directives.get("foo"), Some("bar=baz"));
    assert_eq!(
        directives.layers()?,
        vec![
            LayerDecl::parse("features:784")?,
            LayerDecl::parse("ol.z:10")?,
        ]
    );
    assert_eq!(directives.keys().count(), 5);
    Ok(())
}

#[test]
fn malformed_directives_are_config_invalid() {
    for text in ["layer", "=value", "layer=features", "layer=:10", "layer=x:0", "layer=x:ten"] {
        let result = Directives::parse(&ConfigBlob::new(text)).and_then(|d| d.layers());
        assert!(
            matches!(result, Err(EvalError::ConfigInvalid(_))),
            "`{text}` should be rejected"
        );
    }
}

#[test]
fn device_and_precision_directives() -> Result<()> {
    let parse = |text: &str| Directives::parse(&ConfigBlob::new(text));

    assert_eq!(parse("")?.device()?, Device::Cpu);
    assert_eq!(parse("deviceId=2")?.device()?, Device::Cuda { device_id: 2 });
    assert_eq!(parse("deviceId=cuda:1")?.device()?, Device::Cuda { device_id: 1 });
    assert!(matches!(parse("deviceId=gpu")?.device(), Err(EvalError::ConfigInvalid(_))));

    assert!(parse("precision=float")?.require_float_precision().is_ok());
    assert!(matches!(
        parse("precision=double")?.require_float_precision(),
        Err(EvalError::ConfigInvalid(_))
    ));
    Ok(())
}

#[test]
fn layer_names_may_contain_dots_and_colons() -> Result<()> {
    let decl = LayerDecl::parse("scope:ol.z:10")?;
    assert_eq!(decl.name.as_str(), "scope:ol.z");
    assert_eq!(decl.width, 10);
    Ok(())
}

#[test]
fn declared_layers_are_checked_against_model() -> Result<()> {
    let spec = ModelSpec {
        inputs: vec![LayerSpec::flat("features", 784)],
        outputs: vec![LayerSpec::flat("ol.z", 10)],
    };
    let path = Path::new("model");

    let ok = [LayerDecl::parse("features:784")?, LayerDecl::parse("ol.z:10")?];
    verify_declared_layers(&ok, &spec, path)?;

    let wrong_width = [LayerDecl::parse("ol.z:11")?];
    assert!(matches!(
        verify_declared_layers(&wrong_width, &spec, path),
        Err(EvalError::ModelLoad { .. })
    ));

    let unknown = [LayerDecl::parse("labels:10")?];
    assert!(matches!(
        verify_declared_layers(&unknown, &spec, path),
        Err(EvalError::ModelLoad { .. })
    ));
    Ok(())
}
