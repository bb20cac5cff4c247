//! Model registry tests

use std::fs;

use parlor_providers::{ModelRegistry, ModelSource, RegistryError, resolve_reference};

#[test]
fn registry_file_loads_labels_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("models.txt");
    fs::write(
        &path,
        "# local models\n\
         Pick a model | -\n\
         \n\
         Qwen 0.5B | Qwen/Qwen2.5-0.5B-Instruct-GGUF\n\
         Local | ~/models/llama\n",
    )
    .unwrap();

    let registry = ModelRegistry::load(&path).unwrap();
    let labels: Vec<&str> = registry.labels().collect();
    assert_eq!(labels, ["Pick a model", "Qwen 0.5B", "Local"]);
    assert!(registry.get("Pick a model").unwrap().is_placeholder());
    assert_eq!(registry.first_loadable().unwrap().label(), "Qwen 0.5B");
    assert_eq!(
        registry.get("Local").unwrap().reference(),
        "~/models/llama"
    );
}

#[test]
fn registry_errors_name_the_line() {
    let err = ModelRegistry::parse("Good | org/good\n\nno separator here\n").unwrap_err();
    assert!(matches!(err, RegistryError::MalformedLine { line: 3, .. }));
    assert!(err.to_string().contains("line 3"));
}

#[test]
fn placeholder_only_registry_has_nothing_loadable() {
    let registry = ModelRegistry::parse("Pick a model | -\n").unwrap();
    assert!(registry.first_loadable().is_none());
}

#[test]
fn missing_registry_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelRegistry::load(&dir.path().join("absent.txt")).unwrap_err();
    assert!(matches!(err, RegistryError::Read { .. }));
}

#[test]
fn existing_paths_resolve_locally_and_the_rest_go_to_the_hub() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("model.gguf");
    fs::write(&model, b"GGUF").unwrap();

    let reference = model.to_str().unwrap();
    assert_eq!(resolve_reference(reference), ModelSource::Local(model.clone()));
    assert_eq!(
        resolve_reference("Qwen/Qwen2.5-0.5B-Instruct-GGUF"),
        ModelSource::Hub("Qwen/Qwen2.5-0.5B-Instruct-GGUF".to_string())
    );
}
