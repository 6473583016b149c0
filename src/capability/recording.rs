use std::sync::Arc;

use serde_json::json;

use crate::error::InterpreterError;
use crate::model::{Model, Scene};
use crate::resource::ResourceLocator;
use crate::tree::AspectNode;

use super::ModelInterpreter;

/// Prefix of the ids given to wrapped recordings: `RECORDING_1`, `RECORDING_2`, ...
pub const RECORDING_ID_PREFIX: &str = "RECORDING_";

/// Decodes one recording file into an in-memory value.
///
/// Implementations own the binary/scientific format; the interpreter only
/// wraps what they return.
pub trait RecordingReader: Send + Sync {
    /// # Errors
    /// Returns a description of the decode failure.
    fn read(&self, locator: &ResourceLocator) -> Result<serde_json::Value, String>;
}

/// Reads `file://` recordings stored as JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFileRecordingReader;

impl RecordingReader for JsonFileRecordingReader {
    fn read(&self, locator: &ResourceLocator) -> Result<serde_json::Value, String> {
        let path = locator
            .as_url()
            .to_file_path()
            .map_err(|()| format!("not a local file: {locator}"))?;
        let text = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
        serde_json::from_str(&text).map_err(|e| e.to_string())
    }
}

/// Interpreter that exposes previously recorded simulations as models.
///
/// The primary locator is ignored; every auxiliary locator is read as one
/// recording and wrapped under an id of the form `RECORDING_<n>`, counting from
/// 1 in declaration order.
pub struct RecordingsInterpreter {
    reader: Arc<dyn RecordingReader>,
}

impl RecordingsInterpreter {
    #[must_use]
    pub fn new(reader: Arc<dyn RecordingReader>) -> Self {
        Self { reader }
    }
}

impl ModelInterpreter for RecordingsInterpreter {
    fn name(&self) -> &str {
        "Recording Model Interpreter"
    }

    fn populate_runtime_tree(&self, _node: &mut AspectNode) -> bool {
        false
    }

    fn load(
        &self,
        _locator: &ResourceLocator,
        auxiliary: &[ResourceLocator],
        instance_path: &str,
    ) -> Result<Model, InterpreterError> {
        let mut wrapper = Model::wrapper(instance_path).with_instance_path(instance_path);
        for (idx, recording) in auxiliary.iter().enumerate() {
            let value = self
                .reader
                .read(recording)
                .map_err(|reason| InterpreterError::RecordingFailed {
                    locator: recording.to_string(),
                    reason,
                })?;
            let id = format!("{RECORDING_ID_PREFIX}{}", idx + 1);
            wrapper.wrap_model(Model::data(id, value).with_instance_path(instance_path));
        }
        Ok(wrapper)
    }

    fn scene_from_models(&self, models: &[Model]) -> Result<Scene, InterpreterError> {
        let recordings = serde_json::to_value(models).map_err(|e| InterpreterError::SceneFailed {
            reason: e.to_string(),
        })?;
        Ok(Scene::new(json!({ "recordings": recordings })))
    }
}
