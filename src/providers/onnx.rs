//! Emotion classifier backed by ONNX Runtime.

use super::{EmotionClassifier, ModelError, EMOTION_INPUT_SIZE};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// Runs a 7-class expression model taking `[1, 64, 64, 1]` grayscale input.
pub struct OnnxEmotionClassifier {
    session: Session,
    input_name: String,
}

impl OnnxEmotionClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::Unavailable(format!(
                "emotion model not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| ModelError::Unavailable(format!("ORT load model: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ModelError::Unavailable("model declares no inputs".to_string()))?;

        tracing::info!(model = %model_path.display(), input = %input_name, "Emotion classifier loaded");

        Ok(Self {
            session,
            input_name,
        })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        let side = EMOTION_INPUT_SIZE as usize;
        let array = Array4::from_shape_vec((1, side, side, 1), input.to_vec())
            .map_err(|e| ModelError::Inference(format!("input shape: {e}")))?;
        let tensor =
            Tensor::from_array(array).map_err(|e| ModelError::Inference(format!("ORT tensor: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| ModelError::Inference(format!("ORT run failed: {e}")))?;

        let (_, scores) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("ORT extract: {e}")))?;

        Ok(scores.to_vec())
    }
}
