use crate::error::AppError;
use crate::models::classify_types::Ranking;
use crate::services::classifier::ranking;
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

/// What the model's single output holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Already a softmax distribution.
    Probabilities,
    /// Raw scores; softmax is applied before ranking.
    Logits,
}

/// Anything that maps an input tensor to one score per class.
pub trait ModelProvider: Send {
    fn predict(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError>;

    fn output_kind(&self) -> OutputKind {
        OutputKind::Probabilities
    }
}

/// ONNX Runtime session with a single image input.
pub struct OrtModel {
    session: Session,
    output_kind: OutputKind,
}

impl OrtModel {
    pub fn new(session: Session, output_kind: OutputKind) -> Self {
        Self {
            session,
            output_kind,
        }
    }
}

impl ModelProvider for OrtModel {
    fn predict(&mut self, input: Array4<f32>) -> Result<Vec<f32>, AppError> {
        let input_name = self
            .session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| AppError::Inference("Model declares no inputs".to_string()))?;

        let input_tensor = Value::from_array(input)
            .map_err(|e| AppError::Inference(format!("Failed to create tensor value: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![input_name.as_str() => input_tensor])
            .map_err(|e| AppError::Inference(format!("Model run failed: {}", e)))?;

        let output_value = outputs
            .values()
            .next()
            .ok_or_else(|| AppError::Inference("Model produced no outputs".to_string()))?;

        let (_, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| AppError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        Ok(data.to_vec())
    }

    fn output_kind(&self) -> OutputKind {
        self.output_kind
    }
}

/// Run one prediction and rank it. Single attempt; provider errors propagate.
pub fn infer(
    tensor: Array4<f32>,
    class_index: &[String],
    provider: &mut dyn ModelProvider,
    k: usize,
) -> Result<Ranking, AppError> {
    let raw = provider.predict(tensor)?;
    let probabilities = match provider.output_kind() {
        OutputKind::Probabilities => raw,
        OutputKind::Logits => ranking::softmax(&raw),
    };
    ranking::rank(&probabilities, class_index, k)
}
