use std::path::Path;

use anyhow::{Context, Result, anyhow};
use tracing::info;
use tract_onnx::prelude::*;

use crate::{ClassScores, InputTensor, runtime::classifier_width};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX classifier executed by tract on the CPU.
pub struct OnnxRuntime {
    plan: OnnxPlan,
    input_size: (usize, usize),
    output_width: usize,
}

impl OnnxRuntime {
    pub fn load(path: &Path, input_size: (usize, usize)) -> Result<Self> {
        let (width, height) = input_size;
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .with_context(|| format!("failed to read ONNX model {}", path.display()))?
            .with_input_fact(0, f32::fact([1, height, width, 3]).into())?
            .into_optimized()
            .with_context(|| format!("failed to optimise ONNX model {}", path.display()))?;

        let output_fact = model.output_fact(0)?;
        let shape = output_fact
            .shape
            .as_concrete()
            .ok_or_else(|| anyhow!("model output shape {:?} is not concrete", output_fact.shape))?
            .to_vec();
        let output_width = classifier_width(&shape)?;

        let plan = model.into_runnable()?;
        info!(
            path = %path.display(),
            width, height, output_width,
            "loaded ONNX classifier"
        );
        Ok(Self {
            plan,
            input_size,
            output_width,
        })
    }
}

impl crate::ModelRuntime for OnnxRuntime {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn input_size(&self) -> (usize, usize) {
        self.input_size
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn infer(&self, input: &InputTensor) -> Result<ClassScores> {
        let tensor = Tensor::from_shape(&input.shape(), input.as_slice())?;
        let outputs = self.plan.run(tvec!(tensor.into()))?;
        let scores = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?
            .to_array_view::<f32>()?
            .iter()
            .copied()
            .collect();
        Ok(ClassScores(scores))
    }
}
