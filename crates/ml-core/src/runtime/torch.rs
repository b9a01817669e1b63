use std::{
    convert::TryFrom,
    path::Path,
    sync::{Mutex, PoisonError},
};

use anyhow::Result;
use tch::{self, Device, Kind, Tensor};
use tracing::info;

use crate::{ClassScores, InputTensor, runtime::classifier_width};

/// TorchScript classifier, on CUDA when available.
pub struct TorchRuntime {
    module: Mutex<tch::CModule>,
    device: Device,
    input_size: (usize, usize),
    output_width: usize,
}

impl TorchRuntime {
    /// Load a TorchScript module and probe its output width with a zero input.
    pub fn load(path: &Path, input_size: (usize, usize)) -> Result<Self> {
        let device = Device::cuda_if_available();
        let module = tch::CModule::load_on_device(path, device)?;
        let (width, height) = input_size;
        let probe = Tensor::zeros([1, height as i64, width as i64, 3], (Kind::Float, device));
        let shape: Vec<usize> = module
            .forward_ts(&[probe])?
            .size()
            .into_iter()
            .map(|dim| dim.max(0) as usize)
            .collect();
        let output_width = classifier_width(&shape)?;
        info!(
            path = %path.display(),
            ?device, width, height, output_width,
            "loaded TorchScript classifier"
        );
        Ok(Self {
            module: Mutex::new(module),
            device,
            input_size,
            output_width,
        })
    }
}

impl crate::ModelRuntime for TorchRuntime {
    fn name(&self) -> &'static str {
        "torch"
    }

    fn input_size(&self) -> (usize, usize) {
        self.input_size
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn infer(&self, input: &InputTensor) -> Result<ClassScores> {
        let shape = input.shape().map(|dim| dim as i64);
        let tensor = Tensor::from_slice(input.as_slice())
            .view(shape)
            .to_device(self.device);
        let output = {
            let module = self.module.lock().unwrap_or_else(PoisonError::into_inner);
            module.forward_ts(&[tensor])?
        };
        let flat = output
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .flatten(0, -1);
        Ok(ClassScores(Vec::<f32>::try_from(&flat)?))
    }
}
