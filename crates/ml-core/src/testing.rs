//! Small ONNX classifiers written on the fly for tests.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use prost::Message;
use tract_onnx::pb::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto, attribute_proto::AttributeType,
    tensor_proto::DataType, tensor_shape_proto, type_proto,
};

/// Write a classifier over `[1, edge, edge, 3]` inputs producing `classes`
/// scores. Each channel is averaged over the image; score `i` is the mean of
/// channel `i` for `i < 3` and zero otherwise, so a uniform BGR frame scores
/// `[b, g, r, 0, ...] / 255`.
pub fn write_channel_mean_model(path: &Path, edge: usize, classes: usize) -> Result<()> {
    let mut weights = vec![0.0f32; 3 * classes];
    for channel in 0..3.min(classes) {
        weights[channel * classes + channel] = 1.0;
    }

    let reduce = NodeProto {
        input: vec!["input".into()],
        output: vec!["means".into()],
        name: "channel_means".into(),
        op_type: "ReduceMean".into(),
        attribute: vec![
            AttributeProto {
                name: "axes".into(),
                r#type: AttributeType::Ints as i32,
                ints: vec![1, 2],
                ..Default::default()
            },
            AttributeProto {
                name: "keepdims".into(),
                r#type: AttributeType::Int as i32,
                i: 0,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let project = NodeProto {
        input: vec!["means".into(), "weights".into()],
        output: vec!["scores".into()],
        name: "project".into(),
        op_type: "MatMul".into(),
        ..Default::default()
    };

    let edge = edge as i64;
    let graph = GraphProto {
        name: "channel_mean_classifier".into(),
        node: vec![reduce, project],
        initializer: vec![TensorProto {
            name: "weights".into(),
            dims: vec![3, classes as i64],
            data_type: DataType::Float as i32,
            float_data: weights,
            ..Default::default()
        }],
        input: vec![value_info("input", &[1, edge, edge, 3])],
        output: vec![value_info("scores", &[1, classes as i64])],
        ..Default::default()
    };
    let model = ModelProto {
        ir_version: 7,
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: 13,
        }],
        producer_name: "ml-core tests".into(),
        graph: Some(graph),
        ..Default::default()
    };

    fs::write(path, model.encode_to_vec())
        .with_context(|| format!("failed to write {}", path.display()))
}

fn value_info(name: &str, dims: &[i64]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|&value| tensor_shape_proto::Dimension {
            value: Some(tensor_shape_proto::dimension::Value::DimValue(value)),
            ..Default::default()
        })
        .collect();
    ValueInfoProto {
        name: name.into(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: DataType::Float as i32,
                shape: Some(TensorShapeProto { dim }),
            })),
            ..Default::default()
        }),
        ..Default::default()
    }
}
