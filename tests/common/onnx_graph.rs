//! Minimal ONNX models assembled directly as protobuf bytes
//!
//! Only the handful of message fields the test graphs need are encoded.

use std::path::{Path, PathBuf};

const ELEM_FLOAT: i64 = 1;
const ELEM_INT64: i64 = 7;
const ATTR_INT: i64 = 2;
const ATTR_INTS: i64 = 7;

/// Tensor dimension in a value declaration
#[derive(Debug, Clone, Copy)]
pub enum Dim {
    Fixed(i64),
    Named(&'static str),
}

fn varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn int_field(out: &mut Vec<u8>, field: u64, value: i64) {
    varint(out, field << 3);
    varint(out, value as u64);
}

fn bytes_field(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
    varint(out, (field << 3) | 2);
    varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn value_info(name: &str, elem_type: i64, dims: Option<&[Dim]>) -> Vec<u8> {
    let mut tensor_type = Vec::new();
    int_field(&mut tensor_type, 1, elem_type);
    if let Some(dims) = dims {
        let mut shape = Vec::new();
        for dim in dims {
            let mut encoded = Vec::new();
            match *dim {
                Dim::Fixed(value) => int_field(&mut encoded, 1, value),
                Dim::Named(param) => bytes_field(&mut encoded, 2, param.as_bytes()),
            }
            bytes_field(&mut shape, 1, &encoded);
        }
        bytes_field(&mut tensor_type, 2, &shape);
    }

    let mut type_proto = Vec::new();
    bytes_field(&mut type_proto, 1, &tensor_type);

    let mut info = Vec::new();
    bytes_field(&mut info, 1, name.as_bytes());
    bytes_field(&mut info, 2, &type_proto);
    info
}

fn attr_int(name: &str, value: i64) -> Vec<u8> {
    let mut attr = Vec::new();
    bytes_field(&mut attr, 1, name.as_bytes());
    int_field(&mut attr, 3, value);
    int_field(&mut attr, 20, ATTR_INT);
    attr
}

fn attr_ints(name: &str, values: &[i64]) -> Vec<u8> {
    let mut attr = Vec::new();
    bytes_field(&mut attr, 1, name.as_bytes());
    for &value in values {
        int_field(&mut attr, 8, value);
    }
    int_field(&mut attr, 20, ATTR_INTS);
    attr
}

fn node(op_type: &str, inputs: &[&str], outputs: &[&str], attributes: &[Vec<u8>]) -> Vec<u8> {
    let mut node = Vec::new();
    for input in inputs {
        bytes_field(&mut node, 1, input.as_bytes());
    }
    for output in outputs {
        bytes_field(&mut node, 2, output.as_bytes());
    }
    bytes_field(&mut node, 3, format!("{op_type}_{}", outputs.join("_")).as_bytes());
    bytes_field(&mut node, 4, op_type.as_bytes());
    for attribute in attributes {
        bytes_field(&mut node, 5, attribute);
    }
    node
}

fn model(nodes: &[Vec<u8>], input: Vec<u8>, output: Vec<u8>) -> Vec<u8> {
    let mut graph = Vec::new();
    for node in nodes {
        bytes_field(&mut graph, 1, node);
    }
    bytes_field(&mut graph, 2, b"segmentation");
    bytes_field(&mut graph, 11, &input);
    bytes_field(&mut graph, 12, &output);

    let mut opset = Vec::new();
    bytes_field(&mut opset, 1, b"");
    int_field(&mut opset, 2, 13);

    let mut model = Vec::new();
    int_field(&mut model, 1, 7);
    bytes_field(&mut model, 2, b"bgremove-mask-tests");
    bytes_field(&mut model, 8, &opset);
    bytes_field(&mut model, 7, &graph);
    model
}

/// NCHW image input with free height and width
fn image_input() -> Vec<u8> {
    value_info(
        "input",
        ELEM_FLOAT,
        Some(&[
            Dim::Fixed(1),
            Dim::Fixed(3),
            Dim::Named("height"),
            Dim::Named("width"),
        ]),
    )
}

/// `sigmoid(mean over channels)`: a `[1, 1, H, W]` probability map
pub fn probability_model() -> Vec<u8> {
    model(
        &[
            node(
                "ReduceMean",
                &["input"],
                &["channel_mean"],
                &[attr_ints("axes", &[1]), attr_int("keepdims", 1)],
            ),
            node("Sigmoid", &["channel_mean"], &["mask"], &[]),
        ],
        image_input(),
        value_info("mask", ELEM_FLOAT, None),
    )
}

/// `argmax over channels`: a `[1, 1, H, W]` int64 label map
pub fn class_index_model() -> Vec<u8> {
    model(
        &[node(
            "ArgMax",
            &["input"],
            &["labels"],
            &[attr_int("axis", 1), attr_int("keepdims", 1)],
        )],
        image_input(),
        value_info("labels", ELEM_INT64, None),
    )
}

pub fn write_model(path: &Path, bytes: &[u8]) -> PathBuf {
    std::fs::write(path, bytes).expect("Failed to write ONNX model");
    path.to_path_buf()
}
