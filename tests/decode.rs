use npy_volume::{Dtype, Elements, VolumeBuilder, ViewerError, npy};

fn pseudo_random_bytes(count: usize, seed: u32) -> Vec<u8> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        })
        .collect()
}

#[test]
fn decoded_arrays_match_what_was_encoded() {
    let shapes: [&[usize]; 4] = [&[1, 1], &[7, 3], &[2, 5, 4], &[9, 1, 6]];
    for (seed, shape) in shapes.iter().enumerate() {
        let count: usize = shape.iter().product();
        let bytes = pseudo_random_bytes(count, seed as u32);
        let floats: Vec<f32> = bytes.iter().map(|&b| b as f32 / 7.0 - 3.0).collect();

        for elements in [Elements::UInt8(bytes.clone()), Elements::Float32(floats)] {
            let dtype = elements.dtype();
            let array = npy::decode(&npy::encode(shape, &elements).unwrap()).unwrap();

            assert_eq!(array.shape(), *shape);
            assert_eq!(array.dtype(), dtype);
            assert_eq!(array.len(), shape.iter().product::<usize>());
            assert_eq!(array.elements, elements);
        }
    }
}

#[test]
fn float_scenario_builds_a_flat_volume() {
    let values = vec![0.0f32, 0.5, 1.0, 1.0];
    let bytes = npy::encode(&[2, 2], &Elements::Float32(values)).unwrap();

    let array = npy::decode(&bytes).unwrap();
    assert_eq!(array.dtype(), Dtype::Float32);
    let dataset = VolumeBuilder::build(array).unwrap();
    assert_eq!(dataset.dim(), (2, 2, 1));
    assert_eq!(dataset.value_range(), (0.0, 1.0));
}

#[test]
fn volume_dimensions_reverse_the_shape() {
    let bytes = npy::encode(&[5, 3, 2], &Elements::UInt8(vec![0; 30])).unwrap();
    let dataset = VolumeBuilder::build(npy::decode(&bytes).unwrap()).unwrap();
    assert_eq!(dataset.dim(), (2, 3, 5));
}

#[test]
fn escaped_signature_text_is_not_accepted() {
    let mut bytes = npy::encode(&[2, 2], &Elements::UInt8(vec![0; 4])).unwrap();
    let mut escaped = b"\\x93NUMPY".to_vec();
    escaped.extend_from_slice(&bytes.split_off(6));
    assert!(matches!(npy::decode(&escaped), Err(ViewerError::Format(_))));
}

#[test]
fn every_truncation_of_the_payload_is_detected() {
    let bytes = npy::encode(&[4, 4], &Elements::Float32(vec![1.0; 16])).unwrap();
    for cut in 1..=64 {
        match npy::decode(&bytes[..bytes.len() - cut]) {
            Err(ViewerError::TruncatedBuffer {
                required,
                available,
            }) => {
                assert_eq!(required, 64);
                assert_eq!(available, 64 - cut);
            }
            other => panic!("cut {cut}: expected truncation, got {other:?}"),
        }
    }
}
