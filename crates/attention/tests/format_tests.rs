use anyhow::Result;
use attention::{AggregationMethod, AttentionMatrix, FormatOutcome, RawAttentionMatrix};
use candle_core::{DType, Device, Tensor};

/// Unnormalized weight of a query row over key `col`; rows are normalized below.
fn weight(step: usize, layer: usize, head: usize, row: usize, col: usize) -> f32 {
    (1 + col + 3 * head + 7 * layer + 11 * step + 5 * row) as f32
}

fn causal_row(step: usize, layer: usize, head: usize, row: usize, cols: usize, visible: usize) -> Vec<f32> {
    let total: f32 = (0..visible).map(|col| weight(step, layer, head, row, col)).sum();
    (0..cols)
        .map(|col| {
            if col < visible {
                weight(step, layer, head, row, col) / total
            } else {
                0.0
            }
        })
        .collect()
}

/// Build `steps × layers × [1, heads, a, b]` the way a decoding loop emits it.
fn raw_attention(layers: usize, heads: usize, steps: usize, prompt_len: usize) -> RawAttentionMatrix {
    let device = Device::Cpu;
    (0..steps)
        .map(|step| {
            (0..layers)
                .map(|layer| {
                    let (rows, cols) = if step == 0 {
                        (prompt_len, prompt_len)
                    } else {
                        (1, prompt_len + step)
                    };
                    let mut data = Vec::with_capacity(heads * rows * cols);
                    for head in 0..heads {
                        for row in 0..rows {
                            let visible = if step == 0 { row + 1 } else { cols };
                            data.extend(causal_row(step, layer, head, row, cols, visible));
                        }
                    }
                    Tensor::from_vec(data, (1, heads, rows, cols), &device).unwrap()
                })
                .collect()
        })
        .collect()
}

/// `raw[token][layer][0][head][row_selector][position]`.
fn raw_value(raw: &RawAttentionMatrix, token: usize, layer: usize, head: usize, position: usize) -> Result<f32> {
    let tensor = raw[token][layer].squeeze(0)?;
    let rows = tensor.to_vec3::<f32>()?;
    let row = rows[head].last().expect("at least one row");
    Ok(row[position])
}

#[test]
fn construction_derives_layers_and_heads_from_first_step() -> Result<()> {
    let raw = raw_attention(3, 4, 2, 5);
    let matrix = AttentionMatrix::new(raw)?;

    assert_eq!(matrix.num_layers(), 3);
    assert_eq!(matrix.num_heads(), 4);
    assert_eq!(matrix.num_response_tokens(), 2);
    assert!(!matrix.is_formatted());
    assert!(matrix.raw().is_some());
    assert!(matrix.normalized().is_none());
    assert_eq!(matrix.to_string(), "AttentionMatrix (4 head(s), 3 layer(s))");
    Ok(())
}

#[test]
fn construction_rejects_degenerate_input() -> Result<()> {
    let err = AttentionMatrix::new(Vec::new()).unwrap_err();
    assert!(err.to_string().starts_with("malformed attention tensor"));

    assert!(AttentionMatrix::new(vec![Vec::new()]).is_err());

    let flat = Tensor::zeros((4, 4), DType::F32, &Device::Cpu)?;
    assert!(AttentionMatrix::new(vec![vec![flat]]).is_err());

    let no_heads = Tensor::zeros((1, 0, 2, 2), DType::F32, &Device::Cpu)?;
    assert!(AttentionMatrix::new(vec![vec![no_heads]]).is_err());
    Ok(())
}

#[test]
fn format_without_aggregation_copies_last_query_rows() -> Result<()> {
    let (layers, heads, steps, prompt_len) = (2, 3, 4, 5);
    let raw = raw_attention(layers, heads, steps, prompt_len);
    let mut matrix = AttentionMatrix::new(raw.clone())?;

    assert_eq!(matrix.format(AggregationMethod::None, false)?, FormatOutcome::Formatted);
    assert!(matrix.is_formatted());
    assert_eq!(matrix.num_heads(), heads);
    assert_eq!(matrix.num_layers(), layers);
    assert!(matrix.raw().is_none());

    let normalized = matrix.normalized().expect("formatted");
    for layer in 0..layers {
        for head in 0..heads {
            for token in 0..steps {
                let sequence = normalized.sequence(layer, head, token);
                assert_eq!(sequence.len(), prompt_len + token);
                for (position, &value) in sequence.iter().enumerate() {
                    assert_eq!(value, raw_value(&raw, token, layer, head, position)?);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn format_with_zeroing_masks_position_zero_only() -> Result<()> {
    let (layers, heads, steps, prompt_len) = (2, 2, 3, 4);
    let raw = raw_attention(layers, heads, steps, prompt_len);
    let mut matrix = AttentionMatrix::new(raw.clone())?;
    matrix.format(AggregationMethod::None, true)?;

    let normalized = matrix.normalized().expect("formatted");
    for layer in 0..layers {
        for head in 0..heads {
            for token in 0..steps {
                let sequence = normalized.sequence(layer, head, token);
                assert_eq!(sequence[0], 0.0);
                for position in 1..sequence.len() {
                    assert_eq!(sequence[position], raw_value(&raw, token, layer, head, position)?);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn headwise_averaging_collapses_heads_to_their_mean() -> Result<()> {
    let (layers, heads, steps, prompt_len) = (3, 4, 3, 4);
    let raw = raw_attention(layers, heads, steps, prompt_len);
    let mut matrix = AttentionMatrix::new(raw.clone())?;
    matrix.format(AggregationMethod::HeadwiseAveraging, false)?;

    assert_eq!(matrix.num_heads(), 1);
    assert_eq!(matrix.num_layers(), layers);

    let normalized = matrix.normalized().expect("formatted");
    for layer in 0..layers {
        for token in 0..steps {
            let sequence = normalized.sequence(layer, 0, token);
            for (position, &value) in sequence.iter().enumerate() {
                let mut sum = 0.0f32;
                for head in 0..heads {
                    sum += raw_value(&raw, token, layer, head, position)?;
                }
                let expected = sum / heads as f32;
                assert!(
                    (value - expected).abs() < 1e-6,
                    "layer {layer} token {token} position {position}: {value} != {expected}"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn headwise_averaging_uses_zeroed_values() -> Result<()> {
    let (layers, heads, steps, prompt_len) = (2, 3, 2, 3);
    let raw = raw_attention(layers, heads, steps, prompt_len);
    let mut matrix = AttentionMatrix::new(raw.clone())?;
    matrix.format(AggregationMethod::HeadwiseAveraging, true)?;

    let normalized = matrix.normalized().expect("formatted");
    for layer in 0..layers {
        for token in 0..steps {
            let sequence = normalized.sequence(layer, 0, token);
            assert_eq!(sequence[0], 0.0);
            for position in 1..sequence.len() {
                let mut sum = 0.0f32;
                for head in 0..heads {
                    sum += raw_value(&raw, token, layer, head, position)?;
                }
                assert!((sequence[position] - sum / heads as f32).abs() < 1e-6);
            }
        }
    }
    Ok(())
}

#[test]
fn second_format_is_a_reported_no_op() -> Result<()> {
    let raw = raw_attention(2, 2, 2, 3);
    let mut matrix = AttentionMatrix::new(raw)?;
    matrix.format(AggregationMethod::None, false)?;
    let before = matrix.normalized().cloned().expect("formatted");

    let outcome = matrix.format(AggregationMethod::HeadwiseAveraging, true)?;

    assert_eq!(outcome, FormatOutcome::AlreadyFormatted);
    assert_eq!(matrix.num_heads(), 2);
    assert_eq!(matrix.normalized(), Some(&before));
    Ok(())
}

#[test]
fn failed_format_leaves_raw_state_intact() -> Result<()> {
    let mut raw = raw_attention(2, 2, 3, 3);
    // Drop a layer from the last step.
    raw[2].pop();
    let mut matrix = AttentionMatrix::new(raw)?;

    let err = matrix.format(AggregationMethod::None, false).unwrap_err();
    assert!(err.to_string().contains("step 2 has 1 layers, expected 2"));
    assert!(!matrix.is_formatted());
    assert!(matrix.raw().is_some());
    Ok(())
}

#[test]
fn non_square_prompt_matrix_is_rejected() -> Result<()> {
    let raw = vec![
        vec![Tensor::ones((1, 2, 2, 3), DType::F32, &Device::Cpu)?],
        vec![Tensor::ones((1, 2, 1, 4), DType::F32, &Device::Cpu)?],
    ];
    let mut matrix = AttentionMatrix::new(raw)?;

    let err = matrix.format(AggregationMethod::None, false).unwrap_err();
    assert!(err.to_string().starts_with("malformed attention tensor"));
    assert!(!matrix.is_formatted());
    Ok(())
}

#[test]
fn two_layer_two_head_scenario_has_expected_shapes() -> Result<()> {
    let raw = raw_attention(2, 2, 2, 3);

    let mut none = AttentionMatrix::new(raw.clone())?;
    none.format(AggregationMethod::None, false)?;
    let nested = none.normalized().expect("formatted").to_nested();
    assert_eq!(nested.len(), 2);
    for layer in &nested {
        assert_eq!(layer.len(), 2);
        for head in layer {
            assert_eq!(head.len(), 2);
            assert_eq!(head[0].len(), 3);
            assert_eq!(head[1].len(), 4);
        }
    }

    let mut averaged = AttentionMatrix::new(raw)?;
    averaged.format(AggregationMethod::HeadwiseAveraging, false)?;
    let averaged_nested = averaged.normalized().expect("formatted").to_nested();
    assert_eq!(averaged_nested.len(), 2);
    for (layer, heads) in averaged_nested.iter().enumerate() {
        assert_eq!(heads.len(), 1);
        assert_eq!(heads[0][0].len(), 3);
        assert_eq!(heads[0][1].len(), 4);
        for (token, sequence) in heads[0].iter().enumerate() {
            for (position, value) in sequence.iter().enumerate() {
                let mean = (nested[layer][0][token][position] + nested[layer][1][token][position]) / 2.0;
                assert!((value - mean).abs() < 1e-6);
            }
        }
    }
    Ok(())
}

#[test]
fn non_f32_inputs_are_reduced_in_f32() -> Result<()> {
    let raw: RawAttentionMatrix = raw_attention(1, 2, 2, 3)
        .into_iter()
        .map(|step| {
            step.into_iter()
                .map(|tensor| tensor.to_dtype(DType::F16).unwrap())
                .collect()
        })
        .collect();
    let mut matrix = AttentionMatrix::new(raw)?;
    matrix.format(AggregationMethod::HeadwiseAveraging, false)?;
    assert_eq!(matrix.normalized().expect("formatted").step_len(1), 4);
    Ok(())
}

#[test]
fn serde_round_trip_preserves_weak_equality() -> Result<()> {
    let raw = raw_attention(2, 2, 3, 3);
    let matrix = AttentionMatrix::new(raw)?;

    let decoded = AttentionMatrix::from_json(&matrix.to_json()?)?;
    assert_eq!(decoded, matrix);
    assert!(!decoded.is_formatted());

    let mut formatted = matrix.clone();
    formatted.format(AggregationMethod::None, true)?;
    assert_ne!(formatted, matrix);

    let decoded = AttentionMatrix::from_json(&formatted.to_json()?)?;
    assert_eq!(decoded, formatted);
    assert_eq!(decoded.normalized(), formatted.normalized());
    Ok(())
}

#[test]
fn raw_round_trip_formats_like_the_original() -> Result<()> {
    let raw = raw_attention(2, 3, 3, 4);
    let mut original = AttentionMatrix::new(raw)?;
    let mut reloaded = AttentionMatrix::from_json(&original.to_json()?)?;

    original.format(AggregationMethod::HeadwiseAveraging, true)?;
    reloaded.format(AggregationMethod::HeadwiseAveraging, true)?;

    assert_eq!(reloaded.normalized(), original.normalized());
    Ok(())
}

#[test]
fn weak_equality_ignores_content() -> Result<()> {
    let a = AttentionMatrix::new(raw_attention(2, 2, 2, 3))?;
    let zeros: RawAttentionMatrix = (0..2)
        .map(|step| {
            (0..2)
                .map(|_| {
                    let (rows, cols) = if step == 0 { (3, 3) } else { (1, 4) };
                    Tensor::zeros((1, 2, rows, cols), DType::F32, &Device::Cpu).unwrap()
                })
                .collect()
        })
        .collect();
    let b = AttentionMatrix::new(zeros)?;
    assert_eq!(a, b);
    Ok(())
}
