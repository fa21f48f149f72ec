use super::*;
use candle_core::{Device, Result, Tensor};

#[test]
fn first_position_mask_only_drops_position_zero() -> Result<()> {
    let mask = build_first_position_mask(&Device::Cpu, 4)?;
    assert_eq!(mask.dims(), &[1, 4]);
    assert_eq!(mask.dtype(), MASK_DTYPE);
    assert_eq!(mask.flatten_all()?.to_vec1::<f32>()?, vec![0.0, 1.0, 1.0, 1.0]);
    Ok(())
}

#[test]
fn first_position_mask_handles_single_position() -> Result<()> {
    let mask = build_first_position_mask(&Device::Cpu, 1)?;
    assert_eq!(mask.flatten_all()?.to_vec1::<f32>()?, vec![0.0]);
    Ok(())
}

#[test]
fn zeroing_applies_to_every_head() -> Result<()> {
    let rows = Tensor::from_vec(
        vec![0.5f32, 0.25, 0.25, 0.7, 0.2, 0.1],
        (2, 3),
        &Device::Cpu,
    )?;

    let masked = zero_first_position(&rows)?.to_vec2::<f32>()?;

    assert_eq!(masked[0], vec![0.0, 0.25, 0.25]);
    assert_eq!(masked[1][0], 0.0);
    assert!((masked[1][1] - 0.2).abs() < 1e-7);
    assert!((masked[1][2] - 0.1).abs() < 1e-7);
    Ok(())
}

#[test]
fn zeroing_rejects_non_matrix_input() -> Result<()> {
    let rows = Tensor::zeros((1, 2, 3), MASK_DTYPE, &Device::Cpu)?;
    assert!(zero_first_position(&rows).is_err());
    Ok(())
}
