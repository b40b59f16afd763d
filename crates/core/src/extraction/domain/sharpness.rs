//! Focus measure for face crops.

use ndarray::Array2;

use super::face_crop::FaceCrop;

const LAPLACIAN: [[f64; 3]; 3] = [[0.0, 1.0, 0.0], [1.0, -4.0, 1.0], [0.0, 1.0, 0.0]];

/// Variance of the 3x3 Laplacian response over the crop's luma.
///
/// Higher is sharper. Crops smaller than 3x3 have no interior and score 0.
pub fn laplacian_variance(crop: &FaceCrop) -> f64 {
    let w = crop.width() as usize;
    let h = crop.height() as usize;
    if w < 3 || h < 3 {
        return 0.0;
    }

    let gray = match Array2::from_shape_vec((h, w), crop.to_gray()) {
        Ok(arr) => arr,
        Err(_) => return 0.0,
    };

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut s = 0.0;
            for (ky, krow) in LAPLACIAN.iter().enumerate() {
                for (kx, kval) in krow.iter().enumerate() {
                    s += kval * gray[[y + ky - 1, x + kx - 1]];
                }
            }
            sum += s;
            sum_sq += s * s;
        }
    }

    let n = ((w - 2) * (h - 2)) as f64;
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, v: u8) -> FaceCrop {
        FaceCrop::new(vec![v; (w * h * 3) as usize], w, h)
    }

    fn checkerboard(w: u32, h: u32) -> FaceCrop {
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        FaceCrop::new(data, w, h)
    }

    #[test]
    fn test_uniform_crop_has_zero_variance() {
        assert!(laplacian_variance(&uniform(16, 16, 128)) < 1e-9);
    }

    #[test]
    fn test_checkerboard_is_sharp() {
        assert!(laplacian_variance(&checkerboard(16, 16)) > 1000.0);
    }

    #[test]
    fn test_tiny_crop_scores_zero() {
        assert_eq!(laplacian_variance(&checkerboard(2, 8)), 0.0);
    }

    #[test]
    fn test_deterministic() {
        let crop = checkerboard(9, 7);
        assert_eq!(
            laplacian_variance(&crop).to_bits(),
            laplacian_variance(&crop).to_bits()
        );
    }
}
