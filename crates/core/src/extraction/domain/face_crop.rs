use crate::detection::domain::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// RGB pixels of a single face, copied out of its frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceCrop {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl FaceCrop {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width as usize) * (height as usize) * 3);
        Self {
            data,
            width,
            height,
        }
    }

    /// Copies the pixels under `region` (clamped to the frame).
    ///
    /// Returns `None` when the clamped region covers no whole pixel or the
    /// frame is not 3-channel.
    pub fn from_region(frame: &Frame, region: &FaceRegion) -> Option<Self> {
        if frame.channels() != 3 {
            return None;
        }
        let clamped = region.clamp_to(frame.width(), frame.height());
        let x1 = clamped.x.floor() as u32;
        let y1 = clamped.y.floor() as u32;
        let x2 = ((clamped.x + clamped.width).ceil() as u32).min(frame.width());
        let y2 = ((clamped.y + clamped.height).ceil() as u32).min(frame.height());
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let w = (x2 - x1) as usize;
        let h = (y2 - y1) as usize;
        let stride = frame.width() as usize * 3;
        let src = frame.data();
        let mut data = Vec::with_capacity(w * h * 3);
        for y in y1 as usize..y2 as usize {
            let start = y * stride + x1 as usize * 3;
            data.extend_from_slice(&src[start..start + w * 3]);
        }
        Some(Self::new(data, w as u32, h as u32))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }

    /// BT.601 luma per pixel, row-major.
    pub fn to_gray(&self) -> Vec<f64> {
        self.data
            .chunks_exact(3)
            .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 frame where each pixel's red channel encodes `y * 10 + x`.
    fn indexed_frame() -> Frame {
        let mut data = Vec::new();
        for y in 0..3u8 {
            for x in 0..4u8 {
                data.extend_from_slice(&[y * 10 + x, 0, 0]);
            }
        }
        Frame::new(data, 4, 3, 3, 0)
    }

    #[test]
    fn test_crop_copies_region_pixels() {
        let frame = indexed_frame();
        let crop = FaceCrop::from_region(&frame, &FaceRegion::new(1.0, 1.0, 2.0, 2.0, 0.9)).unwrap();
        assert_eq!((crop.width(), crop.height()), (2, 2));
        let reds: Vec<u8> = crop.data().chunks(3).map(|p| p[0]).collect();
        assert_eq!(reds, vec![11, 12, 21, 22]);
    }

    #[test]
    fn test_crop_expands_fractional_edges() {
        let frame = indexed_frame();
        let crop = FaceCrop::from_region(&frame, &FaceRegion::new(0.5, 0.5, 1.0, 1.0, 0.9)).unwrap();
        assert_eq!((crop.width(), crop.height()), (2, 2));
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = indexed_frame();
        let crop =
            FaceCrop::from_region(&frame, &FaceRegion::new(2.0, -5.0, 10.0, 6.0, 0.9)).unwrap();
        assert_eq!((crop.width(), crop.height()), (2, 1));
    }

    #[test]
    fn test_crop_outside_frame_is_none() {
        let frame = indexed_frame();
        assert!(FaceCrop::from_region(&frame, &FaceRegion::new(10.0, 10.0, 5.0, 5.0, 0.9)).is_none());
    }

    #[test]
    fn test_to_gray_white_is_255() {
        let crop = FaceCrop::new(vec![255; 3], 1, 1);
        assert!((crop.to_gray()[0] - 255.0).abs() < 1e-9);
    }
}
