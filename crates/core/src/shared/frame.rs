use std::time::Duration;

use ndarray::ArrayView3;

/// Clockwise rotation the sensor applied relative to the upright scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Upright,
    Rotated90,
    Rotated180,
    Rotated270,
}

impl Orientation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::Upright),
            90 => Some(Self::Rotated90),
            180 => Some(Self::Rotated180),
            270 => Some(Self::Rotated270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Upright => 0,
            Self::Rotated90 => 90,
            Self::Rotated180 => 180,
            Self::Rotated270 => 270,
        }
    }
}

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Frames are immutable once captured. The pipeline consumes each frame
/// once (detection, then an optional crop) and drops it afterwards.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    sequence: u64,
    captured_at: Duration,
    orientation: Orientation,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            sequence,
            captured_at: Duration::ZERO,
            orientation: Orientation::Upright,
        }
    }

    /// Builds a 3-channel frame from a decoded RGB image.
    pub fn from_rgb_image(image: &image::RgbImage, sequence: u64) -> Self {
        Self::new(
            image.as_raw().clone(),
            image.width(),
            image.height(),
            3,
            sequence,
        )
    }

    pub fn with_capture_time(mut self, captured_at: Duration) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
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

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Capture time relative to the start of the frame source.
    pub fn captured_at(&self) -> Duration {
        self.captured_at
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Returns an upright copy, undoing the sensor rotation.
    ///
    /// Upright frames are returned as-is without copying pixels.
    pub fn to_upright(self) -> Frame {
        if self.orientation == Orientation::Upright {
            return self;
        }

        let w = self.width as usize;
        let h = self.height as usize;
        let c = self.channels as usize;
        let (out_w, out_h) = match self.orientation {
            Orientation::Rotated90 | Orientation::Rotated270 => (h, w),
            _ => (w, h),
        };

        let mut out = vec![0u8; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                // Rotate counter-clockwise by the recorded clockwise amount.
                let (nx, ny) = match self.orientation {
                    Orientation::Rotated90 => (y, w - 1 - x),
                    Orientation::Rotated180 => (w - 1 - x, h - 1 - y),
                    Orientation::Rotated270 => (h - 1 - y, x),
                    Orientation::Upright => (x, y),
                };
                let src = (y * w + x) * c;
                let dst = (ny * out_w + nx) * c;
                out[dst..dst + c].copy_from_slice(&self.data[src..src + c]);
            }
        }

        Frame {
            data: out,
            width: out_w as u32,
            height: out_h as u32,
            channels: self.channels,
            sequence: self.sequence,
            captured_at: self.captured_at,
            orientation: Orientation::Upright,
        }
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.sequence(), 5);
        assert_eq!(frame.data(), &data[..]);
        assert_eq!(frame.orientation(), Orientation::Upright);
        assert_eq!(frame.captured_at(), Duration::ZERO);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        let data = vec![0u8; 10]; // wrong size for 2x2x3
        Frame::new(data, 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let data = vec![0u8; 24]; // 2x4x3
        let frame = Frame::new(data, 4, 2, 3, 0);
        let arr = frame.as_ndarray();
        assert_eq!(arr.shape(), &[2, 4, 3]); // (height, width, channels)
    }

    #[test]
    fn test_from_rgb_image_copies_pixels() {
        let mut img = image::RgbImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&img, 7);
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.as_ndarray()[[1, 2, 1]], 20);
    }

    #[rstest]
    #[case(0, Some(Orientation::Upright))]
    #[case(90, Some(Orientation::Rotated90))]
    #[case(180, Some(Orientation::Rotated180))]
    #[case(270, Some(Orientation::Rotated270))]
    #[case(450, Some(Orientation::Rotated90))]
    #[case(45, None)]
    fn test_orientation_from_degrees(#[case] degrees: u32, #[case] expected: Option<Orientation>) {
        assert_eq!(Orientation::from_degrees(degrees), expected);
    }

    /// 3x2 single-channel frame with distinct values:
    /// ```text
    /// 1 2 3
    /// 4 5 6
    /// ```
    fn numbered(orientation: Orientation) -> Frame {
        Frame::new(vec![1, 2, 3, 4, 5, 6], 3, 2, 1, 0).with_orientation(orientation)
    }

    #[test]
    fn test_to_upright_noop_for_upright() {
        let frame = numbered(Orientation::Upright).to_upright();
        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_to_upright_undoes_90() {
        let frame = numbered(Orientation::Rotated90).to_upright();
        assert_eq!((frame.width(), frame.height()), (2, 3));
        // Counter-clockwise rotation of the grid above.
        assert_eq!(frame.data(), &[3, 6, 2, 5, 1, 4]);
        assert_eq!(frame.orientation(), Orientation::Upright);
    }

    #[test]
    fn test_to_upright_undoes_180() {
        let frame = numbered(Orientation::Rotated180).to_upright();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.data(), &[6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_to_upright_undoes_270() {
        let frame = numbered(Orientation::Rotated270).to_upright();
        assert_eq!((frame.width(), frame.height()), (2, 3));
        assert_eq!(frame.data(), &[4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn test_to_upright_keeps_metadata() {
        let frame = numbered(Orientation::Rotated90)
            .with_capture_time(Duration::from_millis(40))
            .to_upright();
        assert_eq!(frame.captured_at(), Duration::from_millis(40));
        assert_eq!(frame.sequence(), 0);
    }
}
