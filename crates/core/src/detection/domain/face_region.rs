use super::face_landmarks::FaceLandmarks;

/// A detected face in upright frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    pub landmarks: Option<FaceLandmarks>,
}

impl FaceRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            confidence,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, landmarks: FaceLandmarks) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Shorter side of the box in pixels.
    pub fn min_side(&self) -> f64 {
        self.width.min(self.height)
    }

    /// A region is usable when it has a positive, finite area and a
    /// confidence in `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        let finite = [self.x, self.y, self.width, self.height, self.confidence]
            .iter()
            .all(|v| v.is_finite());
        finite && self.area() > 0.0 && (0.0..=1.0).contains(&self.confidence)
    }

    /// Intersects the box with a `frame_w` × `frame_h` frame.
    ///
    /// The result may have zero area when the box lies fully outside.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> FaceRegion {
        let x1 = self.x.clamp(0.0, frame_w as f64);
        let y1 = self.y.clamp(0.0, frame_h as f64);
        let x2 = (self.x + self.width).clamp(0.0, frame_w as f64);
        let y2 = (self.y + self.height).clamp(0.0, frame_h as f64);
        FaceRegion {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
            confidence: self.confidence,
            landmarks: self.landmarks.clone(),
        }
    }

    pub fn iou(&self, other: &FaceRegion) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}
