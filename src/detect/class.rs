use serde::Serialize;

/// The three class identifiers the helmet checkpoint is queried for.
/// Everything else the model may emit is discarded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HelmetClass {
    Helmet,
    NoHelmet,
    Person,
}

impl HelmetClass {
    /// Class ids as trained into the checkpoint.
    pub fn from_id(id: usize) -> Option<Self> {
        match id {
            0 => Some(HelmetClass::Helmet),
            2 => Some(HelmetClass::NoHelmet),
            5 => Some(HelmetClass::Person),
            _ => None,
        }
    }

    pub fn id(self) -> usize {
        match self {
            HelmetClass::Helmet => 0,
            HelmetClass::NoHelmet => 2,
            HelmetClass::Person => 5,
        }
    }

    /// Box color: green for helmet, red for no-helmet, blue for bystanders.
    pub fn color(self) -> [u8; 3] {
        match self {
            HelmetClass::Helmet => [0, 255, 0],
            HelmetClass::NoHelmet => [255, 0, 0],
            HelmetClass::Person => [0, 0, 255],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            HelmetClass::Helmet => "helmet",
            HelmetClass::NoHelmet => "no helmet",
            HelmetClass::Person => "person",
        }
    }
}

impl std::fmt::Display for HelmetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One detected object, in pixel coordinates of the frame it came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    /// Score in 0.0-1.0; always at or above the session threshold.
    pub confidence: f32,
    pub class: HelmetClass,
}

impl Detection {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.width() * self.height() + other.width() * other.height() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Per-frame counts of helmet-worn vs helmet-not-worn detections.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTally {
    pub helmet: u32,
    pub no_helmet: u32,
}

impl FrameTally {
    pub fn from_detections(detections: &[Detection]) -> Self {
        let mut tally = FrameTally::default();
        for det in detections {
            match det.class {
                HelmetClass::Helmet => tally.helmet += 1,
                HelmetClass::NoHelmet => tally.no_helmet += 1,
                HelmetClass::Person => {}
            }
        }
        tally
    }

    pub fn total(&self) -> u32 {
        self.helmet + self.no_helmet
    }

    pub fn has_violation(&self) -> bool {
        self.no_helmet > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} people detected, {} wearing, {} not wearing",
            self.total(),
            self.helmet,
            self.no_helmet
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: HelmetClass) -> Detection {
        Detection {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
            confidence: 0.9,
            class,
        }
    }

    #[test]
    fn tally_counts_only_helmet_classes() {
        let detections = [
            det(HelmetClass::Helmet),
            det(HelmetClass::NoHelmet),
            det(HelmetClass::Person),
            det(HelmetClass::Helmet),
        ];
        let tally = FrameTally::from_detections(&detections);
        assert_eq!(tally.helmet, 2);
        assert_eq!(tally.no_helmet, 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn unknown_class_ids_are_dropped() {
        assert_eq!(HelmetClass::from_id(0), Some(HelmetClass::Helmet));
        assert_eq!(HelmetClass::from_id(2), Some(HelmetClass::NoHelmet));
        assert_eq!(HelmetClass::from_id(5), Some(HelmetClass::Person));
        for id in [1, 3, 4, 6, 80] {
            assert_eq!(HelmetClass::from_id(id), None);
        }
    }

    #[test]
    fn summary_text_matches_display_format() {
        let tally = FrameTally {
            helmet: 3,
            no_helmet: 1,
        };
        assert_eq!(tally.summary(), "4 people detected, 3 wearing, 1 not wearing");
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = det(HelmetClass::Helmet);
        let b = Detection {
            x1: 20.0,
            y1: 20.0,
            x2: 30.0,
            y2: 30.0,
            ..a
        };
        assert_eq!(a.iou(&b), 0.0);
    }
}
