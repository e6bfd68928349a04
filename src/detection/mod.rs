/// 检测系统 (Detection System)
///
/// - Detector: 单帧目标检测 (无身份)
/// - Tracker:  跨帧身份维护 (ByteTrack)
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;

pub use bytetrack::{ByteTrackConfig, ByteTracker};
pub use detector::{Detector, DetectorConfig, HttpDetector};
pub use tracker::{KalmanBoxFilter, Tracker};
pub use types::{retain_vehicles, BBox, Detection, Frame, Track, MIN_CONFIDENCE, VEHICLE_CLASSES};
