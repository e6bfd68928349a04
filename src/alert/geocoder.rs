//! 逆地理编码: 摄像头坐标 → 地址

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, SentinelError};

pub const UNKNOWN_LOCATION: &str = "Unknown Location";
pub const LOCATION_ERROR: &str = "Location Error";

pub trait Geocoder: Send + Sync {
    /// `Ok(None)` 表示服务正常但没有结果
    fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>>;
}

// ========== OpenCage ==========

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    formatted: Option<String>,
}

pub struct OpenCageGeocoder {
    agent: ureq::Agent,
    api_key: String,
    endpoint: String,
}

impl OpenCageGeocoder {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            api_key: api_key.into(),
            endpoint: "https://api.opencagedata.com/geocode/v1/json".to_string(),
        }
    }
}

impl Geocoder for OpenCageGeocoder {
    fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let response: OpenCageResponse = self
            .agent
            .get(&self.endpoint)
            .query("q", &format!("{lat},{lon}"))
            .query("key", &self.api_key)
            .query("limit", "1")
            .query("no_annotations", "1")
            .call()
            .map_err(|e| SentinelError::GeocodeFailure(e.to_string()))?
            .into_json()
            .map_err(|e| SentinelError::GeocodeFailure(e.to_string()))?;

        Ok(response.results.into_iter().find_map(|r| r.formatted))
    }
}

/// 没有 API Key 时直接用坐标作为地址
pub struct CoordinateGeocoder;

impl Geocoder for CoordinateGeocoder {
    fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        Ok(Some(format!("{lat:.4}, {lon:.4}")))
    }
}

// ========== 位置解析 (带缓存) ==========

/// 摄像头位置固定, 成功解析后缓存, 采集线程只读缓存不阻塞
pub struct LocationResolver {
    geocoder: Box<dyn Geocoder>,
    lat: f64,
    lon: f64,
    cache: RwLock<Option<String>>,
}

impl LocationResolver {
    pub fn new(geocoder: Box<dyn Geocoder>, lat: f64, lon: f64) -> Self {
        Self {
            geocoder,
            lat,
            lon,
            cache: RwLock::new(None),
        }
    }

    /// 地图链接
    pub fn map_link(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.lat, self.lon)
    }

    pub fn cached(&self) -> Option<String> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 解析地址, 失败返回哨兵字符串 (不缓存)
    pub fn resolve(&self) -> String {
        if let Some(address) = self.cached() {
            return address;
        }
        match self.geocoder.reverse(self.lat, self.lon) {
            Ok(Some(address)) => {
                *self.cache.write().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
                address
            }
            Ok(None) => UNKNOWN_LOCATION.to_string(),
            Err(e) => {
                warn!("⚠️ 逆地理编码失败: {}", e);
                LOCATION_ERROR.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        answer: Option<Option<String>>,
        calls: Arc<AtomicUsize>,
    }

    impl Geocoder for Scripted {
        fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(a) => Ok(a.clone()),
                None => Err(SentinelError::GeocodeFailure("offline".into())),
            }
        }
    }

    fn resolver(answer: Option<Option<String>>) -> (LocationResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = Scripted {
            answer,
            calls: calls.clone(),
        };
        (LocationResolver::new(Box::new(geocoder), 12.9716, 77.5946), calls)
    }

    #[test]
    fn test_success_is_cached() {
        let (r, calls) = resolver(Some(Some("MG Road, Bengaluru".into())));
        assert_eq!(r.cached(), None);
        assert_eq!(r.resolve(), "MG Road, Bengaluru");
        assert_eq!(r.resolve(), "MG Road, Bengaluru");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(r.cached().as_deref(), Some("MG Road, Bengaluru"));
    }

    #[test]
    fn test_sentinels() {
        let (r, calls) = resolver(Some(None));
        assert_eq!(r.resolve(), UNKNOWN_LOCATION);
        let (e, _) = resolver(None);
        assert_eq!(e.resolve(), LOCATION_ERROR);
        assert_eq!(e.cached(), None);
        // 失败不缓存, 下次仍会重试
        r.resolve();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_coordinate_geocoder_and_map_link() {
        let r = LocationResolver::new(Box::new(CoordinateGeocoder), 12.9716, 77.5946);
        assert_eq!(r.resolve(), "12.9716, 77.5946");
        assert_eq!(r.map_link(), "https://www.google.com/maps?q=12.9716,77.5946");
    }
}
