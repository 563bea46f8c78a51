use crate::error::{Error, Result};
use crate::pipeline::LoopSettings;
use crate::region::Polygon;
use crate::types::{Config, LaneId};
use std::fs;
use std::time::Duration;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Startup checks. Nothing is spawned until these pass.
    pub fn validate(&self) -> Result<()> {
        if self.lanes.len() < 2 {
            return Err(Error::InvalidConfig(format!(
                "at least 2 lanes required, got {}",
                self.lanes.len()
            )));
        }
        if self.signal.dwell_ms == 0 {
            return Err(Error::InvalidConfig("signal.dwell_ms must be > 0".to_string()));
        }
        match LaneId::from_number(self.signal.initial_lane) {
            Some(lane) if lane.index() < self.lanes.len() => {}
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "signal.initial_lane must be in 1..={}, got {}",
                    self.lanes.len(),
                    self.signal.initial_lane
                )))
            }
        }
        if let Some(fps) = self.video.pace_fps {
            if frame_interval(fps).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "video.pace_fps must be a finite rate > 0, got {}",
                    fps
                )));
            }
        }
        self.regions().map(|_| ())
    }

    /// Detection region of every lane, in lane order.
    pub fn regions(&self) -> Result<Vec<Polygon>> {
        self.lanes
            .iter()
            .enumerate()
            .map(|(i, lane)| Polygon::new(LaneId(i), lane.region.clone()))
            .collect()
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            dwell: Duration::from_millis(self.signal.dwell_ms),
            initial_lane: LaneId::from_number(self.signal.initial_lane).unwrap_or(LaneId(0)),
            frame_interval: self.video.pace_fps.and_then(frame_interval),
        }
    }

    /// Filter expression for `tracing_subscriber::EnvFilter`.
    pub fn log_filter(&self) -> String {
        format!("traffic_signal_control={},ort=warn", self.logging.level)
    }
}

/// Spacing between frames at `fps`, or `None` for rates that are not finite
/// and positive or whose period does not fit in a `Duration`.
fn frame_interval(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupancy::DetectionFilter;
    use crate::types::{Point, SourceKind};

    const CONFIG: &str = r#"
signal:
  dwell_ms: 500
  initial_lane: 1
lanes:
  - name: north
    source: videos/sample7.mp4
    region: [[230, 180], [380, 185], [590, 300], [20, 300]]
  - source: recordings/sample9.jsonl
    source_kind: recorded
    region: [[160, 172], [400, 165], [460, 300], [20, 300]]
filter:
  min_confidence: 0.4
logging:
  level: debug
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.lanes.len(), 2);
        assert_eq!(config.lanes[0].source_kind, SourceKind::Video);
        assert_eq!(config.lanes[1].source_kind, SourceKind::Recorded);
        assert_eq!(config.lanes[0].region[0], Point::new(230, 180));
        assert_eq!(config.filter.min_confidence, Some(0.4));
        assert_eq!(config.filter.classes, None);
        assert_eq!(config.video.frame_width, 600);
        assert_eq!(config.log_filter(), "traffic_signal_control=debug,ort=warn");

        let settings = config.loop_settings();
        assert_eq!(settings.dwell, Duration::from_millis(500));
        assert_eq!(settings.initial_lane, LaneId(0));
        assert_eq!(settings.frame_interval, None);
    }

    #[test]
    fn test_defaults_for_omitted_sections() {
        let config = Config::from_yaml_str(
            r#"
lanes:
  - source: a.mp4
    region: [[0, 0], [10, 0], [10, 10]]
  - source: b.mp4
    region: [[0, 0], [10, 0], [10, 10]]
"#,
        )
        .unwrap();
        assert_eq!(config.signal.dwell_ms, 500);
        assert_eq!(config.signal.initial_lane, 1);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.filter, DetectionFilter::default());
    }

    #[test]
    fn test_rejects_short_region() {
        let err = Config::from_yaml_str(
            r#"
lanes:
  - source: a.mp4
    region: [[0, 0], [10, 0], [10, 10]]
  - source: b.mp4
    region: [[0, 0], [10, 0]]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPolygon {
                lane: LaneId(1),
                points: 2
            }
        ));
    }

    #[test]
    fn test_rejects_bad_signal_settings() {
        let lanes = r#"
lanes:
  - source: a.mp4
    region: [[0, 0], [10, 0], [10, 10]]
  - source: b.mp4
    region: [[0, 0], [10, 0], [10, 10]]
"#;
        for signal in [
            "signal:\n  initial_lane: 3\n",
            "signal:\n  initial_lane: 0\n",
            "signal:\n  dwell_ms: 0\n",
        ] {
            let yaml = format!("{}{}", signal, lanes);
            assert!(
                matches!(Config::from_yaml_str(&yaml), Err(Error::InvalidConfig(_))),
                "{}",
                signal
            );
        }
    }

    #[test]
    fn test_rejects_single_lane() {
        let err = Config::from_yaml_str(
            r#"
lanes:
  - source: a.mp4
    region: [[0, 0], [10, 0], [10, 10]]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_pace_fps_becomes_frame_interval() {
        let yaml = format!("video:\n  pace_fps: 25.0\n{}", CONFIG);
        let config = Config::from_yaml_str(&yaml).unwrap();
        let interval = config.loop_settings().frame_interval.unwrap();
        assert_eq!(interval.as_millis(), 40);
    }

    #[test]
    fn test_rejects_unusable_pace_fps() {
        for fps in ["0.0", "-5.0", "1.0e-30", ".nan", ".inf"] {
            let yaml = format!("video:\n  pace_fps: {}\n{}", fps, CONFIG);
            assert!(
                matches!(Config::from_yaml_str(&yaml), Err(Error::InvalidConfig(_))),
                "pace_fps {}",
                fps
            );
        }
    }
}
