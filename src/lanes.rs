// src/lanes.rs
//
// Turns the `lanes:` section of the configuration into ready-to-spawn lane
// setups. Sources are opened lazily, on the lane's own worker thread.

use crate::error::Result;
use crate::occupancy::LaneOccupancyAggregator;
use crate::pipeline::{BoxedDetector, BoxedSource, LaneOpener, LaneSetup};
use crate::replay;
use crate::types::{Config, LaneConfig, LaneId, SourceKind};
use std::path::PathBuf;
use tracing::info;

pub fn build_lanes(config: &Config) -> Result<Vec<LaneSetup>> {
    let regions = config.regions()?;

    Ok(config
        .lanes
        .iter()
        .zip(regions)
        .enumerate()
        .map(|(i, (lane_config, region))| {
            let lane = LaneId(i);
            info!(
                "{} ({}): {:?} source {}, region of {} points",
                lane,
                lane_config.name.as_deref().unwrap_or("unnamed"),
                lane_config.source_kind,
                lane_config.source,
                region.points().len()
            );
            LaneSetup {
                aggregator: LaneOccupancyAggregator::new(lane, region, config.filter.clone()),
                open: opener(lane, lane_config, config),
            }
        })
        .collect())
}

fn opener(lane: LaneId, lane_config: &LaneConfig, config: &Config) -> LaneOpener {
    let path = PathBuf::from(&lane_config.source);
    let (width, height) = (config.video.frame_width, config.video.frame_height);

    match lane_config.source_kind {
        SourceKind::Recorded => recorded_opener(lane, path, width, height),
        SourceKind::Video => video_opener(lane, path, width, height, config),
    }
}

fn recorded_opener(lane: LaneId, path: PathBuf, width: usize, height: usize) -> LaneOpener {
    Box::new(move || -> Result<(BoxedSource, BoxedDetector)> {
        let (source, detector) = replay::open_recording(lane, &path, width, height)?;
        Ok((
            Box::new(source) as BoxedSource,
            Box::new(detector) as BoxedDetector,
        ))
    })
}

#[cfg(feature = "vision")]
fn video_opener(
    lane: LaneId,
    path: PathBuf,
    width: usize,
    height: usize,
    config: &Config,
) -> LaneOpener {
    use crate::vision::{VideoFileSource, YoloDetector};

    let detector_config = config.detector.clone();
    Box::new(move || -> Result<(BoxedSource, BoxedDetector)> {
        let source = VideoFileSource::open(lane, &path, width, height)?;
        let detector = YoloDetector::new(&detector_config)?;
        Ok((
            Box::new(source) as BoxedSource,
            Box::new(detector) as BoxedDetector,
        ))
    })
}

#[cfg(not(feature = "vision"))]
fn video_opener(
    lane: LaneId,
    path: PathBuf,
    _width: usize,
    _height: usize,
    _config: &Config,
) -> LaneOpener {
    Box::new(move || -> Result<(BoxedSource, BoxedDetector)> {
        Err(crate::error::Error::source_unavailable(
            lane,
            format!(
                "{}: video sources need a build with the `vision` feature",
                path.display()
            ),
        ))
    })
}
