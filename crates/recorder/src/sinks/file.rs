//! FileSink - writes the run output tree to disk
//!
//! ```text
//! <root>/info.csv
//! <root>/manifest.json
//! <root>/<agent>/<channel>/<frame>.png|.ply
//! <root>/<agent>/<channel>/<frame>_meta.json
//! ```

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use contracts::{
    CosimError, MeasurementSink, OutputConfig, SensorChannel, SensorMeasurement,
    SensorPayload, VehicleActor,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument};

use crate::encode::{save_image, write_lidar_ply, write_semantic_lidar_ply};

const ACTOR_LOG_HEADER: &str = "frame,type_id,actor_id,x,y,z,roll,pitch,yaw,length,width,height";

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub actor_rows: u64,
    pub payloads_written: u64,
    pub blank_skipped: u64,
}

/// Sink that writes actor rows and payloads to disk
pub struct FileSink {
    name: String,
    root: PathBuf,
    skip_blank: bool,
    actor_log: BufWriter<File>,
    created_dirs: HashSet<PathBuf>,
    started_at: DateTime<Utc>,
    stats: RecorderStats,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: &OutputConfig) -> Result<Self, CosimError> {
        let name = name.into();
        let root = config.root_path.clone();
        fs::create_dir_all(&root)?;

        let log_path = root.join("info.csv");
        let fresh = !log_path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let mut actor_log = BufWriter::new(file);
        if fresh {
            writeln!(actor_log, "{}", ACTOR_LOG_HEADER)?;
        }

        debug!(sink = %name, root = %root.display(), "FileSink opened");
        Ok(Self {
            name,
            root,
            skip_blank: config.skip_blank_payloads,
            actor_log,
            created_dirs: HashSet::new(),
            started_at: Utc::now(),
            stats: RecorderStats::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    fn channel_dir(&self, agent: u32, channel: SensorChannel) -> PathBuf {
        self.root.join(agent.to_string()).join(channel.dir_name())
    }

    fn ensure_dir(&mut self, dir: &Path) -> std::io::Result<()> {
        if !self.created_dirs.contains(dir) {
            fs::create_dir_all(dir)?;
            self.created_dirs.insert(dir.to_path_buf());
        }
        Ok(())
    }

    fn write_payload(&mut self, measurement: &SensorMeasurement) -> std::io::Result<()> {
        let dir = self.channel_dir(measurement.agent, measurement.channel);
        self.ensure_dir(&dir)?;
        let payload_path = dir.join(format!(
            "{:06}.{}",
            measurement.frame,
            measurement.channel.file_extension()
        ));

        let details = match &measurement.payload {
            SensorPayload::Image(image) => {
                save_image(&payload_path, image)?;
                json!({
                    "width": image.width,
                    "height": image.height,
                    "fov": image.fov,
                    "format": image.format,
                })
            }
            SensorPayload::PointCloud(pc) => {
                let mut out = BufWriter::new(File::create(&payload_path)?);
                if measurement.channel == SensorChannel::SemanticLidar {
                    write_semantic_lidar_ply(&mut out, pc)?;
                } else {
                    write_lidar_ply(&mut out, pc)?;
                }
                out.flush()?;
                json!({
                    "num_points": pc.num_points,
                    "channels": pc.channels,
                    "horizontal_angle": pc.horizontal_angle,
                    "points_per_channel": pc.points_per_channel,
                })
            }
        };

        let sidecar = json!({
            "frame": measurement.frame,
            "timestamp": measurement.timestamp,
            "channel": measurement.channel,
            "agent": measurement.agent,
            "sensor": measurement.sensor,
            "sensor_transform": measurement.sensor_transform,
            "payload": details,
        });
        let meta_path = dir.join(format!("{:06}_meta.json", measurement.frame));
        serde_json::to_writer_pretty(File::create(meta_path)?, &sidecar)
            .map_err(std::io::Error::other)?;
        Ok(())
    }

    fn write_manifest(&self) -> std::io::Result<()> {
        let manifest = json!({
            "started_at": self.started_at.to_rfc3339(),
            "finished_at": Utc::now().to_rfc3339(),
            "stats": self.stats,
        });
        serde_json::to_writer_pretty(File::create(self.root.join("manifest.json"))?, &manifest)
            .map_err(std::io::Error::other)
    }

    fn sink_error(&self, e: std::io::Error) -> CosimError {
        CosimError::sink_write(&self.name, e.to_string())
    }
}

impl MeasurementSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_sink_write_actors", skip(self, actors), fields(sink = %self.name, rows = actors.len()))]
    async fn write_actors(&mut self, frame: u64, actors: &[VehicleActor]) -> Result<(), CosimError> {
        for actor in actors {
            let t = &actor.transform;
            let (length, width, height) = actor.extent.full_size();
            writeln!(
                self.actor_log,
                "{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
                frame,
                actor.type_id,
                actor.id,
                t.location.x,
                t.location.y,
                t.location.z,
                t.rotation.roll,
                t.rotation.pitch,
                t.rotation.yaw,
                length,
                width,
                height
            )
            .map_err(|e| self.sink_error(e))?;
            self.stats.actor_rows += 1;
        }
        Ok(())
    }

    #[instrument(
        name = "file_sink_write_measurement",
        skip(self, measurement),
        fields(sink = %self.name, frame = measurement.frame, channel = %measurement.channel)
    )]
    async fn write_measurement(&mut self, measurement: &SensorMeasurement) -> Result<(), CosimError> {
        if self.skip_blank && measurement.payload.is_blank() {
            self.stats.blank_skipped += 1;
            debug!(agent = measurement.agent, "Blank payload skipped");
            return Ok(());
        }
        self.write_payload(measurement).map_err(|e| {
            error!(sink = %self.name, frame = measurement.frame, error = %e, "Write failed");
            self.sink_error(e)
        })?;
        self.stats.payloads_written += 1;
        Ok(())
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), CosimError> {
        self.actor_log.flush().map_err(|e| self.sink_error(e))
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), CosimError> {
        self.actor_log.flush().map_err(|e| self.sink_error(e))?;
        self.write_manifest().map_err(|e| self.sink_error(e))?;
        info!(
            sink = %self.name,
            rows = self.stats.actor_rows,
            payloads = self.stats.payloads_written,
            skipped = self.stats.blank_skipped,
            "FileSink closed"
        );
        Ok(())
    }
}
