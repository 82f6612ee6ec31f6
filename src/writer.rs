use crate::detection::{DataPoint, Positions};
use crate::error::Result;
use crate::roi::Roi;
use serde_derive::{Deserialize, Serialize};
use std::io::Write;

/// ROI index to value mapping, persisted once per run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiMapEntry {
    pub idx: usize,
    pub value: Option<i32>,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl From<&Roi> for RoiMapEntry {
    fn from(roi: &Roi) -> Self {
        let rect = roi.rect();

        Self {
            idx: roi.idx(),
            value: roi.value(),
            x: rect.x,
            y: rect.y,
            w: rect.w,
            h: rect.h,
        }
    }
}

/// One detection of one ROI.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRow {
    pub roi_idx: usize,
    #[serde(flatten)]
    pub point: DataPoint,
}

/// Durable sink for per-frame results.
pub trait ResultWriter {
    fn start(&mut self, rois: &[&Roi]) -> Result<()>;
    fn write(&mut self, t: i64, positions: &Positions) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

/// Keeps every row in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultWriter {
    pub roi_map: Vec<RoiMapEntry>,
    pub rows: Vec<ResultRow>,
    pub frames: usize,
    pub flushed: bool,
}

impl MemoryResultWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Detections of one ROI in frame order.
    pub fn points(&self, roi_idx: usize) -> Vec<DataPoint> {
        self.rows
            .iter()
            .filter(|r| r.roi_idx == roi_idx)
            .map(|r| r.point)
            .collect()
    }
}

impl ResultWriter for MemoryResultWriter {
    fn start(&mut self, rois: &[&Roi]) -> Result<()> {
        self.roi_map = rois.iter().map(|&r| r.into()).collect();
        Ok(())
    }

    fn write(&mut self, _t: i64, positions: &Positions) -> Result<()> {
        self.rows.extend(positions.iter().map(|(&roi_idx, &point)| ResultRow { roi_idx, point }));
        self.frames += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flushed = true;
        Ok(())
    }
}

#[derive(Serialize)]
struct RoiMapLine<'a> {
    roi_map: &'a [RoiMapEntry],
}

/// Writes a `roi_map` line followed by one JSON object per detection.
pub struct JsonLinesResultWriter<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesResultWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultWriter for JsonLinesResultWriter<W> {
    fn start(&mut self, rois: &[&Roi]) -> Result<()> {
        let roi_map: Vec<RoiMapEntry> = rois.iter().map(|&r| r.into()).collect();

        serde_json::to_writer(&mut self.out, &RoiMapLine { roi_map: &roi_map })?;
        self.out.write_all(b"\n")?;

        Ok(())
    }

    fn write(&mut self, _t: i64, positions: &Positions) -> Result<()> {
        for (&roi_idx, &point) in positions {
            serde_json::to_writer(&mut self.out, &ResultRow { roi_idx, point })?;
            self.out.write_all(b"\n")?;
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra as na;

    fn roi(idx: usize, value: Option<i32>) -> Roi {
        Roi::new(
            vec![
                na::Point2::new(10, 20),
                na::Point2::new(40, 20),
                na::Point2::new(40, 50),
                na::Point2::new(10, 50),
            ],
            idx,
            value,
        )
        .unwrap()
    }

    fn point(t: i64, x: i32) -> DataPoint {
        DataPoint {
            t,
            x,
            y: 7,
            w: 6,
            h: 3,
            phi: 45,
            xy_dist: 2,
            has_interacted: false,
        }
    }

    #[test]
    fn json_lines_layout() {
        let a = roi(1, Some(3));
        let b = roi(2, None);
        let mut writer = JsonLinesResultWriter::new(Vec::new());

        writer.start(&[&a, &b]).unwrap();

        let mut positions = Positions::new();
        positions.insert(2, point(40, 5));
        positions.insert(1, point(40, 9));
        writer.write(40, &positions).unwrap();
        writer.flush().unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["roi_map"][0]["value"], 3);
        assert!(lines[0]["roi_map"][1]["value"].is_null());
        assert_eq!(lines[0]["roi_map"][1]["w"], 31);

        assert_eq!(lines[1]["roi_idx"], 1);
        assert_eq!(lines[1]["x"], 9);
        assert_eq!(lines[2]["roi_idx"], 2);
        assert_eq!(lines[2]["phi"], 45);

        let row: ResultRow = serde_json::from_value(lines[2].clone()).unwrap();
        assert_eq!(row.point, point(40, 5));
    }

    #[test]
    fn memory_writer_collects_rows() {
        let a = roi(1, None);
        let mut writer = MemoryResultWriter::new();

        writer.start(&[&a]).unwrap();
        for t in [0, 40] {
            let mut positions = Positions::new();
            positions.insert(1, point(t, t as i32));
            writer.write(t, &positions).unwrap();
        }
        writer.write(80, &Positions::new()).unwrap();
        writer.flush().unwrap();

        assert_eq!(writer.roi_map.len(), 1);
        assert_eq!(writer.frames, 3);
        assert_eq!(writer.points(1).len(), 2);
        assert!(writer.flushed);
    }
}
