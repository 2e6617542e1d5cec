use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Intensity image with one spatial axis and one temporal axis.
///
/// Samples are stored row-major and indexed `[position, frame]`, so a
/// single position's time course is contiguous.
#[derive(Debug, Clone, PartialEq)]
pub struct Kymograph {
    positions: usize,
    frames: usize,
    data: Vec<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KymographFile {
    Rows(Vec<Vec<f64>>),
    Flat {
        positions: usize,
        frames: usize,
        data: Vec<f64>,
    },
}

#[derive(Serialize)]
struct FlatKymograph<'a> {
    positions: usize,
    frames: usize,
    data: &'a [f64],
}

impl Kymograph {
    pub fn new(positions: usize, frames: usize, data: Vec<f64>) -> Result<Self> {
        if positions == 0 {
            bail!("Kymograph has no positions");
        }
        if frames == 0 {
            bail!("Kymograph has no frames");
        }
        let expected = positions
            .checked_mul(frames)
            .ok_or_else(|| anyhow!("Kymograph dimensions {positions}x{frames} overflow"))?;
        if data.len() != expected {
            bail!(
                "Kymograph of {} positions and {} frames needs {} samples, got {}",
                positions,
                frames,
                expected,
                data.len()
            );
        }
        if let Some(idx) = data.iter().position(|v| !v.is_finite()) {
            bail!(
                "Kymograph sample at position {}, frame {} is not finite",
                idx / frames,
                idx % frames
            );
        }
        Ok(Self {
            positions,
            frames,
            data,
        })
    }

    /// Builds a kymograph from one row per position, each row holding the
    /// intensity of every frame.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let positions = rows.len();
        let frames = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != frames) {
            bail!(
                "Kymograph rows are ragged: row 0 has {} frames, row {} has {}",
                frames,
                idx,
                row.len()
            );
        }
        Self::new(positions, frames, rows.into_iter().flatten().collect())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Could not open kymograph {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        let parsed: KymographFile = serde_json::from_reader(reader)
            .with_context(|| format!("Could not parse kymograph {}", path.display()))?;
        match parsed {
            KymographFile::Rows(rows) => Self::from_rows(rows),
            KymographFile::Flat {
                positions,
                frames,
                data,
            } => Self::new(positions, frames, data),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path.as_ref())?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer(
            writer,
            &FlatKymograph {
                positions: self.positions,
                frames: self.frames,
                data: &self.data,
            },
        )?;
        Ok(())
    }

    pub fn positions(&self) -> usize {
        self.positions
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn get(&self, position: usize, frame: usize) -> f64 {
        self.data[position * self.frames + frame]
    }

    /// Time course of a single position.
    pub fn row(&self, position: usize) -> &[f64] {
        let start = position * self.frames;
        &self.data[start..start + self.frames]
    }
}
