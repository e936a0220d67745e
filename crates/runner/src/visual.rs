//! Screenshot comparison and perceptual baselines

use image::{GenericImageView, Pixel, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use sitediff_common::{
    sha256_hex, ComparisonStrategy, SiteDiffError, SiteDiffResult, Snapshot,
};

/// Largest possible YIQ distance between two colors
const MAX_YIQ_DELTA: f64 = 35215.0;

/// Result of comparing two images
#[derive(Debug, Clone)]
pub struct VisualDiff {
    /// Whether the pair is classified identical under the strategy
    pub identical: bool,

    /// Number of differing pixels (perceptual comparisons only)
    pub diff_pixels: Option<u64>,

    /// Total pixels compared, over the union of both image areas
    pub total_pixels: Option<u64>,

    /// PNG highlighting the differing pixels, when there are any
    pub diff_image: Option<Vec<u8>>,
}

impl VisualDiff {
    pub fn diff_percent(&self) -> Option<f64> {
        match (self.diff_pixels, self.total_pixels) {
            (Some(diff), Some(total)) if total > 0 => Some(diff as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// Compare two encoded images under a strategy
pub fn compare(a: &[u8], b: &[u8], strategy: ComparisonStrategy) -> SiteDiffResult<VisualDiff> {
    match strategy {
        ComparisonStrategy::Exact => Ok(VisualDiff {
            identical: a == b,
            diff_pixels: None,
            total_pixels: None,
            diff_image: None,
        }),
        ComparisonStrategy::Perceptual {
            threshold,
            max_diff_pixels,
        } => {
            let img_a = image::load_from_memory(a)?.to_rgba8();
            let img_b = image::load_from_memory(b)?.to_rgba8();

            if a == b {
                debug!("Screenshots match exactly (same bytes)");
                return Ok(VisualDiff {
                    identical: true,
                    diff_pixels: Some(0),
                    total_pixels: Some(img_a.width() as u64 * img_a.height() as u64),
                    diff_image: None,
                });
            }

            let diff = pixel_diff(&img_a, &img_b, threshold);
            let diff_image = match &diff.image {
                Some(img) => Some(encode_png(img)?),
                None => None,
            };

            Ok(VisualDiff {
                identical: diff.diff_pixels <= max_diff_pixels,
                diff_pixels: Some(diff.diff_pixels),
                total_pixels: Some(diff.total_pixels),
                diff_image,
            })
        }
    }
}

/// Compare two snapshots under a strategy
pub fn compare_snapshots(
    a: &Snapshot,
    b: &Snapshot,
    strategy: ComparisonStrategy,
) -> SiteDiffResult<VisualDiff> {
    if (a.width, a.height) != (b.width, b.height) {
        warn!(
            "Screenshot dimensions differ: {} {}x{} vs {} {}x{}",
            a.task.environment.name,
            a.width,
            a.height,
            b.task.environment.name,
            b.width,
            b.height
        );
    }
    compare(&a.image_bytes, &b.image_bytes, strategy)
}

/// Pixel-level difference between two images
#[derive(Debug, Clone)]
pub struct PixelDiff {
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub image: Option<RgbaImage>,
}

/// Count pixels whose YIQ color distance exceeds `threshold` (0.0 - 1.0).
///
/// Images of different sizes are compared on the canvas covering both;
/// every pixel present in only one of them counts as differing.
pub fn pixel_diff(a: &RgbaImage, b: &RgbaImage, threshold: f64) -> PixelDiff {
    let width = a.width().max(b.width());
    let height = a.height().max(b.height());
    let max_delta = MAX_YIQ_DELTA * threshold * threshold;

    let mut diff_img = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let pa = a.get_pixel_checked(x, y);
            let pb = b.get_pixel_checked(x, y);

            let differs = match (pa, pb) {
                (Some(pa), Some(pb)) => color_delta(pa, pb) > max_delta,
                _ => true,
            };

            if differs {
                diff_pixels += 1;
                // Mark diff pixels in red
                diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            } else if let Some(pa) = pa {
                // Keep original but dim it
                let channels = pa.channels();
                diff_img.put_pixel(
                    x,
                    y,
                    Rgba([channels[0] / 2, channels[1] / 2, channels[2] / 2, 128]),
                );
            }
        }
    }

    PixelDiff {
        diff_pixels,
        total_pixels: width as u64 * height as u64,
        image: (diff_pixels > 0).then_some(diff_img),
    }
}

/// Squared YIQ distance of two pixels, each blended over white
fn color_delta(a: &Rgba<u8>, b: &Rgba<u8>) -> f64 {
    if a == b {
        return 0.0;
    }
    let (r1, g1, b1) = blend(a);
    let (r2, g2, b2) = blend(b);

    let y = rgb_to_y(r1, g1, b1) - rgb_to_y(r2, g2, b2);
    let i = rgb_to_i(r1, g1, b1) - rgb_to_i(r2, g2, b2);
    let q = rgb_to_q(r1, g1, b1) - rgb_to_q(r2, g2, b2);

    0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q
}

fn blend(p: &Rgba<u8>) -> (f64, f64, f64) {
    let alpha = p[3] as f64 / 255.0;
    let mix = |c: u8| 255.0 + (c as f64 - 255.0) * alpha;
    (mix(p[0]), mix(p[1]), mix(p[2]))
}

fn rgb_to_y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb_to_i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb_to_q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

fn encode_png(img: &RgbaImage) -> SiteDiffResult<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// Outcome of checking a snapshot against its baseline
#[derive(Debug, Clone)]
pub enum BaselineCheck {
    /// No baseline existed; the snapshot became the baseline
    Created { path: PathBuf },

    /// The baseline was replaced by the snapshot
    Updated { path: PathBuf },

    /// The snapshot was compared to the stored baseline
    Compared {
        path: PathBuf,
        baseline_sha256: String,
        diff: VisualDiff,
    },
}

impl BaselineCheck {
    pub fn path(&self) -> &Path {
        match self {
            BaselineCheck::Created { path }
            | BaselineCheck::Updated { path }
            | BaselineCheck::Compared { path, .. } => path,
        }
    }
}

/// Directory of approved screenshots, one per (viewport, page)
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,

    /// Overwrite existing baselines instead of comparing
    update: bool,
}

impl BaselineStore {
    pub fn open(dir: impl Into<PathBuf>, update: bool) -> SiteDiffResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| SiteDiffError::OutputDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir, update })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, target_key: &str) -> PathBuf {
        self.dir.join(format!("{}.png", target_key))
    }

    /// Check a snapshot against the baseline of its (viewport, page)
    pub fn check(
        &self,
        snapshot: &Snapshot,
        strategy: ComparisonStrategy,
    ) -> SiteDiffResult<BaselineCheck> {
        let key = snapshot.task.target_key();
        let path = self.path_for(&key);

        if !path.exists() {
            info!("Creating baseline for '{}'", key);
            std::fs::write(&path, &snapshot.image_bytes)?;
            return Ok(BaselineCheck::Created { path });
        }

        if self.update {
            std::fs::write(&path, &snapshot.image_bytes)?;
            info!("Updated baseline for '{}'", key);
            return Ok(BaselineCheck::Updated { path });
        }

        let baseline = std::fs::read(&path)?;
        let baseline_sha256 = sha256_hex(&baseline);
        if baseline_sha256 == snapshot.sha256 {
            debug!("Baseline '{}' matches exactly (same hash)", key);
            let diff = VisualDiff {
                identical: true,
                diff_pixels: Some(0),
                total_pixels: Some(snapshot.width as u64 * snapshot.height as u64),
                diff_image: None,
            };
            return Ok(BaselineCheck::Compared {
                path,
                baseline_sha256,
                diff,
            });
        }
        let diff = compare(&baseline, &snapshot.image_bytes, strategy)?;

        if !diff.identical {
            warn!(
                "Visual regression detected in '{}': {} pixels differ",
                key,
                diff.diff_pixels.unwrap_or_default()
            );
        }

        Ok(BaselineCheck::Compared {
            path,
            baseline_sha256,
            diff,
        })
    }

    /// Names of all stored baselines
    pub fn list(&self) -> SiteDiffResult<Vec<String>> {
        let mut baselines = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(name) = path.file_stem() {
                    baselines.push(name.to_string_lossy().to_string());
                }
            }
        }

        baselines.sort();
        Ok(baselines)
    }

    /// Dimensions of a stored baseline
    pub fn dimensions(&self, target_key: &str) -> SiteDiffResult<(u32, u32)> {
        let path = self.path_for(target_key);
        if !path.exists() {
            return Err(SiteDiffError::BaselineNotFound(path.display().to_string()));
        }
        Ok(image::open(&path)?.dimensions())
    }
}
