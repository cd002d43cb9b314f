//! File-system [`ImageSlicer`]: crops layer images out of texture PNGs and renders fog layers.

use anyhow::{Context as _, bail};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use quad2spine::{ImageSlicer, Rect, SliceError, SliceRequest};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Texture variants live next to the source document as `{stem}.{tex}.png` (variant 0) and
/// `{stem}.{tex}.{skin}.png`.
pub struct FsImageSlicer {
    source_dir: PathBuf,
    stem: String,
    out_dir: PathBuf,
    scale: f32,
    textures: Mutex<HashMap<(u32, usize), Arc<RgbaImage>>>,
    skin_counts: Mutex<HashMap<u32, usize>>,
}

impl FsImageSlicer {
    pub fn new(source: &Path, out_dir: impl Into<PathBuf>, scale: f32) -> Self {
        let source_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            source_dir,
            stem,
            out_dir: out_dir.into(),
            scale,
            textures: Mutex::new(HashMap::new()),
            skin_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn texture_path(&self, tex_id: u32, skin_index: usize) -> PathBuf {
        let file = if skin_index == 0 {
            format!("{}.{tex_id}.png", self.stem)
        } else {
            format!("{}.{tex_id}.{skin_index}.png", self.stem)
        };
        self.source_dir.join(file)
    }

    fn texture(&self, tex_id: u32, skin_index: usize) -> anyhow::Result<Arc<RgbaImage>> {
        if let Some(tex) = lock(&self.textures).get(&(tex_id, skin_index)) {
            return Ok(Arc::clone(tex));
        }

        let path = self.texture_path(tex_id, skin_index);
        let mut img = image::open(&path)
            .with_context(|| format!("open texture '{}'", path.display()))?
            .to_rgba8();
        if self.scale != 1.0 {
            let width = scaled(img.width(), self.scale);
            let height = scaled(img.height(), self.scale);
            img = imageops::resize(&img, width, height, FilterType::Triangle);
        }
        tracing::debug!(
            texture = %path.display(),
            width = img.width(),
            height = img.height(),
            "loaded texture"
        );

        // Two workers may decode the same texture; the first insert wins.
        let img = Arc::new(img);
        Ok(Arc::clone(
            lock(&self.textures)
                .entry((tex_id, skin_index))
                .or_insert(img),
        ))
    }

    fn slice_layer(&self, request: &SliceRequest) -> anyhow::Result<()> {
        let img = match request.layer.fog {
            Some(colors) => render_fog(&request.rect, &colors),
            None => {
                let texture = self.texture(request.tex_id, request.skin_index)?;
                crop(&texture, &request.rect)?
            }
        };

        let path = self.out_dir.join(format!("{}.png", request.name));
        img.save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("write png '{}'", path.display()))?;
        tracing::trace!(image = %path.display(), "sliced");
        Ok(())
    }
}

impl ImageSlicer for FsImageSlicer {
    fn skin_count(&self, tex_id: u32) -> usize {
        *lock(&self.skin_counts).entry(tex_id).or_insert_with(|| {
            let mut count = 1;
            while self.texture_path(tex_id, count).is_file() {
                count += 1;
            }
            count
        })
    }

    fn slice(&self, request: &SliceRequest) -> Result<(), SliceError> {
        Ok(self.slice_layer(request)?)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn scaled(len: u32, scale: f32) -> u32 {
    ((len as f32 * scale).round() as u32).max(1)
}

/// Pixel bounds of `rect`, at least one pixel wide and high.
fn pixel_bounds(rect: &Rect) -> (i64, i64, u32, u32) {
    let x = rect.x.floor() as i64;
    let y = rect.y.floor() as i64;
    let width = ((rect.x + rect.width).ceil() as i64 - x).max(1) as u32;
    let height = ((rect.y + rect.height).ceil() as i64 - y).max(1) as u32;
    (x, y, width, height)
}

fn crop(texture: &RgbaImage, rect: &Rect) -> anyhow::Result<RgbaImage> {
    let (x, y, width, height) = pixel_bounds(rect);
    let (tw, th) = texture.dimensions();
    let outside = x >= i64::from(tw)
        || y >= i64::from(th)
        || x + i64::from(width) <= 0
        || y + i64::from(height) <= 0;
    if outside {
        bail!("source rect {x},{y} {width}x{height} lies outside the {tw}x{th} texture");
    }

    // Pixels outside the texture stay transparent.
    let mut out = RgbaImage::new(width, height);
    let sx = x.max(0) as u32;
    let sy = y.max(0) as u32;
    let part = imageops::crop_imm(
        texture,
        sx,
        sy,
        (x + i64::from(width)).min(i64::from(tw)) as u32 - sx,
        (y + i64::from(height)).min(i64::from(th)) as u32 - sy,
    )
    .to_image();
    imageops::overlay(&mut out, &part, i64::from(sx) - x, i64::from(sy) - y);
    Ok(out)
}

/// Bilinear gradient of the four corner colours (top-left, top-right, bottom-right,
/// bottom-left).
fn render_fog(rect: &Rect, colors: &[[f32; 4]; 4]) -> RgbaImage {
    let (_, _, width, height) = pixel_bounds(rect);
    let fx = |x: u32| if width > 1 { x as f32 / (width - 1) as f32 } else { 0.0 };
    let fy = |y: u32| if height > 1 { y as f32 / (height - 1) as f32 } else { 0.0 };

    RgbaImage::from_fn(width, height, |x, y| {
        let (u, v) = (fx(x), fy(y));
        let mut px = [0u8; 4];
        for (c, out) in px.iter_mut().enumerate() {
            let top = colors[0][c] + (colors[1][c] - colors[0][c]) * u;
            let bottom = colors[3][c] + (colors[2][c] - colors[3][c]) * u;
            *out = ((top + (bottom - top) * v).clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        Rgba(px)
    })
}
