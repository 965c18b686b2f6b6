//! Payload encoders

use std::io::{self, Write};
use std::path::Path;

use bytemuck::{pod_read_unaligned, Pod, Zeroable};
use contracts::{ImageData, ImageFormat, PointCloudData};

use crate::palette::color_of;

/// Raw lidar point as delivered by the engine
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct LidarPoint {
    x: f32,
    y: f32,
    z: f32,
    intensity: f32,
}

/// Raw semantic lidar point as delivered by the engine
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct SemanticLidarPoint {
    x: f32,
    y: f32,
    z: f32,
    cos_inc: f32,
    object_idx: u32,
    object_tag: u32,
}

const LIDAR_STRIDE: usize = std::mem::size_of::<LidarPoint>();
const SEMANTIC_LIDAR_STRIDE: usize = std::mem::size_of::<SemanticLidarPoint>();

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

/// Pixels ready for the PNG encoder
pub fn image_pixels(image: &ImageData) -> io::Result<(Vec<u8>, image::ColorType)> {
    let pixels = image.width as usize * image.height as usize;
    if image.data.len() < pixels * 4 {
        return Err(invalid(format!(
            "image {}x{} needs {} bytes, got {}",
            image.width,
            image.height,
            pixels * 4,
            image.data.len()
        )));
    }
    let bgra = image.data[..pixels * 4].chunks_exact(4);

    Ok(match image.format {
        ImageFormat::Bgra8 => {
            let mut rgba = Vec::with_capacity(pixels * 4);
            for px in bgra {
                rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
            (rgba, image::ColorType::Rgba8)
        }
        ImageFormat::SemanticTag => {
            let mut rgb = Vec::with_capacity(pixels * 3);
            for px in bgra {
                rgb.extend_from_slice(&color_of(px[2] as u32));
            }
            (rgb, image::ColorType::Rgb8)
        }
        ImageFormat::Depth => {
            // depth = (R + G*256 + B*256^2) / (256^3 - 1), rendered logarithmic
            let mut gray = Vec::with_capacity(pixels);
            for px in bgra {
                let raw = px[2] as f64 + px[1] as f64 * 256.0 + px[0] as f64 * 65536.0;
                let normalized = raw / 16_777_215.0;
                let log_depth = if normalized > 0.0 {
                    (1.0 + normalized.ln() / 5.70378).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                gray.push((log_depth * 255.0).round() as u8);
            }
            (gray, image::ColorType::L8)
        }
    })
}

pub fn save_image(path: &Path, image: &ImageData) -> io::Result<()> {
    let (pixels, color) = image_pixels(image)?;
    image::save_buffer(path, &pixels, image.width, image.height, color).map_err(io::Error::other)
}

/// Binary little-endian PLY of a lidar sweep (x, -y, z, intensity)
pub fn write_lidar_ply<W: Write>(out: &mut W, pc: &PointCloudData) -> io::Result<()> {
    let points = points_of(pc, LIDAR_STRIDE)?;

    writeln!(out, "ply")?;
    writeln!(out, "format binary_little_endian 1.0")?;
    writeln!(out, "element vertex {}", points.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property float intensity")?;
    writeln!(out, "end_header")?;

    let mut body = Vec::with_capacity(points.len() * LIDAR_STRIDE);
    for chunk in points {
        let p: LidarPoint = pod_read_unaligned(&chunk[..LIDAR_STRIDE]);
        for v in [p.x, -p.y, p.z, p.intensity] {
            body.extend_from_slice(&v.to_le_bytes());
        }
    }
    out.write_all(&body)
}

/// Binary little-endian PLY of a semantic lidar sweep, colored by tag
pub fn write_semantic_lidar_ply<W: Write>(out: &mut W, pc: &PointCloudData) -> io::Result<()> {
    let points = points_of(pc, SEMANTIC_LIDAR_STRIDE)?;

    writeln!(out, "ply")?;
    writeln!(out, "format binary_little_endian 1.0")?;
    writeln!(out, "element vertex {}", points.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property uchar red")?;
    writeln!(out, "property uchar green")?;
    writeln!(out, "property uchar blue")?;
    writeln!(out, "property uint tag")?;
    writeln!(out, "end_header")?;

    let mut body = Vec::with_capacity(points.len() * 19);
    for chunk in points {
        let p: SemanticLidarPoint = pod_read_unaligned(&chunk[..SEMANTIC_LIDAR_STRIDE]);
        for v in [p.x, -p.y, p.z] {
            body.extend_from_slice(&v.to_le_bytes());
        }
        body.extend_from_slice(&color_of(p.object_tag));
        body.extend_from_slice(&p.object_tag.to_le_bytes());
    }
    out.write_all(&body)
}

fn points_of(pc: &PointCloudData, min_stride: usize) -> io::Result<Vec<&[u8]>> {
    let stride = pc.point_stride as usize;
    if stride < min_stride {
        return Err(invalid(format!(
            "point stride {} below {}",
            stride, min_stride
        )));
    }
    let count = (pc.num_points as usize).min(pc.data.len() / stride);
    Ok(pc.data[..count * stride].chunks_exact(stride).collect())
}
