//! Rotation augmentation used when exporting the training cache.

/// Rotate a single-channel `height x width` image by `degrees` about its centre.
///
/// Uses nearest-neighbour sampling; pixels that map outside the source are 0.
pub fn rotate_nearest(pixels: &[f32], height: usize, width: usize, degrees: f32) -> Vec<f32> {
    let mut out = vec![0.0f32; height * width];
    if pixels.len() != height * width {
        return out;
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cy = (height as f32 - 1.0) / 2.0;
    let cx = (width as f32 - 1.0) / 2.0;
    for y in 0..height {
        for x in 0..width {
            // Inverse mapping: find the source pixel that lands on (x, y).
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = (cos * dx + sin * dy + cx).round();
            let sy = (-sin * dx + cos * dy + cy).round();
            if sx < 0.0 || sy < 0.0 || sx >= width as f32 || sy >= height as f32 {
                continue;
            }
            out[y * width + x] = pixels[sy as usize * width + sx as usize];
        }
    }
    out
}

/// Append one rotated copy of every sample per angle.
///
/// `pixels` holds `labels.len()` samples of `height * width` values. The
/// result lists all samples for the first angle, then the second, and so on.
pub fn rotate_samples(
    pixels: &[f32],
    labels: &[i64],
    height: usize,
    width: usize,
    angles: &[f32],
) -> (Vec<f32>, Vec<i64>) {
    let features = height * width;
    let mut out_pixels = Vec::with_capacity(pixels.len() * angles.len());
    let mut out_labels = Vec::with_capacity(labels.len() * angles.len());
    for &angle in angles {
        for (sample, &label) in pixels.chunks_exact(features).zip(labels) {
            if angle == 0.0 {
                out_pixels.extend_from_slice(sample);
            } else {
                out_pixels.extend(rotate_nearest(sample, height, width, angle));
            }
            out_labels.push(label);
        }
    }
    (out_pixels, out_labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_degrees_is_identity() {
        let pixels: Vec<f32> = (0..9).map(|v| v as f32).collect();
        assert_eq!(rotate_nearest(&pixels, 3, 3, 0.0), pixels);
    }

    #[test]
    fn quarter_turn_moves_corners() {
        // 0 1 2        6 3 0
        // 3 4 5   ->   7 4 1
        // 6 7 8        8 5 2
        let pixels: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let rotated = rotate_nearest(&pixels, 3, 3, 90.0);
        assert_eq!(rotated, vec![6.0, 3.0, 0.0, 7.0, 4.0, 1.0, 8.0, 5.0, 2.0]);
    }

    #[test]
    fn rotate_samples_groups_by_angle() {
        let pixels = vec![1.0; 8];
        let (out, labels) = rotate_samples(&pixels, &[3, 7], 2, 2, &[0.0, 15.0]);
        assert_eq!(out.len(), 16);
        assert_eq!(labels, vec![3, 7, 3, 7]);
    }
}
