//! Linear interpolation of a band of images and simple path metrics.

use crate::geometry::Structure;
use nalgebra::{DVector, Vector3};

/// Places every interior image on the straight line between the first and
/// last image.
///
/// Image `i` of `n` ends up at `r_0 + i * (r_last - r_0) / (n - 1)`. With
/// `mic` the per-atom displacement is first reduced to its minimum image in
/// the cell of the first image, so atoms that crossed a periodic boundary do
/// not travel through the whole cell.
///
/// Bands with fewer than three images have nothing to interpolate.
///
/// # Panics
///
/// Panics if the endpoints have different numbers of atoms; callers check
/// this with [`Structure::same_atoms_as`] first.
pub fn interpolate_linear(images: &mut [Structure], mic: bool) {
    let n = images.len();
    if n < 3 {
        return;
    }
    let first = &images[0];
    let last = &images[n - 1];
    assert_eq!(first.num_atoms, last.num_atoms);

    let start = first.coords.clone();
    let mut delta = &last.coords - &first.coords;
    if mic {
        for atom in 0..first.num_atoms {
            let d = Vector3::new(delta[atom * 3], delta[atom * 3 + 1], delta[atom * 3 + 2]);
            let wrapped = first.minimum_image(&d);
            for k in 0..3 {
                delta[atom * 3 + k] = wrapped[k];
            }
        }
    }
    let step = delta / (n - 1) as f64;

    for (i, image) in images.iter_mut().enumerate().take(n - 1).skip(1) {
        let coords: DVector<f64> = &start + &step * i as f64;
        image.set_coords(&coords);
    }
}

/// Distances between consecutive images (norm of the full coordinate
/// difference).
pub fn image_spacings(images: &[Structure]) -> Vec<f64> {
    images
        .windows(2)
        .map(|pair| (&pair[1].coords - &pair[0].coords).norm())
        .collect()
}

/// Total length of the path through all images.
pub fn path_length(images: &[Structure]) -> f64 {
    image_spacings(images).iter().sum()
}

/// Validate that interpolated images are reasonable
pub fn validate_images(images: &[Structure]) -> Result<(), String> {
    let reference = images.first().ok_or("No images to validate")?;

    for (i, image) in images.iter().enumerate() {
        if !image.same_atoms_as(reference) {
            return Err(format!("Image {} has different atoms than image 0", i));
        }
        if let Some(pos) = image.coords.iter().position(|c| !c.is_finite()) {
            return Err(format!(
                "Image {} atom {} has a non-finite coordinate",
                i,
                pos / 3
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix3;

    fn pair(start: [f64; 3], end: [f64; 3], n: usize) -> Vec<Structure> {
        let a = Structure::new(
            vec!["H".to_string()],
            start.to_vec(),
            Matrix3::from_diagonal_element(10.0),
        );
        let b = Structure::new(
            vec!["H".to_string()],
            end.to_vec(),
            Matrix3::from_diagonal_element(10.0),
        );
        let mut images = vec![a.clone(); n - 1];
        images.push(b);
        images
    }

    #[test]
    fn test_linear_fractions() {
        let mut images = pair([0.0, 0.0, 0.0], [4.0, 8.0, -4.0], 5);
        interpolate_linear(&mut images, false);

        for (i, image) in images.iter().enumerate() {
            let t = i as f64 / 4.0;
            let c = image.get_atom_coords(0);
            assert!((c[0] - 4.0 * t).abs() < 1e-12);
            assert!((c[1] - 8.0 * t).abs() < 1e-12);
            assert!((c[2] + 4.0 * t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_linear_endpoints_untouched() {
        let mut images = pair([1.0, 1.0, 1.0], [2.0, 2.0, 2.0], 4);
        let before_first = images[0].clone();
        let before_last = images[3].clone();
        interpolate_linear(&mut images, false);
        assert_eq!(images[0], before_first);
        assert_eq!(images[3], before_last);
    }

    #[test]
    fn test_linear_with_mic_crosses_boundary() {
        let mut images = pair([9.0, 0.0, 0.0], [1.0, 0.0, 0.0], 3);
        interpolate_linear(&mut images, true);
        // Shortest route from x=9 to x=1 passes through x=10 (== 0)
        assert!((images[1].get_atom_coords(0)[0] - 10.0).abs() < 1e-12);

        let mut plain = pair([9.0, 0.0, 0.0], [1.0, 0.0, 0.0], 3);
        interpolate_linear(&mut plain, false);
        assert!((plain[1].get_atom_coords(0)[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_images_is_noop() {
        let mut images = pair([0.0; 3], [1.0, 0.0, 0.0], 2);
        let before = images.clone();
        interpolate_linear(&mut images, false);
        assert_eq!(images, before);
    }

    #[test]
    fn test_path_length_and_spacings() {
        let mut images = pair([0.0; 3], [3.0, 0.0, 0.0], 4);
        interpolate_linear(&mut images, false);
        let spacings = image_spacings(&images);
        assert_eq!(spacings.len(), 3);
        assert!(spacings.iter().all(|s| (s - 1.0).abs() < 1e-12));
        assert!((path_length(&images) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_images() {
        let mut images = pair([0.0; 3], [1.0, 0.0, 0.0], 3);
        assert!(validate_images(&images).is_ok());
        assert!(validate_images(&[]).is_err());

        images[1].coords[0] = f64::NAN;
        let err = validate_images(&images).unwrap_err();
        assert!(err.contains("non-finite"));
    }
}
