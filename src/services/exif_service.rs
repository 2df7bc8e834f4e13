use std::io::Cursor;

// Most EXIF headers live in the first 128KB of the file.
const EXIF_SCAN_LIMIT: usize = 128 * 1024;

/// Read the EXIF orientation tag from encoded image bytes, defaulting to 1.
pub fn get_orientation(bytes: &[u8]) -> u32 {
    let header = &bytes[..bytes.len().min(EXIF_SCAN_LIMIT)];

    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(header)) {
        Ok(e) => e,
        Err(_) => return 1,
    };

    if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
        match field.value {
            exif::Value::Short(ref v) => *v.first().unwrap_or(&1) as u32,
            exif::Value::Long(ref v) => *v.first().unwrap_or(&1),
            _ => 1,
        }
    } else {
        1
    }
}

/// Apply EXIF orientation so the photo is upright, as a browser would show it.
pub fn apply_orientation(img: image::DynamicImage, orientation: u32) -> image::DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}
