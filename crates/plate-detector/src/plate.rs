//! Plate text normalization and detection assembly

use camera_capture::VideoFrame;

use crate::decode::RecognizedText;
use crate::{BoundingBox, DetectorError, RawDetection};

/// Minimum length of a cleaned plate string
const MIN_PLATE_LEN: usize = 6;

/// Uppercase and strip everything except `A-Z` and `0-9`
pub fn clean_plate_text(text: &str) -> String {
    text.chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// Check a cleaned string against the Ghanaian plate layouts:
/// `AA 1234 20`, `AA 123 20`, `AAA 123 20` and `AA 1-4 digits [A] YY`.
pub fn is_valid_plate_format(cleaned: &str) -> bool {
    let bytes = cleaned.as_bytes();
    if bytes.len() < MIN_PLATE_LEN || !bytes.iter().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
        return false;
    }

    let letters = bytes.iter().take_while(|b| b.is_ascii_uppercase()).count();
    let rest = &bytes[letters..];

    match letters {
        2 => {
            if rest.iter().all(u8::is_ascii_digit) {
                return (3..=6).contains(&rest.len());
            }
            // Digits, one series letter, two-digit year
            let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
            let tail = &rest[digits..];
            (1..=4).contains(&digits)
                && tail.len() == 3
                && tail[0].is_ascii_uppercase()
                && tail[1..].iter().all(u8::is_ascii_digit)
        }
        3 => rest.len() == 5 && rest.iter().all(u8::is_ascii_digit),
        _ => false,
    }
}

/// Clean, validate and format recognizer output.
///
/// Returns `None` when the text cannot be a plate. Valid plates of seven or
/// more characters are formatted as `REGION-SERIAL-YY`.
pub fn normalize_plate(text: &str) -> Option<String> {
    let cleaned = clean_plate_text(text);
    if !is_valid_plate_format(&cleaned) {
        return None;
    }
    if cleaned.len() < 7 {
        return Some(cleaned);
    }

    let region = cleaned.bytes().take_while(u8::is_ascii_uppercase).count();
    let year_start = cleaned.len() - 2;
    Some(format!(
        "{}-{}-{}",
        &cleaned[..region],
        &cleaned[region..year_start],
        &cleaned[year_start..]
    ))
}

/// Crop the candidate region, read it and build the raw detection.
///
/// `Ok(None)` when the region is empty, nothing was read, or the text is
/// not a plate.
pub(crate) fn read_candidate<F>(
    frame: &VideoFrame,
    bounding_box: BoundingBox,
    detection_confidence: f32,
    recognize: F,
) -> Result<Option<RawDetection>, DetectorError>
where
    F: FnOnce(&VideoFrame) -> Result<Option<RecognizedText>, DetectorError>,
{
    let Some((x, y, w, h)) = bounding_box.to_crop(frame.width, frame.height) else {
        return Ok(None);
    };
    let Some(crop) = frame.crop(x, y, w, h) else {
        return Ok(None);
    };
    let Some(text) = recognize(&crop)? else {
        return Ok(None);
    };
    let Some(plate_text) = normalize_plate(&text.text) else {
        tracing::debug!("Rejected non-plate text {:?}", text.text);
        return Ok(None);
    };

    Ok(Some(RawDetection {
        plate_text,
        detection_confidence: detection_confidence.clamp(0.0, 1.0),
        text_confidence: text.confidence.clamp(0.0, 1.0),
        bounding_box,
    }))
}
